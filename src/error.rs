//! Error types for the armstate reconciliation engine.
//!
//! This module provides the error hierarchy for every stage of an invocation:
//! configuration, resource schemas, the ARM REST API, and reconciliation.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for armstate.
#[derive(Debug, Error)]
pub enum ArmStateError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Resource schema errors.
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// ARM API errors.
    #[error("ARM API error: {0}")]
    Arm(#[from] ArmApiError),

    /// Reconciliation errors.
    #[error("Reconciliation error: {0}")]
    Reconcile(#[from] ReconcileError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// Environment variable is missing.
    #[error("Missing environment variable: {name}")]
    MissingEnvVar {
        /// Name of the missing variable.
        name: String,
    },

    /// A path parameter needed to address the resource is missing.
    #[error("Missing parameter '{name}' required by {pattern}")]
    MissingParameter {
        /// Name of the missing parameter.
        name: String,
        /// Pattern that referenced it.
        pattern: String,
    },

    /// The requested resource type has no schema.
    #[error("Unknown resource type: {name}")]
    UnknownResourceType {
        /// The unknown type name.
        name: String,
    },
}

/// Resource schema errors.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// The schema document could not be parsed.
    #[error("Failed to parse schema '{source_name}': {message}")]
    ParseError {
        /// Schema file or built-in name.
        source_name: String,
        /// Description of the parse error.
        message: String,
    },

    /// Two arguments share a name at the same level.
    #[error("Duplicate argument '{name}' in schema '{schema}'")]
    DuplicateArgument {
        /// Schema name.
        schema: String,
        /// Duplicated argument name.
        name: String,
    },

    /// A disposition string is malformed.
    #[error("Invalid disposition '{disposition}' for argument '{argument}'")]
    InvalidDisposition {
        /// Argument name.
        argument: String,
        /// The offending disposition.
        disposition: String,
    },

    /// An id or list pattern references an unknown placeholder.
    #[error("Pattern '{pattern}' references unknown placeholder '{placeholder}'")]
    UnknownPlaceholder {
        /// The pattern.
        pattern: String,
        /// The placeholder name.
        placeholder: String,
    },
}

/// ARM REST API errors.
#[derive(Debug, Error)]
pub enum ArmApiError {
    /// Authentication failed.
    #[error("ARM authentication failed: {message}")]
    AuthenticationFailed {
        /// Description of the auth failure.
        message: String,
    },

    /// The resource does not exist.
    #[error("Resource not found: {resource_id}")]
    NotFound {
        /// ARM id of the missing resource.
        resource_id: String,
    },

    /// API request failed.
    #[error("ARM request failed: {status} {code} - {message}")]
    RequestFailed {
        /// HTTP status code.
        status: u16,
        /// ARM error code.
        code: String,
        /// Error message from the API.
        message: String,
    },

    /// Throttled by ARM.
    #[error("ARM request throttled, retry after {retry_after_secs} seconds")]
    Throttled {
        /// Seconds ARM asked the caller to wait.
        retry_after_secs: u64,
    },

    /// Network error.
    #[error("Network error communicating with ARM: {message}")]
    NetworkError {
        /// Description of the network error.
        message: String,
    },

    /// Invalid response from the API.
    #[error("Invalid response from ARM: {message}")]
    InvalidResponse {
        /// Description of the response issue.
        message: String,
    },

    /// A long-running operation ended in a non-success terminal state.
    #[error("Long-running operation {status}: {message}")]
    OperationFailed {
        /// Terminal status (Failed, Canceled).
        status: String,
        /// Error message reported by the operation.
        message: String,
    },

    /// Timeout waiting for a long-running operation.
    #[error("Timeout after {waited_secs}s waiting for operation on {resource_id}")]
    Timeout {
        /// ARM id of the resource.
        resource_id: String,
        /// Seconds waited before giving up.
        waited_secs: u64,
    },
}

/// Reconciliation errors.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The provider rejected a create, update or delete.
    #[error("Failed to {action} '{resource_id}': {message}")]
    ProviderFault {
        /// Action being executed.
        action: String,
        /// ARM id of the resource.
        resource_id: String,
        /// Provider error text.
        message: String,
    },

    /// Reading the observed state failed for a reason other than not-found.
    #[error("Failed to read '{resource_id}': {message}")]
    ReadFault {
        /// ARM id of the resource.
        resource_id: String,
        /// Provider error text.
        message: String,
    },
}

/// Result type alias for armstate operations.
pub type Result<T> = std::result::Result<T, ArmStateError>;

impl ArmStateError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this error means the resource does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Arm(ArmApiError::NotFound { .. }))
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates a validation error without a specific field.
    #[must_use]
    pub fn validation_general(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: None,
        }
    }
}

impl SchemaError {
    /// Creates a parse error for the named schema source.
    #[must_use]
    pub fn parse(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ParseError {
            source_name: source_name.into(),
            message: message.into(),
        }
    }
}

impl ArmApiError {
    /// Creates a request error.
    #[must_use]
    pub fn request_failed(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RequestFailed {
            status,
            code: code.into(),
            message: message.into(),
        }
    }

    /// Creates a network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError {
            message: message.into(),
        }
    }

    /// Creates an invalid response error.
    #[must_use]
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }
}
