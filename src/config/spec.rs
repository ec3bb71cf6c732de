//! Invocation file types.
//!
//! This module defines the structs that map to an `armstate.yaml` file: the
//! provider connection settings and the single resource to reconcile.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

use crate::arm::{DEFAULT_ENDPOINT, ReadPolicy};
use crate::planner::DesiredState;

/// Default Microsoft Entra authority.
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// The root structure of an invocation file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvocationFile {
    /// Connection settings.
    #[serde(default)]
    pub provider: ProviderSettings,
    /// The resource to reconcile or query.
    pub resource: ResourceInvocation,
}

/// ARM connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
pub struct ProviderSettings {
    /// Subscription holding the resource.
    #[serde(default)]
    pub subscription_id: String,
    /// Management endpoint.
    #[serde(default = "default_endpoint")]
    #[validate(url(message = "endpoint must be a valid URL"))]
    pub endpoint: String,
    /// Token authority.
    #[serde(default = "default_authority_host")]
    #[validate(url(message = "authority_host must be a valid URL"))]
    pub authority_host: String,
    /// Timeout for a single HTTP request, in seconds.
    #[serde(default = "default_request_timeout")]
    #[validate(range(min = 1, max = 600, message = "request_timeout_secs must be between 1 and 600"))]
    pub request_timeout_secs: u64,
    /// Bound on a long-running operation, in seconds.
    #[serde(default = "default_lro_timeout")]
    #[validate(range(min = 1, max = 86400, message = "lro_timeout_secs must be between 1 and 86400"))]
    pub lro_timeout_secs: u64,
    /// Interval between operation polls, in seconds.
    #[serde(default = "default_poll_interval")]
    #[validate(range(min = 1, max = 300, message = "poll_interval_secs must be between 1 and 300"))]
    pub poll_interval_secs: u64,
    /// Treat read failures other than not-found as an absent resource.
    #[serde(default)]
    pub lenient_reads: bool,
}

/// The resource an invocation targets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceInvocation {
    /// Built-in schema name.
    #[serde(rename = "type", default)]
    pub resource_type: Option<String>,
    /// Custom schema file, relative to the invocation file.
    #[serde(default)]
    pub schema_file: Option<PathBuf>,
    /// Whether the resource should exist.
    #[serde(default)]
    pub state: DesiredState,
    /// Compute the action without executing it.
    #[serde(default)]
    pub check_mode: bool,
    /// Keep observed tags not named in the parameters.
    #[serde(default = "default_true")]
    pub append_tags: bool,
    /// Flat user arguments.
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

fn default_endpoint() -> String {
    String::from(DEFAULT_ENDPOINT)
}

fn default_authority_host() -> String {
    String::from(DEFAULT_AUTHORITY_HOST)
}

const fn default_request_timeout() -> u64 {
    60
}

const fn default_lro_timeout() -> u64 {
    1800
}

const fn default_poll_interval() -> u64 {
    5
}

const fn default_true() -> bool {
    true
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            subscription_id: String::new(),
            endpoint: default_endpoint(),
            authority_host: default_authority_host(),
            request_timeout_secs: default_request_timeout(),
            lro_timeout_secs: default_lro_timeout(),
            poll_interval_secs: default_poll_interval(),
            lenient_reads: false,
        }
    }
}

impl ProviderSettings {
    /// Returns the read policy selected by `lenient_reads`.
    #[must_use]
    pub const fn read_policy(&self) -> ReadPolicy {
        if self.lenient_reads {
            ReadPolicy::Lenient
        } else {
            ReadPolicy::Strict
        }
    }

    /// Returns the per-request timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Returns the long-running operation bound.
    #[must_use]
    pub const fn lro_timeout(&self) -> Duration {
        Duration::from_secs(self.lro_timeout_secs)
    }

    /// Returns the polling interval.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}
