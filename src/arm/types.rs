//! ARM REST API types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::error::{ArmStateError, ConfigError, Result};
use crate::schema::{SUBSCRIPTION_PLACEHOLDER, pattern};

/// Fully expanded ARM resource path (e.g.
/// `/subscriptions/.../resourceGroups/rg/providers/Microsoft.Cache/redis/cache1`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    /// Wraps an already expanded path.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Expands an id pattern from the subscription and path parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if a placeholder has no non-empty scalar value.
    pub fn from_pattern(
        id_pattern: &str,
        subscription_id: &str,
        params: &Map<String, Value>,
    ) -> Result<Self> {
        pattern::expand(id_pattern, |name| {
            if name == SUBSCRIPTION_PLACEHOLDER {
                (!subscription_id.is_empty()).then(|| subscription_id.to_string())
            } else {
                params.get(name).and_then(pattern::scalar_to_string)
            }
        })
        .map(Self)
        .map_err(|name| {
            ArmStateError::Config(ConfigError::MissingParameter {
                name,
                pattern: id_pattern.to_string(),
            })
        })
    }

    /// Returns the path as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One page of a list response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// Resources on this page.
    #[serde(rename = "value", default)]
    pub items: Vec<Value>,
    /// Continuation URL, passed through verbatim.
    #[serde(rename = "nextLink", default, skip_serializing_if = "Option::is_none")]
    pub next_link: Option<String>,
}

impl Page {
    /// Creates an empty page with no continuation.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            items: Vec::new(),
            next_link: None,
        }
    }
}

/// ARM error envelope: `{"error": {"code": ..., "message": ...}}`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ErrorEnvelope {
    pub(crate) error: ErrorBody,
}

/// Body of an ARM error.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub(crate) code: String,
    #[serde(default)]
    pub(crate) message: String,
}

/// Body returned by an `Azure-AsyncOperation` status URL.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct OperationStatusBody {
    pub(crate) status: OperationStatus,
    #[serde(default)]
    pub(crate) error: Option<ErrorBody>,
}

/// Status of a long-running operation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum OperationStatus {
    /// Still running (`InProgress`, `Accepted`, `Updating`, ...).
    InProgress(String),
    /// Completed successfully.
    Succeeded,
    /// Failed.
    Failed,
    /// Canceled.
    Canceled,
}

impl From<String> for OperationStatus {
    fn from(s: String) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "succeeded" => Self::Succeeded,
            "failed" => Self::Failed,
            "canceled" | "cancelled" => Self::Canceled,
            _ => Self::InProgress(s),
        }
    }
}

impl OperationStatus {
    /// Returns true if the operation has finished.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::InProgress(_))
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InProgress(s) => write!(f, "{s}"),
            Self::Succeeded => write!(f, "Succeeded"),
            Self::Failed => write!(f, "Failed"),
            Self::Canceled => write!(f, "Canceled"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn test_resource_id_from_pattern() {
        let id = ResourceId::from_pattern(
            "/subscriptions/{subscription_id}/resourceGroups/{resource_group}/providers/Microsoft.Cache/redis/{name}",
            "sub-1",
            &params(json!({ "resource_group": "rg", "name": "cache1" })),
        )
        .unwrap();

        assert_eq!(
            id.as_str(),
            "/subscriptions/sub-1/resourceGroups/rg/providers/Microsoft.Cache/redis/cache1"
        );
    }

    #[test]
    fn test_resource_id_missing_parameter() {
        let err = ResourceId::from_pattern(
            "/subscriptions/{subscription_id}/resourceGroups/{resource_group}/x/{name}",
            "sub-1",
            &params(json!({ "name": "cache1", "resource_group": "" })),
        )
        .unwrap_err();

        match err {
            ArmStateError::Config(ConfigError::MissingParameter { name, .. }) => {
                assert_eq!(name, "resource_group");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_page_deserialize() {
        let page: Page = serde_json::from_value(json!({
            "value": [{ "id": "a" }],
            "nextLink": "https://next"
        }))
        .unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.next_link.as_deref(), Some("https://next"));
    }

    #[test]
    fn test_operation_status() {
        let status: OperationStatusBody =
            serde_json::from_value(json!({ "status": "InProgress" })).unwrap();
        assert!(!status.status.is_terminal());

        let status: OperationStatusBody = serde_json::from_value(json!({
            "status": "Failed",
            "error": { "code": "Conflict", "message": "busy" }
        }))
        .unwrap();
        assert_eq!(status.status, OperationStatus::Failed);
        assert_eq!(status.error.unwrap().message, "busy");
    }
}
