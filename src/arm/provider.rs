//! The provider boundary: the five resource operations the engine needs.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

use super::types::{Page, ResourceId};

/// Control-plane operations on one resource type.
///
/// Implementations wait for long-running operations to finish before
/// returning, and report a missing resource as `ArmApiError::NotFound`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    /// Reads a resource.
    async fn get(&self, id: &ResourceId, api_version: &str) -> Result<Value>;

    /// Creates or replaces a resource (PUT) and returns the final resource.
    async fn create_or_update(&self, id: &ResourceId, api_version: &str, body: &Value)
    -> Result<Value>;

    /// Partially updates a resource (PATCH) and returns the final resource.
    async fn update(&self, id: &ResourceId, api_version: &str, body: &Value) -> Result<Value>;

    /// Deletes a resource.
    async fn delete(&self, id: &ResourceId, api_version: &str) -> Result<()>;

    /// Lists the resources under a collection scope.
    async fn list(&self, scope: &ResourceId, api_version: &str) -> Result<Page>;

    /// Follows a `nextLink` continuation URL verbatim.
    async fn list_next(&self, next_link: &str) -> Result<Page>;
}
