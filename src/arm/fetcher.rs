//! State fetcher: reads the observed resource.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{ArmStateError, ReconcileError, Result};

use super::provider::ResourceProvider;
use super::types::ResourceId;

/// Observed state of a resource.
#[derive(Debug, Clone, PartialEq)]
pub enum Observed {
    /// The resource does not exist.
    Absent,
    /// The resource as returned by the read operation.
    Present(Value),
}

impl Observed {
    /// Returns true if the resource exists.
    #[must_use]
    pub const fn is_present(&self) -> bool {
        matches!(self, Self::Present(_))
    }

    /// Returns the observed body, if any.
    #[must_use]
    pub const fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Present(value) => Some(value),
            Self::Absent => None,
        }
    }
}

/// How read failures other than not-found are handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadPolicy {
    /// Surface the failure.
    #[default]
    Strict,
    /// Log the failure and treat the resource as absent.
    Lenient,
}

/// Reads the observed state through a provider.
pub struct StateFetcher<'a, P: ResourceProvider + ?Sized> {
    provider: &'a P,
    policy: ReadPolicy,
}

impl<'a, P: ResourceProvider + ?Sized> StateFetcher<'a, P> {
    /// Creates a new fetcher.
    #[must_use]
    pub const fn new(provider: &'a P, policy: ReadPolicy) -> Self {
        Self { provider, policy }
    }

    /// Fetches the resource.
    ///
    /// # Errors
    ///
    /// Returns `ReconcileError::ReadFault` for non-404 failures under the
    /// strict policy.
    pub async fn fetch(&self, id: &ResourceId, api_version: &str) -> Result<Observed> {
        match self.provider.get(id, api_version).await {
            Ok(value) => {
                debug!("Observed {id}");
                Ok(Observed::Present(value))
            }
            Err(e) if e.is_not_found() => {
                debug!("{id} does not exist");
                Ok(Observed::Absent)
            }
            Err(e) => match self.policy {
                ReadPolicy::Strict => Err(ArmStateError::Reconcile(ReconcileError::ReadFault {
                    resource_id: id.to_string(),
                    message: e.to_string(),
                })),
                ReadPolicy::Lenient => {
                    warn!("Read of {id} failed, treating as absent: {e}");
                    Ok(Observed::Absent)
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arm::provider::MockResourceProvider;
    use crate::error::ArmApiError;
    use serde_json::json;

    fn id() -> ResourceId {
        ResourceId::new("/subscriptions/s/resourceGroups/rg/providers/X/y/z")
    }

    #[tokio::test]
    async fn test_present() {
        let mut provider = MockResourceProvider::new();
        provider
            .expect_get()
            .returning(|_, _| Ok(json!({ "name": "z" })));

        let observed = StateFetcher::new(&provider, ReadPolicy::Strict)
            .fetch(&id(), "2024-01-01")
            .await
            .unwrap();
        assert_eq!(observed.as_value(), Some(&json!({ "name": "z" })));
    }

    #[tokio::test]
    async fn test_not_found_is_absent() {
        let mut provider = MockResourceProvider::new();
        provider.expect_get().returning(|id, _| {
            Err(ArmStateError::Arm(ArmApiError::NotFound {
                resource_id: id.to_string(),
            }))
        });

        let observed = StateFetcher::new(&provider, ReadPolicy::Strict)
            .fetch(&id(), "2024-01-01")
            .await
            .unwrap();
        assert_eq!(observed, Observed::Absent);
    }

    #[tokio::test]
    async fn test_strict_surfaces_read_fault() {
        let mut provider = MockResourceProvider::new();
        provider
            .expect_get()
            .returning(|_, _| Err(ArmStateError::Arm(ArmApiError::request_failed(500, "InternalServerError", "boom"))));

        let err = StateFetcher::new(&provider, ReadPolicy::Strict)
            .fetch(&id(), "2024-01-01")
            .await
            .unwrap_err();
        assert!(matches!(err, ArmStateError::Reconcile(ReconcileError::ReadFault { .. })));
    }

    #[tokio::test]
    async fn test_lenient_treats_fault_as_absent() {
        let mut provider = MockResourceProvider::new();
        provider
            .expect_get()
            .returning(|_, _| Err(ArmStateError::Arm(ArmApiError::network("reset"))));

        let observed = StateFetcher::new(&provider, ReadPolicy::Lenient)
            .fetch(&id(), "2024-01-01")
            .await
            .unwrap();
        assert!(!observed.is_present());
    }
}
