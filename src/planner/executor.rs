//! Action dispatcher for executing reconcile plans.
//!
//! This module performs the single provider call a plan calls for and
//! normalizes the result into the resource mapping reported to the caller.

use serde_json::Value;
use tracing::{error, info};

use crate::arm::{Observed, ResourceProvider};
use crate::error::{ArmStateError, ReconcileError, Result};
use crate::schema::UpdateMethod;

use super::plan::{Action, ReconcilePlan, empty_object};

/// Executes reconcile plans against a provider.
pub struct ActionDispatcher<'a, P: ResourceProvider + ?Sized> {
    /// Resource provider.
    provider: &'a P,
    /// API version sent with every call.
    api_version: &'a str,
}

impl<'a, P: ResourceProvider + ?Sized> ActionDispatcher<'a, P> {
    /// Creates a new dispatcher.
    #[must_use]
    pub const fn new(provider: &'a P, api_version: &'a str) -> Self {
        Self {
            provider,
            api_version,
        }
    }

    /// Executes a plan and returns the resulting resource.
    ///
    /// `NoAction` returns the observed resource; `Delete` returns an empty
    /// mapping.
    ///
    /// # Errors
    ///
    /// Returns `ReconcileError::ProviderFault` if the provider call fails.
    pub async fn dispatch(&self, plan: &ReconcilePlan, observed: &Observed) -> Result<Value> {
        let id = &plan.resource_id;

        match plan.action {
            Action::NoAction => Ok(observed.as_value().cloned().unwrap_or_else(empty_object)),
            Action::Create => {
                info!("Creating {id}");
                self.provider
                    .create_or_update(id, self.api_version, &plan.body)
                    .await
                    .map_err(|e| fault(plan, &e))
            }
            Action::Update => {
                info!("Updating {id} ({} changes)", plan.changes.len());
                let result = match plan.update_method {
                    UpdateMethod::Put => {
                        self.provider
                            .create_or_update(id, self.api_version, &plan.body)
                            .await
                    }
                    UpdateMethod::Patch => self.provider.update(id, self.api_version, &plan.body).await,
                };
                result.map_err(|e| fault(plan, &e))
            }
            Action::Delete => {
                info!("Deleting {id}");
                match self.provider.delete(id, self.api_version).await {
                    Ok(()) => Ok(empty_object()),
                    Err(e) if e.is_not_found() => {
                        info!("{id} was already deleted");
                        Ok(empty_object())
                    }
                    Err(e) => Err(fault(plan, &e)),
                }
            }
        }
    }
}

fn fault(plan: &ReconcilePlan, e: &ArmStateError) -> ArmStateError {
    error!("Failed to {} {}: {e}", plan.action, plan.resource_id);
    ArmStateError::Reconcile(ReconcileError::ProviderFault {
        action: plan.action.to_string(),
        resource_id: plan.resource_id.to_string(),
        message: e.to_string(),
    })
}
