//! Azure Resource Manager integration.
//!
//! This module provides:
//! - The provider trait the engine talks to
//! - A REST client implementing it
//! - Credential handling
//! - The state fetcher

mod auth;
mod client;
mod fetcher;
mod provider;
mod types;

pub use auth::{Credential, ENV_ACCESS_TOKEN, ENV_CLIENT_ID, ENV_CLIENT_SECRET, ENV_TENANT_ID};
pub use client::{ArmClient, DEFAULT_ENDPOINT};
pub use fetcher::{Observed, ReadPolicy, StateFetcher};
#[cfg(test)]
pub use provider::MockResourceProvider;
pub use provider::ResourceProvider;
pub use types::{OperationStatus, Page, ResourceId};
