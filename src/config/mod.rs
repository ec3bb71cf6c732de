//! Configuration module for armstate invocations.
//!
//! This module handles all configuration-related functionality:
//! - Parsing and deserializing `armstate.yaml`
//! - Validation of provider settings and resource parameters
//! - Computing desired-body hashes for plans

mod hash;
mod parser;
mod spec;
mod validator;

pub use hash::BodyHasher;
pub use parser::{
    DEFAULT_CONFIG_FILES, ENV_ENDPOINT, ENV_SUBSCRIPTION_FALLBACK, ENV_SUBSCRIPTION_OVERRIDE,
    InvocationParser, find_config_file,
};
pub use spec::{DEFAULT_AUTHORITY_HOST, InvocationFile, ProviderSettings, ResourceInvocation};
pub use validator::{InvocationValidator, ValidationError, ValidationResult, coerce_parameters};
