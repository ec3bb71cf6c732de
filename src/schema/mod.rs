//! Resource schemas.
//!
//! This module covers everything derived from the declarative description of a
//! resource type:
//! - Schema types and the built-in catalog
//! - Building the nested request body from flat arguments
//! - The per-path modifier table used by the diff

mod builder;
mod catalog;
mod modifiers;
pub mod pattern;
mod types;

pub use builder::DesiredStateBuilder;
pub use catalog::{SchemaCatalog, parse_schema};
pub use modifiers::{FieldModifier, ModifierTable};
pub use types::{
    ArgKind, ArgSpec, Comparison, Disposition, NAME_PLACEHOLDER, ResourceSchema,
    SUBSCRIPTION_PLACEHOLDER, UpdateMethod, camel_case,
};
