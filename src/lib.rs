// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(warnings)]                    // All warnings are treated as errors
#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # armstate
//!
//! Declarative, idempotent reconciliation of Azure Resource Manager resources.
//!
//! ## Overview
//!
//! armstate takes a flat set of user arguments describing one ARM resource and
//! converges the live resource to it:
//!
//! - Resource types are described by declarative schemas
//! - Only fields the caller specifies are compared
//! - Each run performs at most one create, update or delete
//! - A second run with the same arguments is a no-op
//!
//! ## Architecture
//!
//! One invocation flows through a fixed pipeline:
//!
//! 1. **Argument schema**: Maps each argument to a body path and a comparison rule
//! 2. **State fetcher**: Reads the observed resource from ARM
//! 3. **Desired-state builder**: Turns flat arguments into the nested request body
//! 4. **Diff**: Compares desired against observed and decides an action
//! 5. **Action dispatcher**: Executes the action and reports the result
//!
//! ## Modules
//!
//! - [`schema`]: Resource schemas, the built-in catalog and the body builder
//! - [`arm`]: ARM provider trait, REST client and credentials
//! - [`config`]: Invocation parsing and validation
//! - [`planner`]: Diff computation, action decision and dispatch
//! - [`reconciler`]: The reconcile and query pipelines
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! provider:
//!   subscription_id: 00000000-0000-0000-0000-000000000000
//!
//! resource:
//!   type: signalr
//!   state: present
//!   parameters:
//!     resource_group: my-rg
//!     name: my-signalr
//!     location: westeurope
//!     sku: Standard_S1
//!     units: 2
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod arm;
pub mod cli;
pub mod config;
pub mod error;
pub mod planner;
pub mod reconciler;
pub mod schema;

// ============================================================================
// Re-exports
// ============================================================================

pub use arm::{ArmClient, Credential, Observed, ReadPolicy, ResourceId, ResourceProvider, StateFetcher};
pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{BodyHasher, InvocationFile, InvocationParser, InvocationValidator};
pub use error::{ArmStateError, Result};
pub use planner::{Action, ActionDispatcher, DesiredState, DiffEngine, ReconcilePlan};
pub use reconciler::{QueryResult, ReconcileOutcome, ReconcileRequest, Reconciler};
pub use schema::{DesiredStateBuilder, ModifierTable, ResourceSchema, SchemaCatalog};
