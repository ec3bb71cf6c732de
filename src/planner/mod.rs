//! Planning module for reconcile operations.
//!
//! This module handles the comparison between desired and observed states,
//! the decision of a single action, and its execution.

mod diff;
mod executor;
mod plan;

pub use diff::{DiffEngine, DiffResult, FieldChange};
pub use executor::ActionDispatcher;
pub use plan::{Action, DesiredState, ReconcilePlan, empty_object, merge_for_update, updatable_body};
