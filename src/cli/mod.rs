//! CLI module for armstate.
//!
//! This module provides the command-line interface for reconciling and
//! querying a single ARM resource.

mod commands;
mod output;

pub use commands::{Cli, Commands, OutputFormat};
pub use output::OutputFormatter;
