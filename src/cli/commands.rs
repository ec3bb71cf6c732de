//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// armstate - Declarative reconciliation of Azure Resource Manager resources.
#[derive(Parser, Debug)]
#[command(name = "armstate")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the invocation file.
    #[arg(short, long, global = true, env = "ARMSTATE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Reconcile the resource to its desired state.
    Apply {
        /// Compute the action without executing it.
        #[arg(long)]
        check: bool,
    },

    /// Show the action and field changes without executing them.
    Plan,

    /// Read the resource named by the invocation.
    Get,

    /// List resources in the schema's list scope.
    List {
        /// Continuation token returned by a previous page.
        #[arg(long)]
        next_link: Option<String>,
    },

    /// Show a resource schema, or list the built-in ones.
    Schema {
        /// Schema name (lists all built-in schemas if omitted).
        name: Option<String>,
    },

    /// Validate the invocation file.
    Validate {
        /// Show all warnings, not just errors.
        #[arg(short, long)]
        warnings: bool,
    },
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
