//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use colored::Colorize;
use serde_json::Value;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::planner::{Action, FieldChange, ReconcilePlan};
use crate::reconciler::{QueryResult, ReconcileOutcome};
use crate::schema::{ArgSpec, ResourceSchema, SchemaCatalog};

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Field change row for table display.
#[derive(Tabled)]
struct ChangeRow {
    #[tabled(rename = "Field")]
    field: String,
    #[tabled(rename = "Observed")]
    old: String,
    #[tabled(rename = "Desired")]
    new: String,
}

/// Schema argument row for table display.
#[derive(Tabled)]
struct ArgumentRow {
    #[tabled(rename = "Argument")]
    name: String,
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Required")]
    required: String,
    #[tabled(rename = "Path")]
    path: String,
    #[tabled(rename = "Compare")]
    comparison: String,
}

/// Catalog row for table display.
#[derive(Tabled)]
struct SchemaRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Resource type")]
    resource_type: String,
    #[tabled(rename = "API version")]
    api_version: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a reconcile outcome.
    #[must_use]
    pub fn format_outcome(&self, outcome: &ReconcileOutcome, output_key: &str) -> String {
        match self.format {
            OutputFormat::Json => Self::pretty(&outcome.to_output(output_key)),
            OutputFormat::Text => {
                let verb = if outcome.check_mode { "Would" } else { "Did" };
                let mut output = if outcome.changed {
                    format!(
                        "{} {verb} {} {}\n",
                        "~".yellow(),
                        Self::format_action(outcome.action),
                        outcome.resource_id
                    )
                } else {
                    format!(
                        "{} No changes required - {} is up to date.\n",
                        "✓".green(),
                        outcome.resource_id
                    )
                };
                Self::push_changes(&mut output, &outcome.changes);
                Self::push_warnings(&mut output, &outcome.warnings);
                Self::push_resource(&mut output, output_key, &outcome.resource);
                let _ = writeln!(output, "\n   Desired hash: {}", Self::short(&outcome.body_hash));
                output
            }
        }
    }

    /// Formats a plan for display.
    #[must_use]
    pub fn format_plan(&self, plan: &ReconcilePlan) -> String {
        match self.format {
            OutputFormat::Json => Self::pretty(&serde_json::json!({
                "action": plan.action,
                "resource_id": plan.resource_id,
                "diff": plan.changes,
                "warnings": plan.warnings,
                "body_hash": plan.body_hash,
                "body": plan.body,
            })),
            OutputFormat::Text => {
                let mut output = format!(
                    "\nPlan: {} {}\n",
                    Self::format_action(plan.action),
                    plan.resource_id
                );
                let _ = writeln!(output, "   Desired hash: {}", Self::short(&plan.body_hash));
                Self::push_changes(&mut output, &plan.changes);
                Self::push_warnings(&mut output, &plan.warnings);
                output
            }
        }
    }

    /// Formats a query result.
    #[must_use]
    pub fn format_query(&self, result: &QueryResult, output_key: &str) -> String {
        match self.format {
            OutputFormat::Json => Self::pretty(&result.to_output(output_key)),
            OutputFormat::Text => {
                let items = result.items();
                if items.is_empty() {
                    return String::from("   No resources found.\n");
                }

                let mut output = String::new();
                for item in &items {
                    let name = item.get("name").and_then(Value::as_str).unwrap_or("(unnamed)");
                    let location = item.get("location").and_then(Value::as_str).unwrap_or("-");
                    let id = item.get("id").and_then(Value::as_str).unwrap_or("");
                    let _ = writeln!(output, "   {} ({location}) {}", name.bold(), id.dimmed());
                }
                if let Some(link) = result.next_link() {
                    let _ = writeln!(output, "\n   More results: --next-link '{link}'");
                }
                output
            }
        }
    }

    /// Formats a resource schema.
    #[must_use]
    pub fn format_schema(&self, schema: &ResourceSchema) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(schema).unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = format!("\n{} ({})\n", schema.name.bold(), schema.resource_type);
                if let Some(description) = &schema.description {
                    let _ = writeln!(output, "   {description}");
                }
                let _ = writeln!(output, "   API version: {}", schema.api_version);
                let _ = writeln!(output, "   Update method: {}\n", schema.update_method);

                let mut rows = Vec::new();
                Self::collect_arguments(&schema.options, "", &mut rows);
                output.push_str(&Table::new(rows).to_string());
                output.push('\n');
                output
            }
        }
    }

    /// Formats the list of built-in schemas.
    #[must_use]
    pub fn format_catalog(&self, catalog: &SchemaCatalog) -> String {
        match self.format {
            OutputFormat::Json => {
                let names: Vec<&str> = catalog.names().collect();
                Self::pretty(&serde_json::json!({ "schemas": names }))
            }
            OutputFormat::Text => {
                let rows: Vec<SchemaRow> = catalog
                    .iter()
                    .map(|s| SchemaRow {
                        name: s.name.clone(),
                        resource_type: s.resource_type.clone(),
                        api_version: s.api_version.clone(),
                    })
                    .collect();
                format!("{}\n", Table::new(rows))
            }
        }
    }

    /// Formats a validation summary.
    #[must_use]
    pub fn format_validation(&self, schema: &ResourceSchema, warnings: &[String], show_warnings: bool) -> String {
        match self.format {
            OutputFormat::Json => Self::pretty(&serde_json::json!({
                "valid": true,
                "schema": schema.name,
                "warnings": warnings,
            })),
            OutputFormat::Text => {
                let mut output = format!("{} Invocation is valid for {}\n", "✓".green(), schema.name);
                if show_warnings {
                    Self::push_warnings(&mut output, warnings);
                }
                output
            }
        }
    }

    fn push_changes(output: &mut String, changes: &[FieldChange]) {
        if changes.is_empty() {
            return;
        }
        let rows: Vec<ChangeRow> = changes
            .iter()
            .map(|c| ChangeRow {
                field: c.argument.clone().unwrap_or_else(|| c.path.clone()),
                old: Self::truncate(&Self::render(&c.old), 40),
                new: Self::truncate(&Self::render(&c.new), 40),
            })
            .collect();
        output.push('\n');
        output.push_str(&Table::new(rows).to_string());
        output.push('\n');
    }

    fn push_warnings(output: &mut String, warnings: &[String]) {
        if warnings.is_empty() {
            return;
        }
        let _ = write!(output, "\n{} Warnings:\n", "⚠".yellow());
        for warning in warnings {
            let _ = writeln!(output, "   - {warning}");
        }
    }

    /// Summarizes the resource returned by the run.
    fn push_resource(output: &mut String, output_key: &str, resource: &Value) {
        let fields = resource.as_object().filter(|m| !m.is_empty());
        let Some(fields) = fields else {
            let _ = write!(output, "\n   {}: (none)\n", output_key.bold());
            return;
        };

        let _ = write!(output, "\n   {}:\n", output_key.bold());
        let state = resource.pointer("/properties/provisioningState");
        let summary = [
            ("name", fields.get("name")),
            ("location", fields.get("location")),
            ("state", state),
            ("id", fields.get("id")),
        ];
        for (label, value) in summary {
            if let Some(value) = value {
                let _ = writeln!(output, "     {label}: {}", Self::render(value));
            }
        }
    }

    fn collect_arguments(options: &[ArgSpec], prefix: &str, rows: &mut Vec<ArgumentRow>) {
        for arg in options {
            let name = format!("{prefix}{}", arg.name);
            let kind = arg
                .elements
                .map_or_else(|| arg.kind.to_string(), |e| format!("{}[{e}]", arg.kind));
            rows.push(ArgumentRow {
                name: name.clone(),
                kind,
                required: if arg.required { "yes".to_string() } else { String::new() },
                path: arg
                    .disposition
                    .clone()
                    .map_or_else(|| String::from("(path)"), String::from),
                comparison: if arg.updatable {
                    arg.comparison.to_string()
                } else {
                    format!("{} (fixed)", arg.comparison)
                },
            });
            Self::collect_arguments(&arg.options, &format!("{name}."), rows);
        }
    }

    /// Formats an action with color.
    fn format_action(action: Action) -> String {
        match action {
            Action::Create => "+create".green().to_string(),
            Action::Update => "~update".yellow().to_string(),
            Action::Delete => "-delete".red().to_string(),
            Action::NoAction => "no_action".dimmed().to_string(),
        }
    }

    fn render(value: &Value) -> String {
        match value {
            Value::Null => String::from("(unset)"),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    fn short(hash: &str) -> &str {
        &hash[..8.min(hash.len())]
    }

    fn pretty(value: &Value) -> String {
        serde_json::to_string_pretty(value).unwrap_or_default()
    }

    /// Truncates a string to a maximum number of characters.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let head: String = s.chars().take(max_len - 3).collect();
            format!("{head}...")
        }
    }
}
