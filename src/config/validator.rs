//! Invocation validation.
//!
//! Provider settings are checked with their `validator` rules; resource
//! parameters are checked against the resource schema.

use serde_json::{Map, Value};
use std::collections::HashSet;
use tracing::{debug, warn};
use validator::Validate;

use crate::error::{ArmStateError, ConfigError, Result};
use crate::planner::DesiredState;
use crate::schema::{ArgKind, ArgSpec, ResourceSchema, pattern};

use super::spec::InvocationFile;

/// Validator for invocation files.
#[derive(Debug, Default)]
pub struct InvocationValidator;

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl InvocationValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates an invocation against the schema it targets.
    ///
    /// # Errors
    ///
    /// Returns the first validation error found.
    pub fn validate(&self, invocation: &InvocationFile, schema: &ResourceSchema) -> Result<ValidationResult> {
        let result = self.check(invocation, schema);

        if let Some(first) = result.errors.first() {
            return Err(ArmStateError::Config(ConfigError::validation(
                first.message.clone(),
                first.field.clone(),
            )));
        }

        for warning in &result.warnings {
            warn!("{warning}");
        }
        debug!("Invocation validation passed");
        Ok(result)
    }

    /// Collects every error and warning without failing.
    ///
    /// Parameters are checked after scalar coercion, as the reconciler
    /// receives them.
    #[must_use]
    pub fn check(&self, invocation: &InvocationFile, schema: &ResourceSchema) -> ValidationResult {
        let mut result = ValidationResult::default();
        let parameters = coerce_parameters(&schema.options, &invocation.resource.parameters);

        Self::validate_provider(invocation, &mut result);
        Self::validate_parameters(
            &schema.options,
            &parameters,
            invocation.resource.state,
            "resource.parameters",
            true,
            &mut result,
        );

        result
    }

    fn validate_provider(invocation: &InvocationFile, result: &mut ValidationResult) {
        let settings = &invocation.provider;

        if settings.subscription_id.trim().is_empty() {
            result.errors.push(ValidationError {
                field: String::from("provider.subscription_id"),
                message: String::from(
                    "Subscription id is required (set provider.subscription_id or AZURE_SUBSCRIPTION_ID)",
                ),
            });
        }

        if let Err(errors) = settings.validate() {
            let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
            fields.sort_by(|a, b| a.0.cmp(&b.0));
            for (field, field_errors) in fields {
                for error in field_errors {
                    result.errors.push(ValidationError {
                        field: format!("provider.{field}"),
                        message: error
                            .message
                            .as_ref()
                            .map_or_else(|| format!("Invalid value for {field}"), ToString::to_string),
                    });
                }
            }
        }

        if invocation.resource.resource_type.is_none() && invocation.resource.schema_file.is_none() {
            result.errors.push(ValidationError {
                field: String::from("resource.type"),
                message: String::from("Either resource.type or resource.schema_file must be set"),
            });
        }
    }

    fn validate_parameters(
        options: &[ArgSpec],
        params: &Map<String, Value>,
        state: DesiredState,
        prefix: &str,
        top_level: bool,
        result: &mut ValidationResult,
    ) {
        for arg in options {
            let field = format!("{prefix}.{}", arg.name);
            match params.get(&arg.name).filter(|v| !v.is_null()) {
                Some(value) => Self::validate_value(arg, value, state, &field, result),
                None => {
                    let needed = arg.required
                        && arg.default.is_none()
                        && (state == DesiredState::Present || (top_level && arg.disposition.is_none()));
                    if needed {
                        result.errors.push(ValidationError {
                            field,
                            message: format!("Missing required argument: {}", arg.name),
                        });
                    }
                }
            }
        }

        if top_level {
            let known: HashSet<&str> = options.iter().map(|a| a.name.as_str()).collect();
            for key in params.keys().filter(|k| !known.contains(k.as_str())) {
                result
                    .warnings
                    .push(format!("Unknown argument '{key}' in {prefix} is ignored"));
            }
        }
    }

    fn validate_value(
        arg: &ArgSpec,
        value: &Value,
        state: DesiredState,
        field: &str,
        result: &mut ValidationResult,
    ) {
        if !arg.kind.matches(value) {
            result.errors.push(ValidationError {
                field: field.to_string(),
                message: format!("Argument {} must be of type {}", arg.name, arg.kind),
            });
            return;
        }

        match value {
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    let item_field = format!("{field}[{i}]");
                    if let Some(kind) = arg.elements
                        && !kind.matches(item)
                    {
                        result.errors.push(ValidationError {
                            field: item_field,
                            message: format!("Elements of {} must be of type {kind}", arg.name),
                        });
                        continue;
                    }
                    match item {
                        Value::Object(map) if !arg.options.is_empty() => {
                            Self::validate_parameters(&arg.options, map, state, &item_field, false, result);
                        }
                        other => Self::validate_choice(arg, other, &item_field, result),
                    }
                }
            }
            Value::Object(map) if !arg.options.is_empty() => {
                Self::validate_parameters(&arg.options, map, state, field, false, result);
            }
            other => Self::validate_choice(arg, other, field, result),
        }
    }

    fn validate_choice(arg: &ArgSpec, value: &Value, field: &str, result: &mut ValidationResult) {
        if arg.choices.is_empty() {
            return;
        }
        let rendered = pattern::scalar_to_string(value).unwrap_or_default();
        if !arg.choices.iter().any(|c| *c == rendered) {
            result.errors.push(ValidationError {
                field: field.to_string(),
                message: format!(
                    "Value '{rendered}' for {} is not one of: {}",
                    arg.name,
                    arg.choices.join(", ")
                ),
            });
        }
    }
}

/// Converts scalar numbers and booleans to strings for `str` arguments,
/// recursing into nested options.
#[must_use]
pub fn coerce_parameters(options: &[ArgSpec], params: &Map<String, Value>) -> Map<String, Value> {
    let mut out = params.clone();
    for arg in options {
        if let Some(value) = out.get_mut(&arg.name) {
            coerce_value(arg, value);
        }
    }
    out
}

fn coerce_value(arg: &ArgSpec, value: &mut Value) {
    match value {
        Value::Number(_) | Value::Bool(_) if arg.kind == ArgKind::Str => {
            if let Some(s) = pattern::scalar_to_string(value) {
                *value = Value::String(s);
            }
        }
        Value::Object(map) if !arg.options.is_empty() => {
            *map = coerce_parameters(&arg.options, map);
        }
        Value::Array(items) => {
            for item in items {
                match item {
                    Value::Object(map) if !arg.options.is_empty() => {
                        *map = coerce_parameters(&arg.options, map);
                    }
                    Value::Number(_) | Value::Bool(_) if arg.elements == Some(ArgKind::Str) => {
                        if let Some(s) = pattern::scalar_to_string(item) {
                            *item = Value::String(s);
                        }
                    }
                    _ => {}
                }
            }
        }
        _ => {}
    }
}
