//! Desired-state builder.
//!
//! Turns the flat argument mapping supplied by the user into the nested
//! request body ARM expects, using each argument's disposition.

use serde_json::{Map, Value};
use std::collections::HashSet;
use tracing::{trace, warn};

use super::pattern;
use super::types::{ArgSpec, Disposition, NAME_PLACEHOLDER, ResourceSchema, SUBSCRIPTION_PLACEHOLDER};

/// Builder for the desired request body.
#[derive(Debug)]
pub struct DesiredStateBuilder<'a> {
    /// Schema describing the resource type.
    schema: &'a ResourceSchema,
    /// Subscription used to expand id patterns.
    subscription_id: &'a str,
}

impl<'a> DesiredStateBuilder<'a> {
    /// Creates a new builder.
    #[must_use]
    pub const fn new(schema: &'a ResourceSchema, subscription_id: &'a str) -> Self {
        Self {
            schema,
            subscription_id,
        }
    }

    /// Builds the desired body from user parameters.
    ///
    /// Path parameters and unset arguments are omitted; unknown top-level
    /// keys are ignored.
    #[must_use]
    pub fn build(&self, params: &Map<String, Value>) -> Value {
        let mut body = Map::new();

        for arg in &self.schema.options {
            let Some(disposition) = &arg.disposition else {
                continue;
            };
            let Some(value) = effective_value(arg, params.get(&arg.name)) else {
                continue;
            };

            let converted = self.convert(arg, value, params);
            trace!("Placing argument {} at {:?}", arg.name, disposition.resolve(&arg.name));
            place(&mut body, &disposition.resolve(&arg.name), converted);
        }

        Value::Object(body)
    }

    /// Converts a user value into its wire form.
    fn convert(&self, arg: &ArgSpec, value: Value, params: &Map<String, Value>) -> Value {
        match value {
            Value::Object(map) if !arg.options.is_empty() => {
                Value::Object(self.build_nested(&arg.options, map, params))
            }
            Value::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(|item| match item {
                        Value::Object(map) if !arg.options.is_empty() => {
                            Value::Object(self.build_nested(&arg.options, map, params))
                        }
                        other => self.convert_scalar(arg, other, params),
                    })
                    .collect(),
            ),
            other => self.convert_scalar(arg, other, params),
        }
    }

    /// Builds a nested object; keys outside the sub-schema pass through.
    fn build_nested(
        &self,
        options: &[ArgSpec],
        map: Map<String, Value>,
        params: &Map<String, Value>,
    ) -> Map<String, Value> {
        let known: HashSet<&str> = options.iter().map(|o| o.name.as_str()).collect();
        let mut out = Map::new();

        for (key, value) in &map {
            if !known.contains(key.as_str()) && !value.is_null() {
                out.insert(key.clone(), value.clone());
            }
        }

        let default_disposition = Disposition::default();
        for arg in options {
            let Some(value) = effective_value(arg, map.get(&arg.name)) else {
                continue;
            };
            let disposition = arg.disposition.as_ref().unwrap_or(&default_disposition);
            let converted = self.convert(arg, value, params);
            place(&mut out, &disposition.resolve(&arg.name), converted);
        }

        out
    }

    /// Applies the value map and id pattern to a scalar.
    fn convert_scalar(&self, arg: &ArgSpec, value: Value, params: &Map<String, Value>) -> Value {
        let mapped = pattern::scalar_to_string(&value)
            .and_then(|key| arg.value_map.get(&key).cloned())
            .unwrap_or(value);

        let Some(id_pattern) = &arg.pattern else {
            return mapped;
        };
        let Value::String(raw) = &mapped else {
            return mapped;
        };
        if raw.starts_with('/') {
            return mapped;
        }

        let expanded = pattern::expand(id_pattern, |name| match name {
            NAME_PLACEHOLDER => Some(raw.clone()),
            SUBSCRIPTION_PLACEHOLDER => Some(self.subscription_id.to_string()),
            other => params.get(other).and_then(pattern::scalar_to_string),
        });

        match expanded {
            Ok(id) => Value::String(id),
            Err(missing) => {
                warn!(
                    "Cannot expand '{}' for argument {}: missing '{missing}'",
                    raw, arg.name
                );
                mapped
            }
        }
    }
}

/// Returns the supplied value, or the schema default when unset.
fn effective_value(arg: &ArgSpec, provided: Option<&Value>) -> Option<Value> {
    match provided {
        Some(v) if !v.is_null() => Some(v.clone()),
        _ => arg.default.clone(),
    }
}

/// Places a value at a nested path, creating intermediate objects.
fn place(target: &mut Map<String, Value>, path: &[String], value: Value) {
    let Some((key, parents)) = path.split_last() else {
        return;
    };

    let mut current = target;
    for segment in parents {
        let entry = current
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        let Value::Object(next) = entry else {
            return;
        };
        current = next;
    }

    // Objects landing on an existing object merge with it.
    if let Value::Object(incoming) = &value
        && let Some(Value::Object(existing)) = current.get_mut(key)
    {
        existing.extend(incoming.clone());
        return;
    }

    current.insert(key.clone(), value);
}
