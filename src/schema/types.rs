//! Resource schema types.
//!
//! A [`ResourceSchema`] is the mapping table for one ARM resource type: which
//! arguments it accepts, where each argument lands in the request body, and
//! how each field is compared against the observed resource.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

use crate::error::SchemaError;

use super::pattern;

/// Placeholder always available to id patterns.
pub const SUBSCRIPTION_PLACEHOLDER: &str = "subscription_id";

/// Placeholder bound to the argument value itself in argument patterns.
pub const NAME_PLACEHOLDER: &str = "name";

/// The declarative description of one ARM resource type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceSchema {
    /// Short name used to select the schema (e.g. `signalr`).
    pub name: String,
    /// ARM resource type (e.g. `Microsoft.SignalRService/signalR`).
    pub resource_type: String,
    /// API version sent with every request.
    pub api_version: String,
    /// Resource id template, with `{placeholder}` path parameters.
    pub id_pattern: String,
    /// Collection scope used by list queries.
    #[serde(default)]
    pub list_pattern: Option<String>,
    /// Key holding the resource in the output mapping.
    pub output_key: String,
    /// How updates are sent to ARM.
    #[serde(default)]
    pub update_method: UpdateMethod,
    /// Human-readable description.
    #[serde(default)]
    pub description: Option<String>,
    /// Accepted arguments.
    #[serde(default)]
    pub options: Vec<ArgSpec>,
}

/// Specification of a single argument.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArgSpec {
    /// Argument name as supplied by the user.
    pub name: String,
    /// Value kind.
    #[serde(rename = "type", default)]
    pub kind: ArgKind,
    /// Element kind for lists.
    #[serde(default)]
    pub elements: Option<ArgKind>,
    /// Whether the argument must be supplied.
    #[serde(default)]
    pub required: bool,
    /// Allowed values.
    #[serde(default)]
    pub choices: Vec<String>,
    /// Value used when the argument is unset.
    #[serde(default)]
    pub default: Option<Value>,
    /// Where the argument lands in the request body. Top-level arguments
    /// without a disposition are path parameters.
    #[serde(default)]
    pub disposition: Option<Disposition>,
    /// Comparison rule used by the diff.
    #[serde(default)]
    pub comparison: Comparison,
    /// Whether a mismatch may trigger an update.
    #[serde(default = "default_updatable")]
    pub updatable: bool,
    /// Whether list order is significant.
    #[serde(default)]
    pub ordered: bool,
    /// Whether extra observed keys in an object count as a mismatch.
    #[serde(default)]
    pub exact: bool,
    /// Translation from user values to wire values.
    #[serde(default)]
    pub value_map: BTreeMap<String, Value>,
    /// Resource id template used to expand bare names.
    #[serde(default)]
    pub pattern: Option<String>,
    /// Human-readable description.
    #[serde(default)]
    pub description: Option<String>,
    /// Nested arguments for objects and lists of objects.
    #[serde(default)]
    pub options: Vec<ArgSpec>,
}

/// Kinds of argument values.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ArgKind {
    /// String.
    #[default]
    Str,
    /// Integer.
    Int,
    /// Any number.
    Float,
    /// Boolean.
    Bool,
    /// Object.
    Dict,
    /// List.
    List,
    /// Anything, passed through untouched.
    Raw,
}

/// Comparison rules applied to leaf values.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Comparison {
    /// Value equality.
    #[default]
    Default,
    /// Case-insensitive string equality.
    Insensitive,
    /// Case- and whitespace-insensitive (Azure region names).
    Location,
    /// Never a mismatch.
    Ignore,
}

/// HTTP method used for updates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum UpdateMethod {
    /// Full-body PUT of the desired body merged over the observed one.
    #[default]
    Put,
    /// PATCH with only the desired body.
    Patch,
}

/// Parsed disposition: the path an argument takes inside the body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Disposition {
    /// Whether the path starts at the body root.
    pub absolute: bool,
    /// Path segments; the last one is the key, `*` meaning the argument's name.
    pub segments: Vec<String>,
}

const fn default_updatable() -> bool {
    true
}

impl Default for Disposition {
    fn default() -> Self {
        Self {
            absolute: false,
            segments: vec![String::from("*")],
        }
    }
}

impl Disposition {
    /// Parses a disposition such as `/`, `*`, `/properties/*` or `/sku/name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the disposition has empty segments or a `*` that
    /// is not the final segment.
    pub fn parse(raw: &str) -> Result<Self, String> {
        if raw.is_empty() {
            return Err(String::from("Disposition cannot be empty"));
        }

        if raw == "/" {
            return Ok(Self {
                absolute: true,
                segments: vec![String::from("*")],
            });
        }

        let absolute = raw.starts_with('/');
        let body = raw.strip_prefix('/').unwrap_or(raw);
        let segments: Vec<String> = body.split('/').map(String::from).collect();

        if segments.iter().any(String::is_empty) {
            return Err(format!("Invalid disposition: {raw}. Segments cannot be empty"));
        }

        let last = segments.len() - 1;
        if segments.iter().enumerate().any(|(i, s)| s == "*" && i != last) {
            return Err(format!("Invalid disposition: {raw}. '*' must be the last segment"));
        }

        Ok(Self { absolute, segments })
    }

    /// Resolves the path for the named argument.
    #[must_use]
    pub fn resolve(&self, arg_name: &str) -> Vec<String> {
        self.segments
            .iter()
            .map(|s| if s == "*" { camel_case(arg_name) } else { s.clone() })
            .collect()
    }
}

impl TryFrom<String> for Disposition {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Disposition> for String {
    fn from(d: Disposition) -> Self {
        if d.absolute && d.segments.len() == 1 && d.segments[0] == "*" {
            return Self::from("/");
        }
        let joined = d.segments.join("/");
        if d.absolute { format!("/{joined}") } else { joined }
    }
}

/// Converts `snake_case` to `camelCase`.
#[must_use]
pub fn camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = false;
    for c in name.chars() {
        if c == '_' {
            upper_next = !out.is_empty();
        } else if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

impl ArgKind {
    /// Returns true if the value has this kind.
    #[must_use]
    pub fn matches(self, value: &Value) -> bool {
        match self {
            Self::Str => value.is_string(),
            Self::Int => value.is_i64() || value.is_u64(),
            Self::Float => value.is_number(),
            Self::Bool => value.is_boolean(),
            Self::Dict => value.is_object(),
            Self::List => value.is_array(),
            Self::Raw => true,
        }
    }
}

impl std::fmt::Display for ArgKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Str => "str",
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::Dict => "dict",
            Self::List => "list",
            Self::Raw => "raw",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for Comparison {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Default => "default",
            Self::Insensitive => "insensitive",
            Self::Location => "location",
            Self::Ignore => "ignore",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for UpdateMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Put => write!(f, "PUT"),
            Self::Patch => write!(f, "PATCH"),
        }
    }
}

impl ResourceSchema {
    /// Looks up a top-level argument by name.
    #[must_use]
    pub fn arg(&self, name: &str) -> Option<&ArgSpec> {
        self.options.iter().find(|a| a.name == name)
    }

    /// Returns the path-parameter arguments.
    #[must_use]
    pub fn identity_args(&self) -> Vec<&ArgSpec> {
        self.options.iter().filter(|a| a.disposition.is_none()).collect()
    }

    /// Returns the arguments that land in the request body.
    #[must_use]
    pub fn body_args(&self) -> Vec<&ArgSpec> {
        self.options.iter().filter(|a| a.disposition.is_some()).collect()
    }

    /// Checks the schema for structural problems.
    ///
    /// # Errors
    ///
    /// Returns an error on duplicate argument names, relative top-level
    /// dispositions, absolute nested dispositions, or patterns referencing
    /// unknown placeholders.
    pub fn check(&self) -> Result<(), SchemaError> {
        check_unique(&self.name, &self.options)?;

        for arg in &self.options {
            if let Some(disposition) = &arg.disposition
                && !disposition.absolute
            {
                return Err(invalid_disposition(arg, disposition));
            }
            check_nested_dispositions(&arg.options)?;
        }

        let mut known: HashSet<&str> = self.options.iter().map(|a| a.name.as_str()).collect();
        known.insert(SUBSCRIPTION_PLACEHOLDER);

        check_placeholders(&self.id_pattern, &known)?;
        if let Some(list_pattern) = &self.list_pattern {
            check_placeholders(list_pattern, &known)?;
        }

        known.insert(NAME_PLACEHOLDER);
        check_arg_patterns(&self.options, &known)
    }
}

/// Checks argument names are unique at every level.
fn check_unique(schema: &str, options: &[ArgSpec]) -> Result<(), SchemaError> {
    let mut seen = HashSet::new();
    for arg in options {
        if !seen.insert(arg.name.as_str()) {
            return Err(SchemaError::DuplicateArgument {
                schema: schema.to_string(),
                name: arg.name.clone(),
            });
        }
        check_unique(schema, &arg.options)?;
    }
    Ok(())
}

/// Nested options are placed relative to their parent object.
fn check_nested_dispositions(options: &[ArgSpec]) -> Result<(), SchemaError> {
    for arg in options {
        if let Some(disposition) = &arg.disposition
            && disposition.absolute
        {
            return Err(invalid_disposition(arg, disposition));
        }
        check_nested_dispositions(&arg.options)?;
    }
    Ok(())
}

fn invalid_disposition(arg: &ArgSpec, disposition: &Disposition) -> SchemaError {
    SchemaError::InvalidDisposition {
        argument: arg.name.clone(),
        disposition: String::from(disposition.clone()),
    }
}

fn check_placeholders(pattern_str: &str, known: &HashSet<&str>) -> Result<(), SchemaError> {
    for placeholder in pattern::placeholders(pattern_str) {
        if !known.contains(placeholder) {
            return Err(SchemaError::UnknownPlaceholder {
                pattern: pattern_str.to_string(),
                placeholder: placeholder.to_string(),
            });
        }
    }
    Ok(())
}

fn check_arg_patterns(options: &[ArgSpec], known: &HashSet<&str>) -> Result<(), SchemaError> {
    for arg in options {
        if let Some(p) = &arg.pattern {
            check_placeholders(p, known)?;
        }
        check_arg_patterns(&arg.options, known)?;
    }
    Ok(())
}
