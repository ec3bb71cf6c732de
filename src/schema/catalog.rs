//! Catalog of resource schemas.
//!
//! Built-in schemas are embedded at compile time; custom schemas are loaded
//! from YAML files in the same format.

use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{ArmStateError, ConfigError, Result, SchemaError};

use super::types::ResourceSchema;

/// Built-in schema sources, keyed by file name.
const BUILTIN_SOURCES: &[(&str, &str)] = &[
    ("resource_group.yaml", include_str!("../../schemas/resource_group.yaml")),
    ("signalr.yaml", include_str!("../../schemas/signalr.yaml")),
    ("redis_cache.yaml", include_str!("../../schemas/redis_cache.yaml")),
    ("storage_account.yaml", include_str!("../../schemas/storage_account.yaml")),
];

/// Parses and checks a schema document.
///
/// # Errors
///
/// Returns an error if the YAML is invalid or the schema fails its checks.
pub fn parse_schema(content: &str, source_name: &str) -> std::result::Result<ResourceSchema, SchemaError> {
    let schema: ResourceSchema = serde_yaml::from_str(content)
        .map_err(|e| SchemaError::parse(source_name, e.to_string()))?;
    schema.check()?;
    debug!("Parsed schema '{}' from {source_name}", schema.name);
    Ok(schema)
}

/// A set of resource schemas addressable by name.
#[derive(Debug, Clone, Default)]
pub struct SchemaCatalog {
    schemas: BTreeMap<String, ResourceSchema>,
}

impl SchemaCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            schemas: BTreeMap::new(),
        }
    }

    /// Creates a catalog holding the built-in schemas.
    ///
    /// # Errors
    ///
    /// Returns an error if an embedded schema is malformed.
    pub fn builtin() -> Result<Self> {
        let mut catalog = Self::new();
        for (source_name, content) in BUILTIN_SOURCES {
            catalog.register(parse_schema(content, source_name)?);
        }
        Ok(catalog)
    }

    /// Loads a schema from a YAML file and registers it.
    ///
    /// Returns the name of the loaded schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or the schema is invalid.
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<String> {
        let path = path.as_ref();
        info!("Loading schema from: {}", path.display());

        if !path.exists() {
            return Err(ArmStateError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path)?;
        let schema = parse_schema(&content, &path.display().to_string())?;
        let name = schema.name.clone();
        self.register(schema);
        Ok(name)
    }

    /// Registers a schema, replacing any schema with the same name.
    pub fn register(&mut self, schema: ResourceSchema) {
        if self.schemas.contains_key(&schema.name) {
            debug!("Replacing schema '{}'", schema.name);
        }
        self.schemas.insert(schema.name.clone(), schema);
    }

    /// Looks up a schema by name.
    ///
    /// # Errors
    ///
    /// Returns an error if no schema has that name.
    pub fn get(&self, name: &str) -> Result<&ResourceSchema> {
        self.schemas.get(name).ok_or_else(|| {
            ArmStateError::Config(ConfigError::UnknownResourceType {
                name: name.to_string(),
            })
        })
    }

    /// Selects the schema for an invocation: a custom schema file when one is
    /// given, otherwise the named type.
    ///
    /// # Errors
    ///
    /// Returns an error if neither is given, the file cannot be loaded, or
    /// the type is unknown.
    pub fn resolve(&mut self, resource_type: Option<&str>, schema_file: Option<&Path>) -> Result<&ResourceSchema> {
        let name = match (schema_file, resource_type) {
            (Some(path), _) => self.load_file(path)?,
            (None, Some(name)) => name.to_string(),
            (None, None) => {
                return Err(ArmStateError::Config(ConfigError::validation(
                    "Either resource.type or resource.schema_file must be set",
                    "resource.type",
                )));
            }
        };
        self.get(&name)
    }

    /// Returns the registered schema names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }

    /// Iterates over the registered schemas in name order.
    pub fn iter(&self) -> impl Iterator<Item = &ResourceSchema> {
        self.schemas.values()
    }

    /// Returns the number of registered schemas.
    #[must_use]
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    /// Returns true if the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}
