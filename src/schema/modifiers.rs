//! Per-field comparison metadata derived from a schema.

use std::collections::HashMap;

use super::types::{ArgKind, ArgSpec, Comparison, Disposition, ResourceSchema};

/// Comparison metadata for one body path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldModifier {
    /// Comparison rule for leaf values.
    pub comparison: Comparison,
    /// Whether a mismatch may trigger an update.
    pub updatable: bool,
    /// Whether list order is significant.
    pub ordered: bool,
    /// Whether extra observed object keys count as a mismatch.
    pub exact: bool,
}

impl Default for FieldModifier {
    fn default() -> Self {
        Self {
            comparison: Comparison::Default,
            updatable: true,
            ordered: false,
            exact: false,
        }
    }
}

/// Map from absolute body path (`/properties/sku/name`, list elements as
/// `/*`) to its modifier.
#[derive(Debug, Clone, Default)]
pub struct ModifierTable {
    entries: HashMap<String, FieldModifier>,
    arguments: HashMap<String, String>,
}

impl ModifierTable {
    /// Builds the table for a schema.
    #[must_use]
    pub fn from_schema(schema: &ResourceSchema) -> Self {
        let mut table = Self::default();
        for arg in &schema.options {
            if let Some(disposition) = &arg.disposition {
                table.collect(arg, disposition, &[]);
            }
        }
        table
    }

    fn collect(&mut self, arg: &ArgSpec, disposition: &Disposition, base: &[String]) {
        let mut path: Vec<String> = base.to_vec();
        path.extend(disposition.resolve(&arg.name));

        let modifier = FieldModifier {
            comparison: arg.comparison,
            updatable: arg.updatable,
            ordered: arg.ordered,
            exact: arg.exact,
        };
        self.entries.insert(join(&path), modifier);
        self.arguments.insert(join(&path), arg.name.clone());

        let child_base = if arg.kind == ArgKind::List {
            path.push(String::from("*"));
            self.entries.insert(join(&path), modifier);
            path
        } else {
            path
        };

        let default_disposition = Disposition::default();
        for child in &arg.options {
            let child_disposition = child.disposition.as_ref().unwrap_or(&default_disposition);
            self.collect(child, child_disposition, &child_base);
        }
    }

    /// Returns the modifier for a path, or the default.
    #[must_use]
    pub fn get(&self, path: &str) -> FieldModifier {
        self.entries.get(path).copied().unwrap_or_default()
    }

    /// Returns the name of the argument placed at a path.
    #[must_use]
    pub fn argument(&self, path: &str) -> Option<&str> {
        self.arguments.get(path).map(String::as_str)
    }

    /// Marks an object path as exact (or not).
    pub fn set_exact(&mut self, path: &str, exact: bool) {
        self.entries.entry(path.to_string()).or_default().exact = exact;
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the table has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn join(segments: &[String]) -> String {
    format!("/{}", segments.join("/"))
}
