//! Diff engine for comparing desired vs observed state.
//!
//! Only keys present in the desired body are compared. Each comparison
//! honors the modifier registered for its body path.

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use tracing::debug;

use crate::schema::{Comparison, ModifierTable};

/// Engine for computing field-level diffs.
#[derive(Debug)]
pub struct DiffEngine<'a> {
    /// Per-path comparison metadata.
    modifiers: &'a ModifierTable,
}

/// One field whose observed value differs from the desired one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldChange {
    /// Body path of the field.
    pub path: String,
    /// Argument placed at this path, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub argument: Option<String>,
    /// Observed value (null when missing).
    pub old: Value,
    /// Desired value.
    pub new: Value,
}

/// Result of a diff.
#[derive(Debug, Clone, Default)]
pub struct DiffResult {
    /// Updatable fields that differ.
    pub changes: Vec<FieldChange>,
    /// Differences on fields that cannot be updated.
    pub warnings: Vec<String>,
}

impl<'a> DiffEngine<'a> {
    /// Creates a new diff engine.
    #[must_use]
    pub const fn new(modifiers: &'a ModifierTable) -> Self {
        Self { modifiers }
    }

    /// Compares a desired body against the observed one.
    #[must_use]
    pub fn compute(&self, desired: &Value, observed: &Value) -> DiffResult {
        let mut result = DiffResult::default();
        self.walk("", desired, Some(observed), true, &mut result);
        debug!(
            "Diff found {} changes and {} warnings",
            result.changes.len(),
            result.warnings.len()
        );
        result
    }

    fn walk(
        &self,
        path: &str,
        desired: &Value,
        observed: Option<&Value>,
        inherited_updatable: bool,
        out: &mut DiffResult,
    ) {
        let modifier = self.modifiers.get(path);
        let updatable = inherited_updatable && modifier.updatable;

        if modifier.comparison == Comparison::Ignore || desired.is_null() {
            return;
        }

        if let (Value::Object(want), Some(Value::Object(have))) = (desired, observed)
            && !modifier.exact
        {
            for (key, value) in want {
                self.walk(&format!("{path}/{key}"), value, have.get(key), updatable, out);
            }
            return;
        }

        let observed = observed.unwrap_or(&Value::Null);
        match self.compare(path, desired, observed, updatable) {
            Mismatch::Equal => {}
            Mismatch::Fixed => self.record(path, desired, observed, false, out),
            Mismatch::Updatable => self.record(path, desired, observed, true, out),
        }
    }

    fn record(&self, path: &str, desired: &Value, observed: &Value, updatable: bool, out: &mut DiffResult) {
        let change = FieldChange {
            path: path.to_string(),
            argument: self.modifiers.argument(path).map(String::from),
            old: observed.clone(),
            new: desired.clone(),
        };

        if updatable {
            debug!("Field {change}");
            out.changes.push(change);
        } else {
            out.warnings.push(format!("{change} (field cannot be updated, ignored)"));
        }
    }

    /// Compares a desired value with the observed one and reports the worst
    /// mismatch found beneath `path`.
    fn compare(&self, path: &str, desired: &Value, observed: &Value, inherited_updatable: bool) -> Mismatch {
        let modifier = self.modifiers.get(path);
        let updatable = inherited_updatable && modifier.updatable;
        let differs = Mismatch::at(updatable);

        if modifier.comparison == Comparison::Ignore {
            return Mismatch::Equal;
        }

        match (desired, observed) {
            (Value::Null, _) => Mismatch::Equal,
            (_, Value::Null) => differs,
            (Value::Object(want), Value::Object(have)) => {
                if modifier.exact
                    && have
                        .keys()
                        .any(|k| want.get(k).is_none_or(Value::is_null))
                {
                    return differs;
                }
                want.iter()
                    .map(|(key, value)| {
                        self.compare(
                            &format!("{path}/{key}"),
                            value,
                            have.get(key).unwrap_or(&Value::Null),
                            updatable,
                        )
                    })
                    .max()
                    .unwrap_or(Mismatch::Equal)
            }
            (Value::Array(want), Value::Array(have)) => {
                if want.len() != have.len() {
                    return differs;
                }
                let element_path = format!("{path}/*");
                if modifier.ordered {
                    return want
                        .iter()
                        .zip(have)
                        .map(|(w, h)| self.compare(&element_path, w, h, updatable))
                        .max()
                        .unwrap_or(Mismatch::Equal);
                }

                let costs: Vec<Vec<Mismatch>> = want
                    .iter()
                    .map(|w| {
                        have.iter()
                            .map(|h| self.compare(&element_path, w, h, updatable))
                            .collect()
                    })
                    .collect();
                if has_assignment(&costs, Mismatch::Equal) {
                    Mismatch::Equal
                } else if has_assignment(&costs, Mismatch::Fixed) {
                    Mismatch::Fixed
                } else {
                    differs
                }
            }
            (Value::Object(_) | Value::Array(_), _) | (_, Value::Object(_) | Value::Array(_)) => differs,
            (want, have) => {
                if scalar_matches(modifier.comparison, want, have) {
                    Mismatch::Equal
                } else {
                    differs
                }
            }
        }
    }
}

/// Severity of a difference, ordered from none to update-worthy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Mismatch {
    /// Values match.
    Equal,
    /// Only non-updatable fields differ.
    Fixed,
    /// Some updatable field differs.
    Updatable,
}

impl Mismatch {
    const fn at(updatable: bool) -> Self {
        if updatable { Self::Updatable } else { Self::Fixed }
    }
}

/// Returns true if every desired element can be paired with a distinct
/// observed element whose cost is at most `limit`.
fn has_assignment(costs: &[Vec<Mismatch>], limit: Mismatch) -> bool {
    let width = costs.first().map_or(0, Vec::len);
    let mut owner: Vec<Option<usize>> = vec![None; width];

    (0..costs.len()).all(|row| {
        let mut seen = vec![false; width];
        augment(costs, limit, row, &mut seen, &mut owner)
    })
}

/// Kuhn's augmenting path step for one desired element.
fn augment(
    costs: &[Vec<Mismatch>],
    limit: Mismatch,
    row: usize,
    seen: &mut [bool],
    owner: &mut [Option<usize>],
) -> bool {
    for col in 0..seen.len() {
        if costs[row][col] > limit || seen[col] {
            continue;
        }
        seen[col] = true;
        let free = match owner[col] {
            None => true,
            Some(other) => augment(costs, limit, other, seen, owner),
        };
        if free {
            owner[col] = Some(row);
            return true;
        }
    }
    false
}

/// Compares two scalars under a comparison rule.
fn scalar_matches(comparison: Comparison, want: &Value, have: &Value) -> bool {
    match comparison {
        Comparison::Ignore => true,
        Comparison::Insensitive => render(want).to_lowercase() == render(have).to_lowercase(),
        Comparison::Location => normalize_location(&render(want)) == normalize_location(&render(have)),
        Comparison::Default => match (want, have) {
            (Value::Number(a), Value::Number(b)) => {
                if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
                    x == y
                } else if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
                    (x - y).abs() <= f64::EPSILON * x.abs().max(1.0)
                } else {
                    a == b
                }
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (a, b) => render(a) == render(b),
        },
    }
}

/// Renders a scalar as a plain string.
fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Lowercases a region name and strips its spaces.
fn normalize_location(location: &str) -> String {
    location
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}

impl DiffResult {
    /// Returns true if any updatable field differs.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::from("(unset)"),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl fmt::Display for FieldChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = self.argument.as_deref().unwrap_or(&self.path);
        write!(f, "{label}: {} -> {}", display_value(&self.old), display_value(&self.new))
    }
}
