//! Reconcile plan types and construction.
//!
//! A plan is computed once per invocation from the desired body and the
//! observed resource, and fixes the action the dispatcher will take.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::arm::{Observed, ResourceId};
use crate::config::BodyHasher;
use crate::schema::{ModifierTable, UpdateMethod};

use super::diff::{DiffEngine, FieldChange};

/// Top-level fields ARM sets itself and rejects or ignores on write.
const READ_ONLY_FIELDS: &[&str] = &["id", "name", "type", "etag", "systemData"];

/// Read-only fields under `properties`.
const READ_ONLY_PROPERTIES: &[&str] = &["provisioningState"];

/// Whether the resource should exist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DesiredState {
    /// The resource should exist and match the parameters.
    #[default]
    Present,
    /// The resource should not exist.
    Absent,
}

/// The action decided for one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Nothing to do.
    NoAction,
    /// Create the resource.
    Create,
    /// Update the resource.
    Update,
    /// Delete the resource.
    Delete,
}

/// The reconcile plan.
#[derive(Debug, Clone)]
pub struct ReconcilePlan {
    /// When the plan was created.
    pub created_at: DateTime<Utc>,
    /// Decided action.
    pub action: Action,
    /// Target resource.
    pub resource_id: ResourceId,
    /// Updatable fields that differ.
    pub changes: Vec<FieldChange>,
    /// Differences that cannot be applied.
    pub warnings: Vec<String>,
    /// Body to send for create and update.
    pub body: Value,
    /// How an update is sent.
    pub update_method: UpdateMethod,
    /// Fingerprint of the desired body.
    pub body_hash: String,
}

impl ReconcilePlan {
    /// Decides the action for a desired body against the observed state.
    #[must_use]
    pub fn decide(
        resource_id: ResourceId,
        state: DesiredState,
        desired: &Value,
        observed: &Observed,
        modifiers: &ModifierTable,
        update_method: UpdateMethod,
    ) -> Self {
        let mut plan = Self {
            created_at: Utc::now(),
            action: Action::NoAction,
            resource_id,
            changes: Vec::new(),
            warnings: Vec::new(),
            body: Value::Null,
            update_method,
            body_hash: BodyHasher::hash(desired),
        };

        match (observed, state) {
            (Observed::Absent, DesiredState::Present) => {
                plan.action = Action::Create;
                plan.body = desired.clone();
            }
            (Observed::Absent, DesiredState::Absent) => {}
            (Observed::Present(_), DesiredState::Absent) => plan.action = Action::Delete,
            (Observed::Present(current), DesiredState::Present) => {
                let diff = DiffEngine::new(modifiers).compute(desired, current);
                plan.warnings = diff.warnings;
                if !diff.changes.is_empty() {
                    plan.action = Action::Update;
                    plan.changes = diff.changes;
                    plan.body = match update_method {
                        UpdateMethod::Put => merge_for_update(current, desired, modifiers),
                        UpdateMethod::Patch => updatable_body(desired, modifiers),
                    };
                }
            }
        }

        debug!("Decided {} for {}", plan.action, plan.resource_id);
        plan
    }

    /// Returns true if executing the plan changes the resource.
    #[must_use]
    pub const fn is_change(&self) -> bool {
        self.action.is_change()
    }
}

impl Action {
    /// Returns true for actions that modify the resource.
    #[must_use]
    pub const fn is_change(self) -> bool {
        !matches!(self, Self::NoAction)
    }
}

/// Deep-merges the desired body over the observed one, dropping read-only
/// fields. Paths marked exact are replaced rather than merged; non-updatable
/// paths keep their observed value.
#[must_use]
pub fn merge_for_update(observed: &Value, desired: &Value, modifiers: &ModifierTable) -> Value {
    let mut base = observed.clone();
    if let Value::Object(map) = &mut base {
        for field in READ_ONLY_FIELDS {
            map.remove(*field);
        }
        if let Some(Value::Object(properties)) = map.get_mut("properties") {
            for field in READ_ONLY_PROPERTIES {
                properties.remove(*field);
            }
        }
    }
    merge_into(&mut base, desired, "", modifiers);
    base
}

fn merge_into(target: &mut Value, incoming: &Value, path: &str, modifiers: &ModifierTable) {
    match (target, incoming) {
        (Value::Object(existing), Value::Object(update)) if !modifiers.get(path).exact => {
            for (key, value) in update {
                if value.is_null() {
                    continue;
                }
                let child_path = format!("{path}/{key}");
                if !modifiers.get(&child_path).updatable {
                    continue;
                }
                match existing.get_mut(key) {
                    Some(slot) => merge_into(slot, value, &child_path, modifiers),
                    None => {
                        existing.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (slot, value) => *slot = value.clone(),
    }
}

/// Returns the desired body without its non-updatable paths.
#[must_use]
pub fn updatable_body(desired: &Value, modifiers: &ModifierTable) -> Value {
    strip_fixed(desired, "", modifiers)
}

fn strip_fixed(value: &Value, path: &str, modifiers: &ModifierTable) -> Value {
    let Value::Object(map) = value else {
        return value.clone();
    };
    let kept = map
        .iter()
        .filter_map(|(key, child)| {
            let child_path = format!("{path}/{key}");
            modifiers
                .get(&child_path)
                .updatable
                .then(|| (key.clone(), strip_fixed(child, &child_path, modifiers)))
        })
        .collect();
    Value::Object(kept)
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NoAction => "no_action",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for DesiredState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Present => write!(f, "present"),
            Self::Absent => write!(f, "absent"),
        }
    }
}

impl std::fmt::Display for ReconcilePlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{} {} (desired {})", self.action, self.resource_id, self.body_hash)?;
        for change in &self.changes {
            writeln!(f, "  ~ {change}")?;
        }
        for warning in &self.warnings {
            writeln!(f, "  ! {warning}")?;
        }
        Ok(())
    }
}

/// Returns an empty JSON object.
#[must_use]
pub fn empty_object() -> Value {
    Value::Object(Map::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ResourceSchema;
    use serde_json::json;

    fn table() -> ModifierTable {
        let schema: ResourceSchema = serde_yaml::from_str(
            r#"
name: test
resource_type: Microsoft.Test/things
api_version: "2024-01-01"
id_pattern: /subscriptions/{subscription_id}/things/{name}
output_key: thing
options:
  - name: name
  - name: location
    disposition: /
    comparison: location
    updatable: false
  - name: units
    type: int
    disposition: /sku/capacity
  - name: tags
    type: dict
    disposition: /
"#,
        )
        .unwrap();
        ModifierTable::from_schema(&schema)
    }

    fn id() -> ResourceId {
        ResourceId::new("/subscriptions/s/things/t")
    }

    #[test]
    fn test_absent_present_creates() {
        let desired = json!({ "location": "westeurope" });
        let plan = ReconcilePlan::decide(id(), DesiredState::Present, &desired, &Observed::Absent, &table(), UpdateMethod::Put);
        assert_eq!(plan.action, Action::Create);
        assert_eq!(plan.body, desired);
        assert!(plan.is_change());
    }

    #[test]
    fn test_absent_absent_is_noop() {
        let plan = ReconcilePlan::decide(id(), DesiredState::Absent, &json!({}), &Observed::Absent, &table(), UpdateMethod::Put);
        assert_eq!(plan.action, Action::NoAction);
        assert!(!plan.is_change());
    }

    #[test]
    fn test_present_absent_deletes() {
        let observed = Observed::Present(json!({ "id": "/x" }));
        let plan = ReconcilePlan::decide(id(), DesiredState::Absent, &json!({}), &observed, &table(), UpdateMethod::Put);
        assert_eq!(plan.action, Action::Delete);
    }

    #[test]
    fn test_update_put_merges_over_observed() {
        let observed = Observed::Present(json!({
            "id": "/x",
            "name": "t",
            "location": "westeurope",
            "sku": { "name": "Standard", "capacity": 1 },
            "properties": { "provisioningState": "Succeeded", "hostName": "h" }
        }));
        let desired = json!({ "sku": { "capacity": 2 } });
        let plan = ReconcilePlan::decide(id(), DesiredState::Present, &desired, &observed, &table(), UpdateMethod::Put);

        assert_eq!(plan.action, Action::Update);
        assert_eq!(plan.changes.len(), 1);
        assert_eq!(
            plan.body,
            json!({
                "location": "westeurope",
                "sku": { "name": "Standard", "capacity": 2 },
                "properties": { "hostName": "h" }
            })
        );
    }

    #[test]
    fn test_update_patch_sends_desired_only() {
        let observed = Observed::Present(json!({ "sku": { "capacity": 1 } }));
        let desired = json!({ "sku": { "capacity": 2 } });
        let plan = ReconcilePlan::decide(id(), DesiredState::Present, &desired, &observed, &table(), UpdateMethod::Patch);
        assert_eq!(plan.body, desired);
    }

    #[test]
    fn test_update_keeps_observed_non_updatable_fields() {
        let observed = json!({ "location": "westeurope", "sku": { "capacity": 1 } });
        let desired = json!({ "location": "eastus", "sku": { "capacity": 2 } });

        let merged = merge_for_update(&observed, &desired, &table());
        assert_eq!(merged, json!({ "location": "westeurope", "sku": { "capacity": 2 } }));

        let plan = ReconcilePlan::decide(
            id(),
            DesiredState::Present,
            &desired,
            &Observed::Present(observed),
            &table(),
            UpdateMethod::Patch,
        );
        assert_eq!(plan.action, Action::Update);
        assert_eq!(plan.warnings.len(), 1);
        assert_eq!(plan.body, json!({ "sku": { "capacity": 2 } }));
    }

    #[test]
    fn test_non_updatable_only_is_noop_with_warning() {
        let observed = Observed::Present(json!({ "location": "westeurope" }));
        let desired = json!({ "location": "eastus" });
        let plan = ReconcilePlan::decide(id(), DesiredState::Present, &desired, &observed, &table(), UpdateMethod::Put);
        assert_eq!(plan.action, Action::NoAction);
        assert_eq!(plan.warnings.len(), 1);
    }

    #[test]
    fn test_exact_tags_replace_on_merge() {
        let mut table = table();
        table.set_exact("/tags", true);
        let merged = merge_for_update(
            &json!({ "tags": { "a": "1", "b": "2" } }),
            &json!({ "tags": { "a": "1" } }),
            &table,
        );
        assert_eq!(merged, json!({ "tags": { "a": "1" } }));

        let merged = merge_for_update(
            &json!({ "tags": { "a": "1", "b": "2" } }),
            &json!({ "tags": { "c": "3" } }),
            &self::table(),
        );
        assert_eq!(merged, json!({ "tags": { "a": "1", "b": "2", "c": "3" } }));
    }

    #[test]
    fn test_action_display() {
        assert_eq!(Action::NoAction.to_string(), "no_action");
        assert_eq!(serde_json::to_value(Action::Update).unwrap(), json!("update"));
    }
}
