//! Reconciler for converging one ARM resource to its desired state.
//!
//! This module threads an immutable request through the pipeline:
//! fetch the observed resource, build the desired body, decide the action,
//! and dispatch it unless running in check mode.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

use crate::arm::{Observed, Page, ReadPolicy, ResourceId, ResourceProvider, StateFetcher};
use crate::config::{InvocationFile, coerce_parameters};
use crate::error::{ArmStateError, ConfigError, Result};
use crate::planner::{Action, ActionDispatcher, DesiredState, FieldChange, ReconcilePlan, empty_object};
use crate::schema::{DesiredStateBuilder, ModifierTable, ResourceSchema};

/// Body path of resource tags.
const TAGS_PATH: &str = "/tags";

/// One reconcile or query request.
#[derive(Debug, Clone)]
pub struct ReconcileRequest<'a> {
    /// Schema of the target resource type.
    pub schema: &'a ResourceSchema,
    /// Subscription holding the resource.
    pub subscription_id: String,
    /// Flat user arguments.
    pub parameters: Map<String, Value>,
    /// Whether the resource should exist.
    pub state: DesiredState,
    /// Compute the action without executing it.
    pub check_mode: bool,
    /// Keep observed tags not named in the parameters.
    pub append_tags: bool,
}

/// Result of a reconcile run.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileOutcome {
    /// Whether the resource was (or would be) changed.
    pub changed: bool,
    /// Decided action.
    pub action: Action,
    /// Whether the run was a dry run.
    pub check_mode: bool,
    /// Updatable fields that differed.
    pub changes: Vec<FieldChange>,
    /// Differences that could not be applied.
    pub warnings: Vec<String>,
    /// Target resource.
    pub resource_id: ResourceId,
    /// Resource after the run (observed resource in check mode, empty after
    /// delete).
    pub resource: Value,
    /// Fingerprint of the desired body.
    pub body_hash: String,
    /// When the run finished.
    pub completed_at: DateTime<Utc>,
}

/// Result of a read-only query, shaped by the call site.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    /// One resource read by identity.
    Single(Value),
    /// A page of resources.
    Page {
        /// Resources on this page.
        items: Vec<Value>,
        /// Continuation token, passed through verbatim.
        next_link: Option<String>,
    },
}

/// Reconciler for a single resource.
pub struct Reconciler<'a, P: ResourceProvider + ?Sized> {
    /// Resource provider.
    provider: &'a P,
    /// Handling of read failures.
    policy: ReadPolicy,
}

impl<'a> ReconcileRequest<'a> {
    /// Builds a request from a parsed invocation.
    #[must_use]
    pub fn from_invocation(schema: &'a ResourceSchema, invocation: &InvocationFile) -> Self {
        Self {
            schema,
            subscription_id: invocation.provider.subscription_id.clone(),
            parameters: coerce_parameters(&schema.options, &invocation.resource.parameters),
            state: invocation.resource.state,
            check_mode: invocation.resource.check_mode,
            append_tags: invocation.resource.append_tags,
        }
    }

    /// Expands the resource id from the schema's id pattern.
    ///
    /// # Errors
    ///
    /// Returns an error if a path parameter is missing.
    pub fn resource_id(&self) -> Result<ResourceId> {
        ResourceId::from_pattern(&self.schema.id_pattern, &self.subscription_id, &self.parameters)
    }
}

impl<'a, P: ResourceProvider + ?Sized> Reconciler<'a, P> {
    /// Creates a new reconciler.
    #[must_use]
    pub const fn new(provider: &'a P, policy: ReadPolicy) -> Self {
        Self { provider, policy }
    }

    /// Computes the plan for a request without executing it.
    ///
    /// # Errors
    ///
    /// Returns an error if the id cannot be built or the read fails.
    pub async fn plan(&self, request: &ReconcileRequest<'_>) -> Result<(ReconcilePlan, Observed)> {
        let schema = request.schema;
        let id = request.resource_id()?;
        info!("Reconciling {} {id}", schema.name);

        let observed = StateFetcher::new(self.provider, self.policy)
            .fetch(&id, &schema.api_version)
            .await?;

        let desired = DesiredStateBuilder::new(schema, &request.subscription_id).build(&request.parameters);
        debug!("Desired body: {desired}");

        let mut modifiers = ModifierTable::from_schema(schema);
        if !request.append_tags {
            modifiers.set_exact(TAGS_PATH, true);
        }

        let plan = ReconcilePlan::decide(
            id,
            request.state,
            &desired,
            &observed,
            &modifiers,
            schema.update_method,
        );
        for warning in &plan.warnings {
            warn!("{warning}");
        }

        Ok((plan, observed))
    }

    /// Reconciles the resource.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails or the provider rejects the
    /// action.
    pub async fn reconcile(&self, request: &ReconcileRequest<'_>) -> Result<ReconcileOutcome> {
        let (plan, observed) = self.plan(request).await?;

        let resource = if request.check_mode {
            info!("Check mode: would {} {}", plan.action, plan.resource_id);
            observed.as_value().cloned().unwrap_or_else(empty_object)
        } else {
            ActionDispatcher::new(self.provider, &request.schema.api_version)
                .dispatch(&plan, &observed)
                .await?
        };

        info!("Finished {} for {}", plan.action, plan.resource_id);

        Ok(ReconcileOutcome {
            changed: plan.is_change(),
            action: plan.action,
            check_mode: request.check_mode,
            changes: plan.changes,
            warnings: plan.warnings,
            resource_id: plan.resource_id,
            resource,
            body_hash: plan.body_hash,
            completed_at: Utc::now(),
        })
    }

    /// Reads the resource named by the request; not-found yields an empty
    /// page.
    ///
    /// # Errors
    ///
    /// Returns an error if the id cannot be built or the read fails.
    pub async fn get(&self, request: &ReconcileRequest<'_>) -> Result<QueryResult> {
        let id = request.resource_id()?;
        match self.provider.get(&id, &request.schema.api_version).await {
            Ok(value) => Ok(QueryResult::Single(value)),
            Err(e) if e.is_not_found() => {
                debug!("{id} not found");
                Ok(QueryResult::from(Page::empty()))
            }
            Err(e) => Err(e),
        }
    }

    /// Lists resources in the schema's list scope, or follows `next_link`.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema has no list scope, a scope parameter
    /// is missing, or the request fails.
    pub async fn list(&self, request: &ReconcileRequest<'_>, next_link: Option<&str>) -> Result<QueryResult> {
        if let Some(link) = next_link {
            return self.provider.list_next(link).await.map(QueryResult::from);
        }

        let schema = request.schema;
        let Some(list_pattern) = &schema.list_pattern else {
            return Err(ArmStateError::Config(ConfigError::validation_general(format!(
                "Schema '{}' does not support listing",
                schema.name
            ))));
        };

        let scope = ResourceId::from_pattern(list_pattern, &request.subscription_id, &request.parameters)?;
        let page = self.provider.list(&scope, &schema.api_version).await?;
        debug!("Listed {} resources under {scope}", page.items.len());
        Ok(QueryResult::from(page))
    }
}

impl ReconcileOutcome {
    /// Renders the output mapping, with the resource under `output_key`.
    #[must_use]
    pub fn to_output(&self, output_key: &str) -> Value {
        let mut out = Map::new();
        out.insert(String::from("changed"), Value::Bool(self.changed));
        out.insert(String::from("action"), json!(self.action));
        out.insert(String::from("check_mode"), Value::Bool(self.check_mode));
        out.insert(String::from("diff"), json!(self.changes));
        out.insert(String::from("warnings"), json!(self.warnings));
        out.insert(output_key.to_string(), self.resource.clone());
        Value::Object(out)
    }
}

impl QueryResult {
    /// Returns the resources as a list.
    #[must_use]
    pub fn items(&self) -> Vec<Value> {
        match self {
            Self::Single(value) => vec![value.clone()],
            Self::Page { items, .. } => items.clone(),
        }
    }

    /// Returns the continuation token, if any.
    #[must_use]
    pub fn next_link(&self) -> Option<&str> {
        match self {
            Self::Single(_) => None,
            Self::Page { next_link, .. } => next_link.as_deref(),
        }
    }

    /// Renders the query output mapping.
    #[must_use]
    pub fn to_output(&self, output_key: &str) -> Value {
        let mut out = Map::new();
        out.insert(String::from("changed"), Value::Bool(false));
        out.insert(output_key.to_string(), Value::Array(self.items()));
        out.insert(String::from("next_link"), json!(self.next_link()));
        Value::Object(out)
    }
}

impl From<Page> for QueryResult {
    fn from(page: Page) -> Self {
        Self::Page {
            items: page.items,
            next_link: page.next_link,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arm::MockResourceProvider;
    use crate::error::{ArmApiError, ReconcileError};
    use crate::schema::SchemaCatalog;

    const ID: &str = "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.SignalRService/signalR/sig1";

    fn schema() -> ResourceSchema {
        SchemaCatalog::builtin().unwrap().get("signalr").unwrap().clone()
    }

    fn request(schema: &ResourceSchema, state: DesiredState, params: Value) -> ReconcileRequest<'_> {
        let Value::Object(parameters) = params else {
            panic!("parameters must be an object");
        };
        ReconcileRequest {
            schema,
            subscription_id: String::from("sub"),
            parameters,
            state,
            check_mode: false,
            append_tags: true,
        }
    }

    fn base_params(units: u64) -> Value {
        json!({
            "resource_group": "rg",
            "name": "sig1",
            "location": "westeurope",
            "sku": "Standard_S1",
            "units": units
        })
    }

    fn observed_resource(units: u64) -> Value {
        json!({
            "id": ID,
            "name": "sig1",
            "type": "Microsoft.SignalRService/SignalR",
            "location": "West Europe",
            "sku": { "name": "Standard_S1", "tier": "Standard", "capacity": units },
            "properties": { "provisioningState": "Succeeded", "hostName": "sig1.service.signalr.net" }
        })
    }

    fn not_found(id: &ResourceId) -> ArmStateError {
        ArmStateError::Arm(ArmApiError::NotFound {
            resource_id: id.to_string(),
        })
    }

    #[tokio::test]
    async fn test_create_when_absent() {
        let schema = schema();
        let mut provider = MockResourceProvider::new();
        provider.expect_get().times(1).returning(|id, _| Err(not_found(id)));
        provider
            .expect_create_or_update()
            .withf(|id, _, body| {
                id.as_str() == ID
                    && body == &json!({
                        "location": "westeurope",
                        "sku": { "name": "Standard_S1", "capacity": 1 }
                    })
            })
            .times(1)
            .returning(|_, _, _| Ok(observed_resource(1)));

        let outcome = Reconciler::new(&provider, ReadPolicy::Strict)
            .reconcile(&request(&schema, DesiredState::Present, base_params(1)))
            .await
            .unwrap();

        assert!(outcome.changed);
        assert_eq!(outcome.action, Action::Create);
        assert_eq!(outcome.resource["id"], json!(ID));
    }

    #[tokio::test]
    async fn test_delete_when_present() {
        let schema = schema();
        let mut provider = MockResourceProvider::new();
        provider.expect_get().returning(|_, _| Ok(observed_resource(1)));
        provider.expect_delete().times(1).returning(|_, _| Ok(()));

        let outcome = Reconciler::new(&provider, ReadPolicy::Strict)
            .reconcile(&request(&schema, DesiredState::Absent, json!({ "resource_group": "rg", "name": "sig1" })))
            .await
            .unwrap();

        assert!(outcome.changed);
        assert_eq!(outcome.action, Action::Delete);
        assert_eq!(outcome.to_output(&schema.output_key)["signalr"], json!({}));
    }

    #[tokio::test]
    async fn test_absent_and_absent_is_noop() {
        let schema = schema();
        let mut provider = MockResourceProvider::new();
        provider.expect_get().returning(|id, _| Err(not_found(id)));
        provider.expect_delete().never();

        let outcome = Reconciler::new(&provider, ReadPolicy::Strict)
            .reconcile(&request(&schema, DesiredState::Absent, json!({ "resource_group": "rg", "name": "sig1" })))
            .await
            .unwrap();

        assert!(!outcome.changed);
        assert_eq!(outcome.action, Action::NoAction);
    }

    #[tokio::test]
    async fn test_units_change_updates_one_field() {
        let schema = schema();
        let mut provider = MockResourceProvider::new();
        provider.expect_get().returning(|_, _| Ok(observed_resource(1)));
        provider
            .expect_create_or_update()
            .withf(|_, _, body| {
                body["sku"]["capacity"] == json!(2)
                    && body["sku"]["tier"] == json!("Standard")
                    && body.get("id").is_none()
                    && body["properties"].get("provisioningState").is_none()
            })
            .times(1)
            .returning(|_, _, _| Ok(observed_resource(2)));

        let outcome = Reconciler::new(&provider, ReadPolicy::Strict)
            .reconcile(&request(&schema, DesiredState::Present, base_params(2)))
            .await
            .unwrap();

        assert_eq!(outcome.action, Action::Update);
        assert_eq!(outcome.changes.len(), 1);
        assert_eq!(outcome.changes[0].to_string(), "units: 1 -> 2");

        let output = outcome.to_output("signalr");
        assert_eq!(output["changed"], json!(true));
        assert_eq!(output["action"], json!("update"));
        assert_eq!(output["diff"][0]["path"], json!("/sku/capacity"));
        assert_eq!(output["signalr"]["sku"]["capacity"], json!(2));
    }

    #[tokio::test]
    async fn test_subset_of_observed_is_noop() {
        let schema = schema();
        let mut provider = MockResourceProvider::new();
        provider.expect_get().returning(|_, _| Ok(observed_resource(1)));
        provider.expect_create_or_update().never();

        let outcome = Reconciler::new(&provider, ReadPolicy::Strict)
            .reconcile(&request(&schema, DesiredState::Present, base_params(1)))
            .await
            .unwrap();

        assert!(!outcome.changed);
        assert_eq!(outcome.resource, observed_resource(1));
    }

    #[tokio::test]
    async fn test_second_run_converges() {
        let schema = schema();
        let params = json!({
            "resource_group": "rg",
            "name": "sig1",
            "location": "eastus",
            "sku": "Premium_P1",
            "units": 5,
            "tags": { "env": "prod" },
            "cors": { "allowed_origins": ["https://a", "https://b"] }
        });

        let mut first = MockResourceProvider::new();
        first.expect_get().returning(|id, _| Err(not_found(id)));
        first
            .expect_create_or_update()
            .returning(|_, _, body| Ok(body.clone()));
        let created = Reconciler::new(&first, ReadPolicy::Strict)
            .reconcile(&request(&schema, DesiredState::Present, params.clone()))
            .await
            .unwrap();
        assert_eq!(created.action, Action::Create);

        let resource = created.resource.clone();
        let mut second = MockResourceProvider::new();
        second.expect_get().returning(move |_, _| Ok(resource.clone()));
        second.expect_create_or_update().never();
        let again = Reconciler::new(&second, ReadPolicy::Strict)
            .reconcile(&request(&schema, DesiredState::Present, params))
            .await
            .unwrap();
        assert_eq!(again.action, Action::NoAction);
    }

    #[tokio::test]
    async fn test_non_updatable_mismatch_never_updates() {
        let schema = schema();
        let mut provider = MockResourceProvider::new();
        provider.expect_get().returning(|_, _| Ok(observed_resource(1)));
        provider.expect_create_or_update().never();

        let mut params = base_params(1);
        params["location"] = json!("northeurope");
        let outcome = Reconciler::new(&provider, ReadPolicy::Strict)
            .reconcile(&request(&schema, DesiredState::Present, params))
            .await
            .unwrap();

        assert_eq!(outcome.action, Action::NoAction);
        assert_eq!(outcome.warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_check_mode_does_not_write() {
        let schema = schema();
        let mut provider = MockResourceProvider::new();
        provider.expect_get().returning(|_, _| Ok(observed_resource(1)));
        provider.expect_create_or_update().never();

        let mut req = request(&schema, DesiredState::Present, base_params(3));
        req.check_mode = true;
        let outcome = Reconciler::new(&provider, ReadPolicy::Strict)
            .reconcile(&req)
            .await
            .unwrap();

        assert!(outcome.changed);
        assert!(outcome.check_mode);
        assert_eq!(outcome.action, Action::Update);
        assert_eq!(outcome.resource["sku"]["capacity"], json!(1));
    }

    #[tokio::test]
    async fn test_append_tags_false_replaces_tags() {
        let schema = schema();
        let mut observed = observed_resource(1);
        observed["tags"] = json!({ "env": "dev", "owner": "ops" });

        let mut provider = MockResourceProvider::new();
        provider.expect_get().returning(move |_, _| Ok(observed.clone()));
        provider
            .expect_create_or_update()
            .withf(|_, _, body| body["tags"] == json!({ "env": "dev" }))
            .times(1)
            .returning(|_, _, body| Ok(body.clone()));

        let mut params = base_params(1);
        params["tags"] = json!({ "env": "dev" });
        let mut req = request(&schema, DesiredState::Present, params);
        req.append_tags = false;

        let outcome = Reconciler::new(&provider, ReadPolicy::Strict)
            .reconcile(&req)
            .await
            .unwrap();
        assert_eq!(outcome.action, Action::Update);
    }

    #[tokio::test]
    async fn test_read_fault_aborts() {
        let schema = schema();
        let mut provider = MockResourceProvider::new();
        provider
            .expect_get()
            .returning(|_, _| Err(ArmStateError::Arm(ArmApiError::request_failed(500, "InternalError", "boom"))));
        provider.expect_create_or_update().never();

        let err = Reconciler::new(&provider, ReadPolicy::Strict)
            .reconcile(&request(&schema, DesiredState::Present, base_params(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, ArmStateError::Reconcile(ReconcileError::ReadFault { .. })));
    }

    #[tokio::test]
    async fn test_missing_path_parameter() {
        let schema = schema();
        let provider = MockResourceProvider::new();

        let err = Reconciler::new(&provider, ReadPolicy::Strict)
            .reconcile(&request(&schema, DesiredState::Present, json!({ "name": "sig1" })))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ArmStateError::Config(ConfigError::MissingParameter { ref name, .. }) if name == "resource_group"
        ));
    }

    #[tokio::test]
    async fn test_yaml_numeric_choice_reaches_body_as_string() {
        let yaml = r"
provider:
  subscription_id: sub
resource:
  type: redis_cache
  parameters:
    resource_group: rg
    name: cache1
    location: westeurope
    sku: { name: standard, family: C, capacity: 1 }
    minimum_tls_version: 1.2
";
        let invocation: InvocationFile = serde_yaml::from_str(yaml).unwrap();
        let schema = SchemaCatalog::builtin().unwrap().get("redis_cache").unwrap().clone();
        crate::config::InvocationValidator::new()
            .validate(&invocation, &schema)
            .unwrap();

        let mut provider = MockResourceProvider::new();
        provider.expect_get().times(1).returning(|id, _| Err(not_found(id)));
        provider
            .expect_create_or_update()
            .withf(|_, _, body| body["properties"]["minimumTlsVersion"] == json!("1.2"))
            .times(1)
            .returning(|_, _, body| Ok(body.clone()));

        let request = ReconcileRequest::from_invocation(&schema, &invocation);
        let outcome = Reconciler::new(&provider, ReadPolicy::Strict)
            .reconcile(&request)
            .await
            .unwrap();
        assert_eq!(outcome.action, Action::Create);
    }

    #[test]
    fn test_plan_fingerprints_desired_body() {
        let schema = schema();
        let mut provider = MockResourceProvider::new();
        provider.expect_get().returning(|id, _| Err(not_found(id)));

        let reconciler = Reconciler::new(&provider, ReadPolicy::Strict);
        let req = request(&schema, DesiredState::Present, base_params(1));
        let (plan, observed) = tokio_test::block_on(reconciler.plan(&req)).unwrap();

        assert_eq!(observed, Observed::Absent);
        assert_eq!(plan.action, Action::Create);
        assert_eq!(plan.body_hash.len(), 64);
        assert_eq!(plan.body_hash, crate::config::BodyHasher::hash(&plan.body));
    }

    #[tokio::test]
    async fn test_get_not_found_is_empty_page() {
        let schema = schema();
        let mut provider = MockResourceProvider::new();
        provider.expect_get().returning(|id, _| Err(not_found(id)));

        let result = Reconciler::new(&provider, ReadPolicy::Strict)
            .get(&request(&schema, DesiredState::Present, json!({ "resource_group": "rg", "name": "sig1" })))
            .await
            .unwrap();

        assert_eq!(result, QueryResult::Page { items: vec![], next_link: None });
        let output = result.to_output("signalr");
        assert_eq!(output, json!({ "changed": false, "signalr": [], "next_link": null }));
    }

    #[tokio::test]
    async fn test_list_and_follow_next_link() {
        let schema = schema();
        let mut provider = MockResourceProvider::new();
        provider
            .expect_list()
            .withf(|scope, _| scope.as_str() == "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.SignalRService/signalR")
            .returning(|_, _| {
                Ok(Page {
                    items: vec![json!({ "name": "a" })],
                    next_link: Some(String::from("https://next?token=1")),
                })
            });
        provider
            .expect_list_next()
            .withf(|link| link == "https://next?token=1")
            .returning(|_| Ok(Page { items: vec![json!({ "name": "b" })], next_link: None }));

        let reconciler = Reconciler::new(&provider, ReadPolicy::Strict);
        let req = request(&schema, DesiredState::Present, json!({ "resource_group": "rg" }));

        let first = reconciler.list(&req, None).await.unwrap();
        assert_eq!(first.next_link(), Some("https://next?token=1"));

        let second = reconciler.list(&req, first.next_link()).await.unwrap();
        assert_eq!(second.items(), vec![json!({ "name": "b" })]);
        assert_eq!(second.to_output("signalr")["next_link"], Value::Null);
    }
}
