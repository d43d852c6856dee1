//! Managed Sysdig resources.
//!
//! Every resource type implements the same reconciliation contract through
//! [`Reconciler`]; what differs per type is captured by a hand-written
//! [`ResourceMapping`] converting between schema state and the typed API
//! model.

pub mod state;
mod zone_rules;

mod access_key;
mod alert_v2;
pub(crate) mod custom_role;
mod falco_list;
mod falco_macro;
mod falco_rule;
mod group_mapping;
mod notification_channel;
mod policy;
mod scanning_policy;
mod team;
pub(crate) mod zone;

pub use access_key::AgentAccessKey;
pub use alert_v2::{AlertKind, AlertV2};
pub use custom_role::CustomRole;
pub use falco_list::FalcoList;
pub use falco_macro::FalcoMacro;
pub use falco_rule::FalcoRule;
pub use group_mapping::GroupMapping;
pub use notification_channel::{ChannelKind, NotificationChannel};
pub use policy::SecurePolicy;
pub use scanning_policy::ScanningPolicy;
pub use team::Team;
pub use zone::Zone;
pub use zone_rules::{parse_rules, render_rules, rules_equivalent, ZoneExpression};

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument};

use crate::client::{ApiRequest, SysdigApi};
use crate::config::Product;
use crate::error::ProviderError;
use crate::plan::plan_resource;
use crate::schema::{apply_defaults, diagnostics_to_error, Diagnostic, Schema};
use crate::validation;

use self::state::StateReader;

/// A resource type the provider can reconcile.
#[async_trait]
pub trait Resource: Send + Sync {
    /// The resource type name (e.g. `sysdig_secure_zone`).
    fn type_name(&self) -> &str;

    /// Schema of the resource.
    fn schema(&self) -> Schema;

    /// Validate a configuration: schema constraints plus resource rules.
    fn validate(&self, config: &Value) -> Vec<Diagnostic>;

    /// Create the remote entity and return the resulting state.
    async fn create(&self, api: &dyn SysdigApi, planned: &Value) -> Result<Value, ProviderError>;

    /// Refresh state from the backend. `None` means the entity is gone.
    async fn read(&self, api: &dyn SysdigApi, current: &Value) -> Result<Option<Value>, ProviderError>;

    /// Update the remote entity in place and return the confirmed state.
    async fn update(
        &self,
        api: &dyn SysdigApi,
        prior: &Value,
        planned: &Value,
    ) -> Result<Value, ProviderError>;

    /// Delete the remote entity. An entity that is already gone is not an error.
    async fn delete(&self, api: &dyn SysdigApi, current: &Value) -> Result<(), ProviderError>;

    /// Build state for an existing remote entity.
    async fn import(&self, api: &dyn SysdigApi, id: &str) -> Result<Value, ProviderError>;
}

/// How an endpoint applies updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStrategy {
    /// `PUT` the full payload.
    Replace,
    /// `PATCH` only the payload fields that changed.
    Patch,
}

/// Per-type mapping between schema state and the API model.
#[async_trait]
pub trait ResourceMapping: Send + Sync + 'static {
    /// The request/response body of the endpoint.
    type Model: Serialize + DeserializeOwned + Send + Sync;

    /// Resource type name.
    fn type_name(&self) -> &str;

    /// Product whose API hosts the endpoint.
    fn product(&self) -> Product;

    /// Collection path; items live at `<path>/<id>`.
    fn collection_path(&self) -> &str;

    /// Key the payload is wrapped in, for endpoints that use one.
    fn envelope(&self) -> Option<&'static str> {
        None
    }

    /// How updates are sent.
    fn update_strategy(&self) -> UpdateStrategy {
        UpdateStrategy::Replace
    }

    /// Resource schema.
    fn schema(&self) -> Schema;

    /// Rules beyond what the schema expresses.
    fn validate(&self, _config: &Value) -> Vec<Diagnostic> {
        Vec::new()
    }

    /// Build the API model from state.
    fn to_model(&self, state: &Value) -> Result<Self::Model, ProviderError>;

    /// Build state from the API model. `prior` is the state the call started
    /// from and supplies write-only and normalised values.
    fn to_state(&self, model: &Self::Model, prior: &Value) -> Result<Value, ProviderError>;

    /// The identifier the backend assigned, taken from a response body.
    fn remote_id(&self, body: &Value) -> Option<String> {
        id_string(body.get("id"))
    }

    /// Adjust the model before it is sent, for values that need another
    /// call to resolve.
    async fn prepare(
        &self,
        _api: &dyn SysdigApi,
        _state: &Value,
        _model: &mut Self::Model,
    ) -> Result<(), ProviderError> {
        Ok(())
    }
}

/// The generic reconciler: CRUD and import for one mapping.
pub struct Reconciler<M> {
    mapping: M,
}

impl<M: ResourceMapping> Reconciler<M> {
    /// Wrap a mapping.
    pub fn new(mapping: M) -> Self {
        Self { mapping }
    }

    /// Wrap a mapping for registration.
    pub fn boxed(mapping: M) -> Arc<dyn Resource> {
        Arc::new(Self::new(mapping))
    }

    fn item_path(&self, id: &str) -> String {
        format!("{}/{}", self.mapping.collection_path(), id)
    }

    fn check(&self, config: &Value) -> Result<(), ProviderError> {
        match diagnostics_to_error(&Resource::validate(self, config)) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn payload(&self, model: &M::Model) -> Result<Value, ProviderError> {
        let body = serde_json::to_value(model)?;
        Ok(wrap_envelope(self.mapping.envelope(), body))
    }

    fn state_from_body(&self, body: Value, prior: &Value) -> Result<Value, ProviderError> {
        let body = unwrap_envelope(self.mapping.envelope(), body);
        let id = self.mapping.remote_id(&body).ok_or_else(|| {
            ProviderError::Internal(format!(
                "{} response carries no identifier",
                self.mapping.type_name()
            ))
        })?;
        let model: M::Model = serde_json::from_value(body)?;
        let mut state = self.mapping.to_state(&model, prior)?;
        if let Value::Object(obj) = &mut state {
            obj.insert("id".to_string(), Value::String(id));
        }
        Ok(state)
    }

    fn require_id(&self, state: &Value) -> Result<String, ProviderError> {
        StateReader::new(state).id().ok_or_else(|| {
            ProviderError::Internal(format!(
                "{} state has no id",
                self.mapping.type_name()
            ))
        })
    }
}

#[async_trait]
impl<M: ResourceMapping> Resource for Reconciler<M> {
    fn type_name(&self) -> &str {
        self.mapping.type_name()
    }

    fn schema(&self) -> Schema {
        self.mapping.schema()
    }

    fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        let schema = self.mapping.schema();
        let mut config = config.clone();
        apply_defaults(&schema, &mut config);

        let mut diagnostics = validation::validate(&schema, &config);
        // Resource rules assume a structurally valid config.
        if !diagnostics.iter().any(Diagnostic::is_error) {
            diagnostics.extend(self.mapping.validate(&config));
        }
        diagnostics
    }

    #[instrument(skip(self, api, planned), fields(resource_type = %self.mapping.type_name()))]
    async fn create(&self, api: &dyn SysdigApi, planned: &Value) -> Result<Value, ProviderError> {
        let mut planned = planned.clone();
        apply_defaults(&self.mapping.schema(), &mut planned);
        self.check(&planned)?;

        let mut model = self.mapping.to_model(&planned)?;
        self.mapping.prepare(api, &planned, &mut model).await?;
        let request = ApiRequest::post(
            self.mapping.product(),
            self.mapping.collection_path(),
            self.payload(&model)?,
        );

        let body = api.execute(request).await?.ok_or_else(|| {
            ProviderError::Internal(format!(
                "{} create returned an empty body",
                self.mapping.type_name()
            ))
        })?;
        let state = self.state_from_body(body, &planned)?;
        info!(id = ?StateReader::new(&state).id(), "Created resource");
        Ok(state)
    }

    #[instrument(skip(self, api, current), fields(resource_type = %self.mapping.type_name()))]
    async fn read(&self, api: &dyn SysdigApi, current: &Value) -> Result<Option<Value>, ProviderError> {
        let Some(id) = StateReader::new(current).id() else {
            return Ok(None);
        };

        let request = ApiRequest::get(self.mapping.product(), self.item_path(&id));
        match api.execute(request).await {
            Ok(Some(body)) => self.state_from_body(body, current).map(Some),
            Ok(None) => Err(ProviderError::Internal(format!(
                "{} {} read returned an empty body",
                self.mapping.type_name(),
                id
            ))),
            Err(err) if err.is_not_found() => {
                debug!(id = %id, "Remote entity is gone");
                Ok(None)
            },
            Err(err) => Err(err),
        }
    }

    #[instrument(skip(self, api, prior, planned), fields(resource_type = %self.mapping.type_name()))]
    async fn update(
        &self,
        api: &dyn SysdigApi,
        prior: &Value,
        planned: &Value,
    ) -> Result<Value, ProviderError> {
        let schema = self.mapping.schema();
        let id = self.require_id(prior)?;
        // Computed values such as the optimistic-lock version come from prior state.
        let planned = plan_resource(&schema, Some(prior), planned).planned_state;
        self.check(&planned)?;

        let mut model = self.mapping.to_model(&planned)?;
        self.mapping.prepare(api, &planned, &mut model).await?;
        let path = self.item_path(&id);
        let product = self.mapping.product();

        let request = match self.mapping.update_strategy() {
            UpdateStrategy::Replace => Some(ApiRequest::put(product, &path, self.payload(&model)?)),
            UpdateStrategy::Patch => {
                let before = serde_json::to_value(self.mapping.to_model(prior)?)?;
                let after = serde_json::to_value(&model)?;
                let changed = changed_fields(&before, &after);
                if changed.is_empty() {
                    None
                } else {
                    let body = wrap_envelope(self.mapping.envelope(), Value::Object(changed));
                    Some(ApiRequest::patch(product, &path, body))
                }
            },
        };

        if let Some(request) = request {
            api.execute(request).await?;
        }

        let mut confirm_from = planned.clone();
        if let Value::Object(obj) = &mut confirm_from {
            obj.insert("id".to_string(), Value::String(id.clone()));
        }
        let state = self.read(api, &confirm_from).await?.ok_or_else(|| {
            ProviderError::NotFound(format!(
                "{} {} disappeared during update",
                self.mapping.type_name(),
                id
            ))
        })?;
        info!(id = %id, "Updated resource");
        Ok(state)
    }

    #[instrument(skip(self, api, current), fields(resource_type = %self.mapping.type_name()))]
    async fn delete(&self, api: &dyn SysdigApi, current: &Value) -> Result<(), ProviderError> {
        let Some(id) = StateReader::new(current).id() else {
            return Ok(());
        };

        let request = ApiRequest::delete(self.mapping.product(), self.item_path(&id));
        match api.execute(request).await {
            Ok(_) => {
                info!(id = %id, "Deleted resource");
                Ok(())
            },
            Err(err) if err.is_not_found() => {
                debug!(id = %id, "Already deleted");
                Ok(())
            },
            Err(err) => Err(err),
        }
    }

    async fn import(&self, api: &dyn SysdigApi, id: &str) -> Result<Value, ProviderError> {
        let seed = serde_json::json!({ "id": id });
        self.read(api, &seed).await?.ok_or_else(|| {
            ProviderError::NotFound(format!(
                "cannot import non-existent remote object: {} {}",
                self.mapping.type_name(),
                id
            ))
        })
    }
}

/// Every resource type the provider registers.
pub fn all() -> Vec<Arc<dyn Resource>> {
    let mut resources = vec![
        Reconciler::boxed(Team::new(Product::Monitor)),
        Reconciler::boxed(Team::new(Product::Secure)),
        Reconciler::boxed(CustomRole),
        Reconciler::boxed(GroupMapping),
        Reconciler::boxed(AgentAccessKey),
        Reconciler::boxed(AlertV2::new(AlertKind::Event)),
        Reconciler::boxed(AlertV2::new(AlertKind::Metric)),
        Reconciler::boxed(AlertV2::new(AlertKind::Downtime)),
        Reconciler::boxed(Zone),
        Reconciler::boxed(FalcoRule),
        Reconciler::boxed(FalcoList),
        Reconciler::boxed(FalcoMacro),
        Reconciler::boxed(SecurePolicy),
        Reconciler::boxed(ScanningPolicy),
    ];

    for kind in ChannelKind::ALL {
        for product in kind.products() {
            resources.push(Reconciler::boxed(NotificationChannel::new(*kind, *product)));
        }
    }
    resources
}

/// Wrap a payload in its envelope key.
pub(crate) fn wrap_envelope(envelope: Option<&str>, body: Value) -> Value {
    match envelope {
        Some(key) => {
            let mut obj = Map::new();
            obj.insert(key.to_string(), body);
            Value::Object(obj)
        },
        None => body,
    }
}

/// Take a payload out of its envelope key, if present.
pub(crate) fn unwrap_envelope(envelope: Option<&str>, body: Value) -> Value {
    match (envelope, body) {
        (Some(key), Value::Object(mut obj)) if obj.get(key).is_some_and(Value::is_object) => {
            obj.remove(key).unwrap_or(Value::Null)
        },
        (_, body) => body,
    }
}

/// An id as the backend sends it, numeric or string.
pub(crate) fn id_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Top-level fields of `after` whose values differ from `before`. Fields
/// dropped from `after` are sent as `null` so the backend clears them.
fn changed_fields(before: &Value, after: &Value) -> Map<String, Value> {
    let empty = Map::new();
    let before = before.as_object().unwrap_or(&empty);
    let after = after.as_object().unwrap_or(&empty);

    let mut changed: Map<String, Value> = after
        .iter()
        .filter(|(k, v)| before.get(*k) != Some(*v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    for (key, value) in before {
        if !after.contains_key(key) && !value.is_null() {
            changed.insert(key.clone(), Value::Null);
        }
    }
    changed
}
