//! [`SysdigProvider`]: the registry of resources and data sources behind
//! [`ProviderService`].

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::client::{HttpClient, SysdigApi};
use crate::config::{EnvLookup, ProcessEnv, ProviderConfig};
use crate::data_sources::{self, DataSource};
use crate::error::ProviderError;
use crate::plan::plan_resource;
use crate::resources::{self, Resource};
use crate::schema::{diagnostics_to_error, Diagnostic, ProviderSchema};
use crate::service::ProviderService;
use crate::types::{ImportedResource, PlanResult};

/// The Sysdig provider.
///
/// Resource operations need a configured backend: either call
/// [`configure`](ProviderService::configure) or build the provider with
/// [`with_api`](Self::with_api).
pub struct SysdigProvider {
    resources: BTreeMap<String, Arc<dyn Resource>>,
    data_sources: BTreeMap<String, Arc<dyn DataSource>>,
    api: RwLock<Option<Arc<dyn SysdigApi>>>,
    injected: bool,
    env: Box<dyn EnvLookup>,
}

impl SysdigProvider {
    /// A provider reading environment defaults from the process environment.
    pub fn new() -> Self {
        Self::with_env(ProcessEnv)
    }

    /// A provider reading environment defaults from `env`.
    pub fn with_env(env: impl EnvLookup + 'static) -> Self {
        let resources = resources::all()
            .into_iter()
            .map(|r| (r.type_name().to_string(), r))
            .collect();
        let data_sources = data_sources::all()
            .into_iter()
            .map(|d| (d.type_name().to_string(), d))
            .collect();
        Self {
            resources,
            data_sources,
            api: RwLock::new(None),
            injected: false,
            env: Box::new(env),
        }
    }

    /// A provider talking to `api`. `configure` still validates its input
    /// but keeps this backend.
    pub fn with_api(api: Arc<dyn SysdigApi>) -> Self {
        let mut provider = Self::new();
        provider.api = RwLock::new(Some(api));
        provider.injected = true;
        provider
    }

    fn resource(&self, resource_type: &str) -> Result<&Arc<dyn Resource>, ProviderError> {
        self.resources.get(resource_type).ok_or_else(|| {
            ProviderError::UnknownResource(format!("Unknown resource type: {}", resource_type))
        })
    }

    fn data_source(&self, data_source_type: &str) -> Result<&Arc<dyn DataSource>, ProviderError> {
        self.data_sources.get(data_source_type).ok_or_else(|| {
            ProviderError::UnknownResource(format!("Unknown data source type: {}", data_source_type))
        })
    }

    async fn api(&self) -> Result<Arc<dyn SysdigApi>, ProviderError> {
        self.api.read().await.clone().ok_or_else(|| {
            ProviderError::Configuration("provider has not been configured".to_string())
        })
    }
}

impl Default for SysdigProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ProviderService for SysdigProvider {
    fn schema(&self) -> ProviderSchema {
        let schema = ProviderSchema::new().with_provider_config(ProviderConfig::schema());
        let schema = self
            .resources
            .iter()
            .fold(schema, |s, (name, r)| s.with_resource(name, r.schema()));
        self.data_sources
            .iter()
            .fold(schema, |s, (name, d)| s.with_data_source(name, d.schema()))
    }

    async fn validate_provider_config(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        Ok(match ProviderConfig::from_value_with_env(&config, self.env.as_ref()) {
            Ok(_) => Vec::new(),
            Err(diagnostics) => diagnostics,
        })
    }

    #[instrument(skip(self, config))]
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let config = match ProviderConfig::from_value_with_env(&config, self.env.as_ref()) {
            Ok(config) => config,
            Err(diagnostics) => {
                warn!(count = diagnostics.len(), "Provider configuration rejected");
                return Ok(diagnostics);
            },
        };

        let mut diagnostics = Vec::new();
        if config.monitor.is_none() && config.secure.is_none() {
            diagnostics.push(Diagnostic::warning(
                "No Sysdig credentials configured; every resource operation will fail",
            ));
        }

        if self.injected {
            debug!("Keeping injected backend");
        } else {
            let client = HttpClient::new(&config)?;
            *self.api.write().await = Some(Arc::new(client));
        }
        info!(
            monitor = config.monitor.is_some(),
            secure = config.secure.is_some(),
            "Provider configured"
        );
        Ok(diagnostics)
    }

    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        Ok(self.resource(resource_type)?.validate(&config))
    }

    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        let resource = self.resource(resource_type)?;
        if !proposed_state.is_null() {
            if let Some(err) = diagnostics_to_error(&resource.validate(&proposed_state)) {
                return Err(err);
            }
        }
        Ok(plan_resource(&resource.schema(), prior_state.as_ref(), &proposed_state))
    }

    async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError> {
        let resource = self.resource(resource_type)?;
        resource.create(self.api().await?.as_ref(), &planned_state).await
    }

    async fn read(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<Option<Value>, ProviderError> {
        let resource = self.resource(resource_type)?;
        resource.read(self.api().await?.as_ref(), &current_state).await
    }

    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        let resource = self.resource(resource_type)?;
        resource
            .update(self.api().await?.as_ref(), &prior_state, &planned_state)
            .await
    }

    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        let resource = self.resource(resource_type)?;
        resource.delete(self.api().await?.as_ref(), &current_state).await
    }

    async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        let resource = self.resource(resource_type)?;
        let state = resource.import(self.api().await?.as_ref(), id).await?;
        Ok(vec![ImportedResource::new(resource_type, state)])
    }

    async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        Ok(self.data_source(data_source_type)?.validate(&config))
    }

    #[instrument(skip(self, config))]
    async fn read_data_source(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        let data_source = self.data_source(data_source_type)?;
        if let Some(err) = diagnostics_to_error(&data_source.validate(&config)) {
            return Err(err);
        }
        data_source.read(self.api().await?.as_ref(), &config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn env(vars: &[(&str, &str)]) -> BTreeMap<String, String> {
        vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_schema_lists_every_type() {
        let provider = SysdigProvider::with_env(env(&[]));
        let metadata = provider.metadata();
        assert!(metadata.resources.contains(&"sysdig_secure_rule_falco".to_string()));
        assert!(metadata.resources.contains(&"sysdig_monitor_alert_v2_metric".to_string()));
        assert_eq!(metadata.data_sources.len(), 3);
    }

    #[tokio::test]
    async fn test_unconfigured_provider() {
        let provider = SysdigProvider::with_env(env(&[]));
        let err = provider
            .create("sysdig_secure_list", json!({"name": "shells", "items": ["bash"]}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_unknown_resource_type() {
        let provider = SysdigProvider::with_env(env(&[]));
        let err = provider.plan("sysdig_nope", None, json!({})).await.unwrap_err();
        assert!(matches!(err, ProviderError::UnknownResource(_)));
    }

    #[tokio::test]
    async fn test_configure_reports_conflicting_credentials() {
        let provider = SysdigProvider::with_env(env(&[("SYSDIG_SECURE_API_TOKEN", "t")]));
        let diagnostics = provider
            .configure(json!({"ibm_secure_api_key": "k", "ibm_secure_instance_id": "i"}))
            .await
            .unwrap();
        assert!(diagnostics.iter().any(Diagnostic::is_error));
    }

    #[tokio::test]
    async fn test_configure_from_env() {
        let provider = SysdigProvider::with_env(env(&[("SYSDIG_SECURE_API_TOKEN", "t")]));
        let diagnostics = provider.configure(json!({})).await.unwrap();
        assert!(diagnostics.is_empty());
        assert!(provider.api().await.is_ok());
    }

    #[tokio::test]
    async fn test_plan_rejects_invalid_config() {
        let provider = SysdigProvider::with_env(env(&[]));
        let err = provider
            .plan(
                "sysdig_secure_rule_falco",
                None,
                json!({"name": "shell", "condition": "spawned_process", "source": "syscall"}),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("output must be set when append = false"));
    }
}
