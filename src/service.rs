//! The provider surface an orchestrator drives.
//!
//! [`ProviderService`] uses plain Rust types (`serde_json::Value` state,
//! [`Diagnostic`] lists, [`PlanResult`]). How an orchestrator reaches it is
//! left to the embedding binary.

use serde_json::Value;

use crate::error::ProviderError;
use crate::plan::diff;
use crate::schema::{Diagnostic, ProviderSchema};
use crate::types::{ImportedResource, PlanResult, ProviderMetadata, RefreshResult};

/// Trait that provider implementations must implement.
///
/// # Example
///
/// ```ignore
/// use sysdig_provider::{ProviderService, SysdigProvider};
///
/// let provider = SysdigProvider::new();
/// let diagnostics = provider.configure(serde_json::json!({
///     "sysdig_secure_api_token": "..."
/// })).await?;
/// let state = provider.create("sysdig_secure_list", serde_json::json!({
///     "name": "allowed_binaries",
///     "items": ["/usr/bin/curl"]
/// })).await?;
/// ```
#[async_trait::async_trait]
pub trait ProviderService: Send + Sync + 'static {
    // =========================================================================
    // Schema & Metadata
    // =========================================================================

    /// Return the provider's schema including all resources and data sources.
    fn schema(&self) -> ProviderSchema;

    /// Return the resource and data source type names.
    /// By default, this is derived from the schema.
    fn metadata(&self) -> ProviderMetadata {
        let schema = self.schema();
        ProviderMetadata {
            resources: schema.resources.keys().cloned().collect(),
            data_sources: schema.data_sources.keys().cloned().collect(),
        }
    }

    // =========================================================================
    // Provider Lifecycle
    // =========================================================================

    /// Validate the provider configuration before configuring.
    /// Returns diagnostics (errors and warnings).
    async fn validate_provider_config(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = config;
        Ok(vec![])
    }

    /// Configure the provider with credentials and settings.
    /// Returns diagnostics (errors and warnings).
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError>;

    /// Stop the provider gracefully.
    async fn stop(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    /// Validate a resource's configuration before planning.
    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = (resource_type, config);
        Ok(vec![])
    }

    /// Plan changes for a resource.
    ///
    /// `prior_state` is `None` for a create; `proposed_state` is `Null` for a
    /// destroy.
    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
    ) -> Result<PlanResult, ProviderError>;

    /// Create a new resource.
    async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError>;

    /// Read the current state of a resource.
    ///
    /// Returns `None` when the remote entity is gone and the resource should
    /// be dropped from state.
    async fn read(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<Option<Value>, ProviderError>;

    /// Read a resource and report how the backend diverged from `current_state`.
    ///
    /// Drift is reported, never corrected: the returned state is exactly
    /// what [`read`](Self::read) produced.
    async fn refresh(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<RefreshResult, ProviderError> {
        let schema = self
            .schema()
            .resources
            .get(resource_type)
            .cloned()
            .ok_or_else(|| {
                ProviderError::UnknownResource(format!("Unknown resource type: {}", resource_type))
            })?;
        let state = self.read(resource_type, current_state.clone()).await?;
        let drift = match &state {
            Some(state) => diff(&schema, &current_state, state),
            None => diff(&schema, &current_state, &Value::Null),
        };
        Ok(RefreshResult { state, drift })
    }

    /// Update an existing resource.
    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError>;

    /// Delete a resource. Deleting an entity that no longer exists succeeds.
    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError>;

    /// Import existing infrastructure into management.
    async fn import_resource(
        &self,
        resource_type: &str,
        _id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        Err(ProviderError::Unimplemented(format!(
            "Import not supported for resource type: {}",
            resource_type
        )))
    }

    // =========================================================================
    // Data Source Operations
    // =========================================================================

    /// Validate a data source's configuration.
    async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = (data_source_type, config);
        Ok(vec![])
    }

    /// Read data from an external source.
    async fn read_data_source(
        &self,
        data_source_type: &str,
        _config: Value,
    ) -> Result<Value, ProviderError> {
        Err(ProviderError::UnknownResource(format!(
            "Unknown data source type: {}",
            data_source_type
        )))
    }
}
