//! Read-only data sources.

mod current_user;
mod custom_role;
mod zone;

pub use current_user::CurrentUser;
pub use custom_role::CustomRoleLookup;
pub use zone::ZoneLookup;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::client::SysdigApi;
use crate::error::ProviderError;
use crate::schema::{apply_defaults, Diagnostic, Schema};
use crate::validation;

/// A data source the provider can read.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// The data source type name (e.g. `sysdig_current_user`).
    fn type_name(&self) -> &str;

    /// Schema of the data source.
    fn schema(&self) -> Schema;

    /// Validate a configuration against the schema.
    fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        schema_diagnostics(&self.schema(), config)
    }

    /// Look the entity up and return the full data source state.
    async fn read(&self, api: &dyn SysdigApi, config: &Value) -> Result<Value, ProviderError>;
}

/// Every data source the provider registers.
pub fn all() -> Vec<Arc<dyn DataSource>> {
    vec![Arc::new(ZoneLookup), Arc::new(CustomRoleLookup), Arc::new(CurrentUser)]
}

/// Schema diagnostics for a data source configuration, defaults applied.
pub(crate) fn schema_diagnostics(schema: &Schema, config: &Value) -> Vec<Diagnostic> {
    let mut config = config.clone();
    apply_defaults(schema, &mut config);
    validation::validate(schema, &config)
}

/// Items of a collection response: a bare array, or an object holding the
/// array under `data` or under its only array-valued key.
pub(crate) fn list_items(body: Option<Value>) -> Vec<Value> {
    match body {
        Some(Value::Array(items)) => items,
        Some(Value::Object(mut obj)) => {
            if let Some(Value::Array(items)) = obj.remove("data") {
                return items;
            }
            let mut arrays = obj.into_iter().filter_map(|(_, v)| match v {
                Value::Array(items) => Some(items),
                _ => None,
            });
            match (arrays.next(), arrays.next()) {
                (Some(items), None) => items,
                _ => Vec::new(),
            }
        },
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_list_items() {
        assert_eq!(list_items(Some(json!([{"id": 1}]))).len(), 1);
        assert_eq!(list_items(Some(json!({"data": [{"id": 1}, {"id": 2}]}))).len(), 2);
        assert_eq!(list_items(Some(json!({"roles": [{"id": 1}], "total": 1}))).len(), 1);
        assert!(list_items(Some(json!({"a": [], "b": []}))).is_empty());
        assert!(list_items(None).is_empty());
    }

    #[test]
    fn test_data_source_names() {
        let names: Vec<String> = all().iter().map(|d| d.type_name().to_string()).collect();
        assert_eq!(
            names,
            vec!["sysdig_secure_zone", "sysdig_custom_role", "sysdig_current_user"]
        );
    }
}
