//! `sysdig_custom_role` data source.

use async_trait::async_trait;
use serde_json::Value;

use super::{list_items, DataSource};
use crate::client::{ApiRequest, SysdigApi};
use crate::config::Product;
use crate::error::ProviderError;
use crate::resources::custom_role::{CustomRoleModel, ROLES_PATH};
use crate::resources::id_string;
use crate::resources::state::StateReader;
use crate::schema::{Attribute, AttributeFlags, AttributeType, Schema};

fn computed_string_set() -> Attribute {
    Attribute::new(AttributeType::set(AttributeType::String), AttributeFlags::computed())
}

/// Custom role lookup by name.
#[derive(Debug, Clone, Copy, Default)]
pub struct CustomRoleLookup;

#[async_trait]
impl DataSource for CustomRoleLookup {
    fn type_name(&self) -> &str {
        "sysdig_custom_role"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_attribute("id", Attribute::computed_string())
            .with_attribute("name", Attribute::required_string())
            .with_attribute("description", Attribute::computed_string())
            .with_attribute("monitor_permissions", computed_string_set())
            .with_attribute("secure_permissions", computed_string_set())
    }

    async fn read(&self, api: &dyn SysdigApi, config: &Value) -> Result<Value, ProviderError> {
        let name = StateReader::new(config).required_str("name")?;
        let body = api.execute(ApiRequest::get(Product::Monitor, ROLES_PATH)).await?;

        let found = list_items(body)
            .into_iter()
            .find(|role| role.get("name").and_then(Value::as_str) == Some(name.as_str()))
            .ok_or_else(|| ProviderError::NotFound(format!("custom role \"{}\" not found", name)))?;

        let id = id_string(found.get("id"))
            .ok_or_else(|| ProviderError::Internal("role response carries no identifier".to_string()))?;
        let role: CustomRoleModel = serde_json::from_value(found)?;
        let mut state = role.state();
        if let Value::Object(obj) = &mut state {
            obj.insert("id".to_string(), Value::String(id));
        }
        Ok(state)
    }
}
