//! `sysdig_custom_role`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::state::{opt_string_value, StateReader};
use super::ResourceMapping;
use crate::config::Product;
use crate::error::ProviderError;
use crate::schema::{Attribute, Diagnostic, Schema};

pub(crate) const ROLES_PATH: &str = "/api/roles";

/// A role with its Monitor and Secure permission sets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomRoleModel {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub monitor_permissions: Vec<String>,
    #[serde(default)]
    pub secure_permissions: Vec<String>,
}

impl CustomRoleModel {
    pub(crate) fn state(&self) -> Value {
        let mut monitor = self.monitor_permissions.clone();
        monitor.sort();
        let mut secure = self.secure_permissions.clone();
        secure.sort();
        json!({
            "name": self.name,
            "description": opt_string_value(self.description.as_deref()),
            "monitor_permissions": monitor,
            "secure_permissions": secure,
        })
    }
}

/// A role built from individual Monitor and Secure permissions.
#[derive(Debug, Clone, Copy, Default)]
pub struct CustomRole;

impl ResourceMapping for CustomRole {
    type Model = CustomRoleModel;

    fn type_name(&self) -> &str {
        "sysdig_custom_role"
    }

    fn product(&self) -> Product {
        Product::Monitor
    }

    fn collection_path(&self) -> &str {
        ROLES_PATH
    }

    fn schema(&self) -> Schema {
        Schema::resource()
            .with_attribute("name", Attribute::required_string())
            .with_attribute("description", Attribute::optional_string())
            .with_attribute("monitor_permissions", Attribute::optional_string_set())
            .with_attribute("secure_permissions", Attribute::optional_string_set())
    }

    fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        let r = StateReader::new(config);
        if r.string_list("monitor_permissions").is_empty() && r.string_list("secure_permissions").is_empty() {
            return vec![Diagnostic::error(
                "at least one of monitor_permissions or secure_permissions must be set",
            )];
        }
        Vec::new()
    }

    fn to_model(&self, state: &Value) -> Result<CustomRoleModel, ProviderError> {
        let r = StateReader::new(state);
        Ok(CustomRoleModel {
            name: r.required_str("name")?,
            description: r.opt_str("description"),
            monitor_permissions: r.string_list("monitor_permissions"),
            secure_permissions: r.string_list("secure_permissions"),
        })
    }

    fn to_state(&self, model: &CustomRoleModel, _prior: &Value) -> Result<Value, ProviderError> {
        Ok(model.state())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{Reconciler, Resource};

    #[test]
    fn test_requires_some_permission() {
        let resource = Reconciler::new(CustomRole);
        let diagnostics = resource.validate(&json!({"name": "auditor"}));
        assert_eq!(
            diagnostics[0].summary,
            "at least one of monitor_permissions or secure_permissions must be set"
        );

        let diagnostics = resource.validate(&json!({
            "name": "auditor",
            "secure_permissions": ["scanning.read"]
        }));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_permissions_are_sorted_in_state() {
        let model = CustomRoleModel {
            name: "auditor".into(),
            description: Some(String::new()),
            monitor_permissions: vec!["explore.read".into(), "alerts.read".into()],
            secure_permissions: vec![],
        };
        let state = CustomRole.to_state(&model, &Value::Null).unwrap();
        assert_eq!(state["monitor_permissions"], json!(["alerts.read", "explore.read"]));
        assert!(state["description"].is_null());
    }
}
