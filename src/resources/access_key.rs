//! `sysdig_agent_access_key`.
//!
//! Access keys are identified by the key itself and updated with `PATCH`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::state::StateReader;
use super::{id_string, ResourceMapping, UpdateStrategy};
use crate::config::Product;
use crate::error::ProviderError;
use crate::schema::{Attribute, Diagnostic, Schema};

/// Body of the access key endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessKeyModel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    access_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    limit: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reservation: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    team_id: Option<i64>,
    #[serde(default = "enabled_default")]
    enabled: bool,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
    #[serde(default, skip_serializing)]
    date_created: Option<String>,
    #[serde(default, skip_serializing)]
    date_disabled: Option<String>,
}

fn enabled_default() -> bool {
    true
}

/// Agent access keys with per-key agent limits and reservations.
#[derive(Debug, Clone, Copy, Default)]
pub struct AgentAccessKey;

impl ResourceMapping for AgentAccessKey {
    type Model = AccessKeyModel;

    fn type_name(&self) -> &str {
        "sysdig_agent_access_key"
    }

    fn product(&self) -> Product {
        Product::Monitor
    }

    fn collection_path(&self) -> &str {
        "/api/customer/accessKeys"
    }

    fn envelope(&self) -> Option<&'static str> {
        Some("customerAccessKey")
    }

    fn update_strategy(&self) -> UpdateStrategy {
        UpdateStrategy::Patch
    }

    fn remote_id(&self, body: &Value) -> Option<String> {
        id_string(body.get("accessKey"))
    }

    fn schema(&self) -> Schema {
        Schema::resource()
            .with_attribute("limit", Attribute::optional_int64())
            .with_attribute("reservation", Attribute::optional_int64())
            .with_attribute("team_id", Attribute::optional_int64())
            .with_attribute("enabled", Attribute::optional_bool().with_default(json!(true)))
            .with_attribute("metadata", Attribute::optional_string_map())
            .with_attribute("access_key", Attribute::computed_string().sensitive())
            .with_attribute("date_created", Attribute::computed_string())
            .with_attribute("date_disabled", Attribute::computed_string())
    }

    fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        let r = StateReader::new(config);
        let mut diagnostics = Vec::new();
        for name in ["limit", "reservation"] {
            if r.opt_i64(name).is_some_and(|v| v < 0) {
                diagnostics.push(
                    Diagnostic::error(format!("{} must not be negative", name)).with_attribute(name),
                );
            }
        }
        if let (Some(limit), Some(reservation)) = (r.opt_i64("limit"), r.opt_i64("reservation")) {
            if reservation > limit {
                diagnostics.push(
                    Diagnostic::error("reservation must not exceed limit").with_attribute("reservation"),
                );
            }
        }
        diagnostics
    }

    fn to_model(&self, state: &Value) -> Result<AccessKeyModel, ProviderError> {
        let r = StateReader::new(state);
        Ok(AccessKeyModel {
            access_key: r.opt_str("access_key"),
            limit: r.opt_i64("limit"),
            reservation: r.opt_i64("reservation"),
            team_id: r.opt_i64("team_id"),
            enabled: r.bool_or("enabled", true),
            metadata: r.string_map("metadata"),
            date_created: None,
            date_disabled: None,
        })
    }

    fn to_state(&self, model: &AccessKeyModel, _prior: &Value) -> Result<Value, ProviderError> {
        Ok(json!({
            "access_key": model.access_key,
            "limit": model.limit,
            "reservation": model.reservation,
            "team_id": model.team_id,
            "enabled": model.enabled,
            "metadata": model.metadata,
            "date_created": model.date_created,
            "date_disabled": model.date_disabled,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{Reconciler, Resource};

    #[test]
    fn test_reservation_within_limit() {
        let resource = Reconciler::new(AgentAccessKey);
        let diagnostics = resource.validate(&json!({"limit": 5, "reservation": 10}));
        assert_eq!(diagnostics[0].summary, "reservation must not exceed limit");
        assert!(resource.validate(&json!({"limit": 5, "reservation": 2})).is_empty());
    }

    #[test]
    fn test_id_is_the_key() {
        let body = json!({"accessKey": "0d8c-11aa", "limit": 3});
        assert_eq!(AgentAccessKey.remote_id(&body), Some("0d8c-11aa".to_string()));
    }
}
