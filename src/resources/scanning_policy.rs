//! `sysdig_secure_scanning_policy`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::state::{opt_string_value, StateReader};
use super::ResourceMapping;
use crate::config::Product;
use crate::error::ProviderError;
use crate::schema::{Attribute, Block, NestedBlock, Schema};

/// Body of `/api/scanning/v1/policies`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanningPolicyModel {
    name: String,
    #[serde(default)]
    comment: String,
    #[serde(default)]
    rules: Vec<ScanningRule>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ScanningRule {
    gate: String,
    trigger: String,
    action: String,
    #[serde(default)]
    params: Vec<RuleParam>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RuleParam {
    name: String,
    value: String,
}

/// An image scanning policy: gates evaluated against scanned images.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanningPolicy;

impl ResourceMapping for ScanningPolicy {
    type Model = ScanningPolicyModel;

    fn type_name(&self) -> &str {
        "sysdig_secure_scanning_policy"
    }

    fn product(&self) -> Product {
        Product::Secure
    }

    fn collection_path(&self) -> &str {
        "/api/scanning/v1/policies"
    }

    fn schema(&self) -> Schema {
        let param = Block::new()
            .with_attribute("name", Attribute::required_string())
            .with_attribute("value", Attribute::required_string());
        let rule = Block::new()
            .with_attribute("gate", Attribute::required_string())
            .with_attribute("trigger", Attribute::required_string())
            .with_attribute(
                "action",
                Attribute::required_string().with_allowed_values(["STOP", "WARN", "GO"]),
            )
            .with_block("params", NestedBlock::set(param));

        Schema::resource()
            .with_attribute("name", Attribute::required_string())
            .with_attribute("comment", Attribute::optional_string())
            .with_block("rules", NestedBlock::list(rule).with_min_items(1))
    }

    fn to_model(&self, state: &Value) -> Result<ScanningPolicyModel, ProviderError> {
        let r = StateReader::new(state);
        let rules = r
            .blocks("rules")
            .iter()
            .map(|rule| ScanningRule {
                gate: rule.opt_str("gate").unwrap_or_default(),
                trigger: rule.opt_str("trigger").unwrap_or_default(),
                action: rule.opt_str("action").unwrap_or_default(),
                params: rule
                    .blocks("params")
                    .iter()
                    .map(|p| RuleParam {
                        name: p.opt_str("name").unwrap_or_default(),
                        value: p.opt_str("value").unwrap_or_default(),
                    })
                    .collect(),
            })
            .collect();

        Ok(ScanningPolicyModel {
            name: r.required_str("name")?,
            comment: r.opt_str("comment").unwrap_or_default(),
            rules,
        })
    }

    fn to_state(&self, model: &ScanningPolicyModel, _prior: &Value) -> Result<Value, ProviderError> {
        let rules: Vec<Value> = model
            .rules
            .iter()
            .map(|rule| {
                let params: Vec<Value> = rule
                    .params
                    .iter()
                    .map(|p| json!({"name": p.name, "value": p.value}))
                    .collect();
                json!({
                    "gate": rule.gate,
                    "trigger": rule.trigger,
                    "action": rule.action,
                    "params": params,
                })
            })
            .collect();

        Ok(json!({
            "name": model.name,
            "comment": opt_string_value(Some(&model.comment)),
            "rules": rules,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{Reconciler, Resource};

    #[test]
    fn test_rules_required() {
        let resource = Reconciler::new(ScanningPolicy);
        let diagnostics = resource.validate(&json!({"name": "default"}));
        assert_eq!(diagnostics[0].summary, "Block 'rules' requires at least 1 item(s)");
    }

    #[test]
    fn test_rule_mapping() {
        let state = json!({
            "name": "default",
            "rules": [{
                "gate": "dockerfile",
                "trigger": "instruction",
                "action": "WARN",
                "params": [{"name": "instruction", "value": "HEALTHCHECK"}]
            }]
        });
        let model = ScanningPolicy.to_model(&state).unwrap();
        let body = serde_json::to_value(&model).unwrap();
        assert_eq!(body["rules"][0]["params"][0]["value"], "HEALTHCHECK");
        assert_eq!(body["comment"], "");

        let state = ScanningPolicy.to_state(&model, &Value::Null).unwrap();
        assert!(state["comment"].is_null());
        assert_eq!(state["rules"][0]["gate"], "dockerfile");
    }
}
