//! `sysdig_secure_policy`: runtime policy built from Falco rules.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::state::{opt_string_value, single_block, StateReader};
use super::ResourceMapping;
use crate::config::Product;
use crate::error::ProviderError;
use crate::schema::{Attribute, AttributeFlags, AttributeType, Block, Diagnostic, NestedBlock, Schema};

const POLICY_TYPES: &[&str] = &[
    "falco",
    "list_matching",
    "k8s_audit",
    "aws_cloudtrail",
    "gcp_auditlog",
    "azure_platformlogs",
];

const NANOS_PER_SECOND: i64 = 1_000_000_000;
const CAPTURE_ACTION: &str = "POLICY_ACTION_CAPTURE";

/// Body of `/api/v2/policies`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyModel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<i64>,
    name: String,
    #[serde(default)]
    description: String,
    #[serde(rename = "type", default)]
    policy_type: String,
    #[serde(default)]
    severity: i64,
    #[serde(default)]
    enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    runbook: Option<String>,
    #[serde(default)]
    rule_names: Vec<String>,
    #[serde(default)]
    notification_channel_ids: Vec<i64>,
    #[serde(default)]
    actions: Vec<PolicyAction>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PolicyAction {
    #[serde(rename = "type")]
    action_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    before_event_ns: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    after_event_ns: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

fn container_action(kind: &str) -> String {
    format!("POLICY_ACTION_{}", kind.to_uppercase())
}

/// A Secure runtime policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct SecurePolicy;

impl ResourceMapping for SecurePolicy {
    type Model = PolicyModel;

    fn type_name(&self) -> &str {
        "sysdig_secure_policy"
    }

    fn product(&self) -> Product {
        Product::Secure
    }

    fn collection_path(&self) -> &str {
        "/api/v2/policies"
    }

    fn schema(&self) -> Schema {
        let capture = Block::new()
            .with_attribute("seconds_before_event", Attribute::required_int64())
            .with_attribute("seconds_after_event", Attribute::required_int64())
            .with_attribute("name", Attribute::optional_string());
        let actions = Block::new()
            .with_attribute(
                "container",
                Attribute::optional_string().with_allowed_values(["stop", "pause", "kill"]),
            )
            .with_block("capture", NestedBlock::single(capture));

        Schema::resource()
            .with_attribute("name", Attribute::required_string())
            .with_attribute("description", Attribute::optional_string())
            .with_attribute(
                "type",
                Attribute::optional_string()
                    .with_default(json!("falco"))
                    .with_allowed_values(POLICY_TYPES.iter().copied())
                    .with_force_new(),
            )
            .with_attribute("severity", Attribute::optional_int64().with_default(json!(4)))
            .with_attribute("enabled", Attribute::optional_bool().with_default(json!(true)))
            .with_attribute("scope", Attribute::optional_string())
            .with_attribute("runbook", Attribute::optional_string())
            .with_attribute("rule_names", Attribute::optional_string_set())
            .with_attribute(
                "notification_channels",
                Attribute::new(
                    AttributeType::set(AttributeType::Int64),
                    AttributeFlags::optional(),
                ),
            )
            .with_attribute("version", Attribute::computed_int64())
            .with_block("actions", NestedBlock::single(actions))
    }

    fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        let r = StateReader::new(config);
        let mut diagnostics = Vec::new();

        if !(0..=7).contains(&r.i64_or("severity", 4)) {
            diagnostics.push(
                Diagnostic::error("severity must be between 0 and 7").with_attribute("severity"),
            );
        }
        if let Some(capture) = r.block("actions").and_then(|a| a.block("capture")) {
            for name in ["seconds_before_event", "seconds_after_event"] {
                if capture.opt_i64(name).is_some_and(|v| v < 0) {
                    diagnostics.push(
                        Diagnostic::error(format!("{} must not be negative", name))
                            .with_attribute(format!("actions.0.capture.0.{}", name)),
                    );
                }
            }
        }
        diagnostics
    }

    fn to_model(&self, state: &Value) -> Result<PolicyModel, ProviderError> {
        let r = StateReader::new(state);

        let mut actions = Vec::new();
        if let Some(block) = r.block("actions") {
            if let Some(kind) = block.opt_str("container") {
                actions.push(PolicyAction {
                    action_type: container_action(&kind),
                    ..PolicyAction::default()
                });
            }
            if let Some(capture) = block.block("capture") {
                actions.push(PolicyAction {
                    action_type: CAPTURE_ACTION.to_string(),
                    before_event_ns: Some(capture.i64_or("seconds_before_event", 0) * NANOS_PER_SECOND),
                    after_event_ns: Some(capture.i64_or("seconds_after_event", 0) * NANOS_PER_SECOND),
                    name: capture.opt_str("name"),
                });
            }
        }

        Ok(PolicyModel {
            version: r.opt_i64("version"),
            name: r.required_str("name")?,
            description: r.opt_str("description").unwrap_or_default(),
            policy_type: r.str_or("type", "falco"),
            severity: r.i64_or("severity", 4),
            enabled: r.bool_or("enabled", true),
            scope: r.opt_str("scope"),
            runbook: r.opt_str("runbook"),
            rule_names: r.string_list("rule_names"),
            notification_channel_ids: r.int_list("notification_channels"),
            actions,
        })
    }

    fn to_state(&self, model: &PolicyModel, _prior: &Value) -> Result<Value, ProviderError> {
        let mut container = None;
        let mut capture = None;
        for action in &model.actions {
            if action.action_type == CAPTURE_ACTION {
                capture = Some(json!({
                    "seconds_before_event": action.before_event_ns.unwrap_or(0) / NANOS_PER_SECOND,
                    "seconds_after_event": action.after_event_ns.unwrap_or(0) / NANOS_PER_SECOND,
                    "name": opt_string_value(action.name.as_deref()),
                }));
            } else if let Some(kind) = action.action_type.strip_prefix("POLICY_ACTION_") {
                container = Some(kind.to_lowercase());
            }
        }
        let actions = (container.is_some() || capture.is_some()).then(|| {
            json!({
                "container": container,
                "capture": single_block(capture),
            })
        });

        let mut rule_names = model.rule_names.clone();
        rule_names.sort();
        let mut channels = model.notification_channel_ids.clone();
        channels.sort();

        Ok(json!({
            "version": model.version,
            "name": model.name,
            "description": opt_string_value(Some(&model.description)),
            "type": model.policy_type,
            "severity": model.severity,
            "enabled": model.enabled,
            "scope": opt_string_value(model.scope.as_deref()),
            "runbook": opt_string_value(model.runbook.as_deref()),
            "rule_names": rule_names,
            "notification_channels": channels,
            "actions": single_block(actions),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{Reconciler, Resource};

    #[test]
    fn test_severity_range() {
        let resource = Reconciler::new(SecurePolicy);
        let diagnostics = resource.validate(&json!({"name": "p", "severity": 9}));
        assert_eq!(diagnostics[0].summary, "severity must be between 0 and 7");
        assert!(resource.validate(&json!({"name": "p"})).is_empty());
    }

    #[test]
    fn test_actions_mapping() {
        let state = json!({
            "name": "Terminal shell",
            "rule_names": ["Terminal shell in container"],
            "actions": [{
                "container": "stop",
                "capture": [{"seconds_before_event": 5, "seconds_after_event": 10}]
            }]
        });
        let model = SecurePolicy.to_model(&state).unwrap();
        let body = serde_json::to_value(&model).unwrap();
        assert_eq!(body["actions"][0]["type"], "POLICY_ACTION_STOP");
        assert_eq!(body["actions"][1]["type"], CAPTURE_ACTION);
        assert_eq!(body["actions"][1]["afterEventNs"], 10 * NANOS_PER_SECOND);
        assert_eq!(body["type"], "falco");

        let state = SecurePolicy.to_state(&model, &Value::Null).unwrap();
        assert_eq!(state["actions"][0]["container"], "stop");
        assert_eq!(state["actions"][0]["capture"][0]["seconds_before_event"], 5);
    }

    #[test]
    fn test_no_actions() {
        let model = SecurePolicy.to_model(&json!({"name": "p"})).unwrap();
        let state = SecurePolicy.to_state(&model, &Value::Null).unwrap();
        assert_eq!(state["actions"], json!([]));
        assert_eq!(state["severity"], 4);
    }
}
