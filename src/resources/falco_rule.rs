//! `sysdig_secure_rule_falco`.
//!
//! A rule either defines a complete Falco rule or, with `append = true`,
//! extends a rule of the same name. Only complete rules need `output` and
//! `source`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::state::{opt_string_value, StateReader};
use super::ResourceMapping;
use crate::config::Product;
use crate::error::ProviderError;
use crate::schema::{Attribute, Block, Diagnostic, NestedBlock, Schema};

const PRIORITIES: &[&str] = &[
    "emergency",
    "alert",
    "critical",
    "error",
    "warning",
    "notice",
    "informational",
    "debug",
];

const SOURCES: &[&str] = &[
    "syscall",
    "k8s_audit",
    "aws_cloudtrail",
    "gcp_auditlog",
    "azure_platformlogs",
    "awscloudtrail",
    "okta",
    "github",
    "guardduty",
];

/// Body of `/api/secure/rules`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FalcoRuleModel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<i64>,
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    tags: Vec<String>,
    details: RuleDetails,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RuleDetails {
    #[serde(default = "rule_type")]
    rule_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    condition: Option<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    priority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source: Option<String>,
    #[serde(default)]
    append: bool,
    #[serde(default)]
    exceptions: Vec<RuleException>,
}

fn rule_type() -> String {
    "FALCO".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Condition {
    condition: String,
    #[serde(default)]
    components: Vec<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RuleException {
    name: String,
    #[serde(default)]
    fields: Vec<String>,
    #[serde(default)]
    comps: Vec<String>,
    #[serde(default)]
    values: Value,
}

/// A Falco runtime rule.
#[derive(Debug, Clone, Copy, Default)]
pub struct FalcoRule;

impl ResourceMapping for FalcoRule {
    type Model = FalcoRuleModel;

    fn type_name(&self) -> &str {
        "sysdig_secure_rule_falco"
    }

    fn product(&self) -> Product {
        Product::Secure
    }

    fn collection_path(&self) -> &str {
        "/api/secure/rules"
    }

    fn schema(&self) -> Schema {
        let exception = Block::new()
            .with_attribute("name", Attribute::required_string())
            .with_attribute("fields", Attribute::optional_string_list())
            .with_attribute("comps", Attribute::optional_string_list())
            .with_attribute(
                "values",
                Attribute::required_string().with_description("JSON encoded list of value tuples"),
            );

        Schema::resource()
            .with_attribute("name", Attribute::required_string().with_force_new())
            .with_attribute("description", Attribute::optional_string())
            .with_attribute("tags", Attribute::optional_string_set())
            .with_attribute("condition", Attribute::required_string())
            .with_attribute("output", Attribute::optional_string())
            .with_attribute(
                "priority",
                Attribute::optional_string()
                    .with_default(json!("warning"))
                    .with_allowed_values(PRIORITIES.iter().copied()),
            )
            .with_attribute(
                "source",
                Attribute::optional_string().with_allowed_values(SOURCES.iter().copied()),
            )
            .with_attribute("append", Attribute::optional_bool().with_default(json!(false)))
            .with_attribute("version", Attribute::computed_int64())
            .with_block("exceptions", NestedBlock::list(exception))
    }

    fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        let r = StateReader::new(config);
        let mut diagnostics = Vec::new();

        if !r.bool_or("append", false) {
            for name in ["output", "source"] {
                if r.opt_str(name).is_none() {
                    diagnostics.push(
                        Diagnostic::error(format!("{} must be set when append = false", name))
                            .with_attribute(name),
                    );
                }
            }
        }

        for (i, exception) in r.blocks("exceptions").iter().enumerate() {
            let Some(values) = exception.opt_str("values") else {
                continue;
            };
            if !serde_json::from_str::<Value>(&values).is_ok_and(|v| v.is_array()) {
                diagnostics.push(
                    Diagnostic::error("exception values must be a JSON encoded list")
                        .with_attribute(format!("exceptions.{}.values", i)),
                );
            }
        }
        diagnostics
    }

    fn to_model(&self, state: &Value) -> Result<FalcoRuleModel, ProviderError> {
        let r = StateReader::new(state);
        let append = r.bool_or("append", false);

        let exceptions = r
            .blocks("exceptions")
            .iter()
            .map(|e| -> Result<RuleException, ProviderError> {
                let values = match e.opt_str("values") {
                    Some(raw) => serde_json::from_str(&raw)?,
                    None => Value::Array(Vec::new()),
                };
                Ok(RuleException {
                    name: e.opt_str("name").unwrap_or_default(),
                    fields: e.string_list("fields"),
                    comps: e.string_list("comps"),
                    values,
                })
            })
            .collect::<Result<Vec<_>, ProviderError>>()?;

        Ok(FalcoRuleModel {
            version: r.opt_i64("version"),
            name: r.required_str("name")?,
            description: r.opt_str("description").unwrap_or_default(),
            tags: r.string_list("tags"),
            details: RuleDetails {
                rule_type: rule_type(),
                condition: r.opt_str("condition").map(|condition| Condition {
                    condition,
                    components: Vec::new(),
                }),
                output: r.opt_str("output"),
                // Appending rules inherit priority from the base rule.
                priority: (!append).then(|| r.str_or("priority", "warning")),
                source: r.opt_str("source"),
                append,
                exceptions,
            },
        })
    }

    fn to_state(&self, model: &FalcoRuleModel, prior: &Value) -> Result<Value, ProviderError> {
        let details = &model.details;
        let mut tags = model.tags.clone();
        tags.sort();

        let prior_exceptions = StateReader::new(prior).blocks("exceptions");
        let exceptions = details
            .exceptions
            .iter()
            .enumerate()
            .map(|(i, e)| -> Result<Value, ProviderError> {
                // Keep the configured spelling when it encodes the same values.
                let configured = prior_exceptions
                    .get(i)
                    .and_then(|p| p.opt_str("values"))
                    .filter(|raw| serde_json::from_str::<Value>(raw).is_ok_and(|v| v == e.values));
                let values = match configured {
                    Some(raw) => raw,
                    None => serde_json::to_string(&e.values)?,
                };
                Ok(json!({
                    "name": e.name,
                    "fields": e.fields,
                    "comps": e.comps,
                    "values": values,
                }))
            })
            .collect::<Result<Vec<_>, ProviderError>>()?;

        let priority = details
            .priority
            .clone()
            .or_else(|| StateReader::new(prior).opt_str("priority"))
            .unwrap_or_else(|| "warning".to_string());

        Ok(json!({
            "version": model.version,
            "name": model.name,
            "description": opt_string_value(Some(&model.description)),
            "tags": tags,
            "condition": details.condition.as_ref().map(|c| &c.condition),
            "output": opt_string_value(details.output.as_deref()),
            "priority": priority,
            "source": opt_string_value(details.source.as_deref()),
            "append": details.append,
            "exceptions": exceptions,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{Reconciler, Resource};

    fn summaries(config: Value) -> Vec<String> {
        Reconciler::new(FalcoRule)
            .validate(&config)
            .into_iter()
            .map(|d| d.summary)
            .collect()
    }

    #[test]
    fn test_output_and_source_required_without_append() {
        let errors = summaries(json!({"name": "shell", "condition": "spawned_process", "source": "syscall"}));
        assert_eq!(errors, vec!["output must be set when append = false"]);

        let errors = summaries(json!({"name": "shell", "condition": "spawned_process", "output": "shell %proc.name"}));
        assert_eq!(errors, vec!["source must be set when append = false"]);
    }

    #[test]
    fn test_append_relaxes_requirements() {
        let errors = summaries(json!({"name": "shell", "condition": "and user.name = root", "append": true}));
        assert!(errors.is_empty());
    }

    #[test]
    fn test_exception_values_must_be_json() {
        let errors = summaries(json!({
            "name": "shell",
            "condition": "spawned_process",
            "output": "o",
            "source": "syscall",
            "exceptions": [{"name": "proc", "fields": ["proc.name"], "comps": ["="], "values": "not json"}]
        }));
        assert_eq!(errors, vec!["exception values must be a JSON encoded list"]);
    }

    #[test]
    fn test_payload_nests_details() {
        let model = FalcoRule
            .to_model(&json!({
                "name": "shell",
                "condition": "spawned_process",
                "output": "shell %proc.name",
                "source": "syscall",
                "tags": ["shell", "container"],
                "exceptions": [{"name": "proc", "fields": ["proc.name"], "comps": ["in"], "values": "[[[\"bash\"]]]"}]
            }))
            .unwrap();
        let body = serde_json::to_value(&model).unwrap();
        assert_eq!(body["details"]["ruleType"], "FALCO");
        assert_eq!(body["details"]["condition"]["condition"], "spawned_process");
        assert_eq!(body["details"]["priority"], "warning");
        assert_eq!(body["details"]["exceptions"][0]["values"], json!([[["bash"]]]));

        let state = FalcoRule.to_state(&model, &Value::Null).unwrap();
        assert_eq!(state["tags"], json!(["container", "shell"]));
        assert_eq!(state["exceptions"][0]["values"], "[[[\"bash\"]]]");
    }

    #[test]
    fn test_exception_values_keep_configured_spelling() {
        let configured = json!({
            "name": "shell",
            "condition": "spawned_process",
            "output": "o",
            "source": "syscall",
            "exceptions": [{"name": "proc", "fields": ["proc.name"], "comps": ["in"], "values": "[ [\"bash\"] ]"}]
        });
        let model = FalcoRule.to_model(&configured).unwrap();

        let state = FalcoRule.to_state(&model, &configured).unwrap();
        assert_eq!(state["exceptions"][0]["values"], "[ [\"bash\"] ]");

        // A backend-side change is reported in its own encoding.
        let mut changed = model.clone();
        changed.details.exceptions[0].values = json!([["zsh"]]);
        let state = FalcoRule.to_state(&changed, &configured).unwrap();
        assert_eq!(state["exceptions"][0]["values"], "[[\"zsh\"]]");
    }
}
