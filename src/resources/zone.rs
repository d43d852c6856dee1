//! `sysdig_secure_zone`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::state::{opt_string_value, StateReader};
use super::zone_rules::{parse_rules, rules_equivalent, ZoneExpression, OPERATORS};
use super::ResourceMapping;
use crate::config::Product;
use crate::error::ProviderError;
use crate::schema::{Attribute, Block, NestedBlock, Schema};

pub(crate) const ZONES_PATH: &str = "/platform/v1/zones";

/// Body of `/platform/v1/zones`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneModel {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub scopes: Vec<ZoneScopeModel>,
    #[serde(default, skip_serializing)]
    pub is_system: bool,
    #[serde(default, skip_serializing)]
    pub author: Option<String>,
    #[serde(default, skip_serializing)]
    pub last_modified_by: Option<String>,
    #[serde(default, skip_serializing)]
    pub last_updated: Option<i64>,
}

/// One zone scope, as a rules string or as structured expressions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneScopeModel {
    pub target_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expression: Vec<ZoneExpression>,
}

/// Secure zones: named sets of scopes used to partition posture and
/// vulnerability data.
#[derive(Debug, Clone, Copy, Default)]
pub struct Zone;

pub(crate) fn expression_block() -> Block {
    Block::new()
        .with_attribute("field", Attribute::required_string())
        .with_attribute(
            "operator",
            Attribute::required_string().with_allowed_values(OPERATORS.iter().copied()),
        )
        .with_attribute("value", Attribute::optional_string())
        .with_attribute("values", Attribute::optional_string_list())
}

pub(crate) fn expression_state(expressions: &[ZoneExpression]) -> Value {
    Value::Array(
        expressions
            .iter()
            .map(|e| {
                json!({
                    "field": e.field,
                    "operator": e.operator,
                    "value": opt_string_value(e.value.as_deref()),
                    "values": e.values,
                })
            })
            .collect(),
    )
}

fn expression_from_state(scope: &StateReader<'_>) -> Vec<ZoneExpression> {
    scope
        .blocks("expression")
        .iter()
        .map(|e| ZoneExpression {
            field: e.opt_str("field").unwrap_or_default(),
            operator: e.opt_str("operator").unwrap_or_default(),
            value: e.opt_str("value"),
            values: e.string_list("values"),
        })
        .collect()
}

/// The configured scope matching a backend scope: same position first,
/// then the first one with the same target type.
fn matching_prior<'a>(
    prior: &[StateReader<'a>],
    index: usize,
    target_type: &str,
) -> Option<StateReader<'a>> {
    let same_type = |s: &StateReader<'a>| s.opt_str("target_type").as_deref() == Some(target_type);
    prior
        .get(index)
        .filter(|s| same_type(s))
        .copied()
        .or_else(|| prior.iter().find(|s| same_type(s)).copied())
}

fn scope_state(scope: &ZoneScopeModel, prior: Option<StateReader<'_>>) -> Value {
    let prior_rules = prior.and_then(|p| p.opt_str("rules"));
    let rules = scope.rules.as_deref().filter(|r| !r.is_empty());

    let (rules, expression) = match (rules, scope.expression.is_empty()) {
        (Some(rules), _) => {
            // Keep the configured spelling when the backend reformatted it.
            let kept = match (&prior_rules, parse_rules(rules)) {
                (Some(prior), Ok(parsed)) if rules_equivalent(prior, &parsed) => prior.clone(),
                _ => rules.to_string(),
            };
            (Value::String(kept), json!([]))
        },
        (None, false) => match &prior_rules {
            Some(prior) if rules_equivalent(prior, &scope.expression) => {
                (Value::String(prior.clone()), json!([]))
            },
            _ => (Value::Null, expression_state(&scope.expression)),
        },
        (None, true) => (Value::Null, json!([])),
    };

    json!({
        "target_type": scope.target_type,
        "rules": rules,
        "expression": expression,
    })
}

impl ResourceMapping for Zone {
    type Model = ZoneModel;

    fn type_name(&self) -> &str {
        "sysdig_secure_zone"
    }

    fn product(&self) -> Product {
        Product::Secure
    }

    fn collection_path(&self) -> &str {
        ZONES_PATH
    }

    fn schema(&self) -> Schema {
        let scope = Block::new()
            .with_attribute(
                "target_type",
                Attribute::required_string().with_description("e.g. aws, gcp, azure, kubernetes, host"),
            )
            .with_attribute(
                "rules",
                Attribute::optional_string()
                    .with_description("Legacy rules string, e.g. account in (\"a1\")")
                    .with_conflicts_with(["expression"]),
            )
            .with_block("expression", NestedBlock::list(expression_block()));

        Schema::resource()
            .with_description("A Sysdig Secure zone")
            .with_attribute("name", Attribute::required_string())
            .with_attribute("description", Attribute::optional_string())
            .with_attribute("is_system", Attribute::computed_bool())
            .with_attribute("author", Attribute::computed_string())
            .with_attribute("last_modified_by", Attribute::computed_string())
            .with_attribute("last_updated", Attribute::computed_int64())
            .with_block("scope", NestedBlock::set(scope).with_min_items(1))
    }

    fn to_model(&self, state: &Value) -> Result<ZoneModel, ProviderError> {
        let r = StateReader::new(state);
        let scopes = r
            .blocks("scope")
            .iter()
            .map(|s| ZoneScopeModel {
                target_type: s.opt_str("target_type").unwrap_or_default(),
                rules: s.opt_str("rules"),
                expression: expression_from_state(s),
            })
            .collect();

        Ok(ZoneModel {
            name: r.required_str("name")?,
            description: r.opt_str("description"),
            scopes,
            ..ZoneModel::default()
        })
    }

    fn to_state(&self, model: &ZoneModel, prior: &Value) -> Result<Value, ProviderError> {
        let prior_scopes = StateReader::new(prior).blocks("scope");
        let scope: Vec<Value> = model
            .scopes
            .iter()
            .enumerate()
            .map(|(i, s)| scope_state(s, matching_prior(&prior_scopes, i, &s.target_type)))
            .collect();

        Ok(json!({
            "name": model.name,
            "description": opt_string_value(model.description.as_deref()),
            "is_system": model.is_system,
            "author": model.author,
            "last_modified_by": model.last_modified_by,
            "last_updated": model.last_updated,
            "scope": scope,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{Reconciler, Resource};
    use serde_json::json;

    #[test]
    fn test_rules_and_expression_conflict() {
        let resource = Reconciler::new(Zone);
        let diagnostics = resource.validate(&json!({
            "name": "prod",
            "scope": [{
                "target_type": "aws",
                "rules": "account in (\"a1\")",
                "expression": [{"field": "account", "operator": "in", "values": ["a1"]}]
            }]
        }));

        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("cannot be used together with"));
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("scope.0.rules"));
    }

    #[test]
    fn test_scope_required() {
        let resource = Reconciler::new(Zone);
        let diagnostics = resource.validate(&json!({"name": "prod"}));
        assert!(diagnostics.iter().any(|d| d.summary.contains("scope")));
    }

    #[test]
    fn test_backend_expression_folds_back_into_rules() {
        let prior = json!({
            "scope": [{"target_type": "aws", "rules": "organization in (\"o1\") and account in (\"a1\")"}]
        });
        let model = ZoneModel {
            name: "prod".into(),
            scopes: vec![ZoneScopeModel {
                target_type: "aws".into(),
                rules: None,
                expression: parse_rules(r#"account in ("a1") and organization in ("o1")"#).unwrap(),
            }],
            ..ZoneModel::default()
        };

        let state = Zone.to_state(&model, &prior).unwrap();
        assert_eq!(
            state["scope"][0]["rules"],
            "organization in (\"o1\") and account in (\"a1\")"
        );
        assert_eq!(state["scope"][0]["expression"], json!([]));
    }

    #[test]
    fn test_changed_backend_scope_is_reported_as_expression() {
        let prior = json!({
            "scope": [{"target_type": "aws", "rules": "account in (\"a1\")"}]
        });
        let model = ZoneModel {
            name: "prod".into(),
            scopes: vec![ZoneScopeModel {
                target_type: "aws".into(),
                rules: None,
                expression: parse_rules(r#"account in ("a2")"#).unwrap(),
            }],
            ..ZoneModel::default()
        };

        let state = Zone.to_state(&model, &prior).unwrap();
        assert!(state["scope"][0]["rules"].is_null());
        assert_eq!(state["scope"][0]["expression"][0]["values"], json!(["a2"]));
    }

    #[test]
    fn test_model_roundtrip_drops_computed_fields() {
        let state = json!({
            "name": "prod",
            "description": "",
            "author": "someone",
            "scope": [{"target_type": "gcp", "expression": [
                {"field": "organization", "operator": "in", "values": ["o1"]}
            ]}]
        });
        let model = Zone.to_model(&state).unwrap();
        assert_eq!(model.description, None);
        let body = serde_json::to_value(&model).unwrap();
        assert!(body.get("author").is_none());
        assert_eq!(body["scopes"][0]["targetType"], "gcp");
        assert_eq!(body["scopes"][0]["expression"][0]["values"], json!(["o1"]));
    }
}
