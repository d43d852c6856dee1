//! Schema validation helpers.
//!
//! Validates a configuration `serde_json::Value` against a [`Schema`] before
//! any call reaches the Sysdig API, producing deterministic diagnostics.
//!
//! # Example
//!
//! ```
//! use sysdig_provider::schema::{Attribute, Schema};
//! use sysdig_provider::validation::validate;
//! use serde_json::json;
//!
//! let schema = Schema::resource()
//!     .with_attribute("name", Attribute::required_string())
//!     .with_attribute("severity", Attribute::optional_int64());
//!
//! let diagnostics = validate(&schema, &json!({"name": "Terminal shell", "severity": 4}));
//! assert!(diagnostics.is_empty());
//!
//! let diagnostics = validate(&schema, &json!({"name": "Terminal shell", "severity": "high"}));
//! assert_eq!(diagnostics.len(), 1);
//! assert_eq!(diagnostics[0].attribute, Some("severity".to_string()));
//! ```

use crate::schema::{Attribute, AttributeType, Block, Diagnostic, NestedBlock, Schema};
use serde_json::{Map, Value};

/// Validate a JSON value against a schema.
///
/// Returns a list of diagnostics for any validation errors found.
/// An empty list means the value is valid.
///
/// # Validation Rules
///
/// - Required attributes must be present and non-null
/// - Computed-only attributes are skipped (the provider sets these)
/// - Attribute types must match the schema
/// - Attributes with allowed values must use one of them
/// - Conflicting siblings must not both be set
/// - Nested blocks are validated recursively with min/max item constraints
pub fn validate(schema: &Schema, value: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    validate_block(&schema.block, value, "", &mut diagnostics);
    diagnostics
}

/// Validate a JSON value against a schema, returning Ok if valid or Err with diagnostics.
pub fn validate_result(schema: &Schema, value: &Value) -> Result<(), Vec<Diagnostic>> {
    let diagnostics = validate(schema, value);
    if diagnostics.is_empty() {
        Ok(())
    } else {
        Err(diagnostics)
    }
}

/// Check if a JSON value is valid against a schema.
pub fn is_valid(schema: &Schema, value: &Value) -> bool {
    validate(schema, value).is_empty()
}

/// Whether a configuration value counts as "set": non-null, and non-empty
/// for lists/sets of blocks.
pub fn is_set(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Array(items)) => !items.is_empty(),
        Some(_) => true,
    }
}

fn validate_block(block: &Block, value: &Value, path: &str, diagnostics: &mut Vec<Diagnostic>) {
    let obj = match value {
        Value::Object(map) => map,
        Value::Null => return,
        _ => {
            let mut diag = Diagnostic::error("Expected object")
                .with_detail(format!("Got {}", value_type_name(value)));
            if !path.is_empty() {
                diag = diag.with_attribute(path);
            }
            diagnostics.push(diag);
            return;
        },
    };

    for (name, attr) in &block.attributes {
        let attr_path = join_path(path, name);
        validate_attribute(attr, obj.get(name), &attr_path, diagnostics);
    }

    for (name, nested) in &block.blocks {
        let block_path = join_path(path, name);
        validate_nested_block(nested, obj.get(name), &block_path, diagnostics);
    }

    validate_conflicts(block, obj, path, diagnostics);
}

fn validate_attribute(
    attr: &Attribute,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if attr.flags.is_computed_only() {
        return;
    }

    match value {
        None | Some(Value::Null) => {
            if attr.flags.required {
                diagnostics.push(
                    Diagnostic::error(format!("Missing required attribute '{}'", path))
                        .with_detail("This attribute is required and must be provided")
                        .with_attribute(path),
                );
            }
        },
        Some(v) => {
            let before = diagnostics.len();
            validate_attribute_type(&attr.attr_type, v, path, diagnostics);
            if diagnostics.len() == before && !attr.allowed_values.is_empty() {
                validate_allowed_values(attr, v, path, diagnostics);
            }
        },
    }
}

fn validate_allowed_values(
    attr: &Attribute,
    value: &Value,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let candidates: Vec<&Value> = match value {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };

    for candidate in candidates {
        if !attr.allowed_values.contains(candidate) {
            let allowed: Vec<String> = attr.allowed_values.iter().map(render_value).collect();
            diagnostics.push(
                Diagnostic::error(format!("Invalid value for attribute '{}'", path))
                    .with_detail(format!(
                        "Expected one of [{}], got {}",
                        allowed.join(", "),
                        render_value(candidate)
                    ))
                    .with_attribute(path),
            );
        }
    }
}

fn validate_attribute_type(
    attr_type: &AttributeType,
    value: &Value,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match attr_type {
        AttributeType::String => {
            if !value.is_string() {
                diagnostics.push(type_error(path, "string", value));
            }
        },
        AttributeType::Int64 => {
            if !is_int64(value) {
                diagnostics.push(type_error(path, "int64", value));
            }
        },
        AttributeType::Float64 => {
            if !value.is_number() {
                diagnostics.push(type_error(path, "float64", value));
            }
        },
        AttributeType::Bool => {
            if !value.is_boolean() {
                diagnostics.push(type_error(path, "bool", value));
            }
        },
        AttributeType::List(element_type) | AttributeType::Set(element_type) => {
            if let Some(arr) = value.as_array() {
                for (i, elem) in arr.iter().enumerate() {
                    let elem_path = format!("{}.{}", path, i);
                    validate_attribute_type(element_type, elem, &elem_path, diagnostics);
                }
            } else {
                let expected = if matches!(attr_type, AttributeType::Set(_)) {
                    "set"
                } else {
                    "list"
                };
                diagnostics.push(type_error(path, expected, value));
            }
        },
        AttributeType::Map(value_type) => {
            if let Some(obj) = value.as_object() {
                for (key, val) in obj {
                    let key_path = format!("{}.{}", path, key);
                    validate_attribute_type(value_type, val, &key_path, diagnostics);
                }
            } else {
                diagnostics.push(type_error(path, "map", value));
            }
        },
    }
}

fn validate_nested_block(
    nested: &NestedBlock,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match value {
        None | Some(Value::Null) => {
            if nested.min_items > 0 {
                diagnostics.push(
                    Diagnostic::error(format!(
                        "Block '{}' requires at least {} item(s)",
                        path, nested.min_items
                    ))
                    .with_attribute(path),
                );
            }
        },
        Some(Value::Array(arr)) => {
            let len = arr.len() as u32;

            if len < nested.min_items {
                diagnostics.push(
                    Diagnostic::error(format!(
                        "Block '{}' requires at least {} item(s), got {}",
                        path, nested.min_items, len
                    ))
                    .with_attribute(path),
                );
            }

            // 0 means unlimited
            if nested.max_items > 0 && len > nested.max_items {
                diagnostics.push(
                    Diagnostic::error(format!(
                        "Block '{}' allows at most {} item(s), got {}",
                        path, nested.max_items, len
                    ))
                    .with_attribute(path),
                );
            }

            for (i, item) in arr.iter().enumerate() {
                let item_path = format!("{}.{}", path, i);
                validate_block(&nested.block, item, &item_path, diagnostics);
            }
        },
        Some(v) => {
            diagnostics.push(
                Diagnostic::error(format!("Expected list for block '{}'", path))
                    .with_detail(format!("Got {}", value_type_name(v)))
                    .with_attribute(path),
            );
        },
    }
}

fn validate_conflicts(
    block: &Block,
    obj: &Map<String, Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let declared = block
        .attributes
        .iter()
        .map(|(name, attr)| (name, &attr.conflicts_with))
        .chain(
            block
                .blocks
                .iter()
                .map(|(name, nested)| (name, &nested.conflicts_with)),
        );

    for (name, conflicts) in declared {
        if conflicts.is_empty() || !is_set(obj.get(name)) {
            continue;
        }
        for other in conflicts {
            // Report a mutual declaration once, from the name that sorts first.
            if other < name && declares_conflict(block, other, name) {
                continue;
            }
            if is_set(obj.get(other)) {
                diagnostics.push(
                    Diagnostic::error(format!(
                        "\"{}\" cannot be used together with \"{}\"",
                        name, other
                    ))
                    .with_attribute(join_path(path, name)),
                );
            }
        }
    }
}

fn declares_conflict(block: &Block, name: &str, other: &str) -> bool {
    let conflicts = block
        .attributes
        .get(name)
        .map(|a| &a.conflicts_with)
        .or_else(|| block.blocks.get(name).map(|b| &b.conflicts_with));
    conflicts.is_some_and(|c| c.iter().any(|n| n == other))
}

fn join_path(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", base, name)
    }
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{}\"", s),
        other => other.to_string(),
    }
}

fn is_int64(value: &Value) -> bool {
    match value {
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                true
            } else if let Some(f) = n.as_f64() {
                f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64
            } else {
                false
            }
        },
        _ => false,
    }
}

fn type_error(path: &str, expected: &str, got: &Value) -> Diagnostic {
    Diagnostic::error(format!("Invalid type for attribute '{}'", path))
        .with_detail(format!("Expected {}, got {}", expected, value_type_name(got)))
        .with_attribute(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Attribute, AttributeFlags, Block, NestedBlock, Schema};
    use serde_json::json;

    fn zone_schema() -> Schema {
        Schema::resource()
            .with_attribute("name", Attribute::required_string())
            .with_block(
                "scope",
                NestedBlock::set(
                    Block::new()
                        .with_attribute(
                            "target_type",
                            Attribute::required_string().with_allowed_values(["aws", "gcp"]),
                        )
                        .with_attribute(
                            "rules",
                            Attribute::optional_string().with_conflicts_with(["expression"]),
                        )
                        .with_block(
                            "expression",
                            NestedBlock::list(
                                Block::new()
                                    .with_attribute("field", Attribute::required_string()),
                            )
                            .with_conflicts_with(["rules"]),
                        ),
                )
                .with_min_items(1),
            )
    }

    #[test]
    fn test_validate_required_string() {
        let schema = Schema::v0().with_attribute("name", Attribute::required_string());

        assert!(validate(&schema, &json!({"name": "prod"})).is_empty());

        let diagnostics = validate(&schema, &json!({}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].summary, "Missing required attribute 'name'");

        let diagnostics = validate(&schema, &json!({"name": null}));
        assert_eq!(diagnostics.len(), 1);

        let diagnostics = validate(&schema, &json!({"name": 123}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Invalid type"));
    }

    #[test]
    fn test_validate_computed_attribute_skipped() {
        let schema = Schema::resource();
        assert!(validate(&schema, &json!({})).is_empty());
        assert!(validate(&schema, &json!({"id": 123})).is_empty());
    }

    #[test]
    fn test_validate_int64() {
        let schema = Schema::v0().with_attribute("severity", Attribute::required_int64());

        assert!(validate(&schema, &json!({"severity": 4})).is_empty());
        assert!(validate(&schema, &json!({"severity": 4.0})).is_empty());
        assert_eq!(validate(&schema, &json!({"severity": 4.5})).len(), 1);
        assert_eq!(validate(&schema, &json!({"severity": "4"})).len(), 1);
    }

    #[test]
    fn test_validate_string_set_elements() {
        let schema = Schema::v0().with_attribute("rule_names", Attribute::required_string_set());

        assert!(validate(&schema, &json!({"rule_names": ["a", "b"]})).is_empty());

        let diagnostics = validate(&schema, &json!({"rule_names": ["a", 1]}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some("rule_names.1".to_string()));

        let diagnostics = validate(&schema, &json!({"rule_names": "a"}));
        assert_eq!(diagnostics[0].detail.as_deref(), Some("Expected set, got string"));
    }

    #[test]
    fn test_validate_map() {
        let schema = Schema::v0().with_attribute("labels", Attribute::optional_string_map());

        assert!(validate(&schema, &json!({"labels": {"env": "prod"}})).is_empty());

        let diagnostics = validate(&schema, &json!({"labels": {"env": "prod", "tier": 1}}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some("labels.tier".to_string()));
    }

    #[test]
    fn test_validate_allowed_values() {
        let schema = Schema::v0().with_attribute(
            "severity",
            Attribute::required_string().with_allowed_values(["high", "medium", "low", "info"]),
        );

        assert!(validate(&schema, &json!({"severity": "high"})).is_empty());

        let diagnostics = validate(&schema, &json!({"severity": "critical"}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].summary, "Invalid value for attribute 'severity'");
        assert_eq!(
            diagnostics[0].detail.as_deref(),
            Some("Expected one of [\"high\", \"medium\", \"low\", \"info\"], got \"critical\"")
        );
    }

    #[test]
    fn test_validate_allowed_values_in_set() {
        let schema = Schema::v0().with_attribute(
            "permissions",
            Attribute::new(
                AttributeType::set(AttributeType::String),
                AttributeFlags::optional(),
            )
            .with_allowed_values(["alerts.read", "alerts.edit"]),
        );

        assert!(validate(&schema, &json!({"permissions": ["alerts.read"]})).is_empty());
        let diagnostics = validate(&schema, &json!({"permissions": ["alerts.read", "bogus"]}));
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn test_validate_conflicting_attributes() {
        let schema = zone_schema();

        let ok = json!({
            "name": "z",
            "scope": [{"target_type": "aws", "rules": "organization in (\"o1\")"}]
        });
        assert!(validate(&schema, &ok).is_empty());

        let ok = json!({
            "name": "z",
            "scope": [{"target_type": "aws", "expression": [{"field": "account"}]}]
        });
        assert!(validate(&schema, &ok).is_empty());

        let both = json!({
            "name": "z",
            "scope": [{
                "target_type": "aws",
                "rules": "organization in (\"o1\")",
                "expression": [{"field": "account"}]
            }]
        });
        let diagnostics = validate(&schema, &both);
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("cannot be used together with"));
        assert_eq!(
            diagnostics[0].summary,
            "\"expression\" cannot be used together with \"rules\""
        );
        assert_eq!(diagnostics[0].attribute, Some("scope.0.expression".to_string()));
    }

    #[test]
    fn test_validate_empty_block_list_does_not_conflict() {
        let schema = zone_schema();
        let value = json!({
            "name": "z",
            "scope": [{"target_type": "gcp", "rules": "", "expression": []}]
        });
        assert!(validate(&schema, &value).is_empty());
    }

    #[test]
    fn test_validate_nested_block_limits() {
        let schema = Schema::v0().with_block(
            "custom_notification",
            NestedBlock::single(Block::new().with_attribute("subject", Attribute::required_string())),
        );

        assert!(validate(&schema, &json!({"custom_notification": [{"subject": "s"}]})).is_empty());
        assert!(validate(&schema, &json!({})).is_empty());

        let diagnostics = validate(
            &schema,
            &json!({"custom_notification": [{"subject": "a"}, {"subject": "b"}]}),
        );
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("at most 1"));

        let diagnostics = validate(&schema, &json!({"custom_notification": {"subject": "a"}}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Expected list"));
    }

    #[test]
    fn test_validate_min_items() {
        let schema = zone_schema();
        let diagnostics = validate(&schema, &json!({"name": "z"}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("at least 1"));
    }

    #[test]
    fn test_validate_deeply_nested_path() {
        let schema = zone_schema();
        let value = json!({
            "name": "z",
            "scope": [{"target_type": "aws", "expression": [{"field": 7}]}]
        });
        let diagnostics = validate(&schema, &value);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(
            diagnostics[0].attribute,
            Some("scope.0.expression.0.field".to_string())
        );
    }

    #[test]
    fn test_validate_multiple_errors_are_ordered() {
        let schema = Schema::v0()
            .with_attribute("name", Attribute::required_string())
            .with_attribute("enabled", Attribute::optional_bool())
            .with_attribute("severity", Attribute::required_int64());

        let diagnostics = validate(&schema, &json!({"enabled": "yes", "severity": "x"}));
        let paths: Vec<_> = diagnostics
            .iter()
            .map(|d| d.attribute.clone().unwrap())
            .collect();
        assert_eq!(paths, vec!["enabled", "name", "severity"]);
    }

    #[test]
    fn test_helpers() {
        let schema = Schema::v0().with_attribute("name", Attribute::required_string());

        assert!(is_valid(&schema, &json!({"name": "test"})));
        assert!(!is_valid(&schema, &json!({})));
        assert!(validate_result(&schema, &json!({"name": "test"})).is_ok());
        assert_eq!(validate_result(&schema, &json!({})).unwrap_err().len(), 1);

        assert!(!is_set(None));
        assert!(!is_set(Some(&json!(null))));
        assert!(!is_set(Some(&json!([]))));
        assert!(is_set(Some(&json!(""))));
        assert!(is_set(Some(&json!([1]))));
    }

    #[test]
    fn test_validate_root_not_object() {
        let schema = Schema::v0().with_attribute("name", Attribute::required_string());
        let diagnostics = validate(&schema, &json!("not an object"));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Expected object"));
    }
}
