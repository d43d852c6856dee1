//! Plan computation and drift detection.
//!
//! Both walk a resource [`Schema`] and compare two states attribute by
//! attribute:
//!
//! - unset, `null`, and empty collections are equivalent;
//! - set-typed attributes and set-nested blocks compare order-insensitively;
//! - computed-only attributes never produce changes (the backend owns them);
//! - list and single blocks of equal length are compared element by element,
//!   otherwise the whole block is reported as one change.

use serde_json::{Map, Value};

use crate::schema::{apply_defaults, AttributeType, Block, BlockNestingMode, Schema};
use crate::types::{AttributeChange, PlanResult};

/// Compute the attribute changes between two states of the same resource.
pub fn diff(schema: &Schema, before: &Value, after: &Value) -> Vec<AttributeChange> {
    let mut changes = Vec::new();
    diff_block(&schema.block, before, after, "", false, &mut changes);
    changes.into_iter().map(|(change, _)| change).collect()
}

/// Plan a resource operation.
///
/// - `prior = None`: create. Defaults are applied and every configured
///   attribute is reported as added.
/// - `proposed = Null`: destroy. Every attribute in prior state is reported as removed.
/// - otherwise: update. Computed attributes are carried from prior state and
///   `requires_replace` is set when a force-new attribute or block changed.
pub fn plan_resource(schema: &Schema, prior: Option<&Value>, proposed: &Value) -> PlanResult {
    match prior {
        None => plan_create(schema, proposed),
        Some(prior) if proposed.is_null() => plan_destroy(schema, prior),
        Some(prior) => plan_update(schema, prior, proposed),
    }
}

fn plan_create(schema: &Schema, proposed: &Value) -> PlanResult {
    let mut planned = proposed.clone();
    apply_defaults(schema, &mut planned);
    if let Value::Object(obj) = &mut planned {
        for (name, attr) in &schema.block.attributes {
            if attr.flags.is_computed_only() {
                obj.insert(name.clone(), Value::Null);
            }
        }
    }

    let changes = diff(schema, &Value::Null, &planned);
    PlanResult::with_changes(planned, changes, false)
}

fn plan_destroy(schema: &Schema, prior: &Value) -> PlanResult {
    let changes = diff(schema, prior, &Value::Null);
    PlanResult::with_changes(Value::Null, changes, false)
}

fn plan_update(schema: &Schema, prior: &Value, proposed: &Value) -> PlanResult {
    let mut planned = proposed.clone();
    apply_defaults(schema, &mut planned);

    if let (Value::Object(planned_obj), Value::Object(prior_obj)) = (&mut planned, prior) {
        for (name, attr) in &schema.block.attributes {
            let keep_prior = attr.flags.is_computed_only()
                || (attr.flags.computed && is_empty(planned_obj.get(name)));
            if keep_prior {
                let value = prior_obj.get(name).cloned().unwrap_or(Value::Null);
                planned_obj.insert(name.clone(), value);
            }
        }
    }

    let mut changes = Vec::new();
    diff_block(&schema.block, prior, &planned, "", false, &mut changes);
    let requires_replace = changes.iter().any(|(_, force_new)| *force_new);
    let changes = changes.into_iter().map(|(change, _)| change).collect();

    PlanResult::with_changes(planned, changes, requires_replace)
}

fn diff_block(
    block: &Block,
    before: &Value,
    after: &Value,
    path: &str,
    force_new: bool,
    changes: &mut Vec<(AttributeChange, bool)>,
) {
    let empty = Map::new();
    let before_obj = before.as_object().unwrap_or(&empty);
    let after_obj = after.as_object().unwrap_or(&empty);

    for (name, attr) in &block.attributes {
        if attr.flags.is_computed_only() {
            continue;
        }
        let b = before_obj.get(name);
        let a = after_obj.get(name);
        let unordered = matches!(attr.attr_type, AttributeType::Set(_));
        if !values_equal(b, a, unordered) {
            changes.push((
                change_for(join_path(path, name), b, a),
                force_new || attr.force_new,
            ));
        }
    }

    for (name, nested) in &block.blocks {
        let block_path = join_path(path, name);
        let b = before_obj.get(name);
        let a = after_obj.get(name);
        let nested_force_new = force_new || nested.force_new;

        let b_items = as_items(b);
        let a_items = as_items(a);

        match nested.nesting_mode {
            BlockNestingMode::Set => {
                if !values_equal(b, a, true) {
                    changes.push((change_for(block_path, b, a), nested_force_new));
                }
            },
            BlockNestingMode::Single | BlockNestingMode::List => {
                if b_items.len() == a_items.len() {
                    for (i, (bi, ai)) in b_items.iter().zip(a_items.iter()).enumerate() {
                        let item_path = format!("{}.{}", block_path, i);
                        diff_block(
                            &nested.block,
                            bi,
                            ai,
                            &item_path,
                            nested_force_new,
                            changes,
                        );
                    }
                } else {
                    changes.push((change_for(block_path, b, a), nested_force_new));
                }
            },
        }
    }
}

fn change_for(path: String, before: Option<&Value>, after: Option<&Value>) -> AttributeChange {
    let before = before.filter(|v| !is_empty(Some(v))).cloned();
    let after = after.filter(|v| !is_empty(Some(v))).cloned();
    AttributeChange::new(path, before, after)
}

fn as_items(value: Option<&Value>) -> Vec<Value> {
    match value {
        Some(Value::Array(items)) => items.clone(),
        _ => Vec::new(),
    }
}

fn is_empty(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::Array(items)) => items.is_empty(),
        Some(Value::Object(obj)) => obj.is_empty(),
        Some(_) => false,
    }
}

fn values_equal(before: Option<&Value>, after: Option<&Value>, unordered: bool) -> bool {
    match (is_empty(before), is_empty(after)) {
        (true, true) => return true,
        (true, false) | (false, true) => return false,
        (false, false) => {},
    }

    let (Some(b), Some(a)) = (before, after) else {
        return false;
    };

    if unordered {
        if let (Value::Array(bi), Value::Array(ai)) = (b, a) {
            return sorted_canonical(bi) == sorted_canonical(ai);
        }
    }
    canonical(b) == canonical(a)
}

fn sorted_canonical(items: &[Value]) -> Vec<String> {
    let mut keys: Vec<String> = items.iter().map(|v| canonical(v).to_string()).collect();
    keys.sort();
    keys.dedup();
    keys
}

/// Strip nulls and empty collections and normalise integral floats so that
/// structurally equivalent values compare equal.
fn canonical(value: &Value) -> Value {
    match value {
        Value::Object(obj) => Value::Object(
            obj.iter()
                .filter(|(_, v)| !is_empty(Some(v)))
                .map(|(k, v)| (k.clone(), canonical(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
        Value::Number(n) => match n.as_f64() {
            Some(f) if !n.is_i64() && !n.is_u64() && f.fract() == 0.0 && f.abs() < 9.0e15 => {
                Value::from(f as i64)
            },
            _ => value.clone(),
        },
        other => other.clone(),
    }
}

fn join_path(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", base, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Attribute, NestedBlock};
    use serde_json::json;

    fn channel_schema() -> Schema {
        Schema::resource()
            .with_attribute("name", Attribute::required_string())
            .with_attribute("enabled", Attribute::optional_bool().with_default(json!(true)))
            .with_attribute("recipients", Attribute::required_string_set())
            .with_attribute("version", Attribute::computed_int64())
    }

    fn zone_schema() -> Schema {
        Schema::resource()
            .with_attribute("name", Attribute::required_string())
            .with_attribute("description", Attribute::optional_string())
            .with_block(
                "scope",
                NestedBlock::set(
                    Block::new()
                        .with_attribute("target_type", Attribute::required_string())
                        .with_attribute("rules", Attribute::optional_string()),
                ),
            )
    }

    #[test]
    fn test_diff_detects_modified_attribute() {
        let schema = channel_schema();
        let before = json!({"id": "1", "name": "ops", "enabled": true, "recipients": ["a@x.io"]});
        let after = json!({"id": "1", "name": "ops", "enabled": false, "recipients": ["a@x.io"]});

        let changes = diff(&schema, &before, &after);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].path, "enabled");
        assert_eq!(changes[0].before, Some(json!(true)));
        assert_eq!(changes[0].after, Some(json!(false)));
    }

    #[test]
    fn test_diff_sets_ignore_order() {
        let schema = channel_schema();
        let before = json!({"name": "ops", "recipients": ["a@x.io", "b@x.io"]});
        let after = json!({"name": "ops", "recipients": ["b@x.io", "a@x.io"]});
        assert!(diff(&schema, &before, &after).is_empty());
    }

    #[test]
    fn test_diff_null_and_missing_are_equal() {
        let schema = zone_schema();
        let before = json!({"name": "z", "description": null, "scope": []});
        let after = json!({"name": "z"});
        assert!(diff(&schema, &before, &after).is_empty());
    }

    #[test]
    fn test_diff_skips_computed() {
        let schema = channel_schema();
        let before = json!({"id": "1", "name": "ops", "recipients": ["a"], "version": 1});
        let after = json!({"id": "1", "name": "ops", "recipients": ["a"], "version": 7});
        assert!(diff(&schema, &before, &after).is_empty());
    }

    #[test]
    fn test_diff_set_block() {
        let schema = zone_schema();
        let before = json!({"name": "z", "scope": [
            {"target_type": "aws", "rules": "account in (\"a1\")"},
            {"target_type": "gcp", "rules": null}
        ]});
        let reordered = json!({"name": "z", "scope": [
            {"target_type": "gcp"},
            {"target_type": "aws", "rules": "account in (\"a1\")"}
        ]});
        assert!(diff(&schema, &before, &reordered).is_empty());

        let changed = json!({"name": "z", "scope": [
            {"target_type": "gcp"},
            {"target_type": "aws", "rules": "account in (\"a2\")"}
        ]});
        let changes = diff(&schema, &before, &changed);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].path, "scope");
    }

    #[test]
    fn test_diff_list_block_elementwise() {
        let schema = Schema::resource().with_block(
            "notification_channels",
            NestedBlock::list(
                Block::new()
                    .with_attribute("id", Attribute::required_int64())
                    .with_attribute("renotify_every_minutes", Attribute::optional_int64()),
            ),
        );
        let before = json!({"notification_channels": [{"id": 1, "renotify_every_minutes": 10}]});
        let after = json!({"notification_channels": [{"id": 1, "renotify_every_minutes": 30}]});
        let changes = diff(&schema, &before, &after);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].path, "notification_channels.0.renotify_every_minutes");
    }

    #[test]
    fn test_diff_numbers_compare_by_value() {
        let schema = Schema::resource().with_attribute("threshold", Attribute::required_float64());
        assert!(diff(&schema, &json!({"threshold": 10}), &json!({"threshold": 10.0})).is_empty());
        assert_eq!(
            diff(&schema, &json!({"threshold": 10}), &json!({"threshold": 10.5})).len(),
            1
        );
    }

    #[test]
    fn test_plan_create_applies_defaults() {
        let schema = channel_schema();
        let plan = plan_resource(&schema, None, &json!({"name": "ops", "recipients": ["a"]}));

        assert!(!plan.requires_replace);
        assert_eq!(plan.planned_state["enabled"], json!(true));
        assert!(plan.planned_state["id"].is_null());
        let paths: Vec<_> = plan.changes.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(paths, vec!["enabled", "name", "recipients"]);
    }

    #[test]
    fn test_plan_update_in_place_carries_computed() {
        let schema = channel_schema();
        let prior = json!({"id": "9", "name": "ops", "enabled": true, "recipients": ["a"], "version": 3});
        let proposed = json!({"name": "ops", "enabled": false, "recipients": ["a"]});

        let plan = plan_resource(&schema, Some(&prior), &proposed);
        assert!(!plan.requires_replace);
        assert_eq!(plan.planned_state["id"], json!("9"));
        assert_eq!(plan.planned_state["version"], json!(3));
        assert_eq!(plan.changes.len(), 1);
        assert_eq!(plan.changes[0].path, "enabled");
    }

    #[test]
    fn test_plan_update_no_changes() {
        let schema = channel_schema();
        let prior = json!({"id": "9", "name": "ops", "enabled": true, "recipients": ["a"], "version": 3});
        let proposed = json!({"name": "ops", "recipients": ["a"]});

        let plan = plan_resource(&schema, Some(&prior), &proposed);
        assert!(!plan.has_changes());
    }

    #[test]
    fn test_plan_force_new() {
        let schema = Schema::resource()
            .with_attribute("type", Attribute::required_string().with_force_new())
            .with_attribute("name", Attribute::required_string());

        let prior = json!({"id": "1", "type": "falco", "name": "p"});

        let plan = plan_resource(&schema, Some(&prior), &json!({"type": "falco", "name": "q"}));
        assert!(!plan.requires_replace);

        let plan = plan_resource(&schema, Some(&prior), &json!({"type": "list_matching", "name": "p"}));
        assert!(plan.requires_replace);
    }

    #[test]
    fn test_plan_destroy() {
        let schema = channel_schema();
        let prior = json!({"id": "9", "name": "ops", "enabled": true, "recipients": ["a"]});
        let plan = plan_resource(&schema, Some(&prior), &Value::Null);

        assert!(plan.planned_state.is_null());
        assert!(plan.changes.iter().all(|c| c.after.is_none()));
        assert_eq!(plan.changes.len(), 3);
    }
}
