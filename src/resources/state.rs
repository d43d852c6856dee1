//! Typed access to resource state.
//!
//! State arrives as untyped JSON. Mappings read it through [`StateReader`]
//! so that absent, `null` and empty-string values are treated uniformly.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::error::ProviderError;

/// Read-only view over one state object (or one nested block item).
#[derive(Debug, Clone, Copy)]
pub struct StateReader<'a> {
    obj: Option<&'a Map<String, Value>>,
}

impl<'a> StateReader<'a> {
    /// Wrap a state value. Non-objects read as empty.
    pub fn new(value: &'a Value) -> Self {
        Self {
            obj: value.as_object(),
        }
    }

    /// Raw value of an attribute, with `null` reported as absent.
    pub fn get(&self, name: &str) -> Option<&'a Value> {
        self.obj
            .and_then(|obj| obj.get(name))
            .filter(|v| !v.is_null())
    }

    /// The remote id, if the resource has been created.
    pub fn id(&self) -> Option<String> {
        match self.get("id")? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// A string attribute that must be set and non-empty.
    pub fn required_str(&self, name: &str) -> Result<String, ProviderError> {
        self.opt_str(name).ok_or_else(|| {
            ProviderError::Validation(format!("Missing required attribute '{}'", name))
        })
    }

    /// A string attribute; empty strings read as unset.
    pub fn opt_str(&self, name: &str) -> Option<String> {
        self.get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    /// A string attribute with a fallback.
    pub fn str_or(&self, name: &str, default: &str) -> String {
        self.opt_str(name).unwrap_or_else(|| default.to_string())
    }

    /// A bool attribute.
    pub fn opt_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    /// A bool attribute with a fallback.
    pub fn bool_or(&self, name: &str, default: bool) -> bool {
        self.opt_bool(name).unwrap_or(default)
    }

    /// An integer attribute. Integral floats and numeric strings are accepted.
    pub fn opt_i64(&self, name: &str) -> Option<i64> {
        match self.get(name)? {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// An integer attribute with a fallback.
    pub fn i64_or(&self, name: &str, default: i64) -> i64 {
        self.opt_i64(name).unwrap_or(default)
    }

    /// A float attribute.
    pub fn opt_f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_f64)
    }

    /// Elements of a string list or set, in state order.
    pub fn string_list(&self, name: &str) -> Vec<String> {
        match self.get(name) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Elements of an integer list or set.
    pub fn int_list(&self, name: &str) -> Vec<i64> {
        match self.get(name) {
            Some(Value::Array(items)) => items.iter().filter_map(Value::as_i64).collect(),
            _ => Vec::new(),
        }
    }

    /// A string map.
    pub fn string_map(&self, name: &str) -> BTreeMap<String, String> {
        match self.get(name) {
            Some(Value::Object(obj)) => obj
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect(),
            _ => BTreeMap::new(),
        }
    }

    /// Items of a nested block.
    pub fn blocks(&self, name: &str) -> Vec<StateReader<'a>> {
        match self.get(name) {
            Some(Value::Array(items)) => items.iter().map(StateReader::new).collect(),
            _ => Vec::new(),
        }
    }

    /// The first item of a single nested block.
    pub fn block(&self, name: &str) -> Option<StateReader<'a>> {
        self.blocks(name).into_iter().next()
    }
}

/// `Some(s)` as a JSON string, `None` and `""` as `null`.
pub fn opt_string_value(value: Option<&str>) -> Value {
    match value {
        Some(s) if !s.is_empty() => Value::String(s.to_string()),
        _ => Value::Null,
    }
}

/// A single nested block as stored in state: a one-element list.
pub fn single_block(item: Option<Value>) -> Value {
    match item {
        Some(item) => Value::Array(vec![item]),
        None => Value::Array(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_strings_read_as_unset() {
        let state = json!({"name": "ops", "description": "", "filter": null});
        let r = StateReader::new(&state);

        assert_eq!(r.required_str("name").unwrap(), "ops");
        assert_eq!(r.opt_str("description"), None);
        assert_eq!(r.opt_str("filter"), None);
        assert!(r.required_str("description").is_err());
        assert_eq!(r.str_or("theme", "#05C391"), "#05C391");
    }

    #[test]
    fn test_numbers() {
        let state = json!({"id": 42, "limit": 5.0, "team_id": "17", "threshold": 0.5});
        let r = StateReader::new(&state);

        assert_eq!(r.id(), Some("42".to_string()));
        assert_eq!(r.opt_i64("limit"), Some(5));
        assert_eq!(r.opt_i64("team_id"), Some(17));
        assert_eq!(r.opt_i64("threshold"), None);
        assert_eq!(r.opt_f64("threshold"), Some(0.5));
        assert_eq!(r.i64_or("reservation", 0), 0);
    }

    #[test]
    fn test_collections_and_blocks() {
        let state = json!({
            "tags": ["container", "shell"],
            "labels": {"env": "prod", "bad": 1},
            "scope": [{"target_type": "aws", "rules": "account in (\"a1\")"}]
        });
        let r = StateReader::new(&state);

        assert_eq!(r.string_list("tags"), vec!["container", "shell"]);
        assert_eq!(r.string_map("labels").len(), 1);
        let scope = r.block("scope").unwrap();
        assert_eq!(scope.opt_str("target_type").as_deref(), Some("aws"));
        assert!(r.blocks("missing").is_empty());
    }

    #[test]
    fn test_value_helpers() {
        assert_eq!(opt_string_value(Some("")), Value::Null);
        assert_eq!(opt_string_value(Some("x")), json!("x"));
        assert_eq!(single_block(None), json!([]));
        assert_eq!(single_block(Some(json!({"a": 1}))), json!([{"a": 1}]));
    }
}
