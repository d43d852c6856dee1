//! `sysdig_secure_macro`: a named Falco condition fragment.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::state::StateReader;
use super::ResourceMapping;
use crate::config::Product;
use crate::error::ProviderError;
use crate::schema::{Attribute, Schema};

/// Body of `/api/secure/falco/macros`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FalcoMacroModel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<i64>,
    name: String,
    condition: MacroCondition,
    #[serde(default)]
    append: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct MacroCondition {
    condition: String,
    #[serde(default)]
    components: Vec<Value>,
}

/// Falco macros, referenced by name from rule conditions.
#[derive(Debug, Clone, Copy, Default)]
pub struct FalcoMacro;

impl ResourceMapping for FalcoMacro {
    type Model = FalcoMacroModel;

    fn type_name(&self) -> &str {
        "sysdig_secure_macro"
    }

    fn product(&self) -> Product {
        Product::Secure
    }

    fn collection_path(&self) -> &str {
        "/api/secure/falco/macros"
    }

    fn schema(&self) -> Schema {
        Schema::resource()
            .with_attribute("name", Attribute::required_string().with_force_new())
            .with_attribute("condition", Attribute::required_string())
            .with_attribute("append", Attribute::optional_bool().with_default(json!(false)))
            .with_attribute("version", Attribute::computed_int64())
    }

    fn to_model(&self, state: &Value) -> Result<FalcoMacroModel, ProviderError> {
        let r = StateReader::new(state);
        Ok(FalcoMacroModel {
            version: r.opt_i64("version"),
            name: r.required_str("name")?,
            condition: MacroCondition {
                condition: r.required_str("condition")?,
                components: Vec::new(),
            },
            append: r.bool_or("append", false),
        })
    }

    fn to_state(&self, model: &FalcoMacroModel, _prior: &Value) -> Result<Value, ProviderError> {
        Ok(json!({
            "version": model.version,
            "name": model.name,
            "condition": model.condition.condition,
            "append": model.append,
        }))
    }
}
