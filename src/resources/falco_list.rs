//! `sysdig_secure_list`: a Falco list.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::state::StateReader;
use super::ResourceMapping;
use crate::config::Product;
use crate::error::ProviderError;
use crate::schema::{Attribute, AttributeFlags, AttributeType, Schema};

/// Body of `/api/secure/falco/lists`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FalcoListModel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<i64>,
    name: String,
    #[serde(default)]
    items: ListItems,
    #[serde(default)]
    append: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ListItems {
    #[serde(default)]
    items: Vec<String>,
}

/// A named list referenced from Falco conditions.
#[derive(Debug, Clone, Copy, Default)]
pub struct FalcoList;

impl ResourceMapping for FalcoList {
    type Model = FalcoListModel;

    fn type_name(&self) -> &str {
        "sysdig_secure_list"
    }

    fn product(&self) -> Product {
        Product::Secure
    }

    fn collection_path(&self) -> &str {
        "/api/secure/falco/lists"
    }

    fn schema(&self) -> Schema {
        Schema::resource()
            .with_attribute("name", Attribute::required_string().with_force_new())
            // Item order is significant to Falco.
            .with_attribute(
                "items",
                Attribute::new(
                    AttributeType::list(AttributeType::String),
                    AttributeFlags::optional(),
                ),
            )
            .with_attribute("append", Attribute::optional_bool().with_default(json!(false)))
            .with_attribute("version", Attribute::computed_int64())
    }

    fn to_model(&self, state: &Value) -> Result<FalcoListModel, ProviderError> {
        let r = StateReader::new(state);
        Ok(FalcoListModel {
            version: r.opt_i64("version"),
            name: r.required_str("name")?,
            items: ListItems {
                items: r.string_list("items"),
            },
            append: r.bool_or("append", false),
        })
    }

    fn to_state(&self, model: &FalcoListModel, _prior: &Value) -> Result<Value, ProviderError> {
        Ok(json!({
            "version": model.version,
            "name": model.name,
            "items": model.items.items,
            "append": model.append,
        }))
    }
}
