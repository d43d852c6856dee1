//! `sysdig_secure_zone` data source: look a zone up by id or name.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::{list_items, schema_diagnostics, DataSource};
use crate::client::{ApiRequest, SysdigApi};
use crate::config::Product;
use crate::error::ProviderError;
use crate::resources::state::{opt_string_value, StateReader};
use crate::resources::zone::{expression_block, expression_state, ZoneModel, ZoneScopeModel, ZONES_PATH};
use crate::resources::{id_string, parse_rules, render_rules};
use crate::schema::{Attribute, Block, Diagnostic, NestedBlock, Schema};

/// Zone lookup.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZoneLookup;

fn scope_output(scope: &ZoneScopeModel) -> Value {
    let rules = scope.rules.as_deref().filter(|r| !r.is_empty());
    let (rules, expression) = match rules {
        Some(rules) => (rules.to_string(), parse_rules(rules).unwrap_or_default()),
        None => (render_rules(&scope.expression), scope.expression.clone()),
    };
    json!({
        "target_type": scope.target_type,
        "rules": opt_string_value(Some(&rules)),
        "expression": expression_state(&expression),
    })
}

fn zone_output(id: &str, zone: &ZoneModel) -> Value {
    let scope: Vec<Value> = zone.scopes.iter().map(scope_output).collect();
    json!({
        "id": id,
        "name": zone.name,
        "description": opt_string_value(zone.description.as_deref()),
        "is_system": zone.is_system,
        "author": zone.author,
        "last_modified_by": zone.last_modified_by,
        "last_updated": zone.last_updated,
        "scope": scope,
    })
}

impl ZoneLookup {
    async fn by_name(&self, api: &dyn SysdigApi, name: &str) -> Result<Value, ProviderError> {
        let body = api.execute(ApiRequest::get(Product::Secure, ZONES_PATH)).await?;
        list_items(body)
            .into_iter()
            .find(|zone| zone.get("name").and_then(Value::as_str) == Some(name))
            .ok_or_else(|| ProviderError::NotFound(format!("zone \"{}\" not found", name)))
    }
}

#[async_trait]
impl DataSource for ZoneLookup {
    fn type_name(&self) -> &str {
        "sysdig_secure_zone"
    }

    fn schema(&self) -> Schema {
        let scope = Block::new()
            .with_attribute("target_type", Attribute::computed_string())
            .with_attribute("rules", Attribute::computed_string())
            .with_block("expression", NestedBlock::list(expression_block()));

        Schema::v0()
            .with_description("Look up a Sysdig Secure zone")
            .with_attribute("id", Attribute::optional_string())
            .with_attribute("name", Attribute::optional_string())
            .with_attribute("description", Attribute::computed_string())
            .with_attribute("is_system", Attribute::computed_bool())
            .with_attribute("author", Attribute::computed_string())
            .with_attribute("last_modified_by", Attribute::computed_string())
            .with_attribute("last_updated", Attribute::computed_int64())
            .with_block("scope", NestedBlock::set(scope))
    }

    fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        let mut diagnostics = schema_diagnostics(&self.schema(), config);
        let r = StateReader::new(config);
        if r.id().is_some() == r.opt_str("name").is_some() {
            diagnostics.push(Diagnostic::error("exactly one of id or name must be set"));
        }
        diagnostics
    }

    async fn read(&self, api: &dyn SysdigApi, config: &Value) -> Result<Value, ProviderError> {
        let r = StateReader::new(config);
        let body = match (r.id(), r.opt_str("name")) {
            (Some(id), None) => {
                let path = format!("{}/{}", ZONES_PATH, id);
                api.execute(ApiRequest::get(Product::Secure, path))
                    .await?
                    .ok_or_else(|| ProviderError::NotFound(format!("zone {} not found", id)))?
            },
            (None, Some(name)) => self.by_name(api, &name).await?,
            _ => {
                return Err(ProviderError::Validation(
                    "exactly one of id or name must be set".to_string(),
                ))
            },
        };

        let id = id_string(body.get("id"))
            .ok_or_else(|| ProviderError::Internal("zone response carries no identifier".to_string()))?;
        let zone: ZoneModel = serde_json::from_value(body)?;
        debug!(id = %id, name = %zone.name, "Read zone");
        Ok(zone_output(&id, &zone))
    }
}
