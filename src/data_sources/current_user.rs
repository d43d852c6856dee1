//! `sysdig_current_user` data source: the user owning the credentials.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::DataSource;
use crate::client::{ApiRequest, SysdigApi};
use crate::config::Product;
use crate::error::ProviderError;
use crate::schema::{Attribute, Schema};

pub(crate) const CURRENT_USER_PATH: &str = "/api/users/me";

#[derive(Debug, Deserialize)]
struct UserEnvelope {
    user: User,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct User {
    id: i64,
    username: String,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    system_role: Option<String>,
    #[serde(default)]
    customer: Option<Customer>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Customer {
    id: i64,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    external_id: Option<String>,
}

/// Current user lookup.
#[derive(Debug, Clone, Copy, Default)]
pub struct CurrentUser;

#[async_trait]
impl DataSource for CurrentUser {
    fn type_name(&self) -> &str {
        "sysdig_current_user"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_attribute("id", Attribute::computed_string())
            .with_attribute("email", Attribute::computed_string())
            .with_attribute("name", Attribute::computed_string())
            .with_attribute("last_name", Attribute::computed_string())
            .with_attribute("system_role", Attribute::computed_string())
            .with_attribute("customer_id", Attribute::computed_int64())
            .with_attribute("customer_name", Attribute::computed_string())
            .with_attribute("customer_external_id", Attribute::computed_string())
    }

    async fn read(&self, api: &dyn SysdigApi, _config: &Value) -> Result<Value, ProviderError> {
        // Either product can answer; Secure-only setups have no Monitor client.
        let body = match api.execute(ApiRequest::get(Product::Monitor, CURRENT_USER_PATH)).await {
            Err(ProviderError::Configuration(_)) => {
                debug!("Monitor not configured, asking Secure for the current user");
                api.execute(ApiRequest::get(Product::Secure, CURRENT_USER_PATH)).await?
            },
            other => other?,
        };
        let body = body.ok_or_else(|| ProviderError::Internal("empty current user response".to_string()))?;
        let UserEnvelope { user } = serde_json::from_value(body)?;

        let customer = user.customer.as_ref();
        Ok(json!({
            "id": user.id.to_string(),
            "email": user.username,
            "name": user.first_name,
            "last_name": user.last_name,
            "system_role": user.system_role,
            "customer_id": customer.map(|c| c.id),
            "customer_name": customer.and_then(|c| c.name.clone()),
            "customer_external_id": customer.and_then(|c| c.external_id.clone()),
        }))
    }
}
