//! Notification channels.
//!
//! All kinds share one endpoint and payload shape; they differ in the
//! `type` discriminator and the fields carried in `options`. Each kind's
//! option fields are listed explicitly in a per-kind table, which
//! drives the schema and both directions of the mapping.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::state::StateReader;
use super::ResourceMapping;
use crate::client::{ApiRequest, SysdigApi};
use crate::config::Product;
use crate::error::ProviderError;
use crate::schema::{Attribute, AttributeFlags, AttributeType, Schema};

/// Channel kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ChannelKind {
    /// Email recipients.
    Email,
    /// Slack incoming webhook.
    Slack,
    /// PagerDuty service.
    PagerDuty,
    /// OpsGenie.
    OpsGenie,
    /// VictorOps (Splunk On-Call).
    VictorOps,
    /// Generic JSON webhook.
    Webhook,
    /// Webhook with a custom body template.
    CustomWebhook,
    /// Microsoft Teams.
    MsTeams,
    /// Every member of a Sysdig team.
    TeamEmail,
    /// Prometheus Alertmanager.
    PrometheusAlertManager,
    /// Google Chat.
    GoogleChat,
    /// IBM Cloud Event Notifications (Monitor only).
    IbmEventNotification,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    String,
    Bool,
    Int,
    StringSet,
    StringMap,
}

/// One attribute stored under `options`.
#[derive(Debug, Clone, Copy)]
struct OptionField {
    attr: &'static str,
    api: &'static str,
    kind: FieldKind,
    required: bool,
    sensitive: bool,
    default: Option<&'static str>,
    allowed: &'static [&'static str],
}

const fn field(attr: &'static str, api: &'static str, kind: FieldKind) -> OptionField {
    OptionField {
        attr,
        api,
        kind,
        required: false,
        sensitive: false,
        default: None,
        allowed: &[],
    }
}

const fn required(attr: &'static str, api: &'static str, kind: FieldKind) -> OptionField {
    OptionField {
        required: true,
        ..field(attr, api, kind)
    }
}

const fn secret(attr: &'static str, api: &'static str) -> OptionField {
    OptionField {
        sensitive: true,
        ..required(attr, api, FieldKind::String)
    }
}

const URL: OptionField = required("url", "url", FieldKind::String);
const ADDITIONAL_HEADERS: OptionField = field("additional_headers", "additionalHeaders", FieldKind::StringMap);
const ALLOW_INSECURE: OptionField = field(
    "allow_insecure_connections",
    "allowInsecureConnections",
    FieldKind::Bool,
);

const EMAIL_FIELDS: &[OptionField] = &[required("recipients", "emailRecipients", FieldKind::StringSet)];
const SLACK_FIELDS: &[OptionField] = &[
    URL,
    field("channel", "channel", FieldKind::String),
    field("is_private_channel", "privateChannel", FieldKind::Bool),
    field("private_channel_url", "privateChannelUrl", FieldKind::String),
];
const PAGERDUTY_FIELDS: &[OptionField] = &[
    required("account", "account", FieldKind::String),
    secret("service_key", "serviceKey"),
    required("service_name", "serviceName", FieldKind::String),
];
const OPSGENIE_FIELDS: &[OptionField] = &[
    secret("api_key", "apiKey"),
    OptionField {
        default: Some("US"),
        allowed: &["US", "EU"],
        ..field("region", "region", FieldKind::String)
    },
];
const VICTOROPS_FIELDS: &[OptionField] = &[
    secret("api_key", "apiKey"),
    required("routing_key", "routingKey", FieldKind::String),
];
const WEBHOOK_FIELDS: &[OptionField] = &[
    URL,
    ADDITIONAL_HEADERS,
    ALLOW_INSECURE,
    field("custom_data", "customData", FieldKind::StringMap),
];
const CUSTOM_WEBHOOK_FIELDS: &[OptionField] = &[
    URL,
    required("template", "template", FieldKind::String),
    OptionField {
        default: Some("POST"),
        allowed: &["GET", "POST", "PUT", "DELETE", "PATCH"],
        ..field("http_method", "httpMethod", FieldKind::String)
    },
    ADDITIONAL_HEADERS,
    ALLOW_INSECURE,
];
const URL_ONLY_FIELDS: &[OptionField] = &[URL];
const TEAM_EMAIL_FIELDS: &[OptionField] = &[required("team_id", "teamId", FieldKind::Int)];
const ALERT_MANAGER_FIELDS: &[OptionField] = &[URL, ADDITIONAL_HEADERS, ALLOW_INSECURE];
const IBM_EVENT_FIELDS: &[OptionField] = &[required("instance_id", "instanceId", FieldKind::String)];

const BOTH: &[Product] = &[Product::Monitor, Product::Secure];
const MONITOR_ONLY: &[Product] = &[Product::Monitor];

impl ChannelKind {
    /// Every kind, in registration order.
    pub const ALL: &'static [ChannelKind] = &[
        ChannelKind::Email,
        ChannelKind::Slack,
        ChannelKind::PagerDuty,
        ChannelKind::OpsGenie,
        ChannelKind::VictorOps,
        ChannelKind::Webhook,
        ChannelKind::CustomWebhook,
        ChannelKind::MsTeams,
        ChannelKind::TeamEmail,
        ChannelKind::PrometheusAlertManager,
        ChannelKind::GoogleChat,
        ChannelKind::IbmEventNotification,
    ];

    /// Suffix of the resource type name.
    pub fn name(&self) -> &'static str {
        match self {
            ChannelKind::Email => "email",
            ChannelKind::Slack => "slack",
            ChannelKind::PagerDuty => "pagerduty",
            ChannelKind::OpsGenie => "opsgenie",
            ChannelKind::VictorOps => "victorops",
            ChannelKind::Webhook => "webhook",
            ChannelKind::CustomWebhook => "custom_webhook",
            ChannelKind::MsTeams => "msteams",
            ChannelKind::TeamEmail => "team_email",
            ChannelKind::PrometheusAlertManager => "prometheus_alert_manager",
            ChannelKind::GoogleChat => "google_chat",
            ChannelKind::IbmEventNotification => "ibm_event_notification",
        }
    }

    /// The API `type` discriminator.
    pub fn api_type(&self) -> &'static str {
        match self {
            ChannelKind::Email => "EMAIL",
            ChannelKind::Slack => "SLACK",
            ChannelKind::PagerDuty => "PAGER_DUTY",
            ChannelKind::OpsGenie => "OPSGENIE",
            ChannelKind::VictorOps => "VICTOROPS",
            ChannelKind::Webhook => "WEBHOOK",
            ChannelKind::CustomWebhook => "CUSTOM_WEBHOOK",
            ChannelKind::MsTeams => "MS_TEAMS",
            ChannelKind::TeamEmail => "TEAM_EMAIL",
            ChannelKind::PrometheusAlertManager => "PROMETHEUS_ALERT_MANAGER",
            ChannelKind::GoogleChat => "GCHAT",
            ChannelKind::IbmEventNotification => "IBM_EVENT_NOTIFICATION",
        }
    }

    /// Products that offer this kind.
    pub fn products(&self) -> &'static [Product] {
        match self {
            ChannelKind::IbmEventNotification => MONITOR_ONLY,
            _ => BOTH,
        }
    }

    fn fields(&self) -> &'static [OptionField] {
        match self {
            ChannelKind::Email => EMAIL_FIELDS,
            ChannelKind::Slack => SLACK_FIELDS,
            ChannelKind::PagerDuty => PAGERDUTY_FIELDS,
            ChannelKind::OpsGenie => OPSGENIE_FIELDS,
            ChannelKind::VictorOps => VICTOROPS_FIELDS,
            ChannelKind::Webhook => WEBHOOK_FIELDS,
            ChannelKind::CustomWebhook => CUSTOM_WEBHOOK_FIELDS,
            ChannelKind::MsTeams | ChannelKind::GoogleChat => URL_ONLY_FIELDS,
            ChannelKind::TeamEmail => TEAM_EMAIL_FIELDS,
            ChannelKind::PrometheusAlertManager => ALERT_MANAGER_FIELDS,
            ChannelKind::IbmEventNotification => IBM_EVENT_FIELDS,
        }
    }
}

impl OptionField {
    fn attribute(&self) -> Attribute {
        let attr_type = match self.kind {
            FieldKind::String => AttributeType::String,
            FieldKind::Bool => AttributeType::Bool,
            FieldKind::Int => AttributeType::Int64,
            FieldKind::StringSet => AttributeType::set(AttributeType::String),
            FieldKind::StringMap => AttributeType::map(AttributeType::String),
        };
        let flags = if self.required {
            AttributeFlags::required()
        } else {
            AttributeFlags::optional()
        };

        let mut attr = Attribute::new(attr_type, flags);
        if self.sensitive {
            attr = attr.sensitive();
        }
        if let Some(default) = self.default {
            attr = attr.with_default(json!(default));
        }
        if self.kind == FieldKind::Bool {
            attr = attr.with_default(json!(false));
        }
        if !self.allowed.is_empty() {
            attr = attr.with_allowed_values(self.allowed.iter().copied());
        }
        attr
    }

    fn to_option(&self, r: &StateReader<'_>) -> Option<Value> {
        match self.kind {
            FieldKind::String => r.opt_str(self.attr).or(self.default.map(str::to_string)).map(Value::String),
            FieldKind::Bool => Some(json!(r.bool_or(self.attr, false))),
            FieldKind::Int => r.opt_i64(self.attr).map(|v| json!(v)),
            FieldKind::StringSet => {
                let items = r.string_list(self.attr);
                (!items.is_empty()).then(|| json!(items))
            },
            FieldKind::StringMap => {
                let map = r.string_map(self.attr);
                (!map.is_empty()).then(|| json!(map))
            },
        }
    }

    fn to_state(&self, options: &Map<String, Value>) -> Value {
        let value = options.get(self.api).filter(|v| !v.is_null());
        match (self.kind, value) {
            (FieldKind::String, Some(Value::String(s))) if s.is_empty() => Value::Null,
            (FieldKind::Bool, None) => json!(false),
            (FieldKind::StringSet, Some(Value::Array(items))) => {
                let mut items: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
                items.sort_unstable();
                json!(items)
            },
            (_, Some(v)) => v.clone(),
            (_, None) => Value::Null,
        }
    }
}

/// Body of `/api/notificationChannels`; kind-specific fields live in `options`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelModel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<i64>,
    #[serde(rename = "type")]
    channel_type: String,
    name: String,
    #[serde(default)]
    enabled: bool,
    #[serde(default)]
    send_test_notification: bool,
    #[serde(default)]
    team_id: Option<i64>,
    #[serde(default)]
    options: Map<String, Value>,
}

/// A notification channel of one kind in one product.
#[derive(Debug, Clone)]
pub struct NotificationChannel {
    kind: ChannelKind,
    product: Product,
    type_name: String,
}

impl NotificationChannel {
    /// A `kind` channel managed through `product`.
    pub fn new(kind: ChannelKind, product: Product) -> Self {
        Self {
            kind,
            product,
            type_name: format!("sysdig_{}_notification_channel_{}", product, kind.name()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CurrentUser {
    #[serde(default)]
    current_team: Option<i64>,
}

#[async_trait]
impl ResourceMapping for NotificationChannel {
    type Model = ChannelModel;

    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn product(&self) -> Product {
        self.product
    }

    fn collection_path(&self) -> &str {
        "/api/notificationChannels"
    }

    fn envelope(&self) -> Option<&'static str> {
        Some("notificationChannel")
    }

    fn schema(&self) -> Schema {
        let mut schema = Schema::resource()
            .with_attribute("name", Attribute::required_string())
            .with_attribute("enabled", Attribute::optional_bool().with_default(json!(true)))
            .with_attribute(
                "notify_when_ok",
                Attribute::optional_bool().with_default(json!(false)),
            )
            .with_attribute(
                "notify_when_resolved",
                Attribute::optional_bool().with_default(json!(false)),
            )
            .with_attribute(
                "send_test_notification",
                Attribute::optional_bool()
                    .with_default(json!(false))
                    .with_description("Send a test notification on create/update; never read back"),
            )
            .with_attribute(
                "share_with_current_team",
                Attribute::optional_bool().with_default(json!(false)),
            )
            .with_attribute("version", Attribute::computed_int64());

        for f in self.kind.fields() {
            schema = schema.with_attribute(f.attr, f.attribute());
        }
        schema
    }

    fn to_model(&self, state: &Value) -> Result<ChannelModel, ProviderError> {
        let r = StateReader::new(state);

        let mut options = Map::new();
        for f in self.kind.fields() {
            if let Some(value) = f.to_option(&r) {
                options.insert(f.api.to_string(), value);
            }
        }
        options.insert("notifyOnOk".into(), json!(r.bool_or("notify_when_ok", false)));
        options.insert(
            "notifyOnResolve".into(),
            json!(r.bool_or("notify_when_resolved", false)),
        );

        Ok(ChannelModel {
            version: r.opt_i64("version"),
            channel_type: self.kind.api_type().to_string(),
            name: r.required_str("name")?,
            enabled: r.bool_or("enabled", true),
            send_test_notification: r.bool_or("send_test_notification", false),
            team_id: None,
            options,
        })
    }

    async fn prepare(
        &self,
        api: &dyn SysdigApi,
        state: &Value,
        model: &mut ChannelModel,
    ) -> Result<(), ProviderError> {
        if !StateReader::new(state).bool_or("share_with_current_team", false) {
            return Ok(());
        }

        let body = api
            .execute(ApiRequest::get(self.product, "/api/users/me"))
            .await?
            .unwrap_or(Value::Null);
        let user: CurrentUser =
            serde_json::from_value(body.get("user").cloned().unwrap_or(json!({})))?;

        model.team_id = Some(user.current_team.ok_or_else(|| {
            ProviderError::Internal("current user has no current team".to_string())
        })?);
        Ok(())
    }

    fn to_state(&self, model: &ChannelModel, prior: &Value) -> Result<Value, ProviderError> {
        let bool_option = |key: &str| model.options.get(key).and_then(Value::as_bool).unwrap_or(false);
        // Write-only: the backend does not echo it back.
        let send_test = StateReader::new(prior).bool_or("send_test_notification", false);

        let mut state = json!({
            "version": model.version,
            "name": model.name,
            "enabled": model.enabled,
            "notify_when_ok": bool_option("notifyOnOk"),
            "notify_when_resolved": bool_option("notifyOnResolve"),
            "send_test_notification": send_test,
            "share_with_current_team": model.team_id.is_some(),
        });

        if let Value::Object(obj) = &mut state {
            for f in self.kind.fields() {
                obj.insert(f.attr.to_string(), f.to_state(&model.options));
            }
        }
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{Reconciler, Resource};

    #[test]
    fn test_type_names() {
        let slack = NotificationChannel::new(ChannelKind::Slack, Product::Secure);
        assert_eq!(slack.type_name(), "sysdig_secure_notification_channel_slack");
        let ibm = NotificationChannel::new(ChannelKind::IbmEventNotification, Product::Monitor);
        assert_eq!(
            ibm.type_name(),
            "sysdig_monitor_notification_channel_ibm_event_notification"
        );
    }

    #[test]
    fn test_required_option_fields() {
        let resource = Reconciler::new(NotificationChannel::new(ChannelKind::PagerDuty, Product::Monitor));
        let diagnostics = resource.validate(&json!({"name": "pd", "account": "acme"}));
        let summaries: Vec<&str> = diagnostics.iter().map(|d| d.summary.as_str()).collect();
        assert!(summaries.contains(&"Missing required attribute 'service_key'"));
        assert!(summaries.contains(&"Missing required attribute 'service_name'"));
    }

    #[test]
    fn test_opsgenie_region_values() {
        let resource = Reconciler::new(NotificationChannel::new(ChannelKind::OpsGenie, Product::Secure));
        let diagnostics = resource.validate(&json!({"name": "og", "api_key": "k", "region": "APAC"}));
        assert_eq!(diagnostics[0].summary, "Invalid value for attribute 'region'");
        assert!(resource
            .validate(&json!({"name": "og", "api_key": "k"}))
            .is_empty());
    }

    #[test]
    fn test_email_mapping() {
        let channel = NotificationChannel::new(ChannelKind::Email, Product::Monitor);
        let state = json!({
            "name": "oncall",
            "recipients": ["b@example.com", "a@example.com"],
            "notify_when_resolved": true,
            "send_test_notification": true
        });

        let model = channel.to_model(&state).unwrap();
        let body = serde_json::to_value(&model).unwrap();
        assert_eq!(body["type"], "EMAIL");
        assert_eq!(body["enabled"], true);
        assert_eq!(body["options"]["emailRecipients"], json!(["b@example.com", "a@example.com"]));
        assert_eq!(body["options"]["notifyOnResolve"], true);

        let read = channel.to_state(&model, &state).unwrap();
        assert_eq!(read["recipients"], json!(["a@example.com", "b@example.com"]));
        assert_eq!(read["send_test_notification"], true);
        assert_eq!(read["share_with_current_team"], false);

        let imported = channel.to_state(&model, &Value::Null).unwrap();
        assert_eq!(imported["send_test_notification"], false);
    }

    #[test]
    fn test_custom_webhook_defaults() {
        let channel = NotificationChannel::new(ChannelKind::CustomWebhook, Product::Secure);
        let model = channel
            .to_model(&json!({"name": "hook", "url": "https://hooks.example.com", "template": "{}"}))
            .unwrap();
        assert_eq!(model.options["httpMethod"], "POST");
        assert_eq!(model.options["allowInsecureConnections"], false);
        assert!(model.options.get("additionalHeaders").is_none());
    }
}
