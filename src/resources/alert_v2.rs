//! `sysdig_monitor_alert_v2_*`: event, metric and downtime alerts.
//!
//! The three kinds share the alert envelope, notification settings and
//! scope; the `config` object carries the kind-specific condition.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::state::{opt_string_value, single_block, StateReader};
use super::ResourceMapping;
use crate::config::Product;
use crate::error::ProviderError;
use crate::schema::{Attribute, Block, Diagnostic, NestedBlock, Schema};

const SEVERITIES: &[&str] = &["high", "medium", "low", "info"];
const CONDITION_OPERATORS: &[&str] = &[">", ">=", "<", "<=", "=", "!="];
const SCOPE_OPERATORS: &[&str] = &[
    "in",
    "notIn",
    "equals",
    "notEquals",
    "contains",
    "notContains",
    "startsWith",
];
const DOWNTIME_METRIC: &str = "sysdig_container_up";

/// Which condition an alert evaluates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    /// Counts events matching a filter.
    Event,
    /// Compares an aggregated metric against a threshold.
    Metric,
    /// Fires when monitored entities stop reporting.
    Downtime,
}

impl AlertKind {
    fn name(&self) -> &'static str {
        match self {
            AlertKind::Event => "event",
            AlertKind::Metric => "metric",
            AlertKind::Downtime => "downtime",
        }
    }

    fn api_type(&self) -> &'static str {
        match self {
            AlertKind::Event => "EVENT",
            AlertKind::Metric => "MANUAL",
            AlertKind::Downtime => "DOWNTIME",
        }
    }
}

/// Body of the v2 alerts endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertModel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<i64>,
    #[serde(rename = "type")]
    alert_type: String,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default)]
    severity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    group: Option<String>,
    #[serde(default)]
    enabled: bool,
    #[serde(default)]
    duration_sec: i64,
    #[serde(default)]
    notification_channel_config_list: Vec<ChannelConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    custom_notification_template: Option<CustomTemplate>,
    #[serde(default)]
    labels: BTreeMap<String, String>,
    #[serde(default)]
    config: AlertConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelConfig {
    channel_id: i64,
    #[serde(default)]
    notify_on_resolve: bool,
    #[serde(default)]
    re_notify_every_sec: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CustomTemplate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    prepend_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    append_text: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AlertConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scope: Option<ScopeConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    condition_operator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    warning_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    range_sec: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    filter: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metric: Option<MetricRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    time_aggregation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    group_aggregation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    no_data_behaviour: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    segment_by: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ScopeConfig {
    #[serde(default)]
    expressions: Vec<ScopeExpression>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ScopeExpression {
    operand: String,
    operator: String,
    #[serde(default)]
    value: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct MetricRef {
    id: String,
}

/// A v2 alert of one kind.
#[derive(Debug, Clone)]
pub struct AlertV2 {
    kind: AlertKind,
    type_name: String,
}

impl AlertV2 {
    /// An alert resource of `kind`.
    pub fn new(kind: AlertKind) -> Self {
        Self {
            kind,
            type_name: format!("sysdig_monitor_alert_v2_{}", kind.name()),
        }
    }

    fn common_schema(&self) -> Schema {
        let channels = Block::new()
            .with_attribute("id", Attribute::required_int64())
            .with_attribute(
                "renotify_every_minutes",
                Attribute::optional_int64().with_default(json!(0)),
            )
            .with_attribute(
                "notify_on_resolve",
                Attribute::optional_bool().with_default(json!(true)),
            );
        let custom_notification = Block::new()
            .with_attribute("subject", Attribute::optional_string())
            .with_attribute("prepend", Attribute::optional_string())
            .with_attribute("append", Attribute::optional_string());
        let scope = Block::new()
            .with_attribute("label", Attribute::required_string())
            .with_attribute(
                "operator",
                Attribute::required_string().with_allowed_values(SCOPE_OPERATORS.iter().copied()),
            )
            .with_attribute("values", Attribute::optional_string_list());

        Schema::resource()
            .with_attribute("name", Attribute::required_string())
            .with_attribute("description", Attribute::optional_string())
            .with_attribute(
                "severity",
                Attribute::optional_string()
                    .with_default(json!("low"))
                    .with_allowed_values(SEVERITIES.iter().copied()),
            )
            .with_attribute("group", Attribute::optional_string())
            .with_attribute("enabled", Attribute::optional_bool().with_default(json!(true)))
            .with_attribute(
                "duration_seconds",
                Attribute::optional_int64().with_default(json!(0)),
            )
            .with_attribute("labels", Attribute::optional_string_map())
            .with_attribute("version", Attribute::computed_int64())
            .with_block("notification_channels", NestedBlock::set(channels))
            .with_block("custom_notification", NestedBlock::single(custom_notification))
            .with_block("scope", NestedBlock::list(scope))
    }

    fn condition_attributes(schema: Schema) -> Schema {
        schema
            .with_attribute(
                "operator",
                Attribute::required_string().with_allowed_values(CONDITION_OPERATORS.iter().copied()),
            )
            .with_attribute("threshold", Attribute::required_float64())
            .with_attribute("warning_threshold", Attribute::optional_float64())
            .with_attribute("range_seconds", Attribute::required_int64())
    }
}

fn scope_from_state(r: &StateReader<'_>) -> Option<ScopeConfig> {
    let expressions: Vec<ScopeExpression> = r
        .blocks("scope")
        .iter()
        .map(|s| ScopeExpression {
            operand: s.opt_str("label").unwrap_or_default(),
            operator: s.opt_str("operator").unwrap_or_default(),
            value: s.string_list("values"),
        })
        .collect();
    (!expressions.is_empty()).then_some(ScopeConfig { expressions })
}

impl ResourceMapping for AlertV2 {
    type Model = AlertModel;

    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn product(&self) -> Product {
        Product::Monitor
    }

    fn collection_path(&self) -> &str {
        "/monitor/alerts/v1/alerts"
    }

    fn envelope(&self) -> Option<&'static str> {
        Some("alert")
    }

    fn schema(&self) -> Schema {
        let schema = self.common_schema();
        match self.kind {
            AlertKind::Event => Self::condition_attributes(schema)
                .with_attribute("filter", Attribute::required_string())
                .with_attribute("sources", Attribute::optional_string_set()),
            AlertKind::Metric => Self::condition_attributes(schema)
                .with_attribute("metric", Attribute::required_string())
                .with_attribute(
                    "time_aggregation",
                    Attribute::required_string()
                        .with_allowed_values(["avg", "timeAvg", "sum", "min", "max", "rateOfChange"]),
                )
                .with_attribute(
                    "group_aggregation",
                    Attribute::required_string().with_allowed_values(["avg", "sum", "min", "max"]),
                )
                .with_attribute(
                    "no_data_behaviour",
                    Attribute::optional_string()
                        .with_default(json!("DO_NOTHING"))
                        .with_allowed_values(["DO_NOTHING", "TRIGGER"]),
                )
                .with_attribute("group_by", Attribute::optional_string_list()),
            AlertKind::Downtime => schema
                .with_attribute(
                    "range_seconds",
                    Attribute::optional_int64().with_default(json!(600)),
                )
                .with_attribute(
                    "trigger_after_pct",
                    Attribute::optional_int64().with_default(json!(100)),
                )
                .with_attribute("group_by", Attribute::optional_string_list()),
        }
    }

    fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        let r = StateReader::new(config);
        let mut diagnostics = Vec::new();

        if r.i64_or("duration_seconds", 0) < 0 {
            diagnostics.push(
                Diagnostic::error("duration_seconds must not be negative")
                    .with_attribute("duration_seconds"),
            );
        }
        if r.opt_i64("range_seconds").is_some_and(|v| v <= 0) {
            diagnostics.push(
                Diagnostic::error("range_seconds must be greater than zero")
                    .with_attribute("range_seconds"),
            );
        }
        if self.kind == AlertKind::Downtime {
            let pct = r.i64_or("trigger_after_pct", 100);
            if !(1..=100).contains(&pct) {
                diagnostics.push(
                    Diagnostic::error("trigger_after_pct must be between 1 and 100")
                        .with_attribute("trigger_after_pct"),
                );
            }
        }
        diagnostics
    }

    fn to_model(&self, state: &Value) -> Result<AlertModel, ProviderError> {
        let r = StateReader::new(state);

        let channels = r
            .blocks("notification_channels")
            .iter()
            .map(|c| ChannelConfig {
                channel_id: c.i64_or("id", 0),
                notify_on_resolve: c.bool_or("notify_on_resolve", true),
                re_notify_every_sec: c.i64_or("renotify_every_minutes", 0) * 60,
            })
            .collect();
        let template = r.block("custom_notification").map(|c| CustomTemplate {
            subject: c.opt_str("subject"),
            prepend_text: c.opt_str("prepend"),
            append_text: c.opt_str("append"),
        });

        let mut config = AlertConfig {
            scope: scope_from_state(&r),
            range_sec: r.opt_i64("range_seconds"),
            segment_by: r.string_list("group_by"),
            ..AlertConfig::default()
        };
        match self.kind {
            AlertKind::Event | AlertKind::Metric => {
                config.condition_operator = r.opt_str("operator");
                config.threshold = r.opt_f64("threshold");
                config.warning_threshold = r.opt_f64("warning_threshold");
            },
            AlertKind::Downtime => {
                config.condition_operator = Some("<".into());
                config.threshold = Some(r.i64_or("trigger_after_pct", 100) as f64 / 100.0);
                config.metric = Some(MetricRef {
                    id: DOWNTIME_METRIC.into(),
                });
            },
        }
        match self.kind {
            AlertKind::Event => {
                config.filter = r.opt_str("filter");
                config.tags = r.string_list("sources");
            },
            AlertKind::Metric => {
                config.metric = r.opt_str("metric").map(|id| MetricRef { id });
                config.time_aggregation = r.opt_str("time_aggregation");
                config.group_aggregation = r.opt_str("group_aggregation");
                config.no_data_behaviour = Some(r.str_or("no_data_behaviour", "DO_NOTHING"));
            },
            AlertKind::Downtime => {},
        }

        Ok(AlertModel {
            version: r.opt_i64("version"),
            alert_type: self.kind.api_type().to_string(),
            name: r.required_str("name")?,
            description: r.opt_str("description"),
            severity: r.str_or("severity", "low"),
            group: r.opt_str("group"),
            enabled: r.bool_or("enabled", true),
            duration_sec: r.i64_or("duration_seconds", 0),
            notification_channel_config_list: channels,
            custom_notification_template: template,
            labels: r.string_map("labels"),
            config,
        })
    }

    fn to_state(&self, model: &AlertModel, _prior: &Value) -> Result<Value, ProviderError> {
        let channels: Vec<Value> = model
            .notification_channel_config_list
            .iter()
            .map(|c| {
                json!({
                    "id": c.channel_id,
                    "notify_on_resolve": c.notify_on_resolve,
                    "renotify_every_minutes": c.re_notify_every_sec / 60,
                })
            })
            .collect();
        let template = model.custom_notification_template.as_ref().map(|t| {
            json!({
                "subject": opt_string_value(t.subject.as_deref()),
                "prepend": opt_string_value(t.prepend_text.as_deref()),
                "append": opt_string_value(t.append_text.as_deref()),
            })
        });
        let scope: Vec<Value> = model
            .config
            .scope
            .iter()
            .flat_map(|s| s.expressions.iter())
            .map(|e| json!({"label": e.operand, "operator": e.operator, "values": e.value}))
            .collect();

        let mut state = json!({
            "version": model.version,
            "name": model.name,
            "description": opt_string_value(model.description.as_deref()),
            "severity": model.severity,
            "group": opt_string_value(model.group.as_deref()),
            "enabled": model.enabled,
            "duration_seconds": model.duration_sec,
            "labels": model.labels,
            "notification_channels": channels,
            "custom_notification": single_block(template),
            "scope": scope,
            "range_seconds": model.config.range_sec,
        });

        let Value::Object(obj) = &mut state else {
            return Ok(state);
        };
        let config = &model.config;
        match self.kind {
            AlertKind::Event => {
                obj.insert("operator".into(), json!(config.condition_operator));
                obj.insert("threshold".into(), json!(config.threshold));
                obj.insert("warning_threshold".into(), json!(config.warning_threshold));
                obj.insert("filter".into(), json!(config.filter));
                let mut sources = config.tags.clone();
                sources.sort();
                obj.insert("sources".into(), json!(sources));
            },
            AlertKind::Metric => {
                obj.insert("operator".into(), json!(config.condition_operator));
                obj.insert("threshold".into(), json!(config.threshold));
                obj.insert("warning_threshold".into(), json!(config.warning_threshold));
                obj.insert("metric".into(), json!(config.metric.as_ref().map(|m| &m.id)));
                obj.insert("time_aggregation".into(), json!(config.time_aggregation));
                obj.insert("group_aggregation".into(), json!(config.group_aggregation));
                obj.insert("no_data_behaviour".into(), json!(config.no_data_behaviour));
                obj.insert("group_by".into(), json!(config.segment_by));
            },
            AlertKind::Downtime => {
                let pct = config.threshold.map(|t| (t * 100.0).round() as i64).unwrap_or(100);
                obj.insert("trigger_after_pct".into(), json!(pct));
                obj.insert("group_by".into(), json!(config.segment_by));
            },
        }
        Ok(state)
    }
}
