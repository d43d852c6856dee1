//! `sysdig_monitor_team` and `sysdig_secure_team`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::state::{opt_string_value, single_block, StateReader};
use super::ResourceMapping;
use crate::config::Product;
use crate::error::ProviderError;
use crate::schema::{Attribute, AttributeFlags, AttributeType, Block, Diagnostic, NestedBlock, Schema};

const TEAM_ROLES: &[&str] = &[
    "ROLE_TEAM_EDIT",
    "ROLE_TEAM_READ",
    "ROLE_TEAM_MANAGER",
    "ROLE_TEAM_STANDARD",
    "ROLE_TEAM_SERVICE_MANAGER",
];

const ENTRYPOINTS: &[&str] = &[
    "Explore",
    "Dashboards",
    "Events",
    "Alerts",
    "Settings",
    "DashboardTemplates",
    "Advisor",
];

/// Body of `/api/teams`, shared by Monitor and Secure teams.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamModel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<i64>,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    theme: Option<String>,
    #[serde(default)]
    show: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    filter: Option<String>,
    #[serde(default)]
    can_use_sysdig_capture: bool,
    #[serde(default)]
    can_see_infrastructure_events: bool,
    #[serde(default)]
    can_use_aws_metrics: bool,
    #[serde(default)]
    default: bool,
    #[serde(default)]
    products: Vec<String>,
    #[serde(default)]
    user_roles: Vec<UserRole>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    entry_point: Option<EntryPoint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    zone_ids: Vec<i64>,
    #[serde(default)]
    all_zones: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserRole {
    user_name: String,
    role: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntryPoint {
    module: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    selection: Option<String>,
}

/// A team, scoped to one product. Monitor teams carry an entrypoint and
/// infrastructure settings; Secure teams carry zones.
#[derive(Debug, Clone, Copy)]
pub struct Team {
    product: Product,
}

impl Team {
    /// A team for `product`.
    pub fn new(product: Product) -> Self {
        Self { product }
    }

    fn product_code(&self) -> &'static str {
        match self.product {
            Product::Monitor => "SDC",
            Product::Secure => "SDS",
        }
    }
}

impl ResourceMapping for Team {
    type Model = TeamModel;

    fn type_name(&self) -> &str {
        match self.product {
            Product::Monitor => "sysdig_monitor_team",
            Product::Secure => "sysdig_secure_team",
        }
    }

    fn product(&self) -> Product {
        self.product
    }

    fn collection_path(&self) -> &str {
        "/api/teams"
    }

    fn envelope(&self) -> Option<&'static str> {
        Some("team")
    }

    fn schema(&self) -> Schema {
        let user_roles = Block::new()
            .with_attribute("email", Attribute::required_string())
            .with_attribute(
                "role",
                Attribute::optional_string()
                    .with_default(json!("ROLE_TEAM_STANDARD"))
                    .with_allowed_values(TEAM_ROLES.iter().copied()),
            );

        let schema = Schema::resource()
            .with_attribute("name", Attribute::required_string())
            .with_attribute("description", Attribute::optional_string())
            .with_attribute("theme", Attribute::optional_string().with_default(json!("#05C391")))
            .with_attribute(
                "scope_by",
                Attribute::optional_string()
                    .with_default(json!("host"))
                    .with_allowed_values(["host", "container"]),
            )
            .with_attribute("filter", Attribute::optional_string())
            .with_attribute(
                "use_sysdig_capture",
                Attribute::optional_bool().with_default(json!(true)),
            )
            .with_attribute(
                "default_team",
                Attribute::optional_bool().with_default(json!(false)),
            )
            .with_attribute("version", Attribute::computed_int64())
            .with_block("user_roles", NestedBlock::set(user_roles));

        match self.product {
            Product::Monitor => schema
                .with_attribute(
                    "can_see_infrastructure_events",
                    Attribute::optional_bool().with_default(json!(false)),
                )
                .with_attribute(
                    "can_use_aws_data",
                    Attribute::optional_bool().with_default(json!(false)),
                )
                .with_block(
                    "entrypoint",
                    NestedBlock::single(
                        Block::new()
                            .with_attribute(
                                "type",
                                Attribute::required_string()
                                    .with_allowed_values(ENTRYPOINTS.iter().copied()),
                            )
                            .with_attribute("selection", Attribute::optional_string()),
                    )
                    .with_min_items(1),
                ),
            Product::Secure => schema
                .with_attribute(
                    "all_zones",
                    Attribute::optional_bool().with_default(json!(false)),
                )
                .with_attribute(
                    "zone_ids",
                    Attribute::new(
                        AttributeType::set(AttributeType::Int64),
                        AttributeFlags::optional(),
                    ),
                ),
        }
    }

    fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        let r = StateReader::new(config);
        if r.bool_or("all_zones", false) && !r.int_list("zone_ids").is_empty() {
            return vec![Diagnostic::error(
                "\"all_zones\" cannot be used together with \"zone_ids\"",
            )
            .with_attribute("all_zones")];
        }
        Vec::new()
    }

    fn to_model(&self, state: &Value) -> Result<TeamModel, ProviderError> {
        let r = StateReader::new(state);
        let user_roles = r
            .blocks("user_roles")
            .iter()
            .map(|u| UserRole {
                user_name: u.opt_str("email").unwrap_or_default(),
                role: u.str_or("role", "ROLE_TEAM_STANDARD"),
            })
            .collect();
        let entry_point = r.block("entrypoint").map(|e| EntryPoint {
            module: e.opt_str("type").unwrap_or_default(),
            selection: e.opt_str("selection"),
        });

        Ok(TeamModel {
            version: r.opt_i64("version"),
            name: r.required_str("name")?,
            description: r.opt_str("description"),
            theme: r.opt_str("theme"),
            show: r.str_or("scope_by", "host"),
            filter: r.opt_str("filter"),
            can_use_sysdig_capture: r.bool_or("use_sysdig_capture", true),
            can_see_infrastructure_events: r.bool_or("can_see_infrastructure_events", false),
            can_use_aws_metrics: r.bool_or("can_use_aws_data", false),
            default: r.bool_or("default_team", false),
            products: vec![self.product_code().to_string()],
            user_roles,
            entry_point,
            zone_ids: r.int_list("zone_ids"),
            all_zones: r.bool_or("all_zones", false),
        })
    }

    fn to_state(&self, model: &TeamModel, _prior: &Value) -> Result<Value, ProviderError> {
        let user_roles: Vec<Value> = model
            .user_roles
            .iter()
            .map(|u| json!({"email": u.user_name, "role": u.role}))
            .collect();

        let mut state = json!({
            "version": model.version,
            "name": model.name,
            "description": opt_string_value(model.description.as_deref()),
            "theme": opt_string_value(model.theme.as_deref()),
            "scope_by": model.show,
            "filter": opt_string_value(model.filter.as_deref()),
            "use_sysdig_capture": model.can_use_sysdig_capture,
            "default_team": model.default,
            "user_roles": user_roles,
        });

        if let Value::Object(obj) = &mut state {
            match self.product {
                Product::Monitor => {
                    obj.insert(
                        "can_see_infrastructure_events".into(),
                        json!(model.can_see_infrastructure_events),
                    );
                    obj.insert("can_use_aws_data".into(), json!(model.can_use_aws_metrics));
                    let entrypoint = model.entry_point.as_ref().map(|e| {
                        json!({
                            "type": e.module,
                            "selection": opt_string_value(e.selection.as_deref()),
                        })
                    });
                    obj.insert("entrypoint".into(), single_block(entrypoint));
                },
                Product::Secure => {
                    obj.insert("all_zones".into(), json!(model.all_zones));
                    obj.insert("zone_ids".into(), json!(model.zone_ids));
                },
            }
        }
        Ok(state)
    }
}
