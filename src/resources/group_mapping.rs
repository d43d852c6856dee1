//! `sysdig_group_mapping`: SSO group to role/team assignment.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::state::StateReader;
use super::ResourceMapping;
use crate::config::Product;
use crate::error::ProviderError;
use crate::schema::{Attribute, AttributeFlags, AttributeType, Block, Diagnostic, NestedBlock, Schema};

/// Body of `/api/groupmappings`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMappingModel {
    group_name: String,
    role: String,
    #[serde(default)]
    system_role: String,
    team_map: TeamMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    weight: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TeamMap {
    #[serde(default)]
    all_teams: bool,
    #[serde(default)]
    team_ids: Vec<i64>,
}

/// Maps an SSO group to a role and a set of teams.
#[derive(Debug, Clone, Copy, Default)]
pub struct GroupMapping;

impl ResourceMapping for GroupMapping {
    type Model = GroupMappingModel;

    fn type_name(&self) -> &str {
        "sysdig_group_mapping"
    }

    fn product(&self) -> Product {
        Product::Monitor
    }

    fn collection_path(&self) -> &str {
        "/api/groupmappings"
    }

    fn schema(&self) -> Schema {
        let team_map = Block::new()
            .with_attribute("all_teams", Attribute::optional_bool().with_default(json!(false)))
            .with_attribute(
                "team_ids",
                Attribute::new(
                    AttributeType::set(AttributeType::Int64),
                    AttributeFlags::optional(),
                ),
            );

        Schema::resource()
            .with_attribute("group_name", Attribute::required_string())
            .with_attribute("role", Attribute::required_string())
            .with_attribute(
                "system_role",
                Attribute::optional_string()
                    .with_default(json!("ROLE_USER"))
                    .with_allowed_values(["ROLE_USER", "ROLE_CUSTOMER"]),
            )
            .with_attribute("weight", Attribute::optional_int64())
            .with_block("team_map", NestedBlock::single(team_map).with_min_items(1))
    }

    fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        let r = StateReader::new(config);
        let Some(team_map) = r.block("team_map") else {
            return Vec::new();
        };

        let all_teams = team_map.bool_or("all_teams", false);
        let team_ids = team_map.int_list("team_ids");
        match (all_teams, team_ids.is_empty()) {
            (true, false) => vec![Diagnostic::error(
                "\"all_teams\" cannot be used together with \"team_ids\"",
            )
            .with_attribute("team_map.0.all_teams")],
            (false, true) => vec![Diagnostic::error(
                "team_map requires all_teams = true or at least one team id",
            )
            .with_attribute("team_map.0")],
            _ => Vec::new(),
        }
    }

    fn to_model(&self, state: &Value) -> Result<GroupMappingModel, ProviderError> {
        let r = StateReader::new(state);
        let team_map = r
            .block("team_map")
            .map(|t| TeamMap {
                all_teams: t.bool_or("all_teams", false),
                team_ids: t.int_list("team_ids"),
            })
            .unwrap_or_default();

        Ok(GroupMappingModel {
            group_name: r.required_str("group_name")?,
            role: r.required_str("role")?,
            system_role: r.str_or("system_role", "ROLE_USER"),
            team_map,
            weight: r.opt_i64("weight"),
        })
    }

    fn to_state(&self, model: &GroupMappingModel, _prior: &Value) -> Result<Value, ProviderError> {
        Ok(json!({
            "group_name": model.group_name,
            "role": model.role,
            "system_role": model.system_role,
            "weight": model.weight,
            "team_map": [{
                "all_teams": model.team_map.all_teams,
                "team_ids": model.team_map.team_ids,
            }],
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{Reconciler, Resource};

    #[test]
    fn test_team_map_rules() {
        let resource = Reconciler::new(GroupMapping);
        let base = |team_map: Value| {
            json!({"group_name": "admins", "role": "ROLE_TEAM_EDIT", "team_map": [team_map]})
        };

        let diagnostics = resource.validate(&base(json!({"all_teams": true, "team_ids": [1]})));
        assert!(diagnostics[0].summary.contains("cannot be used together with"));

        let diagnostics = resource.validate(&base(json!({})));
        assert!(diagnostics[0].summary.contains("team_map requires"));

        assert!(resource.validate(&base(json!({"all_teams": true}))).is_empty());
        assert!(resource.validate(&base(json!({"team_ids": [4, 5]}))).is_empty());
    }

    #[test]
    fn test_payload_shape() {
        let model = GroupMapping
            .to_model(&json!({
                "group_name": "admins",
                "role": "ROLE_TEAM_EDIT",
                "team_map": [{"all_teams": false, "team_ids": [4]}]
            }))
            .unwrap();
        let body = serde_json::to_value(&model).unwrap();
        assert_eq!(body["groupName"], "admins");
        assert_eq!(body["systemRole"], "ROLE_USER");
        assert_eq!(body["teamMap"]["teamIds"], json!([4]));
    }
}
