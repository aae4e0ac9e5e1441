//! Response bodies as returned by the Graph API

use adwarden_api::{ObservedEntity, RunState};
use adwarden_util::EntityId;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

#[derive(Debug, Deserialize)]
pub(crate) struct ListResponse {
    /// Rows are decoded one by one so a bad row only loses itself
    #[serde(default)]
    pub data: Vec<Value>,
    pub paging: Option<Paging>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Paging {
    pub next: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawEntity {
    pub id: String,
    pub name: Option<String>,
    pub status: String,
    #[serde(default, deserialize_with = "loose_number")]
    pub daily_budget: Option<f64>,
    pub insights: Option<Insights>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Insights {
    #[serde(default)]
    pub data: Vec<InsightRow>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct InsightRow {
    #[serde(default, deserialize_with = "loose_number")]
    pub spend: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorEnvelope {
    pub error: ApiError,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiError {
    pub message: String,
    pub code: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UpdateResponse {
    #[serde(default)]
    pub success: bool,
}

/// Numbers arrive as JSON strings ("10000") or numbers depending on the field
fn loose_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

pub(crate) fn run_state_from_status(status: &str) -> Option<RunState> {
    match status {
        "ACTIVE" => Some(RunState::Running),
        "PAUSED" => Some(RunState::Paused),
        _ => None,
    }
}

pub(crate) fn status_for(state: RunState) -> &'static str {
    match state {
        RunState::Running => "ACTIVE",
        RunState::Paused => "PAUSED",
    }
}

impl RawEntity {
    /// None for statuses the engine cannot control (archived, deleted, ...)
    pub(crate) fn into_observed(self, budget_in_minor_units: bool) -> Option<ObservedEntity> {
        let run_state = run_state_from_status(&self.status)?;

        let spend = self
            .insights
            .and_then(|i| i.data.into_iter().next())
            .and_then(|row| row.spend);
        let daily_budget = self.daily_budget.map(|b| {
            if budget_in_minor_units {
                b / 100.0
            } else {
                b
            }
        });

        Some(ObservedEntity {
            id: EntityId::new(self.id),
            name: self.name,
            run_state,
            spend,
            daily_budget,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_string_and_numeric_amounts() {
        let raw: RawEntity = serde_json::from_str(
            r#"{
                "id": "1",
                "name": "Night traffic",
                "status": "ACTIVE",
                "daily_budget": "10000",
                "insights": { "data": [ { "spend": "41.37" } ] }
            }"#,
        )
        .unwrap();

        let observed = raw.into_observed(true).unwrap();
        assert_eq!(observed.run_state, RunState::Running);
        assert_eq!(observed.daily_budget, Some(100.0));
        assert_eq!(observed.spend, Some(41.37));
    }

    #[test]
    fn missing_insights_means_no_spend() {
        let raw: RawEntity =
            serde_json::from_str(r#"{ "id": "2", "status": "PAUSED", "daily_budget": 2500 }"#)
                .unwrap();

        let observed = raw.into_observed(false).unwrap();
        assert_eq!(observed.spend, None);
        assert_eq!(observed.daily_budget, Some(2500.0));
    }

    #[test]
    fn uncontrollable_statuses_are_dropped() {
        let raw: RawEntity =
            serde_json::from_str(r#"{ "id": "3", "status": "ARCHIVED" }"#).unwrap();
        assert!(raw.into_observed(true).is_none());
    }
}
