//! Shared types for the adwarden API

use adwarden_util::{ClientId, EntityId, ShiftWindow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Run-state of an entity on the advertising platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Running,
    Paused,
}

impl RunState {
    pub fn from_running(running: bool) -> Self {
        if running { RunState::Running } else { RunState::Paused }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, RunState::Running)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Running => write!(f, "running"),
            RunState::Paused => write!(f, "paused"),
        }
    }
}

/// Level of the advertising object hierarchy that is automated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityLevel {
    Campaign,
    #[default]
    Adset,
    Ad,
}

impl EntityLevel {
    /// Collection name under an ad account
    pub fn edge(&self) -> &'static str {
        match self {
            EntityLevel::Campaign => "campaigns",
            EntityLevel::Adset => "adsets",
            EntityLevel::Ad => "ads",
        }
    }
}

impl fmt::Display for EntityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityLevel::Campaign => write!(f, "campaign"),
            EntityLevel::Adset => write!(f, "adset"),
            EntityLevel::Ad => write!(f, "ad"),
        }
    }
}

/// Per-tick snapshot of one entity as reported by the platform.
/// Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedEntity {
    pub id: EntityId,
    pub name: Option<String>,
    pub run_state: RunState,
    /// Today's accumulated spend, in major currency units
    pub spend: Option<f64>,
    /// Today's allocated daily budget, in major currency units
    pub daily_budget: Option<f64>,
}

impl ObservedEntity {
    /// Spend as a percentage of the daily budget, if the budget is known
    pub fn spend_percent(&self) -> Option<f64> {
        match self.daily_budget {
            Some(budget) if budget > 0.0 => Some(self.spend.unwrap_or(0.0) / budget * 100.0),
            _ => None,
        }
    }
}

/// Persisted automation settings for one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySetting {
    pub entity_id: EntityId,
    /// Shift names in assignment order, without duplicates
    pub assigned_shifts: Vec<String>,
    pub spend_limit_percent: f64,
    pub frozen: bool,
    pub updated_at: DateTime<Utc>,
}

/// Values used when a setting is created for a newly observed entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingDefaults {
    pub shift: String,
    pub spend_limit_percent: f64,
}

/// Partial update of an entity setting. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_shifts: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spend_limit_percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frozen: Option<bool>,
}

impl SettingPatch {
    pub fn is_empty(&self) -> bool {
        self.assigned_shifts.is_none()
            && self.spend_limit_percent.is_none()
            && self.frozen.is_none()
    }

    /// Check field values in isolation (shift existence is checked by the caller)
    pub fn validate(&self) -> Result<(), String> {
        if self.is_empty() {
            return Err("Patch does not change any field".into());
        }
        if let Some(limit) = self.spend_limit_percent
            && (!limit.is_finite() || limit < 0.0)
        {
            return Err(format!("Spend limit must be a non-negative number, got {}", limit));
        }
        if let Some(shifts) = &self.assigned_shifts
            && shifts.iter().any(|s| s.trim().is_empty())
        {
            return Err("Shift names cannot be empty".into());
        }
        Ok(())
    }

    /// Assigned shifts with duplicates removed, first occurrence kept
    pub fn normalized_shifts(&self) -> Option<Vec<String>> {
        self.assigned_shifts.as_ref().map(|shifts| dedup_shifts(shifts))
    }
}

/// Remove duplicate shift names, keeping assignment order
pub fn dedup_shifts(shifts: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(shifts.len());
    for shift in shifts {
        let shift = shift.trim();
        if !out.iter().any(|s| s == shift) {
            out.push(shift.to_string());
        }
    }
    out
}

/// Where a run-state change came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransitionOrigin {
    /// Reconciliation engine enforcing schedule and budget
    Engine,
    /// Explicit request from an operator
    Manual { user: String },
}

/// Why frozen flags were cleared
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResetOrigin {
    DailyReset,
    Manual { user: String },
}

/// Engine view of one entity, for dashboards
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityView {
    pub observed: ObservedEntity,
    pub setting: Option<EntitySetting>,
    pub spend_percent: Option<f64>,
    pub in_schedule: bool,
    pub over_budget: bool,
    /// Run-state the engine would enforce now. None when frozen or unset.
    pub desired: Option<RunState>,
}

/// Outcome of a manual run-state change for one entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStateResult {
    pub entity_id: EntityId,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunStateResult {
    pub fn ok(entity_id: EntityId) -> Self {
        Self {
            entity_id,
            success: true,
            error: None,
        }
    }

    pub fn failed(entity_id: EntityId, error: impl Into<String>) -> Self {
        Self {
            entity_id,
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Audit log entry as exposed to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditView {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub details: serde_json::Value,
}

/// Everything a dashboard needs in one response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardSnapshot {
    pub api_version: u32,
    pub automation_active: bool,
    pub entities: Vec<EntityView>,
    pub shifts: BTreeMap<String, ShiftWindow>,
    pub recent_audit: Vec<AuditView>,
    /// When the observed entity list was fetched from the platform
    pub observed_at: Option<DateTime<Utc>>,
    /// Set when the platform could not be reached for this snapshot
    pub platform_error: Option<String>,
}

/// Counters for one reconciliation tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickSummary {
    pub observed: usize,
    pub evaluated: usize,
    pub frozen: usize,
    pub excluded: usize,
    pub commands: usize,
    pub failures: usize,
}

/// Role for authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientRole {
    /// Local admin - can change settings, shifts, run-states, the master switch
    Admin,
    /// Read-only observer
    Observer,
}

impl ClientRole {
    pub fn can_configure(&self) -> bool {
        matches!(self, ClientRole::Admin)
    }
}

/// Client connection info (set by IPC layer)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub client_id: ClientId,
    pub role: ClientRole,
    /// Unix UID if available
    pub uid: Option<u32>,
}

impl ClientInfo {
    pub fn new(role: ClientRole) -> Self {
        Self {
            client_id: ClientId::new(),
            role,
            uid: None,
        }
    }

    pub fn with_uid(mut self, uid: u32) -> Self {
        self.uid = Some(uid);
        self
    }
}

/// Health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub live: bool,
    pub store_ok: bool,
    pub platform_ok: bool,
    pub automation_active: bool,
}
