//! Command types for the adwarden protocol

use adwarden_util::{ClientId, EntityId, ShiftWindow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{
    AuditView, DashboardSnapshot, EntitySetting, HealthStatus, RunState, RunStateResult,
    SettingPatch, API_VERSION,
};

/// Request wrapper with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Request ID for correlation
    pub request_id: u64,
    /// API version
    pub api_version: u32,
    /// The command
    pub command: Command,
}

impl Request {
    pub fn new(request_id: u64, command: Command) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            command,
        }
    }
}

/// Response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Corresponding request ID
    pub request_id: u64,
    /// API version
    pub api_version: u32,
    /// Response payload or error
    pub result: ResponseResult,
}

impl Response {
    pub fn success(request_id: u64, payload: ResponsePayload) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Ok(payload),
        }
    }

    pub fn error(request_id: u64, error: ErrorInfo) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Err(error),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseResult {
    Ok(ResponsePayload),
    Err(ErrorInfo),
}

/// Error information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Error codes for the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidRequest,
    EntityNotFound,
    ShiftNotFound,
    PermissionDenied,
    PlatformError,
    StoreError,
    InternalError,
}

/// All possible commands from clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Observed entities, settings, shifts, master switch and recent audit
    GetSnapshot {
        /// Bypass the short-lived observed-state cache
        #[serde(default)]
        refresh: bool,
    },

    /// List all entity settings
    ListSettings,

    /// List all shifts
    ListShifts,

    /// Change fields of one entity setting
    UpdateSetting {
        entity_id: EntityId,
        patch: SettingPatch,
        user: String,
        #[serde(default)]
        note: Option<String>,
    },

    /// Apply the same change to several entity settings (all or nothing)
    BulkUpdateSettings {
        entity_ids: Vec<EntityId>,
        patch: SettingPatch,
        user: String,
    },

    /// Clear the frozen flag on every entity
    ClearFrozen { user: String },

    /// Replace the window of an existing shift
    UpdateShift {
        name: String,
        window: ShiftWindow,
        user: String,
    },

    /// Flip the automation master switch
    ToggleAutomation { user: String },

    /// Set run-states on the platform directly, reporting each id separately.
    /// Not sticky: the next tick re-applies policy unless the entity is frozen.
    SetRunState {
        entity_ids: Vec<EntityId>,
        state: RunState,
        user: String,
    },

    /// Same as `SetRunState`, executed once at `execute_at`
    ScheduleRunState {
        entity_ids: Vec<EntityId>,
        state: RunState,
        execute_at: DateTime<Utc>,
        user: String,
    },

    /// Recent audit log entries, newest first
    GetAudit {
        #[serde(default = "default_audit_limit")]
        limit: usize,
    },

    /// Subscribe to events (returns immediately, events stream separately)
    SubscribeEvents,

    /// Unsubscribe from events
    UnsubscribeEvents,

    /// Get health status
    GetHealth,

    /// Ping for keepalive
    Ping,
}

fn default_audit_limit() -> usize {
    50
}

impl Command {
    /// Commands that change settings, shifts, the master switch or run-states
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Command::UpdateSetting { .. }
                | Command::BulkUpdateSettings { .. }
                | Command::ClearFrozen { .. }
                | Command::UpdateShift { .. }
                | Command::ToggleAutomation { .. }
                | Command::SetRunState { .. }
                | Command::ScheduleRunState { .. }
        )
    }
}

/// Response payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponsePayload {
    Snapshot(DashboardSnapshot),
    Settings { settings: Vec<EntitySetting> },
    Shifts { shifts: BTreeMap<String, ShiftWindow> },
    SettingUpdated(EntitySetting),
    SettingsUpdated { count: usize },
    FrozenCleared { count: usize },
    ShiftUpdated { name: String, window: ShiftWindow },
    AutomationToggled { active: bool },
    RunStateSet { results: Vec<RunStateResult> },
    RunStateScheduled {
        entity_ids: Vec<EntityId>,
        state: RunState,
        execute_at: DateTime<Utc>,
        delay_seconds: f64,
    },
    Audit { entries: Vec<AuditView> },
    Subscribed { client_id: ClientId },
    Unsubscribed,
    Health(HealthStatus),
    Pong,
}
