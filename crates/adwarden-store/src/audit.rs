//! Audit event types

use adwarden_api::{AuditView, ResetOrigin, RunState, SettingPatch, TransitionOrigin};
use adwarden_util::{EntityId, ShiftWindow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Types of audit events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEventType {
    /// Service started
    ServiceStarted,

    /// Service stopped
    ServiceStopped,

    /// Configuration loaded and shifts seeded
    PolicyLoaded { shift_count: usize, seeded: usize },

    /// Master switch flipped
    AutomationToggled { active: bool, user: String },

    /// One entity setting changed
    SettingUpdated {
        entity_id: EntityId,
        patch: SettingPatch,
        user: String,
        note: Option<String>,
    },

    /// Several entity settings changed together
    SettingsBulkUpdated {
        entity_ids: Vec<EntityId>,
        patch: SettingPatch,
        user: String,
    },

    /// Frozen flags cleared
    FrozenCleared { count: usize, origin: ResetOrigin },

    /// Shift window replaced
    ShiftUpdated {
        name: String,
        window: ShiftWindow,
        user: String,
    },

    /// Run-state command accepted by the platform
    RunStateChanged {
        entity_id: EntityId,
        from: Option<RunState>,
        to: RunState,
        origin: TransitionOrigin,
    },

    /// Run-state command failed
    TransitionFailed {
        entity_id: EntityId,
        to: RunState,
        origin: TransitionOrigin,
        error: String,
    },

    /// Run-state change queued for a later time
    RunStateScheduled {
        entity_ids: Vec<EntityId>,
        state: RunState,
        execute_at: DateTime<Utc>,
        user: String,
    },

    /// Client connected
    ClientConnected {
        client_id: String,
        role: String,
        uid: Option<u32>,
    },

    /// Client disconnected
    ClientDisconnected { client_id: String },
}

/// Full audit event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID
    pub id: i64,

    /// Event timestamp
    pub timestamp: DateTime<Utc>,

    /// Event type and details
    pub event: AuditEventType,
}

impl AuditEvent {
    pub fn new(event: AuditEventType) -> Self {
        Self {
            id: 0, // Will be set by store
            timestamp: Utc::now(),
            event,
        }
    }

    /// Client-facing form with the event details as JSON
    pub fn to_view(&self) -> AuditView {
        let details = serde_json::to_value(&self.event).unwrap_or(serde_json::Value::Null);
        let event_type = details
            .get("type")
            .and_then(|t| t.as_str())
            .unwrap_or("unknown")
            .to_string();

        AuditView {
            id: self.id,
            timestamp: self.timestamp,
            event_type,
            details,
        }
    }
}
