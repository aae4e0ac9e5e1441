//! Event types for adwardend -> client streaming

use adwarden_util::{EntityId, ShiftWindow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{EntitySetting, ResetOrigin, RunState, TickSummary, TransitionOrigin, API_VERSION};

/// Event envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub api_version: u32,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            api_version: API_VERSION,
            timestamp: Utc::now(),
            payload,
        }
    }
}

/// All possible events from the service to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// Master switch flipped
    AutomationToggled { active: bool, user: String },

    /// An entity was moved to a new run-state on the platform
    RunStateChanged {
        entity_id: EntityId,
        /// Unknown for manual changes, which are sent without a fetch
        from: Option<RunState>,
        to: RunState,
        origin: TransitionOrigin,
    },

    /// The platform rejected or failed a run-state command
    TransitionFailed {
        entity_id: EntityId,
        to: RunState,
        error: String,
    },

    /// Frozen flags cleared, by the daily reset or an operator
    FrozenCleared { count: usize, origin: ResetOrigin },

    /// An entity setting changed
    SettingUpdated(EntitySetting),

    /// A shift window changed
    ShiftUpdated { name: String, window: ShiftWindow },

    /// A reconciliation tick ran to completion
    TickCompleted(TickSummary),

    /// The platform could not be queried this tick
    FetchFailed { error: String },

    /// Service is shutting down
    Shutdown,
}
