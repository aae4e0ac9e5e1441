//! Core events emitted by the engine

use adwarden_api::{RunState, TickSummary};
use adwarden_util::EntityId;

/// Events emitted by one reconciliation tick
#[derive(Debug, Clone, PartialEq)]
pub enum CoreEvent {
    /// Frozen flags were cleared after local midnight
    DailyReset { cleared: usize },

    /// Observed state could not be fetched; the tick ended early
    FetchFailed { error: String },

    /// A run-state command was accepted by the platform
    TransitionIssued {
        entity_id: EntityId,
        from: RunState,
        to: RunState,
    },

    /// A run-state command failed; retried on the next tick if still needed
    TransitionFailed {
        entity_id: EntityId,
        to: RunState,
        error: String,
    },

    /// The tick ran to completion
    TickCompleted(TickSummary),
}
