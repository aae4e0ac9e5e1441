//! Pure evaluation rules
//!
//! Nothing here performs I/O. The engine and the dashboard snapshot share
//! these functions so they always agree on what "desired" means.

use adwarden_api::{EntitySetting, ObservedEntity, RunState};
use adwarden_util::ShiftWindow;
use chrono::{DateTime, FixedOffset};
use std::collections::BTreeMap;

/// Outcome of evaluating one entity against its setting
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub in_schedule: bool,
    pub over_budget: bool,
    /// None when frozen: the engine must not act
    pub desired: Option<RunState>,
}

/// True if `now` falls in at least one assigned shift that exists.
/// Unknown shift names never match, so no resolvable shift means false.
pub fn in_schedule(
    assigned: &[String],
    shifts: &BTreeMap<String, ShiftWindow>,
    now: &DateTime<FixedOffset>,
) -> bool {
    assigned
        .iter()
        .filter_map(|name| shifts.get(name))
        .any(|window| window.contains(now))
}

/// True if today's spend reached the limit. Unknown or non-positive budgets
/// never count as over budget; missing spend counts as zero.
pub fn over_budget(observed: &ObservedEntity, spend_limit_percent: f64) -> bool {
    match observed.spend_percent() {
        Some(percent) => percent >= spend_limit_percent,
        None => false,
    }
}

pub fn evaluate(
    observed: &ObservedEntity,
    setting: &EntitySetting,
    shifts: &BTreeMap<String, ShiftWindow>,
    now: &DateTime<FixedOffset>,
) -> Evaluation {
    let in_schedule = in_schedule(&setting.assigned_shifts, shifts, now);
    let over_budget = over_budget(observed, setting.spend_limit_percent);

    let desired = if setting.frozen {
        None
    } else {
        Some(RunState::from_running(in_schedule && !over_budget))
    };

    Evaluation {
        in_schedule,
        over_budget,
        desired,
    }
}

/// The command to send, if observed state differs from desired state
pub fn command_for(observed: &ObservedEntity, evaluation: &Evaluation) -> Option<RunState> {
    evaluation
        .desired
        .filter(|desired| *desired != observed.run_state)
}

/// Assigned shift names that do not exist
pub fn unresolved_shifts<'a>(
    assigned: &'a [String],
    shifts: &BTreeMap<String, ShiftWindow>,
) -> Vec<&'a str> {
    assigned
        .iter()
        .filter(|name| !shifts.contains_key(*name))
        .map(String::as_str)
        .collect()
}
