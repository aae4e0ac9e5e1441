//! Plain-text rendering of responses and events

use adwarden_api::{
    DashboardSnapshot, EntitySetting, Event, EventPayload, ResponsePayload, RunState,
    TransitionOrigin,
};
use adwarden_util::ShiftWindow;
use std::collections::BTreeMap;
use std::fmt::Write;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn state_label(state: Option<RunState>) -> &'static str {
    match state {
        Some(RunState::Running) => "running",
        Some(RunState::Paused) => "paused",
        None => "-",
    }
}

fn ok_label(ok: bool) -> &'static str {
    if ok { "ok" } else { "FAILING" }
}

fn snapshot(out: &mut String, snapshot: &DashboardSnapshot) {
    let _ = writeln!(
        out,
        "Automation: {}",
        if snapshot.automation_active { "ON" } else { "OFF" }
    );
    if let Some(error) = &snapshot.platform_error {
        let _ = writeln!(out, "Platform unavailable: {}", error);
    }
    if let Some(at) = snapshot.observed_at {
        let _ = writeln!(out, "Observed at {} UTC", at.format(TIME_FORMAT));
    }
    let _ = writeln!(out);

    let _ = writeln!(
        out,
        "{:<22} {:<9} {:<9} {:>7} {:>7}  {:<8} {:<8} SHIFTS",
        "ENTITY", "STATE", "DESIRED", "SPEND%", "LIMIT%", "SCHEDULE", "FROZEN"
    );
    for view in &snapshot.entities {
        let spend = view
            .spend_percent
            .map(|p| format!("{:.1}", p))
            .unwrap_or_else(|| "-".into());
        let (limit, frozen, shifts) = match &view.setting {
            Some(setting) => (
                format!("{:.0}", setting.spend_limit_percent),
                if setting.frozen { "yes" } else { "no" },
                setting.assigned_shifts.join(","),
            ),
            None => ("-".into(), "-", String::new()),
        };
        let _ = writeln!(
            out,
            "{:<22} {:<9} {:<9} {:>7} {:>7}  {:<8} {:<8} {}",
            view.observed.id.as_str(),
            state_label(Some(view.observed.run_state)),
            state_label(view.desired),
            spend,
            limit,
            if view.in_schedule { "in" } else { "out" },
            frozen,
            shifts
        );
    }
}

fn settings(out: &mut String, settings: &[EntitySetting]) {
    for setting in settings {
        let _ = writeln!(
            out,
            "{:<22} limit {:>5.1}%  {}  shifts: {}",
            setting.entity_id.as_str(),
            setting.spend_limit_percent,
            if setting.frozen { "frozen" } else { "      " },
            setting.assigned_shifts.join(",")
        );
    }
}

fn shifts(out: &mut String, shifts: &BTreeMap<String, ShiftWindow>) {
    for (name, window) in shifts {
        let _ = writeln!(out, "{:<16} {}", name, window);
    }
}

/// Render a response payload for a terminal
pub fn payload(payload: &ResponsePayload) -> String {
    let mut out = String::new();
    match payload {
        ResponsePayload::Snapshot(s) => snapshot(&mut out, s),
        ResponsePayload::Settings { settings: list } => settings(&mut out, list),
        ResponsePayload::Shifts { shifts: map } => shifts(&mut out, map),
        ResponsePayload::SettingUpdated(setting) => {
            settings(&mut out, std::slice::from_ref(setting))
        }
        ResponsePayload::SettingsUpdated { count } => {
            let _ = writeln!(out, "Updated {} settings", count);
        }
        ResponsePayload::FrozenCleared { count } => {
            let _ = writeln!(out, "Cleared frozen flag on {} entities", count);
        }
        ResponsePayload::ShiftUpdated { name, window } => {
            let _ = writeln!(out, "Shift {} is now {}", name, window);
        }
        ResponsePayload::AutomationToggled { active } => {
            let _ = writeln!(out, "Automation {}", if *active { "ON" } else { "OFF" });
        }
        ResponsePayload::RunStateSet { results } => {
            for result in results {
                match &result.error {
                    None => {
                        let _ = writeln!(out, "{:<20} ok", result.entity_id.as_str());
                    }
                    Some(error) => {
                        let id = result.entity_id.as_str();
                        let _ = writeln!(out, "{:<20} FAILED: {}", id, error);
                    }
                }
            }
        }
        ResponsePayload::RunStateScheduled {
            entity_ids,
            state,
            execute_at,
            delay_seconds,
        } => {
            let _ = writeln!(
                out,
                "{} entities will be {} at {} UTC (in {:.0}s)",
                entity_ids.len(),
                state,
                execute_at.format(TIME_FORMAT),
                delay_seconds
            );
        }
        ResponsePayload::Audit { entries } => {
            for entry in entries {
                let _ = writeln!(
                    out,
                    "{}  {:<20} {}",
                    entry.timestamp.format(TIME_FORMAT),
                    entry.event_type,
                    entry.details
                );
            }
        }
        ResponsePayload::Health(health) => {
            let _ = writeln!(out, "store:      {}", ok_label(health.store_ok));
            let _ = writeln!(out, "platform:   {}", ok_label(health.platform_ok));
            let _ = writeln!(
                out,
                "automation: {}",
                if health.automation_active { "ON" } else { "OFF" }
            );
        }
        ResponsePayload::Subscribed { client_id } => {
            let _ = writeln!(out, "Subscribed as {}", client_id);
        }
        ResponsePayload::Unsubscribed => {
            let _ = writeln!(out, "Unsubscribed");
        }
        ResponsePayload::Pong => {
            let _ = writeln!(out, "pong");
        }
    }
    out
}

/// One line per event for `watch`
pub fn event_line(event: &Event) -> String {
    let at = event.timestamp.format(TIME_FORMAT);
    let body = match &event.payload {
        EventPayload::AutomationToggled { active, user } => {
            format!("automation {} by {}", if *active { "ON" } else { "OFF" }, user)
        }
        EventPayload::RunStateChanged {
            entity_id,
            from,
            to,
            origin,
        } => {
            let by = match origin {
                TransitionOrigin::Engine => "engine".to_string(),
                TransitionOrigin::Manual { user } => user.clone(),
            };
            format!("{} {} -> {} ({})", entity_id, state_label(*from), to, by)
        }
        EventPayload::TransitionFailed { entity_id, to, error } => {
            format!("{} -> {} FAILED: {}", entity_id, to, error)
        }
        EventPayload::FrozenCleared { count, .. } => {
            format!("frozen cleared on {} entities", count)
        }
        EventPayload::SettingUpdated(setting) => {
            format!("setting updated for {}", setting.entity_id)
        }
        EventPayload::ShiftUpdated { name, window } => format!("shift {} now {}", name, window),
        EventPayload::TickCompleted(summary) => format!(
            "tick: {} observed, {} commands, {} failures",
            summary.observed, summary.commands, summary.failures
        ),
        EventPayload::FetchFailed { error } => format!("fetch failed: {}", error),
        EventPayload::Shutdown => "service shutting down".to_string(),
    };
    format!("{}  {}", at, body)
}
