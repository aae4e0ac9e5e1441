//! Request dispatch and event translation for adwardend
//!
//! Kept out of `main.rs` so the integration tests can drive the same code
//! paths the daemon uses.

use adwarden_api::{
    ClientRole, Command, ErrorCode, ErrorInfo, EventPayload, ResetOrigin, Response,
    ResponsePayload, TransitionOrigin,
};
use adwarden_core::{ControlPlane, CoreEvent};
use adwarden_util::{AdwardenError, ClientId};
use std::sync::Arc;
use tracing::debug;

/// Protocol error for a control plane failure
pub fn error_info(err: &AdwardenError) -> ErrorInfo {
    let code = match err {
        AdwardenError::EntityNotFound(_) => ErrorCode::EntityNotFound,
        AdwardenError::ShiftNotFound(_) => ErrorCode::ShiftNotFound,
        AdwardenError::InvalidRequest(_) | AdwardenError::ConfigError(_) => {
            ErrorCode::InvalidRequest
        }
        AdwardenError::PermissionDenied(_) => ErrorCode::PermissionDenied,
        AdwardenError::PlatformError(_) => ErrorCode::PlatformError,
        AdwardenError::StoreError(_) => ErrorCode::StoreError,
        AdwardenError::Internal(_) => ErrorCode::InternalError,
    };
    ErrorInfo::new(code, err.to_string())
}

/// Event broadcast to subscribers for an engine event
pub fn core_event_payload(event: CoreEvent) -> EventPayload {
    match event {
        CoreEvent::DailyReset { cleared } => EventPayload::FrozenCleared {
            count: cleared,
            origin: ResetOrigin::DailyReset,
        },
        CoreEvent::FetchFailed { error } => EventPayload::FetchFailed { error },
        CoreEvent::TransitionIssued { entity_id, from, to } => EventPayload::RunStateChanged {
            entity_id,
            from: Some(from),
            to,
            origin: TransitionOrigin::Engine,
        },
        CoreEvent::TransitionFailed { entity_id, to, error } => {
            EventPayload::TransitionFailed { entity_id, to, error }
        }
        CoreEvent::TickCompleted(summary) => EventPayload::TickCompleted(summary),
    }
}

/// Handle one client command
///
/// Returns the response plus any events the change should broadcast.
pub async fn handle_command(
    control: &Arc<ControlPlane>,
    role: ClientRole,
    client_id: &ClientId,
    request_id: u64,
    command: Command,
) -> (Response, Vec<EventPayload>) {
    if command.is_mutation() && !role.can_configure() {
        debug!(client_id = %client_id, ?role, "Mutation refused");
        return (
            Response::error(
                request_id,
                ErrorInfo::new(ErrorCode::PermissionDenied, "Admin role required"),
            ),
            Vec::new(),
        );
    }

    let mut events = Vec::new();

    let result = match command {
        Command::GetSnapshot { refresh } => control
            .snapshot(refresh)
            .await
            .map(ResponsePayload::Snapshot),

        Command::ListSettings => control
            .list_settings()
            .map(|settings| ResponsePayload::Settings { settings }),

        Command::ListShifts => control
            .list_shifts()
            .map(|shifts| ResponsePayload::Shifts { shifts }),

        Command::UpdateSetting {
            entity_id,
            patch,
            user,
            note,
        } => control
            .update_setting(&entity_id, &patch, &user, note)
            .map(|setting| {
                events.push(EventPayload::SettingUpdated(setting.clone()));
                ResponsePayload::SettingUpdated(setting)
            }),

        Command::BulkUpdateSettings {
            entity_ids,
            patch,
            user,
        } => control
            .bulk_update_settings(&entity_ids, &patch, &user)
            .map(|count| ResponsePayload::SettingsUpdated { count }),

        Command::ClearFrozen { user } => control.clear_frozen(&user).map(|count| {
            events.push(EventPayload::FrozenCleared {
                count,
                origin: ResetOrigin::Manual { user },
            });
            ResponsePayload::FrozenCleared { count }
        }),

        Command::UpdateShift { name, window, user } => {
            control.update_shift(&name, &window, &user).map(|()| {
                events.push(EventPayload::ShiftUpdated {
                    name: name.clone(),
                    window,
                });
                ResponsePayload::ShiftUpdated { name, window }
            })
        }

        Command::ToggleAutomation { user } => control.toggle_automation(&user).map(|active| {
            events.push(EventPayload::AutomationToggled { active, user });
            ResponsePayload::AutomationToggled { active }
        }),

        Command::SetRunState {
            entity_ids,
            state,
            user,
        } => control
            .set_run_states(&entity_ids, state, &user)
            .await
            .map(|results| {
                for result in results.iter().filter(|r| r.success) {
                    events.push(EventPayload::RunStateChanged {
                        entity_id: result.entity_id.clone(),
                        from: None,
                        to: state,
                        origin: TransitionOrigin::Manual { user: user.clone() },
                    });
                }
                ResponsePayload::RunStateSet { results }
            }),

        Command::ScheduleRunState {
            entity_ids,
            state,
            execute_at,
            user,
        } => control
            .schedule_run_state(entity_ids.clone(), state, execute_at, &user)
            .map(|scheduled| ResponsePayload::RunStateScheduled {
                entity_ids,
                state,
                execute_at,
                delay_seconds: scheduled.delay.as_secs_f64(),
            }),

        Command::GetAudit { limit } => control
            .recent_audit(limit)
            .map(|entries| ResponsePayload::Audit { entries }),

        Command::SubscribeEvents => Ok(ResponsePayload::Subscribed {
            client_id: client_id.clone(),
        }),

        Command::UnsubscribeEvents => Ok(ResponsePayload::Unsubscribed),

        Command::GetHealth => Ok(ResponsePayload::Health(control.health().await)),

        Command::Ping => Ok(ResponsePayload::Pong),
    };

    match result {
        Ok(payload) => (Response::success(request_id, payload), events),
        Err(e) => (Response::error(request_id, error_info(&e)), Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adwarden_api::RunState;
    use adwarden_util::EntityId;

    #[test]
    fn errors_map_to_protocol_codes() {
        let info = error_info(&AdwardenError::ShiftNotFound("night".into()));
        assert_eq!(info.code, ErrorCode::ShiftNotFound);
        assert!(info.message.contains("night"));

        assert_eq!(
            error_info(&AdwardenError::platform("HTTP 502")).code,
            ErrorCode::PlatformError
        );
        assert_eq!(
            error_info(&AdwardenError::invalid("bad")).code,
            ErrorCode::InvalidRequest
        );
    }

    #[test]
    fn engine_transitions_become_run_state_events() {
        let payload = core_event_payload(CoreEvent::TransitionIssued {
            entity_id: EntityId::new("a"),
            from: RunState::Paused,
            to: RunState::Running,
        });

        match payload {
            EventPayload::RunStateChanged { from, to, origin, .. } => {
                assert_eq!(from, Some(RunState::Paused));
                assert_eq!(to, RunState::Running);
                assert_eq!(origin, TransitionOrigin::Engine);
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn daily_reset_becomes_frozen_cleared() {
        let payload = core_event_payload(CoreEvent::DailyReset { cleared: 3 });
        assert!(matches!(
            payload,
            EventPayload::FrozenCleared { count: 3, origin: ResetOrigin::DailyReset }
        ));
    }
}
