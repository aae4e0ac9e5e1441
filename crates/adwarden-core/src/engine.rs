//! Reconciliation engine

use adwarden_api::{
    ObservedEntity, ResetOrigin, RunState, SettingDefaults, TickSummary, TransitionOrigin,
};
use adwarden_config::Policy;
use adwarden_platform_api::{EntityFilter, PlatformClient, PlatformError};
use adwarden_store::{AuditEvent, AuditEventType, Store};
use adwarden_util::{within_grace_after_midnight, Clock, EntityId, ShiftWindow};
use chrono::{DateTime, FixedOffset, NaiveDate};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::{command_for, evaluate, unresolved_shifts, CoreEvent};

/// Engine knobs taken from the validated policy
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub defaults: SettingDefaults,
    /// Empty means every observed entity is automated
    pub allow_list: Vec<EntityId>,
    pub reset_grace: Duration,
    /// Upper bound on each platform call
    pub request_timeout: Duration,
}

impl EngineSettings {
    pub fn from_policy(policy: &Policy) -> Self {
        Self {
            defaults: policy.defaults.clone(),
            allow_list: policy.allow_list.clone(),
            reset_grace: policy.service.reset_grace,
            request_timeout: policy.platform.request_timeout,
        }
    }
}

/// Drives observed run-states toward the desired ones, one pass per tick
///
/// Owned by a single task; ticks are awaited one after another and never
/// overlap. Nothing is cached between ticks except the last reset date.
pub struct ReconcileEngine {
    store: Arc<dyn Store>,
    platform: Arc<dyn PlatformClient>,
    clock: Arc<dyn Clock>,
    settings: EngineSettings,
    last_reset: Option<NaiveDate>,
}

impl ReconcileEngine {
    pub fn new(
        store: Arc<dyn Store>,
        platform: Arc<dyn PlatformClient>,
        clock: Arc<dyn Clock>,
        settings: EngineSettings,
    ) -> Self {
        info!(
            allow_list = settings.allow_list.len(),
            default_shift = %settings.defaults.shift,
            "Reconciliation engine initialized"
        );

        Self {
            store,
            platform,
            clock,
            settings,
            last_reset: None,
        }
    }

    /// Local date of the last successful daily reset
    pub fn last_reset(&self) -> Option<NaiveDate> {
        self.last_reset
    }

    /// Run one reconciliation pass
    pub async fn tick(&mut self) -> Vec<CoreEvent> {
        let mut events = Vec::new();

        match self.store.automation_active() {
            Ok(true) => {}
            Ok(false) => {
                debug!("Automation off, skipping tick");
                return events;
            }
            Err(e) => {
                warn!(error = %e, "Could not read master switch, skipping tick");
                return events;
            }
        }

        let now = self.clock.now();
        self.maybe_daily_reset(&now, &mut events);

        let filter = EntityFilter::from_allow_list(&self.settings.allow_list);
        let observed = match self.fetch(&filter).await {
            Ok(observed) => observed,
            Err(e) => {
                warn!(error = %e, transient = e.is_transient(), "Fetch failed, ending tick");
                events.push(CoreEvent::FetchFailed {
                    error: e.to_string(),
                });
                return events;
            }
        };

        let shifts = match self.store.list_shifts() {
            Ok(shifts) => shifts,
            Err(e) => {
                warn!(error = %e, "Could not read shifts, ending tick");
                return events;
            }
        };

        let mut summary = TickSummary {
            observed: observed.len(),
            ..Default::default()
        };

        for entity in &observed {
            if !filter.matches(&entity.id) {
                summary.excluded += 1;
                continue;
            }
            self.reconcile_entity(entity, &shifts, &now, &mut summary, &mut events)
                .await;
        }

        info!(
            observed = summary.observed,
            evaluated = summary.evaluated,
            frozen = summary.frozen,
            commands = summary.commands,
            failures = summary.failures,
            "Tick completed"
        );
        events.push(CoreEvent::TickCompleted(summary));

        events
    }

    fn maybe_daily_reset(&mut self, now: &DateTime<FixedOffset>, events: &mut Vec<CoreEvent>) {
        let today = now.date_naive();
        if self.last_reset == Some(today)
            || !within_grace_after_midnight(now, self.settings.reset_grace)
        {
            return;
        }

        match self.store.clear_all_frozen() {
            Ok(cleared) => {
                self.last_reset = Some(today);

                let _ = self.store.append_audit(AuditEvent::new(AuditEventType::FrozenCleared {
                    count: cleared,
                    origin: ResetOrigin::DailyReset,
                }));

                info!(date = %today, cleared, "Daily reset cleared frozen flags");
                events.push(CoreEvent::DailyReset { cleared });
            }
            Err(e) => {
                // last_reset stays unset so the next tick in the window retries
                warn!(error = %e, "Daily reset failed");
            }
        }
    }

    async fn fetch(&self, filter: &EntityFilter) -> Result<Vec<ObservedEntity>, PlatformError> {
        match tokio::time::timeout(
            self.settings.request_timeout,
            self.platform.fetch_entities(filter),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(PlatformError::Timeout),
        }
    }

    async fn reconcile_entity(
        &self,
        entity: &ObservedEntity,
        shifts: &BTreeMap<String, ShiftWindow>,
        now: &DateTime<FixedOffset>,
        summary: &mut TickSummary,
        events: &mut Vec<CoreEvent>,
    ) {
        let setting = match self
            .store
            .get_or_create_setting(&entity.id, &self.settings.defaults)
        {
            Ok(setting) => setting,
            Err(e) => {
                warn!(
                    entity_id = %entity.id,
                    error = %e,
                    "Could not load setting, skipping entity"
                );
                summary.failures += 1;
                return;
            }
        };

        if setting.frozen {
            debug!(entity_id = %entity.id, "Entity frozen, skipping");
            summary.frozen += 1;
            return;
        }

        let unresolved = unresolved_shifts(&setting.assigned_shifts, shifts);
        if !unresolved.is_empty() {
            debug!(entity_id = %entity.id, shifts = ?unresolved, "Assigned shifts not found");
        }

        summary.evaluated += 1;
        let evaluation = evaluate(entity, &setting, shifts, now);
        let Some(to) = command_for(entity, &evaluation) else {
            return;
        };

        debug!(
            entity_id = %entity.id,
            in_schedule = evaluation.in_schedule,
            over_budget = evaluation.over_budget,
            from = %entity.run_state,
            to = %to,
            "Run-state change needed"
        );

        match self.send(&entity.id, to).await {
            Ok(()) => {
                summary.commands += 1;

                let _ = self.store.append_audit(AuditEvent::new(AuditEventType::RunStateChanged {
                    entity_id: entity.id.clone(),
                    from: Some(entity.run_state),
                    to,
                    origin: TransitionOrigin::Engine,
                }));

                info!(
                    entity_id = %entity.id,
                    from = %entity.run_state,
                    to = %to,
                    "Run-state changed"
                );
                events.push(CoreEvent::TransitionIssued {
                    entity_id: entity.id.clone(),
                    from: entity.run_state,
                    to,
                });
            }
            Err(e) => {
                summary.failures += 1;

                let _ = self.store.append_audit(AuditEvent::new(AuditEventType::TransitionFailed {
                    entity_id: entity.id.clone(),
                    to,
                    origin: TransitionOrigin::Engine,
                    error: e.to_string(),
                }));

                warn!(
                    entity_id = %entity.id,
                    to = %to,
                    error = %e,
                    transient = e.is_transient(),
                    "Run-state command failed"
                );
                events.push(CoreEvent::TransitionFailed {
                    entity_id: entity.id.clone(),
                    to,
                    error: e.to_string(),
                });
            }
        }
    }

    async fn send(&self, id: &EntityId, to: RunState) -> Result<(), PlatformError> {
        match tokio::time::timeout(
            self.settings.request_timeout,
            self.platform.set_run_state(id, to),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(PlatformError::Timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adwarden_api::SettingPatch;
    use adwarden_platform_api::MockPlatform;
    use adwarden_store::SqliteStore;
    use adwarden_util::{DaysOfWeek, FixedClock};

    const AD: &str = "120238886501840717";

    struct Harness {
        store: Arc<SqliteStore>,
        platform: Arc<MockPlatform>,
        clock: Arc<FixedClock>,
        engine: ReconcileEngine,
    }

    fn offset() -> FixedOffset {
        FixedOffset::west_opt(6 * 3600).unwrap()
    }

    fn entity(
        id: &str,
        state: RunState,
        spend: Option<f64>,
        budget: Option<f64>,
    ) -> ObservedEntity {
        ObservedEntity {
            id: EntityId::new(id),
            name: Some(format!("Ad set {}", id)),
            run_state: state,
            spend,
            daily_budget: budget,
        }
    }

    fn settings() -> EngineSettings {
        EngineSettings {
            defaults: SettingDefaults {
                shift: "morning".into(),
                spend_limit_percent: 50.0,
            },
            allow_list: vec![],
            reset_grace: Duration::from_secs(300),
            request_timeout: Duration::from_secs(2),
        }
    }

    fn harness_with(
        local: &str,
        entities: Vec<ObservedEntity>,
        settings: EngineSettings,
    ) -> Harness {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let mut shifts = BTreeMap::new();
        shifts.insert(
            "morning".to_string(),
            ShiftWindow::new(DaysOfWeek::WEEKDAYS, 6.0, 13.0).unwrap(),
        );
        shifts.insert(
            "weekend".to_string(),
            ShiftWindow::new(DaysOfWeek::new(DaysOfWeek::SATURDAY), 8.0, 14.0).unwrap(),
        );
        store.seed_shifts(&shifts).unwrap();
        store.toggle_automation().unwrap();

        let platform = Arc::new(MockPlatform::with_entities(entities));
        let clock = Arc::new(FixedClock::at_local(local, offset()).unwrap());
        let engine = ReconcileEngine::new(store.clone(), platform.clone(), clock.clone(), settings);

        Harness {
            store,
            platform,
            clock,
            engine,
        }
    }

    fn harness(local: &str, entities: Vec<ObservedEntity>) -> Harness {
        harness_with(local, entities, settings())
    }

    fn freeze(store: &SqliteStore, id: &str) {
        let id = EntityId::new(id);
        store.get_or_create_setting(&id, &settings().defaults).unwrap();
        store
            .update_setting(
                &id,
                &SettingPatch {
                    frozen: Some(true),
                    ..Default::default()
                },
            )
            .unwrap();
    }

    fn summary(events: &[CoreEvent]) -> TickSummary {
        events
            .iter()
            .find_map(|e| match e {
                CoreEvent::TickCompleted(s) => Some(*s),
                _ => None,
            })
            .expect("tick should complete")
    }

    #[tokio::test]
    async fn paused_entity_in_schedule_under_budget_starts() {
        let mut h = harness(
            "2025-12-30 08:00:00",
            vec![entity(AD, RunState::Paused, Some(40.0), Some(100.0))],
        );

        let events = h.engine.tick().await;

        assert_eq!(
            h.platform.commands(),
            vec![(EntityId::new(AD), RunState::Running)]
        );
        assert!(events.contains(&CoreEvent::TransitionIssued {
            entity_id: EntityId::new(AD),
            from: RunState::Paused,
            to: RunState::Running,
        }));

        // Setting was created lazily with defaults
        let setting = h.store.get_setting(&EntityId::new(AD)).unwrap().unwrap();
        assert_eq!(setting.assigned_shifts, vec!["morning"]);

        let audits = h.store.get_recent_audits(10).unwrap();
        assert!(audits.iter().any(|a| matches!(
            a.event,
            AuditEventType::RunStateChanged {
                to: RunState::Running,
                origin: TransitionOrigin::Engine,
                ..
            }
        )));
    }

    #[tokio::test]
    async fn over_budget_entity_pauses() {
        let mut h = harness(
            "2025-12-30 08:00:00",
            vec![entity(AD, RunState::Running, Some(55.0), Some(100.0))],
        );

        h.engine.tick().await;
        assert_eq!(
            h.platform.commands(),
            vec![(EntityId::new(AD), RunState::Paused)]
        );
    }

    #[tokio::test]
    async fn off_schedule_entity_pauses() {
        let mut h = harness(
            "2025-12-30 20:00:00",
            vec![entity(AD, RunState::Running, Some(10.0), Some(100.0))],
        );

        h.engine.tick().await;
        assert_eq!(
            h.platform.commands(),
            vec![(EntityId::new(AD), RunState::Paused)]
        );
    }

    #[tokio::test]
    async fn master_switch_off_is_a_no_op() {
        let mut h = harness(
            "2025-12-30 08:00:00",
            vec![entity(AD, RunState::Paused, Some(40.0), Some(100.0))],
        );
        h.store.toggle_automation().unwrap();

        let events = h.engine.tick().await;

        assert!(events.is_empty());
        assert!(h.platform.commands().is_empty());
        assert_eq!(h.platform.fetch_count(), 0);
    }

    #[tokio::test]
    async fn second_tick_is_idempotent() {
        let mut h = harness(
            "2025-12-30 08:00:00",
            vec![
                entity("a", RunState::Paused, Some(40.0), Some(100.0)),
                entity("b", RunState::Running, Some(80.0), Some(100.0)),
            ],
        );

        h.engine.tick().await;
        assert_eq!(h.platform.commands().len(), 2);

        h.platform.clear_commands();
        let events = h.engine.tick().await;
        assert!(h.platform.commands().is_empty());
        assert_eq!(summary(&events).commands, 0);
    }

    #[tokio::test]
    async fn frozen_entity_is_never_commanded() {
        let mut h = harness(
            "2025-12-30 20:00:00",
            vec![entity(AD, RunState::Running, Some(99.0), Some(100.0))],
        );
        freeze(&h.store, AD);

        let events = h.engine.tick().await;

        assert!(h.platform.commands().is_empty());
        assert_eq!(summary(&events).frozen, 1);
    }

    #[tokio::test]
    async fn weekend_shift_matches_saturday() {
        let mut h = harness(
            "2025-12-27 10:00:00",
            vec![entity(AD, RunState::Paused, Some(0.0), Some(100.0))],
        );
        h.store.get_or_create_setting(&EntityId::new(AD), &settings().defaults).unwrap();
        h.store
            .update_setting(
                &EntityId::new(AD),
                &SettingPatch {
                    assigned_shifts: Some(vec!["morning".into(), "weekend".into()]),
                    ..Default::default()
                },
            )
            .unwrap();

        h.engine.tick().await;
        assert_eq!(
            h.platform.commands(),
            vec![(EntityId::new(AD), RunState::Running)]
        );
    }

    #[tokio::test]
    async fn unknown_shift_fails_closed() {
        let mut h = harness(
            "2025-12-30 08:00:00",
            vec![entity(AD, RunState::Running, Some(0.0), Some(100.0))],
        );
        h.store.get_or_create_setting(&EntityId::new(AD), &settings().defaults).unwrap();
        h.store
            .update_setting(
                &EntityId::new(AD),
                &SettingPatch {
                    assigned_shifts: Some(vec!["graveyard".into()]),
                    ..Default::default()
                },
            )
            .unwrap();

        h.engine.tick().await;
        assert_eq!(
            h.platform.commands(),
            vec![(EntityId::new(AD), RunState::Paused)]
        );
    }

    #[tokio::test]
    async fn daily_reset_runs_once_per_date() {
        let mut h = harness(
            "2025-12-30 00:02:00",
            vec![entity(AD, RunState::Paused, Some(0.0), Some(100.0))],
        );
        freeze(&h.store, AD);

        let events = h.engine.tick().await;
        assert!(events.contains(&CoreEvent::DailyReset { cleared: 1 }));
        assert!(!h.store.get_setting(&EntityId::new(AD)).unwrap().unwrap().frozen);
        assert_eq!(h.engine.last_reset(), NaiveDate::from_ymd_opt(2025, 12, 30));

        // Refrozen inside the same grace window: no second reset today
        freeze(&h.store, AD);
        h.clock.advance(chrono::Duration::minutes(1));
        let events = h.engine.tick().await;
        assert!(!events.iter().any(|e| matches!(e, CoreEvent::DailyReset { .. })));
        assert!(h.store.get_setting(&EntityId::new(AD)).unwrap().unwrap().frozen);

        // Next midnight resets again
        h.clock.advance(chrono::Duration::days(1));
        let events = h.engine.tick().await;
        assert!(events.contains(&CoreEvent::DailyReset { cleared: 1 }));
    }

    #[tokio::test]
    async fn no_reset_outside_grace_window() {
        let mut h = harness("2025-12-30 00:06:00", vec![]);
        freeze(&h.store, AD);

        let events = h.engine.tick().await;
        assert!(!events.iter().any(|e| matches!(e, CoreEvent::DailyReset { .. })));
        assert!(h.store.get_setting(&EntityId::new(AD)).unwrap().unwrap().frozen);
    }

    #[tokio::test]
    async fn reset_happens_even_when_fetch_fails() {
        let mut h = harness("2025-12-30 00:01:00", vec![]);
        freeze(&h.store, AD);
        h.platform.set_fail_fetch(true);

        let events = h.engine.tick().await;
        assert!(events.contains(&CoreEvent::DailyReset { cleared: 1 }));
        assert!(events.iter().any(|e| matches!(e, CoreEvent::FetchFailed { .. })));
    }

    #[tokio::test]
    async fn fetch_failure_issues_no_commands() {
        let mut h = harness(
            "2025-12-30 08:00:00",
            vec![entity(AD, RunState::Paused, Some(0.0), Some(100.0))],
        );
        h.platform.set_fail_fetch(true);

        let events = h.engine.tick().await;
        assert!(h.platform.commands().is_empty());
        assert!(events.iter().any(|e| matches!(e, CoreEvent::FetchFailed { .. })));
        assert!(!events.iter().any(|e| matches!(e, CoreEvent::TickCompleted(_))));
    }

    #[tokio::test]
    async fn slow_fetch_times_out() {
        let mut s = settings();
        s.request_timeout = Duration::from_millis(50);
        let mut h = harness_with(
            "2025-12-30 08:00:00",
            vec![entity(AD, RunState::Paused, Some(0.0), Some(100.0))],
            s,
        );
        h.platform.set_fetch_delay(Some(Duration::from_millis(500)));

        let events = h.engine.tick().await;
        assert!(events.contains(&CoreEvent::FetchFailed {
            error: PlatformError::Timeout.to_string()
        }));
        assert!(h.platform.commands().is_empty());
    }

    #[tokio::test]
    async fn failed_command_does_not_block_others() {
        let mut h = harness(
            "2025-12-30 08:00:00",
            vec![
                entity("a", RunState::Paused, Some(0.0), Some(100.0)),
                entity("b", RunState::Paused, Some(0.0), Some(100.0)),
            ],
        );
        h.platform.fail_commands_for(&EntityId::new("a"));

        let events = h.engine.tick().await;

        assert_eq!(
            h.platform.commands(),
            vec![(EntityId::new("b"), RunState::Running)]
        );
        let s = summary(&events);
        assert_eq!(s.commands, 1);
        assert_eq!(s.failures, 1);

        let audits = h.store.get_recent_audits(10).unwrap();
        assert!(audits.iter().any(|a| matches!(
            &a.event,
            AuditEventType::TransitionFailed { entity_id, .. } if entity_id.as_str() == "a"
        )));
    }

    #[tokio::test]
    async fn allow_list_limits_automation() {
        let mut s = settings();
        s.allow_list = vec![EntityId::new("a")];
        let mut h = harness_with(
            "2025-12-30 08:00:00",
            vec![
                entity("a", RunState::Paused, Some(0.0), Some(100.0)),
                entity("b", RunState::Paused, Some(0.0), Some(100.0)),
            ],
            s,
        );

        h.engine.tick().await;

        assert_eq!(
            h.platform.commands(),
            vec![(EntityId::new("a"), RunState::Running)]
        );
        assert!(h.store.get_setting(&EntityId::new("b")).unwrap().is_none());
    }

    #[tokio::test]
    async fn manual_override_is_not_sticky() {
        let mut h = harness(
            "2025-12-30 20:00:00",
            vec![entity(AD, RunState::Paused, Some(0.0), Some(100.0))],
        );

        // Operator starts the entity off-schedule
        h.platform
            .set_run_state(&EntityId::new(AD), RunState::Running)
            .await
            .unwrap();
        h.platform.clear_commands();

        h.engine.tick().await;
        assert_eq!(
            h.platform.commands(),
            vec![(EntityId::new(AD), RunState::Paused)]
        );
    }

    #[tokio::test]
    async fn spend_crossing_limit_between_ticks() {
        let mut h = harness(
            "2025-12-30 08:00:00",
            vec![entity(AD, RunState::Paused, Some(10.0), Some(100.0))],
        );

        h.engine.tick().await;
        assert_eq!(h.platform.run_state(&EntityId::new(AD)), Some(RunState::Running));

        h.platform.set_spend(&EntityId::new(AD), Some(50.0));
        h.clock.advance(chrono::Duration::minutes(2));
        h.engine.tick().await;
        assert_eq!(h.platform.run_state(&EntityId::new(AD)), Some(RunState::Paused));
    }
}
