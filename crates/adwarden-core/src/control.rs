//! Control plane: every client-facing read and mutation
//!
//! Runs concurrently with the engine. It talks to the store and the platform
//! directly and never waits on a tick in progress.

use adwarden_api::{
    AuditView, DashboardSnapshot, EntitySetting, EntityView, HealthStatus, ObservedEntity,
    ResetOrigin, RunState, RunStateResult, SettingDefaults, SettingPatch, TransitionOrigin,
    API_VERSION,
};
use adwarden_config::Policy;
use adwarden_platform_api::{EntityFilter, PlatformClient, PlatformError};
use adwarden_store::{AuditEvent, AuditEventType, Store};
use adwarden_util::{AdwardenError, Clock, EntityId, Result, ShiftWindow};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::evaluate;

/// Audit entries included in a dashboard snapshot
pub const SNAPSHOT_AUDIT_LIMIT: usize = 20;

/// Control plane knobs taken from the validated policy
#[derive(Debug, Clone)]
pub struct ControlSettings {
    pub defaults: SettingDefaults,
    pub allow_list: Vec<EntityId>,
    pub request_timeout: Duration,
    /// How long a fetched entity list is reused for snapshots
    pub sync_cache: Duration,
}

impl ControlSettings {
    pub fn from_policy(policy: &Policy) -> Self {
        Self {
            defaults: policy.defaults.clone(),
            allow_list: policy.allow_list.clone(),
            request_timeout: policy.platform.request_timeout,
            sync_cache: policy.service.sync_cache,
        }
    }
}

/// A run-state change waiting for its execution time
#[derive(Debug)]
pub struct ScheduledRunState {
    pub delay: Duration,
    pub handle: JoinHandle<Vec<RunStateResult>>,
}

#[derive(Debug, Clone)]
struct CachedObservation {
    fetched: Instant,
    observed_at: DateTime<Utc>,
    entities: Vec<ObservedEntity>,
}

pub struct ControlPlane {
    store: Arc<dyn Store>,
    platform: Arc<dyn PlatformClient>,
    clock: Arc<dyn Clock>,
    settings: ControlSettings,
    cache: Mutex<Option<CachedObservation>>,
}

impl ControlPlane {
    pub fn new(
        store: Arc<dyn Store>,
        platform: Arc<dyn PlatformClient>,
        clock: Arc<dyn Clock>,
        settings: ControlSettings,
    ) -> Self {
        Self {
            store,
            platform,
            clock,
            settings,
            cache: Mutex::new(None),
        }
    }

    fn filter(&self) -> EntityFilter {
        EntityFilter::from_allow_list(&self.settings.allow_list)
    }

    fn invalidate_cache(&self) {
        *self.cache.lock().unwrap() = None;
    }

    fn audit(&self, event: AuditEventType) {
        if let Err(e) = self.store.append_audit(AuditEvent::new(event)) {
            warn!(error = %e, "Failed to append audit event");
        }
    }

    async fn observe(
        &self,
        refresh: bool,
    ) -> std::result::Result<CachedObservation, PlatformError> {
        if !refresh {
            let cache = self.cache.lock().unwrap();
            if let Some(cached) = cache.as_ref()
                && cached.fetched.elapsed() < self.settings.sync_cache
            {
                return Ok(cached.clone());
            }
        }

        let entities = match tokio::time::timeout(
            self.settings.request_timeout,
            self.platform.fetch_entities(&self.filter()),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => return Err(PlatformError::Timeout),
        };

        let observation = CachedObservation {
            fetched: Instant::now(),
            observed_at: Utc::now(),
            entities,
        };
        *self.cache.lock().unwrap() = Some(observation.clone());
        Ok(observation)
    }

    // Reads

    /// Everything a dashboard shows in one call
    ///
    /// Settings are created with defaults for newly observed entities, so
    /// they can be configured before automation is switched on.
    pub async fn snapshot(&self, refresh: bool) -> Result<DashboardSnapshot> {
        let automation_active = self.store.automation_active()?;
        let shifts = self.store.list_shifts()?;
        let recent_audit = self.recent_audit(SNAPSHOT_AUDIT_LIMIT)?;
        let now = self.clock.now();

        let (entities, observed_at, platform_error) = match self.observe(refresh).await {
            Ok(observation) => {
                let filter = self.filter();
                let mut views = Vec::with_capacity(observation.entities.len());
                for observed in observation.entities {
                    if !filter.matches(&observed.id) {
                        continue;
                    }
                    let setting = match self
                        .store
                        .get_or_create_setting(&observed.id, &self.settings.defaults)
                    {
                        Ok(setting) => setting,
                        Err(e) => {
                            warn!(entity_id = %observed.id, error = %e, "Could not load setting");
                            views.push(EntityView {
                                spend_percent: observed.spend_percent(),
                                in_schedule: false,
                                over_budget: false,
                                desired: None,
                                observed,
                                setting: None,
                            });
                            continue;
                        }
                    };
                    let evaluation = evaluate::evaluate(&observed, &setting, &shifts, &now);
                    views.push(EntityView {
                        spend_percent: observed.spend_percent(),
                        in_schedule: evaluation.in_schedule,
                        over_budget: evaluation.over_budget,
                        desired: evaluation.desired,
                        observed,
                        setting: Some(setting),
                    });
                }
                (views, Some(observation.observed_at), None)
            }
            Err(e) => {
                warn!(error = %e, transient = e.is_transient(), "Snapshot fetch failed");
                (Vec::new(), None, Some(e.to_string()))
            }
        };

        Ok(DashboardSnapshot {
            api_version: API_VERSION,
            automation_active,
            entities,
            shifts,
            recent_audit,
            observed_at,
            platform_error,
        })
    }

    pub fn list_settings(&self) -> Result<Vec<EntitySetting>> {
        Ok(self.store.list_settings()?)
    }

    pub fn list_shifts(&self) -> Result<BTreeMap<String, ShiftWindow>> {
        Ok(self.store.list_shifts()?)
    }

    pub fn recent_audit(&self, limit: usize) -> Result<Vec<AuditView>> {
        Ok(self
            .store
            .get_recent_audits(limit)?
            .iter()
            .map(AuditEvent::to_view)
            .collect())
    }

    pub async fn health(&self) -> HealthStatus {
        let store_ok = self.store.is_healthy();
        let platform_ok =
            tokio::time::timeout(self.settings.request_timeout, self.platform.is_healthy())
                .await
                .unwrap_or(false);

        HealthStatus {
            live: true,
            store_ok,
            platform_ok,
            automation_active: self.store.automation_active().unwrap_or(false),
        }
    }

    // Mutations

    fn check_patch(&self, patch: &SettingPatch) -> Result<()> {
        patch.validate().map_err(AdwardenError::invalid)?;

        if let Some(assigned) = patch.normalized_shifts() {
            let shifts = self.store.list_shifts()?;
            if let Some(missing) = assigned.iter().find(|name| !shifts.contains_key(*name)) {
                return Err(AdwardenError::ShiftNotFound(missing.clone()));
            }
        }

        Ok(())
    }

    pub fn update_setting(
        &self,
        entity_id: &EntityId,
        patch: &SettingPatch,
        user: &str,
        note: Option<String>,
    ) -> Result<EntitySetting> {
        self.check_patch(patch)?;

        let setting = self.store.update_setting(entity_id, patch)?;
        self.audit(AuditEventType::SettingUpdated {
            entity_id: entity_id.clone(),
            patch: patch.clone(),
            user: user.to_string(),
            note,
        });

        info!(entity_id = %entity_id, user, "Entity setting updated");
        Ok(setting)
    }

    /// Apply one patch to many settings. Unknown ids fail the whole batch.
    pub fn bulk_update_settings(
        &self,
        entity_ids: &[EntityId],
        patch: &SettingPatch,
        user: &str,
    ) -> Result<usize> {
        if entity_ids.is_empty() {
            return Err(AdwardenError::invalid("No entity ids given"));
        }
        self.check_patch(patch)?;

        let count = self.store.update_settings_bulk(entity_ids, patch)?;
        self.audit(AuditEventType::SettingsBulkUpdated {
            entity_ids: entity_ids.to_vec(),
            patch: patch.clone(),
            user: user.to_string(),
        });

        info!(count, user, "Entity settings updated in bulk");
        Ok(count)
    }

    /// Same effect as the daily reset, on demand
    pub fn clear_frozen(&self, user: &str) -> Result<usize> {
        let count = self.store.clear_all_frozen()?;
        self.audit(AuditEventType::FrozenCleared {
            count,
            origin: ResetOrigin::Manual {
                user: user.to_string(),
            },
        });

        info!(count, user, "Frozen flags cleared manually");
        Ok(count)
    }

    pub fn update_shift(&self, name: &str, window: &ShiftWindow, user: &str) -> Result<()> {
        window.validate().map_err(AdwardenError::invalid)?;

        self.store.update_shift(name, window)?;
        self.audit(AuditEventType::ShiftUpdated {
            name: name.to_string(),
            window: *window,
            user: user.to_string(),
        });

        info!(shift = name, window = %window, user, "Shift updated");
        Ok(())
    }

    /// Flip the master switch, returning the new value
    pub fn toggle_automation(&self, user: &str) -> Result<bool> {
        let active = self.store.toggle_automation()?;
        self.invalidate_cache();
        self.audit(AuditEventType::AutomationToggled {
            active,
            user: user.to_string(),
        });

        info!(active, user, "Automation master switch toggled");
        Ok(active)
    }

    /// Every id must be non-empty and inside the allow-list before anything
    /// is sent.
    fn check_run_state_targets(&self, entity_ids: &[EntityId]) -> Result<()> {
        if entity_ids.is_empty() {
            return Err(AdwardenError::invalid("No entity ids given"));
        }
        let filter = self.filter();
        if let Some(outside) = entity_ids.iter().find(|id| !filter.matches(id)) {
            return Err(AdwardenError::permission(format!(
                "Entity {} is outside the automation allow-list",
                outside
            )));
        }
        Ok(())
    }

    /// Forward a run-state change for several entities. Platform failures
    /// are reported per id and never stop the rest of the batch.
    pub async fn set_run_states(
        &self,
        entity_ids: &[EntityId],
        state: RunState,
        user: &str,
    ) -> Result<Vec<RunStateResult>> {
        self.check_run_state_targets(entity_ids)?;

        let mut results = Vec::with_capacity(entity_ids.len());
        for id in entity_ids {
            let result = match self.set_run_state(id, state, user).await {
                Ok(()) => RunStateResult::ok(id.clone()),
                Err(e) => RunStateResult::failed(id.clone(), e.to_string()),
            };
            results.push(result);
        }
        Ok(results)
    }

    /// Queue `set_run_states` for `execute_at`. Times not in the future are
    /// rejected. The allow-list is checked now and again at execution.
    pub fn schedule_run_state(
        self: &Arc<Self>,
        entity_ids: Vec<EntityId>,
        state: RunState,
        execute_at: DateTime<Utc>,
        user: &str,
    ) -> Result<ScheduledRunState> {
        self.check_run_state_targets(&entity_ids)?;

        let now = self.clock.now().with_timezone(&Utc);
        let delay = (execute_at - now)
            .to_std()
            .ok()
            .filter(|delay| !delay.is_zero())
            .ok_or_else(|| AdwardenError::invalid("Execution time must be in the future"))?;

        self.audit(AuditEventType::RunStateScheduled {
            entity_ids: entity_ids.clone(),
            state,
            execute_at,
            user: user.to_string(),
        });
        info!(
            count = entity_ids.len(),
            state = %state,
            %execute_at,
            user,
            "Run-state change scheduled"
        );

        let control = Arc::clone(self);
        let user = user.to_string();
        let deadline = Instant::now() + delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            match control.set_run_states(&entity_ids, state, &user).await {
                Ok(results) => results,
                Err(e) => {
                    warn!(error = %e, "Scheduled run-state change refused");
                    entity_ids
                        .into_iter()
                        .map(|id| RunStateResult::failed(id, e.to_string()))
                        .collect()
                }
            }
        });

        Ok(ScheduledRunState { delay, handle })
    }

    /// Forward a run-state change to the platform. The next tick re-applies
    /// policy unless the entity is frozen.
    pub async fn set_run_state(
        &self,
        entity_id: &EntityId,
        state: RunState,
        user: &str,
    ) -> Result<()> {
        self.check_run_state_targets(std::slice::from_ref(entity_id))?;

        let origin = TransitionOrigin::Manual {
            user: user.to_string(),
        };
        let result = match tokio::time::timeout(
            self.settings.request_timeout,
            self.platform.set_run_state(entity_id, state),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(PlatformError::Timeout),
        };
        self.invalidate_cache();

        match result {
            Ok(()) => {
                self.audit(AuditEventType::RunStateChanged {
                    entity_id: entity_id.clone(),
                    from: None,
                    to: state,
                    origin,
                });
                info!(entity_id = %entity_id, state = %state, user, "Run-state set manually");
                Ok(())
            }
            Err(e) => {
                self.audit(AuditEventType::TransitionFailed {
                    entity_id: entity_id.clone(),
                    to: state,
                    origin,
                    error: e.to_string(),
                });
                debug!(entity_id = %entity_id, error = %e, "Manual run-state change failed");
                Err(e.into())
            }
        }
    }
}
