//! Mock platform for testing

use adwarden_api::{ObservedEntity, RunState};
use adwarden_util::EntityId;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::{EntityFilter, PlatformClient, PlatformError, PlatformResult};

/// In-memory platform for unit/integration testing
///
/// Accepted run-state commands are applied to the stored entity, so a second
/// reconciliation pass observes the new state.
pub struct MockPlatform {
    entities: Arc<Mutex<BTreeMap<EntityId, ObservedEntity>>>,
    commands: Arc<Mutex<Vec<(EntityId, RunState)>>>,
    fetch_count: AtomicUsize,

    /// Configure fetch to fail
    pub fail_fetch: Arc<Mutex<bool>>,

    /// Entities whose run-state commands fail
    pub fail_set_for: Arc<Mutex<HashSet<EntityId>>>,

    /// Delay applied to every fetch
    pub fetch_delay: Arc<Mutex<Option<Duration>>>,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self {
            entities: Arc::new(Mutex::new(BTreeMap::new())),
            commands: Arc::new(Mutex::new(Vec::new())),
            fetch_count: AtomicUsize::new(0),
            fail_fetch: Arc::new(Mutex::new(false)),
            fail_set_for: Arc::new(Mutex::new(HashSet::new())),
            fetch_delay: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_entities(entities: impl IntoIterator<Item = ObservedEntity>) -> Self {
        let platform = Self::new();
        for entity in entities {
            platform.upsert(entity);
        }
        platform
    }

    /// Add or replace an observed entity
    pub fn upsert(&self, entity: ObservedEntity) {
        self.entities
            .lock()
            .unwrap()
            .insert(entity.id.clone(), entity);
    }

    /// Change today's spend for an entity
    pub fn set_spend(&self, id: &EntityId, spend: Option<f64>) {
        if let Some(entity) = self.entities.lock().unwrap().get_mut(id) {
            entity.spend = spend;
        }
    }

    pub fn run_state(&self, id: &EntityId) -> Option<RunState> {
        self.entities.lock().unwrap().get(id).map(|e| e.run_state)
    }

    /// Every accepted run-state command, in order
    pub fn commands(&self) -> Vec<(EntityId, RunState)> {
        self.commands.lock().unwrap().clone()
    }

    pub fn clear_commands(&self) {
        self.commands.lock().unwrap().clear();
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }

    pub fn set_fail_fetch(&self, fail: bool) {
        *self.fail_fetch.lock().unwrap() = fail;
    }

    pub fn fail_commands_for(&self, id: &EntityId) {
        self.fail_set_for.lock().unwrap().insert(id.clone());
    }

    pub fn set_fetch_delay(&self, delay: Option<Duration>) {
        *self.fetch_delay.lock().unwrap() = delay;
    }
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlatformClient for MockPlatform {
    async fn fetch_entities(&self, filter: &EntityFilter) -> PlatformResult<Vec<ObservedEntity>> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);

        let delay = *self.fetch_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if *self.fail_fetch.lock().unwrap() {
            return Err(PlatformError::Server { status: 503 });
        }

        Ok(self
            .entities
            .lock()
            .unwrap()
            .values()
            .filter(|e| filter.matches(&e.id))
            .cloned()
            .collect())
    }

    async fn set_run_state(&self, id: &EntityId, state: RunState) -> PlatformResult<()> {
        if self.fail_set_for.lock().unwrap().contains(id) {
            return Err(PlatformError::Api {
                code: Some(100),
                message: format!("Mock rejection for {}", id),
            });
        }

        let mut entities = self.entities.lock().unwrap();
        let entity = entities.get_mut(id).ok_or_else(|| PlatformError::Api {
            code: Some(803),
            message: format!("Unknown object {}", id),
        })?;
        entity.run_state = state;
        self.commands.lock().unwrap().push((id.clone(), state));

        Ok(())
    }

    async fn is_healthy(&self) -> bool {
        !*self.fail_fetch.lock().unwrap()
    }
}
