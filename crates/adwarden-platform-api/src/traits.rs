//! Platform client trait

use adwarden_api::{ObservedEntity, RunState};
use adwarden_util::{AdwardenError, EntityId};
use async_trait::async_trait;
use thiserror::Error;

/// Errors from platform operations
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("Request timed out")]
    Timeout,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Server error: HTTP {status}")]
    Server { status: u16 },

    #[error("Platform rejected request: {message}")]
    Api { code: Option<i64>, message: String },

    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl PlatformError {
    /// Whether retrying on the next tick may succeed without operator action
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PlatformError::Timeout | PlatformError::Transport(_) | PlatformError::Server { .. }
        )
    }
}

impl From<PlatformError> for AdwardenError {
    fn from(e: PlatformError) -> Self {
        AdwardenError::platform(e.to_string())
    }
}

pub type PlatformResult<T> = Result<T, PlatformError>;

/// Which entities to fetch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityFilter {
    /// Restrict to these ids. None fetches every entity in the account.
    pub ids: Option<Vec<EntityId>>,
}

impl EntityFilter {
    pub fn all() -> Self {
        Self::default()
    }

    /// Filter from an allow-list, where an empty list means everything
    pub fn from_allow_list(allow_list: &[EntityId]) -> Self {
        if allow_list.is_empty() {
            Self::all()
        } else {
            Self {
                ids: Some(allow_list.to_vec()),
            }
        }
    }

    pub fn matches(&self, id: &EntityId) -> bool {
        match &self.ids {
            Some(ids) => ids.contains(id),
            None => true,
        }
    }
}

/// Advertising platform client
///
/// Implementations must bound every call with a timeout and must only report
/// entities whose status is RUNNING or PAUSED.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Fetch observed state for all matching entities in one batch
    async fn fetch_entities(&self, filter: &EntityFilter) -> PlatformResult<Vec<ObservedEntity>>;

    /// Command one entity to a run-state
    async fn set_run_state(&self, id: &EntityId, state: RunState) -> PlatformResult<()>;

    /// Cheap reachability check
    async fn is_healthy(&self) -> bool;
}
