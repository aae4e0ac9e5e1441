//! Persistence layer for adwardend
//!
//! Provides:
//! - Entity settings (shift assignment, spend limit, frozen veto)
//! - Shift schedules
//! - Automation master switch
//! - Audit log (append-only)

mod audit;
mod sqlite;
mod traits;

pub use audit::*;
pub use sqlite::*;
pub use traits::*;

use adwarden_util::{AdwardenError, EntityId};
use thiserror::Error;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Entity not found: {0}")]
    EntityNotFound(EntityId),

    #[error("Shift not found: {0}")]
    ShiftNotFound(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<StoreError> for AdwardenError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::EntityNotFound(id) => AdwardenError::EntityNotFound(id),
            StoreError::ShiftNotFound(name) => AdwardenError::ShiftNotFound(name),
            other => AdwardenError::store(other.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
