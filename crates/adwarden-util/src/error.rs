//! Error types for adwarden

use thiserror::Error;

use crate::EntityId;

/// Error type for request-driven adwarden operations
///
/// These are the errors surfaced synchronously to a caller (a configuration
/// edit, a manual run-state change). The reconciliation engine never returns
/// them; it logs and moves on.
#[derive(Debug, Error)]
pub enum AdwardenError {
    #[error("Entity not found: {0}")]
    EntityNotFound(EntityId),

    #[error("Shift not found: {0}")]
    ShiftNotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Platform error: {0}")]
    PlatformError(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AdwardenError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::StoreError(msg.into())
    }

    pub fn platform(msg: impl Into<String>) -> Self {
        Self::PlatformError(msg.into())
    }

    pub fn permission(msg: impl Into<String>) -> Self {
        Self::PermissionDenied(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// True for errors caused by the caller referencing something unknown
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::EntityNotFound(_) | Self::ShiftNotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, AdwardenError>;
