//! IPC layer for adwardend
//!
//! Provides:
//! - Unix domain socket server with peer UID roles
//! - NDJSON (newline-delimited JSON) protocol
//! - Request/response client and event stream for dashboards and the CLI

mod client;
mod server;

pub use client::*;
pub use server::*;

use adwarden_api::ErrorCode;
use thiserror::Error;

/// IPC errors
#[derive(Debug, Error)]
pub enum IpcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Server error ({code:?}): {message}")]
    ServerError { code: ErrorCode, message: String },
}

pub type IpcResult<T> = Result<T, IpcError>;
