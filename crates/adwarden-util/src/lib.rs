//! Shared utilities for adwarden
//!
//! This crate provides:
//! - ID types (EntityId, ClientId)
//! - The account clock and shift windows (fractional hours, weekday masks)
//! - Error types
//! - Default paths for socket, config, data, and log directories

mod error;
mod ids;
mod paths;
mod time;

pub use error::*;
pub use ids::*;
pub use paths::*;
pub use time::*;
