//! Advertising platform interface for adwardend
//!
//! This crate defines the boundary between the reconciliation engine and a
//! concrete advertising platform. It contains no HTTP code itself.

mod mock;
mod traits;

pub use mock::*;
pub use traits::*;
