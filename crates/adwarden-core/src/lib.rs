//! Reconciliation engine and control plane for adwardend
//!
//! This crate is the heart of adwardend, containing:
//! - Evaluation rules (schedule membership, budget guard, desired run-state)
//! - The reconciliation engine, one pass per tick
//! - The control plane behind every client request

mod control;
mod engine;
mod evaluate;
mod events;

pub use control::*;
pub use engine::*;
pub use evaluate::*;
pub use events::*;
