//! Graph-style REST client for adwardend
//!
//! Talks to a Meta Marketing API compatible endpoint:
//! - `GET {base}/{version}/{account}/{edge}` lists entities with today's spend
//! - `POST {base}/{version}/{id}` with `status=ACTIVE|PAUSED` changes run-state

mod client;
mod wire;

pub use client::*;
