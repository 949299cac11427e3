//! Database module for HealthTrail.
//!
//! Provides SQLite storage for the URL registry and check history, with
//! migrations embedded at build time.

mod models;
mod store;

pub use models::*;
pub use store::*;
