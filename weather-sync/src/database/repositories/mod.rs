//! Repository layer for database access.
//!
//! Traits describe the store operations the scheduler, listener and API rely
//! on; the `Sqlx*` types implement them over SQLite.

pub mod asset;
pub mod configuration;

pub use asset::*;
pub use configuration::*;
