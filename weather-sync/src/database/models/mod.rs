//! Database models for weather-sync.
//!
//! These models map directly to the database schema and handle
//! conversion of JSON and role columns into domain types.

pub mod asset;
pub mod configuration;

pub use asset::*;
pub use configuration::*;
