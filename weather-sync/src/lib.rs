//! weather-sync library crate.
//!
//! Polls current weather for every tenant's locations and publishes it to
//! the building platform. This module exposes the core functionality for
//! integration testing.

pub mod api;
pub mod app;
pub mod config;
pub mod database;
pub mod domain;
pub mod error;
pub mod heartbeat;
pub mod listener;
pub mod logging;
pub mod platform;
pub mod scheduler;
pub mod weather;

pub use error::{Error, Result};
