//! REST control plane.
//!
//! Lets an operator read and upsert tenant configurations and check the
//! process status.

pub mod error;
pub mod models;
pub mod routes;
pub mod server;

pub use server::{ApiServer, ApiServerConfig, AppState};
