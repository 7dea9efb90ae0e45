//! Domain layer for weather-sync.
//!
//! Tenants (configurations), the assets they own and the process-wide status.

pub mod asset;
pub mod configuration;
pub mod status;

pub use asset::{Asset, AssetRole, Location, NewAsset};
pub use configuration::{Configuration, ConfigurationSnapshot, TenantId};
pub use status::{ProcessStatus, StatusHandle};
