//! Multi-tenant polling scheduler.
//!
//! - [`SchedulerDriver`] reconciles running loops with the stored
//!   configurations on every tick.
//! - [`ChangeDetector`] decides whether an active tenant's configuration
//!   changed since it was last seen.
//! - [`TenantScheduler`] runs one tenant's cycles and owns its restart signal.
//! - [`CollectionRunner`] performs a single collection cycle.
//! - [`InFlightSet`] guarantees at most one loop per tenant.

mod change_detector;
mod driver;
mod in_flight;
mod runner;
mod tenant;

pub use change_detector::ChangeDetector;
pub use driver::{DEFAULT_RELOAD_CAPACITY, ReloadTrigger, SchedulerDriver, TickReport};
pub use in_flight::{InFlightGuard, InFlightSet};
pub use runner::{CollectionRunner, Collector};
pub use tenant::{TenantHandle, TenantScheduler, TenantState};
