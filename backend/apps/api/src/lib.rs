//! API Server
//!
//! Wires the auth routes and the task processor into one process that
//! starts and stops as a unit.

pub mod bootstrap;
pub mod config;
pub mod lifecycle;
pub mod telemetry;

pub use bootstrap::{Application, StartupError, bootstrap, build_router};
pub use config::{AppConfig, ConfigError};
pub use lifecycle::{Coordinator, LifecycleError, shutdown_signal};
