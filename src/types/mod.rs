//! Core types shared by the runtime, health monitor and registry.
//!
//! - **Errors**: Application error types with thiserror derives
//! - **Config**: Configuration structures loaded from file and environment
//! - **Status**: Health status enumerations

mod config;
mod errors;
mod status;

pub use config::{
    Config, HealthConfig, ObservabilityConfig, RegistryConfig, RuntimeConfig, ServerInfo,
};
pub use errors::{Error, Result};
pub use status::{HealthStatus, ServerStatus};
