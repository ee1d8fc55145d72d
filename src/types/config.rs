//! Configuration structures.
//!
//! Configuration is loaded from an optional JSON file and then overridden by
//! `SWITCHBOARD_*` environment variables.

use crate::types::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Global configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Server identity.
    #[serde(default)]
    pub server: ServerInfo,

    /// Health monitor configuration.
    #[serde(default)]
    pub health: HealthConfig,

    /// Registry configuration.
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Tool runtime configuration.
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Read a JSON config file. Sections missing from the file use defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw).map_err(|e| {
            Error::validation(format!("Invalid config file {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would stall the health loop.
    pub fn validate(&self) -> Result<()> {
        self.health.validate()
    }

    /// Apply `SWITCHBOARD_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(path) = lookup("SWITCHBOARD_REGISTRY_FILE") {
            self.registry.registry_file = PathBuf::from(path);
        }
        if let Some(raw) = lookup("SWITCHBOARD_MAX_HEALTH_FAILURES") {
            self.registry.max_health_failures = raw.parse().map_err(|_| {
                Error::validation(format!("SWITCHBOARD_MAX_HEALTH_FAILURES: invalid value '{}'", raw))
            })?;
        }
        if let Some(level) = lookup("SWITCHBOARD_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Some(format) = lookup("SWITCHBOARD_LOG_FORMAT") {
            self.observability.json_logs = format.eq_ignore_ascii_case("json");
        }
        Ok(())
    }
}

/// Display identity of the hosting server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
    pub description: String,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: "switchboard-registry".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            description: "Registry and health monitor for tool servers".to_string(),
        }
    }
}

/// Health monitor defaults applied to probes created without explicit settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Interval between runs of a single probe.
    #[serde(with = "humantime_serde")]
    pub check_interval: Duration,

    /// Deadline for a single probe run.
    #[serde(with = "humantime_serde")]
    pub check_timeout: Duration,

    /// Consecutive failures before a probe is unhealthy.
    pub failure_threshold: u32,

    /// Consecutive successes tracked for recovery reporting.
    pub success_threshold: u32,

    /// Cadence of the background loop that looks for due probes.
    #[serde(with = "humantime_serde")]
    pub check_tick: Duration,

    /// Number of response-time samples kept for the average.
    pub metrics_window: usize,
}

impl HealthConfig {
    pub fn validate(&self) -> Result<()> {
        if self.check_tick.is_zero() {
            return Err(Error::validation("health.check_tick must be greater than zero"));
        }
        Ok(())
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(30),
            check_timeout: Duration::from_secs(5),
            failure_threshold: 3,
            success_threshold: 1,
            check_tick: Duration::from_secs(5),
            metrics_window: 100,
        }
    }
}

/// Registry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Path of the JSON catalog snapshot.
    pub registry_file: PathBuf,

    /// Consecutive endpoint failures before a server is marked unhealthy.
    pub max_health_failures: u32,

    /// Deadline for a single endpoint probe.
    #[serde(with = "humantime_serde")]
    pub probe_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            registry_file: PathBuf::from("registry.json"),
            max_health_failures: 3,
            probe_timeout: Duration::from_secs(5),
        }
    }
}

/// Tool runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Maximum blocking handlers running at once.
    pub max_blocking_workers: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_blocking_workers: 8,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Tracing log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable JSON log formatting.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}
