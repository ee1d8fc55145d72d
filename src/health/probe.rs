//! Health probes and their per-probe counters.

use crate::types::{HealthConfig, HealthStatus};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Error type a probe check may return.
pub type ProbeError = Box<dyn std::error::Error + Send + Sync>;

/// `Ok(true)` passes, `Ok(false)` is a logical failure, `Err` is a failure
/// with a reason.
pub type CheckResult = std::result::Result<bool, ProbeError>;

type CheckFn = dyn Fn() -> BoxFuture<'static, CheckResult> + Send + Sync;

/// The function a probe runs.
#[derive(Clone)]
pub struct ProbeCheck(Arc<CheckFn>);

impl ProbeCheck {
    pub fn new<F, Fut>(check: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CheckResult> + Send + 'static,
    {
        Self(Arc::new(move || check().boxed()))
    }

    pub(crate) fn call(&self) -> BoxFuture<'static, CheckResult> {
        (self.0)()
    }
}

impl fmt::Debug for ProbeCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ProbeCheck")
    }
}

/// Cadence, deadline and thresholds for one probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeSettings {
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub enabled: bool,
}

impl ProbeSettings {
    pub fn from_config(config: &HealthConfig) -> Self {
        Self {
            interval: config.check_interval,
            timeout: config.check_timeout,
            failure_threshold: config.failure_threshold,
            success_threshold: config.success_threshold,
            enabled: true,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self::from_config(&HealthConfig::default())
    }
}

/// A named probe and its running state.
#[derive(Debug)]
pub struct HealthProbe {
    pub(crate) name: String,
    pub(crate) check: ProbeCheck,
    pub(crate) settings: ProbeSettings,
    pub(crate) last_checked_at: Option<DateTime<Utc>>,
    pub(crate) last_run: Option<Instant>,
    pub(crate) last_result: Option<bool>,
    pub(crate) last_error: Option<String>,
    pub(crate) consecutive_failures: u32,
    pub(crate) consecutive_successes: u32,
    pub(crate) total_checks: u64,
    pub(crate) total_failures: u64,
}

impl HealthProbe {
    pub fn new(name: impl Into<String>, check: ProbeCheck, settings: ProbeSettings) -> Self {
        Self {
            name: name.into(),
            check,
            settings,
            last_checked_at: None,
            last_run: None,
            last_result: None,
            last_error: None,
            consecutive_failures: 0,
            consecutive_successes: 0,
            total_checks: 0,
            total_failures: 0,
        }
    }

    /// Never-run probes are always due.
    pub fn is_due(&self, now: Instant) -> bool {
        match self.last_run {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.settings.interval,
        }
    }

    pub(crate) fn record_success(&mut self, now: Instant) {
        self.stamp(now);
        self.last_result = Some(true);
        self.last_error = None;
        self.consecutive_successes += 1;
        self.consecutive_failures = 0;
    }

    pub(crate) fn record_failure(&mut self, now: Instant, error: Option<String>) {
        self.stamp(now);
        self.last_result = Some(false);
        self.last_error = error;
        self.consecutive_failures += 1;
        self.consecutive_successes = 0;
        self.total_failures += 1;
    }

    fn stamp(&mut self, now: Instant) {
        self.last_run = Some(now);
        self.last_checked_at = Some(Utc::now());
        self.total_checks += 1;
    }

    /// Classification of this probe. Disabled probes count as passing.
    pub fn status(&self) -> HealthStatus {
        if !self.settings.enabled || self.consecutive_failures == 0 {
            HealthStatus::Healthy
        } else if self.consecutive_failures >= self.settings.failure_threshold {
            HealthStatus::Unhealthy
        } else {
            HealthStatus::Degraded
        }
    }

    pub fn report(&self) -> ProbeReport {
        ProbeReport {
            name: self.name.clone(),
            status: self.status(),
            enabled: self.settings.enabled,
            last_checked_at: self.last_checked_at,
            last_result: self.last_result,
            last_error: self.last_error.clone(),
            consecutive_failures: self.consecutive_failures,
            consecutive_successes: self.consecutive_successes,
            total_checks: self.total_checks,
            total_failures: self.total_failures,
            failure_threshold: self.settings.failure_threshold,
            success_threshold: self.settings.success_threshold,
            interval_seconds: self.settings.interval.as_secs_f64(),
        }
    }
}

/// Serializable view of a probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeReport {
    pub name: String,
    pub status: HealthStatus,
    pub enabled: bool,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_result: Option<bool>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub total_checks: u64,
    pub total_failures: u64,
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub interval_seconds: f64,
}
