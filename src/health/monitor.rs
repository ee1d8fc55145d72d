//! Health monitor: runs probes and rolls their state up into one status.

use crate::health::metrics::{InvocationMetrics, MetricsSnapshot};
use crate::health::probe::{HealthProbe, ProbeCheck, ProbeReport, ProbeSettings};
use crate::recovery::with_recovery_async;
use crate::types::{Error, HealthConfig, HealthStatus, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Loop cadence used when the configured tick is zero.
const MIN_CHECK_TICK: Duration = Duration::from_millis(1);

/// Result of one probe run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub passed: bool,
    pub error: Option<String>,
}

/// `{status, timestamp}` summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleStatus {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
}

/// Full health report: aggregate, per-probe detail and invocation metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: i64,
    pub monitoring: bool,
    pub probes: Vec<ProbeReport>,
    pub metrics: MetricsSnapshot,
}

#[derive(Debug)]
struct MonitorTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns a set of named probes and the loop that runs them.
#[derive(Debug)]
pub struct HealthMonitor {
    config: HealthConfig,
    probes: RwLock<BTreeMap<String, HealthProbe>>,
    metrics: Mutex<InvocationMetrics>,
    started_at: DateTime<Utc>,
    task: Mutex<Option<MonitorTask>>,
}

impl HealthMonitor {
    pub fn new(config: HealthConfig) -> Self {
        let metrics = InvocationMetrics::new(config.metrics_window);
        Self {
            config,
            probes: RwLock::new(BTreeMap::new()),
            metrics: Mutex::new(metrics),
            started_at: Utc::now(),
            task: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    /// Settings for a new probe, taken from the monitor's config.
    pub fn default_settings(&self) -> ProbeSettings {
        ProbeSettings::from_config(&self.config)
    }

    // =========================================================================
    // Probe management
    // =========================================================================

    /// Add a probe, replacing any probe of the same name (and its counters).
    pub async fn add_probe(
        &self,
        name: impl Into<String>,
        check: ProbeCheck,
        settings: Option<ProbeSettings>,
    ) {
        let name = name.into();
        let settings = settings.unwrap_or_else(|| self.default_settings());
        tracing::debug!(probe = %name, interval = ?settings.interval, "probe_added");
        let probe = HealthProbe::new(name.clone(), check, settings);
        self.probes.write().await.insert(name, probe);
    }

    /// Remove a probe. Returns whether it existed.
    pub async fn remove_probe(&self, name: &str) -> bool {
        self.probes.write().await.remove(name).is_some()
    }

    pub async fn set_probe_enabled(&self, name: &str, enabled: bool) -> Result<()> {
        let mut probes = self.probes.write().await;
        let probe = probes
            .get_mut(name)
            .ok_or_else(|| Error::not_found(format!("Unknown probe: {}", name)))?;
        probe.settings.enabled = enabled;
        Ok(())
    }

    pub async fn probe_report(&self, name: &str) -> Option<ProbeReport> {
        self.probes.read().await.get(name).map(HealthProbe::report)
    }

    pub async fn probe_names(&self) -> Vec<String> {
        self.probes.read().await.keys().cloned().collect()
    }

    // =========================================================================
    // Probe execution
    // =========================================================================

    /// Run one probe now, regardless of its interval.
    ///
    /// A disabled probe is not executed and reports as passing. Timeouts,
    /// returned errors and panics all count as a failed check.
    pub async fn run_probe(&self, name: &str) -> Result<ProbeOutcome> {
        let (check, timeout) = {
            let probes = self.probes.read().await;
            let probe = probes
                .get(name)
                .ok_or_else(|| Error::not_found(format!("Unknown probe: {}", name)))?;
            if !probe.settings.enabled {
                return Ok(ProbeOutcome {
                    passed: true,
                    error: None,
                });
            }
            (probe.check.clone(), probe.settings.timeout)
        };

        let outcome = match tokio::time::timeout(timeout, with_recovery_async(|| check.call(), name)).await
        {
            Ok(Ok(Ok(true))) => ProbeOutcome {
                passed: true,
                error: None,
            },
            Ok(Ok(Ok(false))) => ProbeOutcome {
                passed: false,
                error: None,
            },
            Ok(Ok(Err(e))) => ProbeOutcome {
                passed: false,
                error: Some(e.to_string()),
            },
            Ok(Err(panic)) => ProbeOutcome {
                passed: false,
                error: Some(panic.to_string()),
            },
            Err(_elapsed) => ProbeOutcome {
                passed: false,
                error: Some(Error::timeout(format!("check timed out after {:?}", timeout)).to_string()),
            },
        };

        let now = Instant::now();
        let mut probes = self.probes.write().await;
        // Removed while the check was in flight
        let Some(probe) = probes.get_mut(name) else {
            return Ok(outcome);
        };
        if outcome.passed {
            probe.record_success(now);
        } else {
            probe.record_failure(now, outcome.error.clone());
            tracing::warn!(
                probe = name,
                consecutive_failures = probe.consecutive_failures,
                error = outcome.error.as_deref().unwrap_or("check returned false"),
                "probe_failed"
            );
        }
        Ok(outcome)
    }

    /// Run every enabled probe that is due, concurrently.
    pub async fn run_due_probes(&self) -> usize {
        let now = Instant::now();
        let due: Vec<String> = self
            .probes
            .read()
            .await
            .values()
            .filter(|p| p.settings.enabled && p.is_due(now))
            .map(|p| p.name.clone())
            .collect();
        self.run_named(&due).await;
        due.len()
    }

    /// Run every enabled probe, ignoring intervals.
    pub async fn run_all_probes(&self) -> usize {
        let names: Vec<String> = self
            .probes
            .read()
            .await
            .values()
            .filter(|p| p.settings.enabled)
            .map(|p| p.name.clone())
            .collect();
        self.run_named(&names).await;
        names.len()
    }

    async fn run_named(&self, names: &[String]) {
        let runs = names.iter().map(|name| self.run_probe(name));
        for (name, result) in names.iter().zip(futures::future::join_all(runs).await) {
            if let Err(e) = result {
                tracing::debug!(probe = %name, error = %e, "probe_skipped");
            }
        }
    }

    // =========================================================================
    // Status
    // =========================================================================

    /// Worst-case roll-up across enabled probes, computed on each call.
    pub async fn overall_status(&self) -> HealthStatus {
        let probes = self.probes.read().await;
        probes
            .values()
            .filter(|p| p.settings.enabled)
            .map(HealthProbe::status)
            .fold(HealthStatus::Unknown, HealthStatus::worst)
    }

    pub async fn simple_status(&self) -> SimpleStatus {
        SimpleStatus {
            status: self.overall_status().await,
            timestamp: Utc::now(),
        }
    }

    pub async fn detailed_status(&self) -> HealthReport {
        let probes: Vec<ProbeReport> = self
            .probes
            .read()
            .await
            .values()
            .map(HealthProbe::report)
            .collect();
        HealthReport {
            status: self.overall_status().await,
            timestamp: Utc::now(),
            uptime_seconds: self.uptime().num_seconds(),
            monitoring: self.is_monitoring().await,
            probes,
            metrics: self.metrics_snapshot().await,
        }
    }

    pub fn uptime(&self) -> chrono::Duration {
        Utc::now() - self.started_at
    }

    // =========================================================================
    // Metrics
    // =========================================================================

    pub async fn record_invocation(&self, duration: Duration, success: bool) {
        self.metrics.lock().await.record(duration, success);
    }

    /// Mean response time over the current window, in milliseconds.
    pub async fn average_response_time(&self) -> f64 {
        self.metrics.lock().await.average_response_time_ms()
    }

    pub async fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.lock().await.snapshot()
    }

    // =========================================================================
    // Background loop
    // =========================================================================

    /// Start the background loop. Returns `false` if it was already running.
    ///
    /// The task holds only a weak reference; dropping the last `Arc` ends it.
    pub async fn start_monitoring(self: &Arc<Self>) -> bool {
        let mut task = self.task.lock().await;
        if task.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            return false;
        }

        let tick = if self.config.check_tick.is_zero() {
            tracing::warn!(tick = ?MIN_CHECK_TICK, "zero_check_tick_clamped");
            MIN_CHECK_TICK
        } else {
            self.config.check_tick
        };

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(monitor_loop(Arc::downgrade(self), tick, cancel.clone()));
        *task = Some(MonitorTask { cancel, handle });
        tracing::info!(tick = ?tick, "health_monitoring_started");
        true
    }

    /// Stop the loop and wait for it to exit. No probe runs after this returns.
    pub async fn stop_monitoring(&self) {
        let Some(task) = self.task.lock().await.take() else {
            return;
        };
        task.cancel.cancel();
        if let Err(e) = task.handle.await {
            tracing::error!(error = %e, "health_monitor_task_failed");
        }
        tracing::info!("health_monitoring_stopped");
    }

    pub async fn is_monitoring(&self) -> bool {
        self.task
            .lock()
            .await
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished())
    }
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new(HealthConfig::default())
    }
}

async fn monitor_loop(monitor: Weak<HealthMonitor>, tick: Duration, cancel: CancellationToken) {
    let mut ticker = interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let Some(monitor) = monitor.upgrade() else {
                    break;
                };
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    ran = monitor.run_due_probes() => {
                        if ran > 0 {
                            tracing::trace!(probes = ran, "health_tick_completed");
                        }
                    }
                }
            }
        }
    }
    tracing::debug!("health_monitor_loop_exited");
}

// =============================================================================
// Tests
// =============================================================================
