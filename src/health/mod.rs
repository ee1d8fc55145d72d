//! Health monitoring with consecutive-failure hysteresis.
//!
//! Each probe carries its own interval, timeout and thresholds. The loop ticks
//! at a fixed cadence and runs whichever probes are due; the aggregate status
//! is derived fresh from probe counters on every query.

pub mod metrics;
pub mod monitor;
pub mod probe;

pub use metrics::{InvocationMetrics, MetricsSnapshot};
pub use monitor::{HealthMonitor, HealthReport, ProbeOutcome, SimpleStatus};
pub use probe::{CheckResult, HealthProbe, ProbeCheck, ProbeError, ProbeReport, ProbeSettings};
