//! Invocation metrics over a bounded response-time window.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

/// Response-time samples (FIFO, oldest evicted first) and request counters.
#[derive(Debug)]
pub struct InvocationMetrics {
    samples_ms: VecDeque<f64>,
    capacity: usize,
    total_requests: u64,
    successful_requests: u64,
    failed_requests: u64,
    last_request_time: Option<DateTime<Utc>>,
}

impl InvocationMetrics {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples_ms: VecDeque::with_capacity(capacity),
            capacity,
            total_requests: 0,
            successful_requests: 0,
            failed_requests: 0,
            last_request_time: None,
        }
    }

    pub fn record(&mut self, duration: Duration, success: bool) {
        self.samples_ms.push_back(duration.as_secs_f64() * 1000.0);
        while self.samples_ms.len() > self.capacity {
            self.samples_ms.pop_front();
        }

        self.total_requests += 1;
        if success {
            self.successful_requests += 1;
        } else {
            self.failed_requests += 1;
        }
        self.last_request_time = Some(Utc::now());
    }

    /// Mean of the current window in milliseconds, 0 when empty.
    pub fn average_response_time_ms(&self) -> f64 {
        if self.samples_ms.is_empty() {
            return 0.0;
        }
        self.samples_ms.iter().sum::<f64>() / self.samples_ms.len() as f64
    }

    pub fn error_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        self.failed_requests as f64 / self.total_requests as f64
    }

    pub fn window_len(&self) -> usize {
        self.samples_ms.len()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests: self.total_requests,
            successful_requests: self.successful_requests,
            failed_requests: self.failed_requests,
            average_response_time_ms: self.average_response_time_ms(),
            error_rate: self.error_rate(),
            window_len: self.window_len(),
            last_request_time: self.last_request_time,
        }
    }
}

/// Point-in-time copy of the metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub average_response_time_ms: f64,
    pub error_rate: f64,
    pub window_len: usize,
    pub last_request_time: Option<DateTime<Utc>>,
}
