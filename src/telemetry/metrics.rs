//! Metrics
//!
//! Session metrics collection interfaces and implementations.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Metric labels.
pub type MetricLabels = HashMap<String, String>;

/// Session metrics interface.
pub trait SessionMetrics: Send + Sync {
    /// Record a dispatched request and its status.
    fn record_request(&self, method: &str, status: u16);

    /// Record the start of a refresh exchange.
    fn record_refresh_started(&self);

    /// Record a waiter joining an in-flight refresh.
    fn record_refresh_joined(&self);

    /// Record a settled refresh episode.
    fn record_refresh_settled(&self, success: bool, waiters: usize, duration_ms: f64);

    /// Record a replayed request.
    fn record_replay(&self, status: u16);

    /// Record a session ended by a failed refresh.
    fn record_session_ended(&self);
}

/// No-op metrics implementation.
pub struct NoOpMetrics;

impl SessionMetrics for NoOpMetrics {
    fn record_request(&self, _method: &str, _status: u16) {}
    fn record_refresh_started(&self) {}
    fn record_refresh_joined(&self) {}
    fn record_refresh_settled(&self, _success: bool, _waiters: usize, _duration_ms: f64) {}
    fn record_replay(&self, _status: u16) {}
    fn record_session_ended(&self) {}
}

/// No-op metrics singleton.
pub fn no_op_metrics() -> NoOpMetrics {
    NoOpMetrics
}

/// Metric entry for in-memory storage.
#[derive(Debug, Clone)]
pub struct MetricEntry {
    pub name: String,
    pub value: f64,
    pub labels: MetricLabels,
    pub timestamp: u64,
}

/// In-memory metrics for testing.
#[derive(Default)]
pub struct InMemoryMetrics {
    entries: Mutex<Vec<MetricEntry>>,
}

impl InMemoryMetrics {
    /// Create new in-memory metrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all recorded entries.
    pub fn get_entries(&self) -> Vec<MetricEntry> {
        self.entries.lock().clone()
    }

    /// Get entries by name.
    pub fn get_entries_by_name(&self, name: &str) -> Vec<MetricEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.name == name)
            .cloned()
            .collect()
    }

    /// Number of entries with the given name.
    pub fn count(&self, name: &str) -> usize {
        self.entries.lock().iter().filter(|e| e.name == name).count()
    }

    /// Clear all entries.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    fn record(&self, name: &str, value: f64, labels: MetricLabels) {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;

        self.entries.lock().push(MetricEntry {
            name: name.to_string(),
            value,
            labels,
            timestamp,
        });
    }
}

fn labels(pairs: &[(&str, String)]) -> MetricLabels {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

impl SessionMetrics for InMemoryMetrics {
    fn record_request(&self, method: &str, status: u16) {
        self.record(
            "session_requests_total",
            1.0,
            labels(&[("method", method.to_string()), ("status", status.to_string())]),
        );
    }

    fn record_refresh_started(&self) {
        self.record("session_refresh_started_total", 1.0, MetricLabels::new());
    }

    fn record_refresh_joined(&self) {
        self.record("session_refresh_joined_total", 1.0, MetricLabels::new());
    }

    fn record_refresh_settled(&self, success: bool, waiters: usize, duration_ms: f64) {
        self.record(
            "session_refresh_settled_total",
            waiters as f64,
            labels(&[("success", success.to_string())]),
        );
        self.record(
            "session_refresh_duration_ms",
            duration_ms,
            labels(&[("success", success.to_string())]),
        );
    }

    fn record_replay(&self, status: u16) {
        self.record(
            "session_replays_total",
            1.0,
            labels(&[("status", status.to_string())]),
        );
    }

    fn record_session_ended(&self) {
        self.record("session_ended_total", 1.0, MetricLabels::new());
    }
}

/// Create in-memory metrics for testing.
pub fn create_in_memory_metrics() -> InMemoryMetrics {
    InMemoryMetrics::new()
}
