//! Telemetry
//!
//! Metrics for request dispatch and credential refresh. Logging goes
//! through `tracing` events emitted by each component.

pub mod metrics;

pub use metrics::{
    create_in_memory_metrics, no_op_metrics, InMemoryMetrics, MetricEntry, MetricLabels,
    NoOpMetrics, SessionMetrics,
};
