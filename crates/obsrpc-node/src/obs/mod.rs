//! In-process metrics rendered in Prometheus text format by the ops endpoint.

pub mod metrics;

pub use metrics::NodeMetrics;
