//! fleetgrid-metrics — fire-and-forget telemetry for the control loops.
//!
//! # Architecture
//!
//! ```text
//! MetricsSink (trait)
//!   └── add_metric(name, value, kind, attributes) ← engines, service, distributor
//!
//! MetricsRecorder
//!   ├── gauges overwrite, counts accumulate, keyed by name + attributes
//!   └── snapshot() → render_prometheus() → text/plain for /metrics
//! ```

pub mod prometheus;
pub mod recorder;

pub use prometheus::render_prometheus;
pub use recorder::{MetricKind, MetricSample, MetricsRecorder, MetricsSink};
