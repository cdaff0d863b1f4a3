//! In-memory metrics recorder.

use std::collections::BTreeMap;
use std::sync::Mutex;

use serde::Serialize;
use tracing::trace;

/// How a metric's values combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// Last value wins.
    Gauge,
    /// Values are summed.
    Count,
}

/// Destination for telemetry. Implementations must never block or fail
/// the caller.
pub trait MetricsSink: Send + Sync {
    fn add_metric(&self, name: &str, value: f64, kind: MetricKind, attributes: &[(&str, &str)]);
}

/// One recorded series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSample {
    pub name: String,
    pub kind: MetricKind,
    pub attributes: Vec<(String, String)>,
    pub value: f64,
}

type SeriesKey = (String, Vec<(String, String)>);

/// Thread-safe recorder keeping the latest value of every series.
#[derive(Debug, Default)]
pub struct MetricsRecorder {
    series: Mutex<BTreeMap<SeriesKey, (MetricKind, f64)>>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// All series, ordered by name then attributes.
    pub fn snapshot(&self) -> Vec<MetricSample> {
        let series = self.series.lock().unwrap_or_else(|p| p.into_inner());
        series
            .iter()
            .map(|((name, attributes), (kind, value))| MetricSample {
                name: name.clone(),
                kind: *kind,
                attributes: attributes.clone(),
                value: *value,
            })
            .collect()
    }

    /// Value of one series with exactly these attributes.
    pub fn value(&self, name: &str, attributes: &[(&str, &str)]) -> Option<f64> {
        let key = series_key(name, attributes);
        let series = self.series.lock().unwrap_or_else(|p| p.into_inner());
        series.get(&key).map(|(_, v)| *v)
    }

    /// Sum of every series with this name, regardless of attributes.
    pub fn total(&self, name: &str) -> f64 {
        let series = self.series.lock().unwrap_or_else(|p| p.into_inner());
        series
            .iter()
            .filter(|((n, _), _)| n == name)
            .map(|(_, (_, v))| *v)
            .sum()
    }
}

fn series_key(name: &str, attributes: &[(&str, &str)]) -> SeriesKey {
    let mut attrs: Vec<(String, String)> = attributes
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    attrs.sort();
    (name.to_string(), attrs)
}

impl MetricsSink for MetricsRecorder {
    fn add_metric(&self, name: &str, value: f64, kind: MetricKind, attributes: &[(&str, &str)]) {
        trace!(%name, value, ?kind, "metric");
        let key = series_key(name, attributes);
        // A poisoned lock only means another writer panicked mid-update.
        let mut series = self.series.lock().unwrap_or_else(|p| p.into_inner());
        let entry = series.entry(key).or_insert((kind, 0.0));
        entry.0 = kind;
        match kind {
            MetricKind::Gauge => entry.1 = value,
            MetricKind::Count => entry.1 += value,
        }
    }
}
