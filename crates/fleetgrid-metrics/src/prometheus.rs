//! Prometheus text exposition format.
//!
//! Renders recorded series for scraping by a Prometheus server or
//! compatible agent. Dotted names become underscored and are prefixed
//! with `fleetgrid_`; counts are exposed as counters.

use crate::recorder::{MetricKind, MetricSample};

/// Render a snapshot into Prometheus text format.
pub fn render_prometheus(samples: &[MetricSample]) -> String {
    let mut out = String::new();
    let mut current: Option<&str> = None;

    for s in samples {
        let name = metric_name(&s.name);
        if current != Some(s.name.as_str()) {
            let kind = match s.kind {
                MetricKind::Gauge => "gauge",
                MetricKind::Count => "counter",
            };
            out.push_str(&format!("# TYPE {name} {kind}\n"));
            current = Some(s.name.as_str());
        }
        if s.attributes.is_empty() {
            out.push_str(&format!("{name} {}\n", s.value));
        } else {
            let labels: Vec<String> = s
                .attributes
                .iter()
                .map(|(k, v)| format!("{}=\"{}\"", label_name(k), escape(v)))
                .collect();
            out.push_str(&format!("{name}{{{}}} {}\n", labels.join(","), s.value));
        }
    }

    out
}

fn metric_name(name: &str) -> String {
    format!("fleetgrid_{}", label_name(name))
}

fn label_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn escape(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
