use crate::domain::ports::MetricsSink;
use std::sync::{Arc, Mutex};

/// Emits every gauge as a structured log line.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMetricsSink;

impl MetricsSink for TracingMetricsSink {
    fn record_gauge(&self, name: &str, value: f64, tags: &[(&str, String)]) {
        let tags = tags
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(" ");
        tracing::info!(metric = name, value, tags = %tags, "📊 gauge");
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GaugeRecord {
    pub name: String,
    pub value: f64,
    pub tags: Vec<(String, String)>,
}

impl GaugeRecord {
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Keeps recorded gauges in memory so callers can inspect them afterwards.
#[derive(Debug, Clone, Default)]
pub struct RecordingMetricsSink {
    records: Arc<Mutex<Vec<GaugeRecord>>>,
}

impl RecordingMetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<GaugeRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    pub fn named(&self, name: &str) -> Vec<GaugeRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.name == name)
            .collect()
    }
}

impl MetricsSink for RecordingMetricsSink {
    fn record_gauge(&self, name: &str, value: f64, tags: &[(&str, String)]) {
        if let Ok(mut records) = self.records.lock() {
            records.push(GaugeRecord {
                name: name.to_string(),
                value,
                tags: tags
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.clone()))
                    .collect(),
            });
        }
    }
}
