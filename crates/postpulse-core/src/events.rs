//! Lifecycle and observability event bus.
//!
//! Four fixed topics, each backed by its own `tokio::sync::broadcast`
//! channel. Publishing never fails: with no subscribers the event is dropped.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::provider::Provider;
use crate::scan::Scan;

const TOPIC_CAPACITY: usize = 256;

/// The only topic names that are part of the engine's contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventTopic {
    ScanCompleted,
    ScanFailed,
    Log,
    Metrics,
}

impl EventTopic {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            EventTopic::ScanCompleted => "scan.completed",
            EventTopic::ScanFailed => "scan.failed",
            EventTopic::Log => "log",
            EventTopic::Metrics => "metrics",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanFailed {
    pub scan: Scan,
    pub error: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    pub scan_id: Option<String>,
    pub provider: Option<Provider>,
    pub at: DateTime<Utc>,
}

impl LogEntry {
    #[must_use]
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            scan_id: None,
            provider: None,
            at: Utc::now(),
        }
    }

    #[must_use]
    pub fn scan(mut self, scan_id: &str) -> Self {
        self.scan_id = Some(scan_id.to_owned());
        self
    }

    #[must_use]
    pub fn provider(mut self, provider: Provider) -> Self {
        self.provider = Some(provider);
        self
    }
}

/// A named measurement, e.g. `cache.hit` with `segment` and `key` labels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricEvent {
    pub name: String,
    pub value: f64,
    pub labels: BTreeMap<String, String>,
    pub at: DateTime<Utc>,
}

impl MetricEvent {
    #[must_use]
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
            labels: BTreeMap::new(),
            at: Utc::now(),
        }
    }

    #[must_use]
    pub fn label(mut self, key: &str, value: impl Into<String>) -> Self {
        self.labels.insert(key.to_owned(), value.into());
        self
    }
}

/// Process-wide publish/subscribe hub, constructed once and cloned into each
/// component that emits events.
#[derive(Debug, Clone)]
pub struct EventBus {
    completed: broadcast::Sender<Scan>,
    failed: broadcast::Sender<ScanFailed>,
    logs: broadcast::Sender<LogEntry>,
    metrics: broadcast::Sender<MetricEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        let (completed, _) = broadcast::channel(TOPIC_CAPACITY);
        let (failed, _) = broadcast::channel(TOPIC_CAPACITY);
        let (logs, _) = broadcast::channel(TOPIC_CAPACITY);
        let (metrics, _) = broadcast::channel(TOPIC_CAPACITY);
        Self {
            completed,
            failed,
            logs,
            metrics,
        }
    }

    pub fn publish_completed(&self, scan: Scan) {
        let _ = self.completed.send(scan);
    }

    pub fn publish_failed(&self, scan: Scan, error: String) {
        let _ = self.failed.send(ScanFailed { scan, error });
    }

    pub fn publish_log(&self, entry: LogEntry) {
        let _ = self.logs.send(entry);
    }

    pub fn publish_metric(&self, metric: MetricEvent) {
        let _ = self.metrics.send(metric);
    }

    #[must_use]
    pub fn subscribe_completed(&self) -> broadcast::Receiver<Scan> {
        self.completed.subscribe()
    }

    #[must_use]
    pub fn subscribe_failed(&self) -> broadcast::Receiver<ScanFailed> {
        self.failed.subscribe()
    }

    #[must_use]
    pub fn subscribe_logs(&self) -> broadcast::Receiver<LogEntry> {
        self.logs.subscribe()
    }

    #[must_use]
    pub fn subscribe_metrics(&self) -> broadcast::Receiver<MetricEvent> {
        self.metrics.subscribe()
    }
}
