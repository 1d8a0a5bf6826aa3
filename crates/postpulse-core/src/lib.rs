//! Shared domain types, error taxonomy, event bus, and configuration for the
//! postpulse ingestion engine.

pub mod app_config;
pub mod config;
pub mod error;
pub mod events;
pub mod post;
pub mod provider;
pub mod scan;

pub use app_config::{AppConfig, Environment, ProviderSettings};
pub use config::{load_app_config, load_app_config_from_env};
pub use error::{ConfigError, IngestError};
pub use events::{EventBus, EventTopic, LogEntry, LogLevel, MetricEvent, ScanFailed};
pub use post::{engagement_rate, extract_hashtags, ContentType, EngagementCounts, PostMetric};
pub use provider::Provider;
pub use scan::{PeakTime, Scan, ScanOptions, ScanResults, ScanStatus};
