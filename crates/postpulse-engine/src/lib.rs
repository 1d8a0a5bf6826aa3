//! Scan orchestration for postpulse.
//!
//! [`Orchestrator`] owns the scan lifecycle: it validates options, fans out
//! to each provider's [`postpulse_providers::PostSource`] behind a circuit
//! breaker and the cache, aggregates the posts, and announces the outcome on
//! the [`postpulse_core::EventBus`]. Throttling and retries belong to the
//! sources themselves.

pub mod aggregate;
pub mod config;
pub mod orchestrator;
pub mod registry;
pub mod scheduler;

pub use aggregate::{aggregate, TOP_POSTS};
pub use config::EngineConfig;
pub use orchestrator::{Orchestrator, ANALYTICS_SEGMENT, POSTS_SEGMENT, SCANS_SEGMENT};
pub use registry::ScanRegistry;
pub use scheduler::{build_cleanup_scheduler, CLEANUP_SCHEDULE};
