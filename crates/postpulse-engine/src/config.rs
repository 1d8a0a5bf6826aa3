use std::time::Duration;

use postpulse_core::AppConfig;
use postpulse_providers::PageLimits;
use postpulse_resilience::CircuitBreakerConfig;

/// Orchestrator tuning. Derived from [`AppConfig`] by the binary; tests build
/// it directly.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Base TTL for raw post listings, scaled by observed volatility.
    pub posts_ttl: Duration,
    pub posts_stale_window: Duration,
    pub analytics_ttl: Duration,
    pub scan_timeout: Duration,
    /// How long scans stay in memory and in the cache mirror.
    pub scan_retention: Duration,
    pub page_limits: PageLimits,
    pub breaker: CircuitBreakerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            posts_ttl: Duration::from_secs(60 * 60),
            posts_stale_window: Duration::from_secs(15 * 60),
            analytics_ttl: Duration::from_secs(4 * 60 * 60),
            scan_timeout: Duration::from_secs(5 * 60),
            scan_retention: Duration::from_secs(24 * 60 * 60),
            page_limits: PageLimits::default(),
            breaker: CircuitBreakerConfig::default(),
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            posts_ttl: Duration::from_secs(config.posts_cache_ttl_secs),
            posts_stale_window: Duration::from_secs(config.posts_stale_window_secs),
            analytics_ttl: Duration::from_secs(config.analytics_cache_ttl_secs),
            scan_timeout: Duration::from_secs(config.scan_timeout_secs),
            scan_retention: Duration::from_secs(config.scan_retention_secs),
            page_limits: PageLimits {
                max_pages: config.max_pages,
                max_per_page: config.max_per_page,
            },
            breaker: CircuitBreakerConfig {
                failure_threshold: config.breaker_failure_threshold,
                success_threshold: config.breaker_success_threshold,
                reset_timeout: Duration::from_secs(config.breaker_reset_timeout_secs),
            },
        }
    }
}
