use crate::provider::Provider;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Per-provider endpoint, credential, and quota settings.
#[derive(Clone)]
pub struct ProviderSettings {
    pub base_url: String,
    pub access_token: Option<String>,
    pub requests_per_minute: u32,
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("base_url", &self.base_url)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[redacted]"),
            )
            .field("requests_per_minute", &self.requests_per_minute)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub env: Environment,
    pub log_level: String,
    pub request_timeout_secs: u64,
    pub user_agent: String,
    pub tiktok: ProviderSettings,
    pub instagram: ProviderSettings,
    pub youtube: ProviderSettings,
    pub rate_limit_burst: u32,
    pub breaker_failure_threshold: u32,
    pub breaker_success_threshold: u32,
    pub breaker_reset_timeout_secs: u64,
    pub retry_max_retries: u32,
    pub retry_initial_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub batch_size: usize,
    pub inter_batch_delay_ms: u64,
    pub max_pages: u32,
    pub max_per_page: u32,
    pub posts_cache_ttl_secs: u64,
    pub posts_stale_window_secs: u64,
    pub analytics_cache_ttl_secs: u64,
    pub scan_timeout_secs: u64,
    pub scan_retention_secs: u64,
}

impl AppConfig {
    #[must_use]
    pub fn provider(&self, provider: Provider) -> &ProviderSettings {
        match provider {
            Provider::TikTok => &self.tiktok,
            Provider::Instagram => &self.instagram,
            Provider::YouTube => &self.youtube,
        }
    }
}
