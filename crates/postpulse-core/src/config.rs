use std::str::FromStr;

use crate::app_config::{AppConfig, Environment, ProviderSettings};
use crate::error::ConfigError;

const DEFAULT_TIKTOK_BASE_URL: &str = "https://open.tiktokapis.com";
const DEFAULT_INSTAGRAM_BASE_URL: &str = "https://graph.facebook.com/v19.0";
const DEFAULT_YOUTUBE_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if a value is present but invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if a value is present but invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the process environment so it can be tested with a plain
/// `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let parse_u32 = |var: &str, default: &str| parse_var::<u32>(var, &or_default(var, default));
    let parse_u64 = |var: &str, default: &str| parse_var::<u64>(var, &or_default(var, default));
    let parse_usize =
        |var: &str, default: &str| parse_var::<usize>(var, &or_default(var, default));

    let provider = |name: &str, base_url: &str, rpm: &str| -> Result<ProviderSettings, ConfigError> {
        let rpm_var = format!("POSTPULSE_{name}_REQUESTS_PER_MINUTE");
        let requests_per_minute = parse_u32(&rpm_var, rpm)?;
        if requests_per_minute == 0 {
            return Err(ConfigError::InvalidEnvVar {
                var: rpm_var,
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(ProviderSettings {
            base_url: or_default(&format!("POSTPULSE_{name}_BASE_URL"), base_url),
            access_token: lookup(&format!("POSTPULSE_{name}_ACCESS_TOKEN"))
                .ok()
                .filter(|t| !t.trim().is_empty()),
            requests_per_minute,
        })
    };

    let env = parse_environment(&or_default("POSTPULSE_ENV", "development"))?;
    let log_level = or_default("POSTPULSE_LOG_LEVEL", "info");
    let request_timeout_secs = parse_u64("POSTPULSE_REQUEST_TIMEOUT_SECS", "30")?;
    let user_agent = or_default("POSTPULSE_USER_AGENT", "postpulse/0.1 (post-ingestion)");

    let tiktok = provider("TIKTOK", DEFAULT_TIKTOK_BASE_URL, "600")?;
    let instagram = provider("INSTAGRAM", DEFAULT_INSTAGRAM_BASE_URL, "200")?;
    let youtube = provider("YOUTUBE", DEFAULT_YOUTUBE_BASE_URL, "100")?;

    let rate_limit_burst = parse_u32("POSTPULSE_RATE_LIMIT_BURST", "10")?;
    let breaker_failure_threshold = parse_u32("POSTPULSE_BREAKER_FAILURE_THRESHOLD", "5")?;
    let breaker_success_threshold = parse_u32("POSTPULSE_BREAKER_SUCCESS_THRESHOLD", "2")?;
    let breaker_reset_timeout_secs = parse_u64("POSTPULSE_BREAKER_RESET_TIMEOUT_SECS", "60")?;

    let retry_max_retries = parse_u32("POSTPULSE_RETRY_MAX_RETRIES", "3")?;
    let retry_initial_delay_ms = parse_u64("POSTPULSE_RETRY_INITIAL_DELAY_MS", "1000")?;
    let retry_max_delay_ms = parse_u64("POSTPULSE_RETRY_MAX_DELAY_MS", "30000")?;

    let batch_size = parse_usize("POSTPULSE_BATCH_SIZE", "5")?;
    if batch_size == 0 {
        return Err(ConfigError::InvalidEnvVar {
            var: "POSTPULSE_BATCH_SIZE".to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    let inter_batch_delay_ms = parse_u64("POSTPULSE_INTER_BATCH_DELAY_MS", "1000")?;
    let max_pages = parse_u32("POSTPULSE_MAX_PAGES", "10")?;
    let max_per_page = parse_u32("POSTPULSE_MAX_PER_PAGE", "20")?;

    let posts_cache_ttl_secs = parse_u64("POSTPULSE_POSTS_CACHE_TTL_SECS", "3600")?;
    let posts_stale_window_secs = parse_u64("POSTPULSE_POSTS_STALE_WINDOW_SECS", "900")?;
    let analytics_cache_ttl_secs = parse_u64("POSTPULSE_ANALYTICS_CACHE_TTL_SECS", "14400")?;
    let scan_timeout_secs = parse_u64("POSTPULSE_SCAN_TIMEOUT_SECS", "300")?;
    let scan_retention_secs = parse_u64("POSTPULSE_SCAN_RETENTION_SECS", "86400")?;

    Ok(AppConfig {
        env,
        log_level,
        request_timeout_secs,
        user_agent,
        tiktok,
        instagram,
        youtube,
        rate_limit_burst,
        breaker_failure_threshold,
        breaker_success_threshold,
        breaker_reset_timeout_secs,
        retry_max_retries,
        retry_initial_delay_ms,
        retry_max_delay_ms,
        batch_size,
        inter_batch_delay_ms,
        max_pages,
        max_per_page,
        posts_cache_ttl_secs,
        posts_stale_window_secs,
        analytics_cache_ttl_secs,
        scan_timeout_secs,
        scan_retention_secs,
    })
}

fn parse_var<T>(var: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
}

/// Parse a string into an `Environment` variant.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "POSTPULSE_ENV".to_string(),
            reason: format!("unknown environment \"{other}\""),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
