use thiserror::Error;

use crate::provider::Provider;

/// Errors surfaced by the ingestion engine and its provider clients.
///
/// Retry and circuit-breaker classification is driven by the variant, never by
/// message text: see [`IngestError::is_retriable`].
#[derive(Debug, Error)]
pub enum IngestError {
    /// No valid credentials were available for the provider/user pair.
    #[error("no valid {provider} credentials for user {user_id}")]
    Auth { provider: Provider, user_id: String },

    /// Upstream answered HTTP 429. Distinct from local rate-limit admission.
    #[error("{provider} rate limit exceeded (retry after {retry_after_secs}s)")]
    RateLimitExceeded {
        provider: Provider,
        retry_after_secs: u64,
    },

    /// The provider's circuit breaker rejected the call without a network request.
    #[error("{provider} service unavailable: circuit open")]
    CircuitOpen { provider: Provider },

    /// 5xx or network failure; worth retrying.
    #[error("transient {provider} failure{}: {message}", status_suffix(*.status))]
    TransientProvider {
        provider: Provider,
        status: Option<u16>,
        message: String,
    },

    /// 4xx other than 429; retrying will not help.
    #[error("{provider} rejected the request (HTTP {status}): {message}")]
    PermanentProvider {
        provider: Provider,
        status: u16,
        message: String,
    },

    /// Upstream body did not match the expected shape.
    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid scan options: {0}")]
    Validation(String),

    #[error("scan timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("cache error: {0}")]
    Cache(String),
}

fn status_suffix(status: Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

impl IngestError {
    /// Returns `true` for errors that should be retried after a back-off delay:
    /// transient provider failures and upstream 429s.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            IngestError::TransientProvider { .. } | IngestError::RateLimitExceeded { .. }
        )
    }

    /// Minimum wait the upstream asked for, if any.
    #[must_use]
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            IngestError::RateLimitExceeded {
                retry_after_secs, ..
            } => Some(*retry_after_secs),
            _ => None,
        }
    }

    /// Whether this failure should count against the provider's circuit breaker.
    ///
    /// Local rejections (open circuit, missing credentials, bad options) say
    /// nothing about upstream health.
    #[must_use]
    pub fn counts_against_breaker(&self) -> bool {
        !matches!(
            self,
            IngestError::CircuitOpen { .. }
                | IngestError::Auth { .. }
                | IngestError::Validation(_)
                | IngestError::Cache(_)
        )
    }
}

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_and_rate_limit_are_retriable() {
        assert!(IngestError::TransientProvider {
            provider: Provider::TikTok,
            status: Some(503),
            message: "unavailable".to_owned(),
        }
        .is_retriable());
        assert!(IngestError::RateLimitExceeded {
            provider: Provider::TikTok,
            retry_after_secs: 5,
        }
        .is_retriable());
    }

    #[test]
    fn permanent_and_validation_are_not_retriable() {
        assert!(!IngestError::PermanentProvider {
            provider: Provider::YouTube,
            status: 403,
            message: "forbidden".to_owned(),
        }
        .is_retriable());
        assert!(!IngestError::Validation("bad".to_owned()).is_retriable());
        assert!(!IngestError::CircuitOpen {
            provider: Provider::YouTube
        }
        .is_retriable());
    }

    #[test]
    fn local_rejections_do_not_count_against_breaker() {
        assert!(!IngestError::CircuitOpen {
            provider: Provider::Instagram
        }
        .counts_against_breaker());
        assert!(!IngestError::Auth {
            provider: Provider::Instagram,
            user_id: "u1".to_owned(),
        }
        .counts_against_breaker());
        assert!(IngestError::TransientProvider {
            provider: Provider::Instagram,
            status: None,
            message: "connection reset".to_owned(),
        }
        .counts_against_breaker());
    }

    #[test]
    fn transient_message_includes_status_when_known() {
        let err = IngestError::TransientProvider {
            provider: Provider::TikTok,
            status: Some(502),
            message: "bad gateway".to_owned(),
        };
        assert_eq!(err.to_string(), "transient tiktok failure (HTTP 502): bad gateway");
    }
}
