use thiserror::Error;

/// Errors raised while constructing a provider adapter. Request-time failures
/// are reported as [`postpulse_core::IngestError`].
#[derive(Debug, Error)]
pub enum ClientBuildError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid base URL \"{url}\": {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}
