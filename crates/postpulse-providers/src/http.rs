//! Shared HTTP plumbing for provider adapters.
//!
//! Builds endpoint URLs under a provider base URL, sends bearer-authenticated
//! requests, maps non-2xx statuses and transport failures onto
//! [`IngestError`], and reads upstream quota headers.

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use postpulse_core::{IngestError, Provider};
use reqwest::header::HeaderMap;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;

use crate::error::ClientBuildError;
use crate::types::{ApiResponse, QuotaSnapshot};

/// Wait assumed when a 429 carries no usable `Retry-After`.
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Error bodies are truncated to this many characters in messages.
const ERROR_BODY_LIMIT: usize = 200;

const HEADER_LIMIT: &str = "x-ratelimit-limit";
const HEADER_REMAINING: &str = "x-ratelimit-remaining";
const HEADER_RESET: &str = "x-ratelimit-reset";

#[derive(Debug, Clone)]
pub struct HttpOptions {
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: concat!("postpulse/", env!("CARGO_PKG_VERSION")).to_owned(),
        }
    }
}

/// `reqwest` client bound to one provider's base URL.
#[derive(Debug, Clone)]
pub struct ApiHttp {
    client: Client,
    provider: Provider,
    base_url: Url,
}

impl ApiHttp {
    /// # Errors
    ///
    /// Returns [`ClientBuildError::Http`] if the `reqwest::Client` cannot be
    /// built, or [`ClientBuildError::InvalidBaseUrl`] if `base_url` does not
    /// parse.
    pub fn new(
        provider: Provider,
        base_url: &str,
        options: &HttpOptions,
    ) -> Result<Self, ClientBuildError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(options.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(options.user_agent.as_str())
            .build()?;

        // A trailing slash keeps the last path segment (e.g. an API version)
        // when joining relative endpoint paths.
        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        let parsed = Url::parse(&normalised).map_err(|e| ClientBuildError::InvalidBaseUrl {
            url: base_url.to_owned(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            client,
            provider,
            base_url: parsed,
        })
    }

    #[must_use]
    pub fn provider(&self) -> Provider {
        self.provider
    }

    /// Resolves `path` relative to the base URL.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Validation`] if the joined URL is invalid.
    pub fn endpoint(&self, path: &str) -> Result<Url, IngestError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| IngestError::Validation(format!("invalid {} endpoint {path}: {e}", self.provider)))
    }

    pub fn get(&self, url: Url, access_token: &str) -> RequestBuilder {
        self.client.get(url).bearer_auth(access_token)
    }

    pub fn post(&self, url: Url, access_token: &str) -> RequestBuilder {
        self.client.post(url).bearer_auth(access_token)
    }

    /// Sends `request` and parses a successful body as `T`.
    ///
    /// # Errors
    ///
    /// - [`IngestError::RateLimitExceeded`] on HTTP 429.
    /// - [`IngestError::TransientProvider`] on 5xx, 408, or network failure.
    /// - [`IngestError::PermanentProvider`] on any other non-2xx status.
    /// - [`IngestError::Deserialize`] if the body does not match `T`.
    pub async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        context: &str,
    ) -> Result<ApiResponse<T>, IngestError> {
        let response = request
            .send()
            .await
            .map_err(|e| classify_transport(self.provider, &e))?;
        let status = response.status();

        if !status.is_success() {
            let retry_after = retry_after_secs(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(self.provider, status, retry_after, &body));
        }

        let quota = parse_quota(response.headers());
        let text = response
            .text()
            .await
            .map_err(|e| classify_transport(self.provider, &e))?;
        let body = serde_json::from_str::<T>(&text).map_err(|e| IngestError::Deserialize {
            context: format!("{} {context}", self.provider),
            source: e,
        })?;

        Ok(ApiResponse { body, quota })
    }
}

/// Maps a non-2xx status to the error taxonomy.
pub(crate) fn classify_status(
    provider: Provider,
    status: StatusCode,
    retry_after: Option<u64>,
    body: &str,
) -> IngestError {
    let message: String = body.chars().take(ERROR_BODY_LIMIT).collect();
    if status == StatusCode::TOO_MANY_REQUESTS {
        return IngestError::RateLimitExceeded {
            provider,
            retry_after_secs: retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS),
        };
    }
    if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
        return IngestError::TransientProvider {
            provider,
            status: Some(status.as_u16()),
            message,
        };
    }
    IngestError::PermanentProvider {
        provider,
        status: status.as_u16(),
        message,
    }
}

/// Network, TLS, and timeout failures are all worth retrying.
pub(crate) fn classify_transport(provider: Provider, err: &reqwest::Error) -> IngestError {
    let kind = if err.is_timeout() {
        "timeout"
    } else if err.is_connect() {
        "connect"
    } else {
        "transport"
    };
    IngestError::TransientProvider {
        provider,
        status: err.status().map(|s| s.as_u16()),
        message: format!("{kind}: {err}"),
    }
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
}

fn retry_after_secs(headers: &HeaderMap) -> Option<u64> {
    header_u64(headers, reqwest::header::RETRY_AFTER.as_str())
}

/// Reads `x-ratelimit-limit` / `x-ratelimit-remaining` and, if present, the
/// `x-ratelimit-reset` epoch-seconds timestamp.
pub(crate) fn parse_quota(headers: &HeaderMap) -> Option<QuotaSnapshot> {
    let limit = u32::try_from(header_u64(headers, HEADER_LIMIT)?).ok()?;
    let remaining = u32::try_from(header_u64(headers, HEADER_REMAINING)?).ok()?;
    let reset_at: Option<DateTime<Utc>> = header_u64(headers, HEADER_RESET)
        .and_then(|secs| i64::try_from(secs).ok())
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single());
    Some(QuotaSnapshot {
        limit,
        remaining,
        reset_at,
    })
}

#[cfg(test)]
mod tests {
    use reqwest::header::HeaderValue;

    use super::*;

    #[test]
    fn too_many_requests_uses_retry_after_or_default() {
        let err = classify_status(Provider::TikTok, StatusCode::TOO_MANY_REQUESTS, Some(12), "");
        assert!(matches!(
            err,
            IngestError::RateLimitExceeded {
                retry_after_secs: 12,
                ..
            }
        ));
        let err = classify_status(Provider::TikTok, StatusCode::TOO_MANY_REQUESTS, None, "");
        assert_eq!(err.retry_after_secs(), Some(60));
    }

    #[test]
    fn server_errors_are_transient_client_errors_permanent() {
        let err = classify_status(Provider::YouTube, StatusCode::BAD_GATEWAY, None, "upstream");
        assert!(err.is_retriable());
        assert!(matches!(err, IngestError::TransientProvider { status: Some(502), .. }));

        let err = classify_status(Provider::YouTube, StatusCode::FORBIDDEN, None, "quota");
        assert!(!err.is_retriable());
        assert!(matches!(err, IngestError::PermanentProvider { status: 403, .. }));
    }

    #[test]
    fn long_error_bodies_are_truncated() {
        let body = "x".repeat(1_000);
        match classify_status(Provider::Instagram, StatusCode::BAD_REQUEST, None, &body) {
            IngestError::PermanentProvider { message, .. } => assert_eq!(message.len(), 200),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn quota_headers_parse_when_complete() {
        let mut headers = HeaderMap::new();
        assert!(parse_quota(&headers).is_none());

        headers.insert(HEADER_LIMIT, HeaderValue::from_static("100"));
        assert!(parse_quota(&headers).is_none(), "remaining is required");

        headers.insert(HEADER_REMAINING, HeaderValue::from_static("7"));
        headers.insert(HEADER_RESET, HeaderValue::from_static("1700000000"));
        let quota = parse_quota(&headers).unwrap();
        assert_eq!(quota.limit, 100);
        assert_eq!(quota.remaining, 7);
        assert_eq!(quota.reset_at.unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn base_url_keeps_version_segment() {
        let http = ApiHttp::new(
            Provider::Instagram,
            "https://graph.facebook.com/v19.0",
            &HttpOptions::default(),
        )
        .unwrap();
        assert_eq!(
            http.endpoint("/me/media").unwrap().as_str(),
            "https://graph.facebook.com/v19.0/me/media"
        );
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let err = ApiHttp::new(Provider::TikTok, "not a url", &HttpOptions::default()).unwrap_err();
        assert!(matches!(err, ClientBuildError::InvalidBaseUrl { .. }));
    }
}
