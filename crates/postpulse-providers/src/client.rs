//! Paginating, enriching ingestion client shared by every provider.
//!
//! [`IngestionClient`] drives a [`PlatformApi`] adapter: it resolves
//! credentials, walks listing pages until the lookback window is covered, then
//! re-fetches each listed post in fixed-size concurrent batches. Every
//! upstream call waits on the provider's shared [`RateLimiter`] and is wrapped
//! in the configured [`RetryPolicy`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use postpulse_core::{AppConfig, IngestError, PostMetric, Provider};
use postpulse_resilience::{retry_with_backoff, RateLimiter, RetryPolicy};

use crate::api::{ListTarget, PlatformApi};
use crate::credentials::{CredentialProvider, Credentials};
use crate::error::ClientBuildError;
use crate::http::HttpOptions;
use crate::instagram::InstagramApi;
use crate::source::{PageLimits, Pagination, PostBatch, PostSource, StopReason};
use crate::tiktok::TikTokApi;
use crate::types::{ApiResponse, RawPost};
use crate::youtube::YouTubeApi;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestionOptions {
    /// Posts enriched concurrently per batch.
    pub batch_size: usize,
    /// Pause between enrichment batches.
    pub inter_batch_delay: Duration,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            batch_size: 5,
            inter_batch_delay: Duration::from_secs(1),
        }
    }
}

/// Everything a provider client needs besides its credentials and limiter.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub http: HttpOptions,
    pub retry: RetryPolicy,
    pub ingestion: IngestionOptions,
}

impl ClientSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            http: HttpOptions {
                timeout_secs: config.request_timeout_secs,
                user_agent: config.user_agent.clone(),
            },
            retry: RetryPolicy {
                max_retries: config.retry_max_retries,
                initial_delay: Duration::from_millis(config.retry_initial_delay_ms),
                max_delay: Duration::from_millis(config.retry_max_delay_ms),
                ..RetryPolicy::default()
            },
            ingestion: IngestionOptions {
                batch_size: config.batch_size,
                inter_batch_delay: Duration::from_millis(config.inter_batch_delay_ms),
            },
        }
    }
}

pub struct IngestionClient<A> {
    api: A,
    credentials: Arc<dyn CredentialProvider>,
    limiter: RateLimiter,
    retry: RetryPolicy,
    options: IngestionOptions,
}

impl<A: PlatformApi> IngestionClient<A> {
    #[must_use]
    pub fn new(
        api: A,
        credentials: Arc<dyn CredentialProvider>,
        limiter: RateLimiter,
        retry: RetryPolicy,
        options: IngestionOptions,
    ) -> Self {
        Self {
            api,
            credentials,
            limiter,
            retry,
            options,
        }
    }

    #[must_use]
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    async fn credentials_for(&self, user_id: &str) -> Result<Credentials, IngestError> {
        let provider = self.api.provider();
        self.credentials
            .get_valid_credentials(provider, user_id)
            .await
            .ok_or_else(|| IngestError::Auth {
                provider,
                user_id: user_id.to_owned(),
            })
    }

    /// One throttled, retried upstream call. Quota headers on the final
    /// response are fed back into the limiter.
    async fn call<T, F, Fut>(&self, mut operation: F) -> Result<T, IngestError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<ApiResponse<T>, IngestError>>,
    {
        let provider = self.api.provider();
        let limiter = &self.limiter;
        let response = retry_with_backoff(
            &self.retry,
            |err: &IngestError, attempt| {
                tracing::warn!(
                    provider = %provider,
                    attempt,
                    max_retries = self.retry.max_retries,
                    error = %err,
                    "upstream call failed, retrying after back-off"
                );
            },
            || {
                let request = operation();
                async move {
                    limiter.acquire().await;
                    request.await
                }
            },
        )
        .await?;

        if let Some(quota) = response.quota {
            limiter.update_limits(quota.limit, quota.remaining, quota.reset_at);
        }
        Ok(response.body)
    }

    /// Walks listing pages newest-first. Stops when the provider has no more
    /// pages, when `limits.max_pages` is reached, or when a page's oldest post
    /// predates `since`. Posts older than `since` are dropped.
    async fn list_window(
        &self,
        credentials: &Credentials,
        target: ListTarget<'_>,
        since: DateTime<Utc>,
        limits: PageLimits,
    ) -> Result<(Vec<RawPost>, Option<u64>, Pagination), IngestError> {
        let provider = self.api.provider();
        let max_pages = limits.max_pages.max(1);
        let mut listed = Vec::new();
        let mut follower_count = None;
        let mut cursor: Option<String> = None;
        let mut pages_fetched = 0u32;

        loop {
            let page = self
                .call(|| {
                    self.api
                        .list_page(credentials, target, cursor.as_deref(), limits.max_per_page)
                })
                .await?;
            pages_fetched += 1;
            follower_count = follower_count.or(page.follower_count);

            let oldest = page.items.iter().filter_map(RawPost::published_at).min();
            let before = listed.len();
            listed.extend(
                page.items
                    .into_iter()
                    .filter(|item| item.published_at().is_some_and(|at| at >= since)),
            );
            tracing::debug!(
                provider = %provider,
                page = pages_fetched,
                kept = listed.len() - before,
                "fetched listing page"
            );

            let next = page.next_cursor.filter(|_| page.has_more);
            let stop = match &next {
                None => Some(StopReason::Exhausted),
                Some(_) if oldest.is_some_and(|at| at < since) => Some(StopReason::LookbackReached),
                Some(_) if pages_fetched >= max_pages => Some(StopReason::MaxPages),
                Some(_) => None,
            };

            if let Some(stop_reason) = stop {
                return Ok((
                    listed,
                    follower_count,
                    Pagination {
                        pages_fetched,
                        has_more: next.is_some(),
                        next_cursor: next,
                        stop_reason,
                    },
                ));
            }
            cursor = next;
        }
    }

    /// Re-fetches listed posts in sequential batches of concurrent calls.
    /// A post whose fetch fails keeps the fields from its listing record.
    async fn enrich(
        &self,
        credentials: &Credentials,
        listed: &[RawPost],
        follower_count: Option<u64>,
    ) -> Vec<PostMetric> {
        let batch_size = self.options.batch_size.max(1);
        let mut posts = Vec::with_capacity(listed.len());

        for (index, batch) in listed.chunks(batch_size).enumerate() {
            if index > 0 && !self.options.inter_batch_delay.is_zero() {
                tokio::time::sleep(self.options.inter_batch_delay).await;
            }
            let enriched = join_all(
                batch
                    .iter()
                    .map(|raw| self.enrich_one(credentials, raw, follower_count)),
            )
            .await;
            posts.extend(enriched.into_iter().flatten());
        }
        posts
    }

    async fn enrich_one(
        &self,
        credentials: &Credentials,
        raw: &RawPost,
        follower_count: Option<u64>,
    ) -> Option<PostMetric> {
        let post_id = raw.native_id();
        match self
            .call(|| self.api.fetch_item(credentials, post_id))
            .await
        {
            Ok(full) => full
                .to_metric(follower_count)
                .or_else(|| raw.to_metric(follower_count)),
            Err(e) => {
                tracing::warn!(
                    provider = %self.api.provider(),
                    post_id,
                    error = %e,
                    "post enrichment failed, keeping listing fields"
                );
                raw.to_metric(follower_count)
            }
        }
    }

    async fn ingest(
        &self,
        target: ListTarget<'_>,
        lookback_days: u32,
        limits: PageLimits,
    ) -> Result<PostBatch, IngestError> {
        let credentials = self.credentials_for(target.user_id()).await?;
        let since = Utc::now() - chrono::Duration::days(i64::from(lookback_days));
        let (listed, follower_count, pagination) = self
            .list_window(&credentials, target, since, limits)
            .await?;
        let posts = self.enrich(&credentials, &listed, follower_count).await;

        tracing::info!(
            provider = %self.api.provider(),
            pages = pagination.pages_fetched,
            stop_reason = ?pagination.stop_reason,
            posts = posts.len(),
            "ingested posts"
        );
        Ok(PostBatch { posts, pagination })
    }
}

#[async_trait]
impl<A: PlatformApi> PostSource for IngestionClient<A> {
    fn provider(&self) -> Provider {
        self.api.provider()
    }

    async fn get_user_posts(
        &self,
        user_id: &str,
        lookback_days: u32,
        limits: PageLimits,
    ) -> Result<PostBatch, IngestError> {
        self.ingest(ListTarget::Own { user_id }, lookback_days, limits)
            .await
    }

    async fn get_competitor_posts(
        &self,
        user_id: &str,
        handle: &str,
        lookback_days: u32,
        limits: PageLimits,
    ) -> Result<PostBatch, IngestError> {
        self.ingest(
            ListTarget::Competitor { user_id, handle },
            lookback_days,
            limits,
        )
        .await
    }

    async fn get_post_metrics(&self, user_id: &str, post_id: &str) -> Result<PostMetric, IngestError> {
        let credentials = self.credentials_for(user_id).await?;
        let raw = self
            .call(|| self.api.fetch_item(&credentials, post_id))
            .await?;
        raw.to_metric(None).ok_or_else(|| IngestError::PermanentProvider {
            provider: self.api.provider(),
            status: 422,
            message: format!("post {post_id} has no usable publish time"),
        })
    }
}

/// Builds the ingestion client for `provider` against `base_url`.
///
/// # Errors
///
/// Returns [`ClientBuildError`] if the HTTP client cannot be built or
/// `base_url` is invalid.
pub fn build_source(
    provider: Provider,
    base_url: &str,
    settings: &ClientSettings,
    credentials: Arc<dyn CredentialProvider>,
    limiter: RateLimiter,
) -> Result<Arc<dyn PostSource>, ClientBuildError> {
    let retry = settings.retry.clone();
    let options = settings.ingestion;
    let source: Arc<dyn PostSource> = match provider {
        Provider::TikTok => Arc::new(IngestionClient::new(
            TikTokApi::with_base_url(base_url, &settings.http)?,
            credentials,
            limiter,
            retry,
            options,
        )),
        Provider::Instagram => Arc::new(IngestionClient::new(
            InstagramApi::with_base_url(base_url, &settings.http)?,
            credentials,
            limiter,
            retry,
            options,
        )),
        Provider::YouTube => Arc::new(IngestionClient::new(
            YouTubeApi::with_base_url(base_url, &settings.http)?,
            credentials,
            limiter,
            retry,
            options,
        )),
    };
    Ok(source)
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;
