//! Scan orchestration: lifecycle, provider fan-out, caching, aggregation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, TimeDelta, Utc};
use futures::future::join_all;
use postpulse_cache::{Cache, SetOptions};
use postpulse_core::{
    EventBus, IngestError, LogEntry, LogLevel, MetricEvent, PostMetric, Provider, Scan,
    ScanOptions, ScanResults,
};
use postpulse_providers::{PostBatch, PostSource};
use postpulse_resilience::{CircuitBreakerRegistry, CircuitState};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::aggregate::aggregate;
use crate::config::EngineConfig;
use crate::registry::ScanRegistry;

pub const POSTS_SEGMENT: &str = "posts";
pub const ANALYTICS_SEGMENT: &str = "analytics";
pub const SCANS_SEGMENT: &str = "scans";

/// Owns every scan and the per-provider resilience state.
///
/// Cheap to clone; clones share the registry, breakers, and cache.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    config: EngineConfig,
    providers: HashMap<Provider, Arc<dyn PostSource>>,
    breakers: CircuitBreakerRegistry,
    cache: Cache,
    scans: ScanRegistry,
    events: EventBus,
}

/// One cached post listing request.
#[derive(Debug, Clone)]
enum PostQuery {
    Own {
        provider: Provider,
        user_id: String,
        lookback_days: u32,
    },
    Competitor {
        provider: Provider,
        user_id: String,
        handle: String,
        lookback_days: u32,
    },
}

impl PostQuery {
    fn provider(&self) -> Provider {
        match self {
            PostQuery::Own { provider, .. } | PostQuery::Competitor { provider, .. } => *provider,
        }
    }
}

impl Orchestrator {
    /// Builds an orchestrator over `sources`, keyed by each source's provider.
    /// A later source for the same provider replaces an earlier one.
    ///
    /// Sources own their rate limiting and retries; the orchestrator calls
    /// each one once per cache miss.
    #[must_use]
    pub fn new(
        config: EngineConfig,
        cache: Cache,
        events: EventBus,
        sources: impl IntoIterator<Item = Arc<dyn PostSource>>,
    ) -> Self {
        let providers: HashMap<Provider, Arc<dyn PostSource>> = sources
            .into_iter()
            .map(|source| (source.provider(), source))
            .collect();
        let breakers =
            CircuitBreakerRegistry::new(config.breaker, providers.keys().map(|p| p.as_str()));
        Self {
            inner: Arc::new(Inner {
                config,
                providers,
                breakers,
                cache,
                scans: ScanRegistry::new(),
                events,
            }),
        }
    }

    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    #[must_use]
    pub fn cache(&self) -> &Cache {
        &self.inner.cache
    }

    #[must_use]
    pub fn breaker_state(&self, provider: Provider) -> CircuitState {
        self.inner.breakers.state(provider.as_str())
    }

    /// Validates `options`, records a pending scan, and starts processing it
    /// in the background. Returns the new scan id immediately.
    ///
    /// Completion or failure is announced on the event bus; poll with
    /// [`Orchestrator::get_scan_result`] otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Validation`] for invalid options or a provider
    /// with no configured source.
    pub async fn start_scan(&self, user_id: &str, options: ScanOptions) -> Result<String, IngestError> {
        options.validate()?;
        if user_id.trim().is_empty() {
            return Err(IngestError::Validation("user id must not be blank".to_owned()));
        }
        if let Some(missing) = options
            .providers
            .iter()
            .find(|p| !self.inner.providers.contains_key(*p))
        {
            return Err(IngestError::Validation(format!(
                "provider {missing} is not configured"
            )));
        }

        let id = Uuid::new_v4().to_string();
        let scan = Scan::new(id.clone(), user_id.to_owned(), options, Utc::now());
        self.inner.scans.insert(scan.clone());
        self.mirror(&scan);
        tracing::info!(
            scan_id = %id,
            user_id,
            providers = ?scan.options.providers,
            lookback_days = scan.options.lookback_days,
            "scan queued"
        );

        let this = self.clone();
        let scan_id = id.clone();
        tokio::spawn(async move { this.run_scan(&scan_id).await });
        Ok(id)
    }

    /// Current state of a scan: the in-memory record, or its cache mirror if
    /// the record has been swept.
    #[must_use]
    pub fn get_scan_result(&self, scan_id: &str) -> Option<Scan> {
        self.inner
            .scans
            .get(scan_id)
            .or_else(|| self.inner.cache.get::<Scan>(SCANS_SEGMENT, scan_id))
    }

    /// Posts published by `user_id` on `provider` within the lookback window,
    /// served from cache when possible.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::CircuitOpen`] when the provider's breaker
    /// rejects the call, or the provider error once retries are exhausted.
    pub async fn get_user_posts(
        &self,
        provider: Provider,
        user_id: &str,
        lookback_days: u32,
    ) -> Result<Vec<PostMetric>, IngestError> {
        let key = format!("{provider}:{user_id}:{lookback_days}");
        let tags = [
            format!("user:{user_id}"),
            provider.platform_tag(),
            provider.user_tag(user_id),
        ];
        self.cached_posts(
            &key,
            tags,
            PostQuery::Own {
                provider,
                user_id: user_id.to_owned(),
                lookback_days,
            },
        )
        .await
    }

    /// Posts published by competitor `handle` on `provider`, fetched with
    /// `user_id`'s credentials. Cached independently of the requesting user.
    ///
    /// # Errors
    ///
    /// As [`Orchestrator::get_user_posts`].
    pub async fn get_competitor_posts(
        &self,
        provider: Provider,
        user_id: &str,
        handle: &str,
        lookback_days: u32,
    ) -> Result<Vec<PostMetric>, IngestError> {
        let key = format!("{provider}:competitor:{handle}:{lookback_days}");
        let tags = [
            provider.platform_tag(),
            format!("{provider}:competitor:{handle}"),
        ];
        self.cached_posts(
            &key,
            tags,
            PostQuery::Competitor {
                provider,
                user_id: user_id.to_owned(),
                handle: handle.to_owned(),
                lookback_days,
            },
        )
        .await
    }

    /// Drops cached posts and analytics for one user on one provider.
    /// Returns the number of entries removed.
    pub fn invalidate_user_cache(&self, provider: Provider, user_id: &str) -> usize {
        let tag = provider.user_tag(user_id);
        let removed = self.inner.cache.invalidate_by_tag(POSTS_SEGMENT, &tag)
            + self.inner.cache.invalidate_by_tag(ANALYTICS_SEGMENT, &tag);
        tracing::info!(provider = %provider, user_id, removed, "user cache invalidated");
        removed
    }

    /// Removes scans past the retention window and purges expired cache
    /// entries. Returns the number of scans removed.
    pub fn sweep_expired_scans(&self) -> usize {
        let cutoff = TimeDelta::from_std(self.inner.config.scan_retention)
            .ok()
            .and_then(|retention| Utc::now().checked_sub_signed(retention));
        let Some(cutoff) = cutoff else {
            return 0;
        };
        self.sweep_before(cutoff)
    }

    fn sweep_before(&self, cutoff: DateTime<Utc>) -> usize {
        let scans = self.inner.scans.sweep(cutoff);
        let entries = self.inner.cache.purge_expired();
        tracing::info!(scans, entries, "expired scans swept");
        scans
    }

    fn source(&self, provider: Provider) -> Result<&Arc<dyn PostSource>, IngestError> {
        self.inner
            .providers
            .get(&provider)
            .ok_or_else(|| IngestError::Validation(format!("provider {provider} is not configured")))
    }

    fn mirror(&self, scan: &Scan) {
        let options = SetOptions::new(self.inner.config.scan_retention)
            .tag(format!("user:{}", scan.user_id));
        if let Err(e) = self.inner.cache.set(SCANS_SEGMENT, &scan.id, scan, &options) {
            tracing::warn!(scan_id = %scan.id, error = %e, "failed to mirror scan into cache");
        }
    }

    async fn run_scan(&self, scan_id: &str) {
        let Some(scan) = self.inner.scans.transition(scan_id, Scan::mark_in_progress) else {
            return;
        };
        self.mirror(&scan);
        let started = Instant::now();

        let worker = {
            let this = self.clone();
            let scan = scan.clone();
            tokio::spawn(async move { this.collect(&scan).await })
        };
        let timeout = self.inner.config.scan_timeout;
        // On timeout the worker is detached, not aborted; its provider calls
        // still populate the posts cache.
        let outcome = tokio::select! {
            joined = worker => match joined {
                Ok(result) => result.map_err(|e| e.to_string()),
                Err(e) if e.is_panic() => Err("scan processing failed unexpectedly".to_owned()),
                Err(_) => Err("scan processing was cancelled".to_owned()),
            },
            () = tokio::time::sleep(timeout) => {
                Err(IngestError::Timeout { secs: timeout.as_secs() }.to_string())
            }
        };

        #[allow(clippy::cast_precision_loss)]
        let elapsed_ms = started.elapsed().as_millis() as f64;
        let now = Utc::now();
        match outcome {
            Ok(results) => {
                let total_posts = results.total_posts;
                let Some(scan) = self.inner.scans.transition(scan_id, |s| s.complete(results, now))
                else {
                    return;
                };
                self.mirror(&scan);
                tracing::info!(scan_id, total_posts, elapsed_ms, "scan completed");
                self.inner.events.publish_log(
                    LogEntry::new(LogLevel::Info, format!("scan completed with {total_posts} posts"))
                        .scan(scan_id),
                );
                self.inner.events.publish_metric(
                    MetricEvent::new("scan.duration_ms", elapsed_ms).label("status", "completed"),
                );
                self.inner.events.publish_completed(scan);
            }
            Err(message) => {
                let Some(scan) = self
                    .inner
                    .scans
                    .transition(scan_id, |s| s.fail(message.clone(), now))
                else {
                    return;
                };
                self.mirror(&scan);
                tracing::error!(scan_id, error = %message, elapsed_ms, "scan failed");
                self.inner.events.publish_log(
                    LogEntry::new(LogLevel::Error, format!("scan failed: {message}")).scan(scan_id),
                );
                self.inner.events.publish_metric(
                    MetricEvent::new("scan.duration_ms", elapsed_ms).label("status", "failed"),
                );
                self.inner.events.publish_failed(scan, message);
            }
        }
    }

    /// Fetches every requested target and aggregates the results, or returns
    /// the cached aggregate for identical options.
    async fn collect(&self, scan: &Scan) -> Result<ScanResults, IngestError> {
        let options = &scan.options;
        let offset = options.utc_offset()?;
        let key = analytics_key(&scan.user_id, options);
        if let Some(results) = self.inner.cache.get::<ScanResults>(ANALYTICS_SEGMENT, &key) {
            tracing::debug!(scan_id = %scan.id, "analytics cache hit");
            return Ok(results);
        }

        let mut fetches = Vec::new();
        for &provider in &options.providers {
            if options.include_own_posts {
                fetches.push(self.fetch_target(scan, provider, None));
            }
            for handle in &options.competitor_ids {
                fetches.push(self.fetch_target(scan, provider, Some(handle.as_str())));
            }
        }
        let mut posts = Vec::new();
        let mut failed = 0_usize;
        for outcome in join_all(fetches).await {
            match outcome {
                Some(batch) => posts.extend(batch),
                None => failed += 1,
            }
        }

        let results = aggregate(posts, offset);
        // A partial aggregate must not outlive the outage that produced it.
        if failed > 0 {
            tracing::debug!(scan_id = %scan.id, failed, "partial aggregate not cached");
            return Ok(results);
        }
        let tags = std::iter::once(format!("user:{}", scan.user_id))
            .chain(options.providers.iter().map(|p| p.user_tag(&scan.user_id)));
        let set_options = SetOptions::new(self.inner.config.analytics_ttl).tags(tags);
        self.inner
            .cache
            .set(ANALYTICS_SEGMENT, &key, &results, &set_options)?;
        Ok(results)
    }

    /// One own-posts or competitor fetch. Failures are logged and yield
    /// `None` so the rest of the scan can proceed without them.
    async fn fetch_target(
        &self,
        scan: &Scan,
        provider: Provider,
        competitor: Option<&str>,
    ) -> Option<Vec<PostMetric>> {
        let lookback_days = scan.options.lookback_days;
        let result = match competitor {
            None => self.get_user_posts(provider, &scan.user_id, lookback_days).await,
            Some(handle) => {
                self.get_competitor_posts(provider, &scan.user_id, handle, lookback_days)
                    .await
            }
        };
        match result {
            Ok(posts) => Some(posts),
            Err(e) => {
                let target = competitor.unwrap_or("own posts");
                tracing::warn!(
                    scan_id = %scan.id,
                    provider = %provider,
                    fetch_target = target,
                    error = %e,
                    "fetch failed, excluding from aggregation"
                );
                self.inner.events.publish_log(
                    LogEntry::new(LogLevel::Warn, format!("{target} fetch failed: {e}"))
                        .scan(&scan.id)
                        .provider(provider),
                );
                None
            }
        }
    }

    async fn cached_posts(
        &self,
        key: &str,
        tags: impl IntoIterator<Item = String>,
        query: PostQuery,
    ) -> Result<Vec<PostMetric>, IngestError> {
        let provider = query.provider();
        self.source(provider)?;
        if !self.inner.breakers.admit(provider.as_str()) {
            return Err(IngestError::CircuitOpen { provider });
        }

        let ttl = self
            .inner
            .cache
            .calculate_adaptive_ttl(POSTS_SEGMENT, key, self.inner.config.posts_ttl);
        let options = SetOptions::new(ttl)
            .stale_window(self.inner.config.posts_stale_window)
            .tags(tags);
        let this = self.clone();
        self.inner
            .cache
            .get_or_refresh(POSTS_SEGMENT, key, options, move || async move {
                this.load_posts(query).await
            })
            .await
    }

    /// Upstream fetch behind the cache. The source throttles and retries each
    /// HTTP call itself; the final outcome is recorded once on the breaker.
    async fn load_posts(&self, query: PostQuery) -> Result<Vec<PostMetric>, IngestError> {
        let provider = query.provider();
        let source = self.source(provider)?;
        let result = fetch(source.as_ref(), &query, self.inner.config.page_limits).await;

        match &result {
            Ok(batch) => {
                self.inner.breakers.record_success(provider.as_str());
                tracing::debug!(
                    provider = %provider,
                    posts = batch.posts.len(),
                    pages = batch.pagination.pages_fetched,
                    "posts loaded"
                );
            }
            Err(e) if e.counts_against_breaker() => {
                self.inner.breakers.record_failure(provider.as_str());
            }
            Err(_) => {}
        }
        result.map(|batch| batch.posts)
    }
}

async fn fetch(
    source: &dyn PostSource,
    query: &PostQuery,
    limits: postpulse_providers::PageLimits,
) -> Result<PostBatch, IngestError> {
    match query {
        PostQuery::Own {
            user_id,
            lookback_days,
            ..
        } => source.get_user_posts(user_id, *lookback_days, limits).await,
        PostQuery::Competitor {
            user_id,
            handle,
            lookback_days,
            ..
        } => {
            source
                .get_competitor_posts(user_id, handle, *lookback_days, limits)
                .await
        }
    }
}

/// `<user>:<providers>:<lookback>:<digest>`, where the digest covers the
/// options that change the aggregate but would make the key unreadable.
fn analytics_key(user_id: &str, options: &ScanOptions) -> String {
    let mut providers: Vec<&str> = options.providers.iter().map(|p| p.as_str()).collect();
    providers.sort_unstable();
    let mut competitors: Vec<&str> = options.competitor_ids.iter().map(String::as_str).collect();
    competitors.sort_unstable();

    let mut hasher = Sha256::new();
    hasher.update(competitors.join(",").as_bytes());
    hasher.update([u8::from(options.include_own_posts)]);
    hasher.update(options.timezone.trim().as_bytes());
    let digest = format!("{:x}", hasher.finalize());

    format!(
        "{user_id}:{}:{}:{}",
        providers.join(","),
        options.lookback_days,
        &digest[..16]
    )
}

#[cfg(test)]
#[path = "orchestrator_test.rs"]
mod tests;
