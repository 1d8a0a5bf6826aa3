//! The [`Cache`] handle and its entry store.
//!
//! Entries are keyed by `(segment, key)` inside one namespace. Each entry is
//! JSON, stamped with the cache version it was written under, and indexed by
//! tag so a whole segment slice can be dropped at once. A per-key write
//! history feeds [`Cache::calculate_adaptive_ttl`].

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use postpulse_core::{EventBus, IngestError, MetricEvent};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::time::Instant;

use crate::adaptive::{scale_ttl, WriteHistory};

/// Write-history records untouched for this long are dropped by
/// [`Cache::purge_expired`].
const HISTORY_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// Options for [`Cache::set`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetOptions {
    pub ttl: Duration,
    /// After `ttl`, the value may still be served for this long while a
    /// refresh runs.
    pub stale_window: Option<Duration>,
    pub tags: Vec<String>,
}

impl SetOptions {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            stale_window: None,
            tags: Vec::new(),
        }
    }

    #[must_use]
    pub fn stale_window(mut self, window: Duration) -> Self {
        self.stale_window = Some(window);
        self
    }

    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    #[must_use]
    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }
}

/// A stored value with its expiry, staleness window, tags, and version.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: serde_json::Value,
    pub expires_at: Instant,
    pub stale_until: Instant,
    pub tags: HashSet<String>,
    pub version: u32,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }

    fn is_servable(&self, now: Instant) -> bool {
        now < self.stale_until
    }
}

/// Result of [`Cache::lookup`].
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    Fresh(T),
    /// Expired but inside its staleness window.
    Stale(T),
    Miss,
}

impl<T> Lookup<T> {
    #[must_use]
    pub fn into_value(self) -> Option<T> {
        match self {
            Lookup::Fresh(v) | Lookup::Stale(v) => Some(v),
            Lookup::Miss => None,
        }
    }
}

#[derive(Debug, Default)]
struct CacheState {
    segments: HashMap<String, HashMap<String, CacheEntry>>,
    history: HashMap<(String, String), WriteHistory>,
    refreshing: HashSet<(String, String)>,
}

#[derive(Debug)]
struct Inner {
    namespace: String,
    version: AtomicU32,
    state: Mutex<CacheState>,
    events: Option<EventBus>,
}

/// Cloneable handle to one cache namespace. Clones share entries.
#[derive(Debug, Clone)]
pub struct Cache {
    inner: Arc<Inner>,
}

impl Cache {
    /// Creates a silent cache for `namespace`, starting at version 1.
    #[must_use]
    pub fn new(namespace: impl Into<String>) -> Self {
        Self::build(namespace.into(), None)
    }

    /// Creates a cache that reports `cache.hit`, `cache.miss`, and
    /// `cache.metric` events on the bus's metrics topic.
    #[must_use]
    pub fn with_events(namespace: impl Into<String>, events: EventBus) -> Self {
        Self::build(namespace.into(), Some(events))
    }

    fn build(namespace: String, events: Option<EventBus>) -> Self {
        Self {
            inner: Arc::new(Inner {
                namespace,
                version: AtomicU32::new(1),
                state: Mutex::new(CacheState::default()),
                events,
            }),
        }
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.inner.namespace
    }

    /// Current write version. Entries stamped with an older one read as
    /// misses.
    #[must_use]
    pub fn version(&self) -> u32 {
        self.inner.version.load(Ordering::SeqCst)
    }

    /// Logically invalidates every entry written under the current version.
    /// Returns the new version.
    pub fn bump_version(&self) -> u32 {
        self.inner.version.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Reads `(segment, key)`, distinguishing fresh from stale hits.
    ///
    /// Entries past both windows, written under an older version, or that no
    /// longer decode as `T` are removed and reported as a miss.
    pub fn lookup<T: DeserializeOwned>(&self, segment: &str, key: &str) -> Lookup<T> {
        let now = Instant::now();
        let version = self.version();
        let found = {
            let mut state = self.lock();
            match state.segments.get_mut(segment) {
                Some(entries) => match entries.get(key) {
                    Some(entry) if entry.version == version && entry.is_servable(now) => {
                        Some((entry.value.clone(), entry.is_fresh(now)))
                    }
                    Some(_) => {
                        entries.remove(key);
                        None
                    }
                    None => None,
                },
                None => None,
            }
        };

        let Some((value, fresh)) = found else {
            self.emit_miss(segment, key);
            return Lookup::Miss;
        };

        match serde_json::from_value::<T>(value) {
            Ok(v) => {
                self.emit(
                    MetricEvent::new("cache.hit", 1.0)
                        .label("segment", segment)
                        .label("key", key)
                        .label("freshness", if fresh { "fresh" } else { "stale" }),
                );
                if fresh {
                    Lookup::Fresh(v)
                } else {
                    Lookup::Stale(v)
                }
            }
            Err(e) => {
                tracing::warn!(
                    namespace = %self.inner.namespace,
                    segment,
                    key,
                    error = %e,
                    "cached value no longer decodes, dropping entry"
                );
                self.invalidate(segment, key);
                self.emit_miss(segment, key);
                Lookup::Miss
            }
        }
    }

    /// Returns the cached value, fresh or stale, or `None` on a miss.
    pub fn get<T: DeserializeOwned>(&self, segment: &str, key: &str) -> Option<T> {
        self.lookup(segment, key).into_value()
    }

    /// Stores `value` under `(segment, key)`, replacing any previous entry.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Cache`] if `value` cannot be serialized.
    pub fn set<T: Serialize + ?Sized>(
        &self,
        segment: &str,
        key: &str,
        value: &T,
        options: &SetOptions,
    ) -> Result<(), IngestError> {
        let json = serde_json::to_value(value)
            .map_err(|e| IngestError::Cache(format!("serialize {segment}/{key}: {e}")))?;
        let bytes = serde_json::to_vec(&json)
            .map_err(|e| IngestError::Cache(format!("serialize {segment}/{key}: {e}")))?;

        let now = Instant::now();
        let expires_at = now + options.ttl;
        let entry = CacheEntry {
            value: json,
            expires_at,
            stale_until: expires_at + options.stale_window.unwrap_or(Duration::ZERO),
            tags: options.tags.iter().cloned().collect(),
            version: self.version(),
        };

        {
            let mut state = self.lock();
            state
                .history
                .entry((segment.to_owned(), key.to_owned()))
                .or_insert_with(WriteHistory::new)
                .record(&bytes);
            state
                .segments
                .entry(segment.to_owned())
                .or_default()
                .insert(key.to_owned(), entry);
        }

        #[allow(clippy::cast_precision_loss)]
        let size = bytes.len() as f64;
        self.emit(
            MetricEvent::new("cache.metric", size)
                .label("op", "set")
                .label("segment", segment)
                .label("key", key),
        );
        Ok(())
    }

    /// Removes one entry. Returns whether it existed.
    pub fn invalidate(&self, segment: &str, key: &str) -> bool {
        let mut state = self.lock();
        state
            .segments
            .get_mut(segment)
            .and_then(|entries| entries.remove(key))
            .is_some()
    }

    /// Removes every entry in `segment` whose tag set contains `tag`.
    /// Returns how many entries were removed.
    pub fn invalidate_by_tag(&self, segment: &str, tag: &str) -> usize {
        let removed = {
            let mut state = self.lock();
            let Some(entries) = state.segments.get_mut(segment) else {
                return 0;
            };
            let before = entries.len();
            entries.retain(|_, entry| !entry.tags.contains(tag));
            before - entries.len()
        };
        tracing::debug!(segment, tag, removed, "invalidated cache entries by tag");
        #[allow(clippy::cast_precision_loss)]
        let count = removed as f64;
        self.emit(
            MetricEvent::new("cache.metric", count)
                .label("op", "invalidate_by_tag")
                .label("segment", segment)
                .label("tag", tag),
        );
        removed
    }

    /// Stretches or shrinks `base_ttl` by how often the value under
    /// `(segment, key)` has changed across recent writes, within
    /// [0.25×, 4×]. Keys with fewer than two writes keep `base_ttl`.
    pub fn calculate_adaptive_ttl(&self, segment: &str, key: &str, base_ttl: Duration) -> Duration {
        let volatility = self
            .lock()
            .history
            .get(&(segment.to_owned(), key.to_owned()))
            .and_then(WriteHistory::volatility);
        scale_ttl(base_ttl, volatility)
    }

    /// Reads through the cache with stale-while-revalidate.
    ///
    /// - fresh hit: returned as is;
    /// - stale hit: returned immediately while `loader` refreshes the entry in
    ///   a background task (at most one refresh per key in flight);
    /// - miss: `loader` runs inline and its value is stored.
    ///
    /// # Errors
    ///
    /// Propagates `loader` errors on a miss. Background refresh errors are
    /// logged and leave the stale entry in place.
    pub async fn get_or_refresh<T, F, Fut>(
        &self,
        segment: &str,
        key: &str,
        options: SetOptions,
        loader: F,
    ) -> Result<T, IngestError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, IngestError>> + Send + 'static,
    {
        match self.lookup::<T>(segment, key) {
            Lookup::Fresh(v) => Ok(v),
            Lookup::Stale(v) => {
                self.spawn_refresh(segment, key, options, loader);
                Ok(v)
            }
            Lookup::Miss => {
                let value = loader().await?;
                self.set(segment, key, &value, &options)?;
                Ok(value)
            }
        }
    }

    fn spawn_refresh<T, F, Fut>(&self, segment: &str, key: &str, options: SetOptions, loader: F)
    where
        T: Serialize + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, IngestError>> + Send + 'static,
    {
        let slot = (segment.to_owned(), key.to_owned());
        if !self.lock().refreshing.insert(slot.clone()) {
            return;
        }
        let cache = self.clone();
        tokio::spawn(async move {
            let (segment, key) = &slot;
            match loader().await {
                Ok(value) => {
                    if let Err(e) = cache.set(segment, key, &value, &options) {
                        tracing::warn!(segment, key, error = %e, "background refresh could not store value");
                    }
                }
                Err(e) => {
                    tracing::warn!(segment, key, error = %e, "background refresh failed, keeping stale value");
                }
            }
            cache.lock().refreshing.remove(&slot);
        });
    }

    /// Whether a background refresh for `(segment, key)` is in flight.
    #[must_use]
    pub fn is_refreshing(&self, segment: &str, key: &str) -> bool {
        self.lock()
            .refreshing
            .contains(&(segment.to_owned(), key.to_owned()))
    }

    /// Drops entries past both windows or from older versions, and write
    /// histories idle for more than a day. Returns the number of entries
    /// removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let version = self.version();
        let mut state = self.lock();
        let mut removed = 0;
        for entries in state.segments.values_mut() {
            let before = entries.len();
            entries.retain(|_, e| e.version == version && e.is_servable(now));
            removed += before - entries.len();
        }
        state.segments.retain(|_, entries| !entries.is_empty());
        state
            .history
            .retain(|_, h| now.saturating_duration_since(h.last_write) < HISTORY_RETENTION);
        removed
    }

    /// Number of stored entries in `segment`, including expired ones not yet
    /// purged.
    #[must_use]
    pub fn segment_len(&self, segment: &str) -> usize {
        self.lock().segments.get(segment).map_or(0, HashMap::len)
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn emit_miss(&self, segment: &str, key: &str) {
        self.emit(
            MetricEvent::new("cache.miss", 1.0)
                .label("segment", segment)
                .label("key", key),
        );
    }

    fn emit(&self, metric: MetricEvent) {
        if let Some(events) = &self.inner.events {
            events.publish_metric(metric.label("namespace", self.inner.namespace.clone()));
        }
    }
}

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;
