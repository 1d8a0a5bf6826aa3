//! Token-bucket rate limiter with async FIFO acquisition.
//!
//! Tokens accrue lazily from elapsed time; there is no background ticker.
//! When the bucket is empty, callers park on a oneshot channel in a FIFO
//! queue. A single drain task per limiter hands out tokens in arrival order,
//! removing each token before the waiter is released, so two acquirers can
//! never spend the same token.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;
use tokio::time::Instant;

/// Share of capacity below which upstream quota reconciliation slows refill.
const LOW_QUOTA_RATIO: f64 = 0.2;
/// Slowest refill allowed under low quota, as a share of capacity per minute.
const MIN_REFILL_RATIO_PER_MINUTE: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimiterOptions {
    pub requests_per_minute: u32,
    pub burst_capacity: u32,
}

impl Default for RateLimiterOptions {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            burst_capacity: 10,
        }
    }
}

/// Point-in-time view of a limiter, for assertions and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimiterSnapshot {
    pub tokens: f64,
    pub capacity: f64,
    pub tokens_per_second: f64,
    pub queued: usize,
}

/// Cloneable handle to one token bucket. Clones share state.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    key: String,
    state: Mutex<BucketState>,
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    capacity: f64,
    tokens_per_second: f64,
    last_refill: Instant,
    waiters: VecDeque<oneshot::Sender<()>>,
    draining: bool,
}

impl BucketState {
    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.tokens_per_second).min(self.capacity);
        self.last_refill = now;
    }

    /// Wait until roughly one more token has accrued.
    fn token_wait(&self) -> Duration {
        let millis = (1000.0 / self.tokens_per_second).ceil();
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let millis = millis.max(1.0) as u64;
        Duration::from_millis(millis)
    }
}

fn per_second(requests_per_minute: u32) -> f64 {
    f64::from(requests_per_minute.max(1)) / 60.0
}

impl RateLimiter {
    /// Creates a limiter that starts with a full bucket.
    #[must_use]
    pub fn new(key: impl Into<String>, options: RateLimiterOptions) -> Self {
        let capacity = f64::from(options.burst_capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                key: key.into(),
                state: Mutex::new(BucketState {
                    tokens: capacity,
                    capacity,
                    tokens_per_second: per_second(options.requests_per_minute),
                    last_refill: Instant::now(),
                    waiters: VecDeque::new(),
                    draining: false,
                }),
            }),
        }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.inner.key
    }

    /// Waits until a token is available, then consumes it.
    ///
    /// Never fails; callers that need a bounded wait wrap this in
    /// `tokio::time::timeout`. Dropping the future before it resolves gives
    /// up the place in the queue without consuming a token.
    pub async fn acquire(&self) {
        loop {
            let receiver = {
                let mut state = self.inner.lock();
                state.refill(Instant::now());
                if state.waiters.is_empty() && state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return;
                }
                let (tx, rx) = oneshot::channel();
                state.waiters.push_back(tx);
                if !state.draining {
                    state.draining = true;
                    tokio::spawn(drain(Arc::clone(&self.inner)));
                }
                rx
            };
            if receiver.await.is_ok() {
                return;
            }
        }
    }

    /// Changes the refill rate and burst cap, clamping current tokens to the
    /// new cap. Tokens accrued under the old rate are kept.
    pub fn update_options(&self, requests_per_minute: u32, burst_capacity: u32) {
        let mut state = self.inner.lock();
        state.refill(Instant::now());
        state.capacity = f64::from(burst_capacity.max(1));
        state.tokens_per_second = per_second(requests_per_minute);
        state.tokens = state.tokens.min(state.capacity);
    }

    /// Reconciles local state with an authoritative upstream quota snapshot.
    ///
    /// Tokens become `remaining` and the cap becomes `limit`. When less than
    /// 20% of the quota remains, refill slows to spread what is left over the
    /// time until `reset_at`, but never below 10% of the cap per minute.
    /// Otherwise refill returns to the nominal `limit` per minute.
    pub fn update_limits(&self, limit: u32, remaining: u32, reset_at: Option<DateTime<Utc>>) {
        let capacity = f64::from(limit.max(1));
        let remaining = f64::from(remaining).min(capacity);
        let nominal = capacity / 60.0;
        let floor = capacity * MIN_REFILL_RATIO_PER_MINUTE / 60.0;

        let rate = if remaining < capacity * LOW_QUOTA_RATIO {
            let until_reset = reset_at
                .map(|at| (at - Utc::now()).num_milliseconds())
                .filter(|ms| *ms > 0);
            match until_reset {
                #[allow(clippy::cast_precision_loss)]
                Some(ms) => (remaining / (ms as f64 / 1000.0)).clamp(floor, nominal),
                None => floor,
            }
        } else {
            nominal
        };

        let mut state = self.inner.lock();
        state.refill(Instant::now());
        state.capacity = capacity;
        state.tokens = remaining;
        state.tokens_per_second = rate;
        tracing::debug!(
            limiter = %self.inner.key,
            limit,
            remaining,
            tokens_per_second = rate,
            "rate limiter reconciled with upstream quota"
        );
    }

    /// Refills the bucket to now, then reports its state.
    #[must_use]
    pub fn snapshot(&self) -> RateLimiterSnapshot {
        let mut state = self.inner.lock();
        state.refill(Instant::now());
        RateLimiterSnapshot {
            tokens: state.tokens,
            capacity: state.capacity,
            tokens_per_second: state.tokens_per_second,
            queued: state.waiters.len(),
        }
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, BucketState> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Releases queued waiters as tokens accrue. At most one runs per limiter.
async fn drain(inner: Arc<Inner>) {
    loop {
        let wait = {
            let mut state = inner.lock();
            state.refill(Instant::now());
            while state.tokens >= 1.0 {
                let Some(waiter) = state.waiters.pop_front() else {
                    break;
                };
                state.tokens -= 1.0;
                if waiter.send(()).is_err() {
                    // Acquirer gave up; return its token.
                    state.tokens += 1.0;
                }
            }
            if state.waiters.is_empty() {
                state.draining = false;
                return;
            }
            state.token_wait()
        };
        tokio::time::sleep(wait).await;
    }
}
