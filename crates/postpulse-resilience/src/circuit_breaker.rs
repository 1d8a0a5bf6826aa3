//! Per-provider circuit breakers.
//!
//! Admission and result recording are separate calls so a caller can fail
//! fast before spending a rate-limit token, then report the outcome once the
//! upstream call resolves.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation; every call is admitted.
    Closed,
    /// Tripped; calls are rejected until the reset timeout elapses.
    Open,
    /// Probing; calls are admitted and a single failure re-opens.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        };
        f.write_str(s)
    }
}

/// Thresholds shared by every breaker in a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that trip a closed breaker.
    pub failure_threshold: u32,
    /// Successes needed in half-open before closing again.
    pub success_threshold: u32,
    /// How long an open breaker rejects calls before probing.
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            reset_timeout: Duration::from_secs(60),
        }
    }
}

/// Point-in-time view of one breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub last_transition: Instant,
}

#[derive(Debug)]
struct Breaker {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_transition: Instant,
}

impl Breaker {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_transition: Instant::now(),
        }
    }

    fn transition(&mut self, key: &str, to: CircuitState) {
        tracing::info!(breaker = key, from = %self.state, to = %to, "circuit breaker transition");
        self.state = to;
        self.last_transition = Instant::now();
        self.success_count = 0;
        if to == CircuitState::Closed {
            self.failure_count = 0;
        }
    }

    fn snapshot(&self) -> BreakerSnapshot {
        BreakerSnapshot {
            state: self.state,
            failure_count: self.failure_count,
            success_count: self.success_count,
            last_transition: self.last_transition,
        }
    }
}

/// One breaker per provider key, all sharing a configuration.
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    config: CircuitBreakerConfig,
    breakers: Mutex<HashMap<String, Breaker>>,
}

impl CircuitBreakerRegistry {
    /// Creates a registry with a closed breaker for each key. Keys seen
    /// later are given a closed breaker on first use.
    #[must_use]
    pub fn new<I, K>(config: CircuitBreakerConfig, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let breakers = keys
            .into_iter()
            .map(|k| (k.into(), Breaker::new()))
            .collect();
        Self {
            config,
            breakers: Mutex::new(breakers),
        }
    }

    #[must_use]
    pub fn config(&self) -> CircuitBreakerConfig {
        self.config
    }

    /// Returns whether a call for `key` may proceed.
    ///
    /// An open breaker whose reset timeout has elapsed moves to half-open and
    /// admits the call.
    pub fn admit(&self, key: &str) -> bool {
        let mut breakers = self.lock();
        let breaker = breakers.entry(key.to_owned()).or_insert_with(Breaker::new);
        match breaker.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                if breaker.last_transition.elapsed() > self.config.reset_timeout {
                    breaker.transition(key, CircuitState::HalfOpen);
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Reports a successful call. Clears the failure streak when closed;
    /// counts toward closing when half-open.
    pub fn record_success(&self, key: &str) {
        let mut breakers = self.lock();
        let breaker = breakers.entry(key.to_owned()).or_insert_with(Breaker::new);
        match breaker.state {
            CircuitState::Closed => breaker.failure_count = 0,
            CircuitState::HalfOpen => {
                breaker.success_count += 1;
                if breaker.success_count >= self.config.success_threshold {
                    breaker.transition(key, CircuitState::Closed);
                }
            }
            // A call admitted before the breaker tripped finished late.
            CircuitState::Open => {}
        }
    }

    /// Reports a failed call. Trips a closed breaker at the failure
    /// threshold and re-opens a half-open one immediately.
    pub fn record_failure(&self, key: &str) {
        let mut breakers = self.lock();
        let breaker = breakers.entry(key.to_owned()).or_insert_with(Breaker::new);
        breaker.failure_count = breaker.failure_count.saturating_add(1);
        match breaker.state {
            CircuitState::Closed => {
                if breaker.failure_count >= self.config.failure_threshold {
                    tracing::warn!(
                        breaker = key,
                        failures = breaker.failure_count,
                        "failure threshold reached, opening circuit"
                    );
                    breaker.transition(key, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => breaker.transition(key, CircuitState::Open),
            CircuitState::Open => {}
        }
    }

    /// State of `key`'s breaker; unknown keys read as closed.
    #[must_use]
    pub fn state(&self, key: &str) -> CircuitState {
        self.snapshot(key).map_or(CircuitState::Closed, |s| s.state)
    }

    /// `None` if no call for `key` has been admitted or recorded yet.
    #[must_use]
    pub fn snapshot(&self, key: &str) -> Option<BreakerSnapshot> {
        self.lock().get(key).map(Breaker::snapshot)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Breaker>> {
        self.breakers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
