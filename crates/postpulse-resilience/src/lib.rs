//! Admission control and failure handling shared by every provider client:
//! a token-bucket [`RateLimiter`], a per-provider [`CircuitBreakerRegistry`],
//! and bounded exponential back-off via [`retry_with_backoff`].

pub mod circuit_breaker;
pub mod rate_limit;
pub mod retry;

pub use circuit_breaker::{BreakerSnapshot, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitState};
pub use rate_limit::{RateLimiter, RateLimiterOptions, RateLimiterSnapshot};
pub use retry::{retry_with_backoff, Retriable, RetryPolicy};
