//! Value-volatility tracking for adaptive TTLs.

use std::collections::VecDeque;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio::time::Instant;

pub const MIN_TTL_MULTIPLIER: f64 = 0.25;
pub const MAX_TTL_MULTIPLIER: f64 = 4.0;

/// Number of recent writes considered per key.
const HISTORY_LEN: usize = 10;

/// Fingerprints of the most recent values written under one key.
#[derive(Debug)]
pub(crate) struct WriteHistory {
    digests: VecDeque<[u8; 32]>,
    pub(crate) last_write: Instant,
}

impl WriteHistory {
    pub(crate) fn new() -> Self {
        Self {
            digests: VecDeque::with_capacity(HISTORY_LEN),
            last_write: Instant::now(),
        }
    }

    pub(crate) fn record(&mut self, bytes: &[u8]) {
        if self.digests.len() == HISTORY_LEN {
            self.digests.pop_front();
        }
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&Sha256::digest(bytes));
        self.digests.push_back(digest);
        self.last_write = Instant::now();
    }

    /// Share of consecutive writes whose value changed, in `[0, 1]`.
    /// `None` until at least two writes have been seen.
    pub(crate) fn volatility(&self) -> Option<f64> {
        if self.digests.len() < 2 {
            return None;
        }
        let pairs = self.digests.len() - 1;
        let changes = self
            .digests
            .iter()
            .zip(self.digests.iter().skip(1))
            .filter(|(a, b)| a != b)
            .count();
        #[allow(clippy::cast_precision_loss)]
        let ratio = changes as f64 / pairs as f64;
        Some(ratio)
    }
}

/// Scales `base` by `4^(1 - 2v)`: a value that never changes keeps 4× the
/// base TTL, one that changes on every write keeps 0.25×.
pub(crate) fn scale_ttl(base: Duration, volatility: Option<f64>) -> Duration {
    let Some(v) = volatility else {
        return base;
    };
    let multiplier = MAX_TTL_MULTIPLIER
        .powf(1.0 - 2.0 * v.clamp(0.0, 1.0))
        .clamp(MIN_TTL_MULTIPLIER, MAX_TTL_MULTIPLIER);
    base.mul_f64(multiplier)
}
