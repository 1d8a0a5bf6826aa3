//! Segmented, tagged response cache.
//!
//! Entries live under `(segment, key)` and carry a TTL, an optional
//! stale-while-revalidate window, and a tag set for bulk invalidation.
//! Values are stored as JSON so one cache can hold posts, analytics, and
//! scan mirrors side by side.

mod adaptive;
mod store;

pub use adaptive::{MAX_TTL_MULTIPLIER, MIN_TTL_MULTIPLIER};
pub use store::{Cache, CacheEntry, Lookup, SetOptions};
