use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use postpulse_core::{EventBus, IngestError};
use serde::{Deserialize, Serialize};

use super::*;
use crate::{MAX_TTL_MULTIPLIER, MIN_TTL_MULTIPLIER};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Sample {
    id: u32,
    caption: String,
}

fn sample(id: u32) -> Sample {
    Sample {
        id,
        caption: format!("post {id}"),
    }
}

#[tokio::test(start_paused = true)]
async fn set_then_get_round_trips_within_ttl() {
    let cache = Cache::new("test");
    cache
        .set("posts", "k", &sample(1), &SetOptions::new(Duration::from_secs(60)))
        .unwrap();

    assert_eq!(cache.get::<Sample>("posts", "k"), Some(sample(1)));
    assert_eq!(cache.get::<Sample>("analytics", "k"), None, "segments are isolated");
}

#[tokio::test(start_paused = true)]
async fn unserializable_value_is_rejected_without_storing() {
    let cache = Cache::new("test");
    // JSON object keys must be strings.
    let mut value = HashMap::new();
    value.insert((1_u8, 2_u8), 3_u8);

    let err = cache
        .set("posts", "k", &value, &SetOptions::new(Duration::from_secs(60)))
        .unwrap_err();

    assert!(matches!(err, IngestError::Cache(ref m) if m.contains("posts/k")));
    assert_eq!(cache.segment_len("posts"), 0);
}

#[tokio::test(start_paused = true)]
async fn expired_entry_without_stale_window_is_a_miss_and_removed() {
    let cache = Cache::new("test");
    cache
        .set("posts", "k", &sample(1), &SetOptions::new(Duration::from_secs(60)))
        .unwrap();

    tokio::time::advance(Duration::from_secs(61)).await;
    assert_eq!(cache.lookup::<Sample>("posts", "k"), Lookup::Miss);
    assert_eq!(cache.segment_len("posts"), 0);
}

#[tokio::test(start_paused = true)]
async fn stale_window_serves_value_then_expires() {
    let cache = Cache::new("test");
    let opts = SetOptions::new(Duration::from_secs(60)).stale_window(Duration::from_secs(30));
    cache.set("posts", "k", &sample(1), &opts).unwrap();

    tokio::time::advance(Duration::from_secs(45)).await;
    assert_eq!(cache.lookup("posts", "k"), Lookup::Fresh(sample(1)));

    tokio::time::advance(Duration::from_secs(30)).await;
    assert_eq!(cache.lookup("posts", "k"), Lookup::Stale(sample(1)));

    tokio::time::advance(Duration::from_secs(20)).await;
    assert_eq!(cache.lookup::<Sample>("posts", "k"), Lookup::Miss);
}

#[tokio::test(start_paused = true)]
async fn undecodable_value_is_treated_as_miss() {
    let cache = Cache::new("test");
    cache
        .set("posts", "k", &"not a sample", &SetOptions::new(Duration::from_secs(60)))
        .unwrap();
    assert_eq!(cache.get::<Sample>("posts", "k"), None);
    assert_eq!(cache.segment_len("posts"), 0);
}

#[tokio::test(start_paused = true)]
async fn invalidate_by_tag_only_touches_matching_entries_in_segment() {
    let cache = Cache::new("test");
    let ttl = Duration::from_secs(600);
    cache
        .set("posts", "a", &sample(1), &SetOptions::new(ttl).tags(["user:1", "platform:tiktok"]))
        .unwrap();
    cache
        .set("posts", "b", &sample(2), &SetOptions::new(ttl).tag("user:2"))
        .unwrap();
    cache
        .set("analytics", "a", &sample(3), &SetOptions::new(ttl).tag("user:1"))
        .unwrap();

    assert_eq!(cache.invalidate_by_tag("posts", "user:1"), 1);
    assert_eq!(cache.get::<Sample>("posts", "a"), None);
    assert_eq!(cache.get::<Sample>("posts", "b"), Some(sample(2)));
    assert_eq!(cache.get::<Sample>("analytics", "a"), Some(sample(3)));
    assert_eq!(cache.invalidate_by_tag("posts", "user:1"), 0);
    assert_eq!(cache.invalidate_by_tag("missing", "user:1"), 0);
}

#[tokio::test(start_paused = true)]
async fn invalidate_removes_single_key() {
    let cache = Cache::new("test");
    cache
        .set("posts", "a", &sample(1), &SetOptions::new(Duration::from_secs(60)))
        .unwrap();
    assert!(cache.invalidate("posts", "a"));
    assert!(!cache.invalidate("posts", "a"));
}

#[tokio::test(start_paused = true)]
async fn bump_version_hides_older_entries() {
    let cache = Cache::new("test");
    cache
        .set("posts", "a", &sample(1), &SetOptions::new(Duration::from_secs(60)))
        .unwrap();
    assert_eq!(cache.bump_version(), 2);
    assert_eq!(cache.get::<Sample>("posts", "a"), None);

    cache
        .set("posts", "a", &sample(2), &SetOptions::new(Duration::from_secs(60)))
        .unwrap();
    assert_eq!(cache.get::<Sample>("posts", "a"), Some(sample(2)));
}

#[tokio::test(start_paused = true)]
async fn adaptive_ttl_tracks_value_churn() {
    let cache = Cache::new("test");
    let base = Duration::from_secs(3_600);
    let opts = SetOptions::new(base);

    assert_eq!(cache.calculate_adaptive_ttl("posts", "stable", base), base);
    for _ in 0..5 {
        cache.set("posts", "stable", &sample(1), &opts).unwrap();
    }
    assert_eq!(
        cache.calculate_adaptive_ttl("posts", "stable", base),
        base.mul_f64(MAX_TTL_MULTIPLIER)
    );

    for i in 0..5 {
        cache.set("posts", "churning", &sample(i), &opts).unwrap();
    }
    assert_eq!(
        cache.calculate_adaptive_ttl("posts", "churning", base),
        base.mul_f64(MIN_TTL_MULTIPLIER)
    );
}

#[tokio::test(start_paused = true)]
async fn purge_expired_drops_dead_entries_only() {
    let cache = Cache::new("test");
    cache
        .set("posts", "short", &sample(1), &SetOptions::new(Duration::from_secs(10)))
        .unwrap();
    cache
        .set(
            "posts",
            "stale",
            &sample(2),
            &SetOptions::new(Duration::from_secs(10)).stale_window(Duration::from_secs(100)),
        )
        .unwrap();
    cache
        .set("posts", "long", &sample(3), &SetOptions::new(Duration::from_secs(1_000)))
        .unwrap();

    tokio::time::advance(Duration::from_secs(20)).await;
    assert_eq!(cache.purge_expired(), 1);
    assert_eq!(cache.segment_len("posts"), 2);
}

#[tokio::test(start_paused = true)]
async fn get_or_refresh_loads_on_miss_and_serves_from_cache_after() {
    let cache = Cache::new("test");
    let calls = Arc::new(AtomicU32::new(0));

    for _ in 0..3 {
        let c = Arc::clone(&calls);
        let value = cache
            .get_or_refresh("posts", "k", SetOptions::new(Duration::from_secs(60)), move || async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(sample(7))
            })
            .await
            .unwrap();
        assert_eq!(value, sample(7));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn get_or_refresh_propagates_loader_error_on_miss() {
    let cache = Cache::new("test");
    let result: Result<Sample, _> = cache
        .get_or_refresh("posts", "k", SetOptions::new(Duration::from_secs(60)), || async {
            Err(IngestError::Timeout { secs: 5 })
        })
        .await;
    assert!(matches!(result, Err(IngestError::Timeout { secs: 5 })));
    assert_eq!(cache.segment_len("posts"), 0);
}

#[tokio::test(start_paused = true)]
async fn stale_hit_returns_old_value_and_refreshes_once_in_background() {
    let cache = Cache::new("test");
    let opts = SetOptions::new(Duration::from_secs(60)).stale_window(Duration::from_secs(600));
    cache.set("posts", "k", &sample(1), &opts).unwrap();
    tokio::time::advance(Duration::from_secs(61)).await;

    let calls = Arc::new(AtomicU32::new(0));
    for _ in 0..3 {
        let c = Arc::clone(&calls);
        let value = cache
            .get_or_refresh("posts", "k", opts.clone(), move || async move {
                c.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok(sample(2))
            })
            .await
            .unwrap();
        assert_eq!(value, sample(1), "stale value is served while refreshing");
    }
    assert!(cache.is_refreshing("posts", "k"));

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1, "refreshes are deduplicated");
    assert!(!cache.is_refreshing("posts", "k"));
    assert_eq!(cache.lookup("posts", "k"), Lookup::Fresh(sample(2)));
}

#[tokio::test(start_paused = true)]
async fn failed_background_refresh_keeps_stale_value() {
    let cache = Cache::new("test");
    let opts = SetOptions::new(Duration::from_secs(60)).stale_window(Duration::from_secs(600));
    cache.set("posts", "k", &sample(1), &opts).unwrap();
    tokio::time::advance(Duration::from_secs(61)).await;

    let value: Sample = cache
        .get_or_refresh("posts", "k", opts, || async {
            Err(IngestError::Cache("upstream down".to_owned()))
        })
        .await
        .unwrap();
    assert_eq!(value, sample(1));

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(cache.lookup("posts", "k"), Lookup::Stale(sample(1)));
}

#[tokio::test(start_paused = true)]
async fn emits_hit_miss_and_write_metrics() {
    let bus = EventBus::new();
    let mut metrics = bus.subscribe_metrics();
    let cache = Cache::with_events("posts-cache", bus);

    assert!(cache.get::<Sample>("posts", "k").is_none());
    cache
        .set("posts", "k", &sample(1), &SetOptions::new(Duration::from_secs(60)))
        .unwrap();
    assert!(cache.get::<Sample>("posts", "k").is_some());

    let miss = metrics.recv().await.unwrap();
    assert_eq!(miss.name, "cache.miss");
    assert_eq!(miss.labels.get("namespace").map(String::as_str), Some("posts-cache"));

    let write = metrics.recv().await.unwrap();
    assert_eq!(write.name, "cache.metric");
    assert_eq!(write.labels.get("op").map(String::as_str), Some("set"));
    assert!(write.value > 0.0);

    let hit = metrics.recv().await.unwrap();
    assert_eq!(hit.name, "cache.hit");
    assert_eq!(hit.labels.get("freshness").map(String::as_str), Some("fresh"));
}
