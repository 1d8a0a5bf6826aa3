//! Canonical post record produced by every provider client.

use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::{DateTime, Timelike, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::provider::Provider;

static HASHTAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#([\p{L}\p{N}_]+)").expect("valid hashtag regex"));

/// Content classification shared across providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Video,
    Image,
    Carousel,
    Story,
    Short,
    Other,
}

/// Raw engagement counts as reported upstream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementCounts {
    pub views: u64,
    pub likes: u64,
    pub comments: u64,
    pub shares: u64,
    pub saves: Option<u64>,
}

/// Weighted engagement rate as a percentage.
///
/// `(likes + 2 * comments + 3 * shares) / denominator * 100`, where the
/// denominator is the view count when one was reported, otherwise the follower
/// count, and never less than 1.
#[must_use]
pub fn engagement_rate(counts: &EngagementCounts, follower_count: Option<u64>) -> f64 {
    let weighted = counts
        .likes
        .saturating_add(counts.comments.saturating_mul(2))
        .saturating_add(counts.shares.saturating_mul(3));
    let denominator = if counts.views > 0 {
        counts.views
    } else {
        follower_count.unwrap_or(0)
    }
    .max(1);

    #[allow(clippy::cast_precision_loss)]
    let rate = weighted as f64 / denominator as f64 * 100.0;
    rate
}

/// Extracts lowercase hashtags from caption text, de-duplicated in order of
/// first appearance.
#[must_use]
pub fn extract_hashtags(caption: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    HASHTAG_RE
        .captures_iter(caption)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_lowercase())
        .filter(|tag| seen.insert(tag.clone()))
        .collect()
}

/// A single post with its metrics, normalised from a provider payload.
///
/// The engagement rate is derived from the raw counts on construction and on
/// deserialization; an upstream-supplied rate is never trusted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoredPostMetric")]
pub struct PostMetric {
    /// Provider-qualified identifier, e.g. `tiktok:7291`.
    pub id: String,
    pub provider: Provider,
    pub published_at: DateTime<Utc>,
    pub counts: EngagementCounts,
    pub follower_count: Option<u64>,
    engagement_rate: f64,
    pub content_type: ContentType,
    pub caption: String,
    pub hashtags: Vec<String>,
    pub url: String,
    pub thumbnail_url: Option<String>,
    pub title: Option<String>,
}

impl PostMetric {
    #[must_use]
    pub fn new(
        provider: Provider,
        native_id: &str,
        published_at: DateTime<Utc>,
        counts: EngagementCounts,
    ) -> Self {
        Self {
            id: format!("{}:{native_id}", provider.as_str()),
            provider,
            published_at,
            counts,
            follower_count: None,
            engagement_rate: engagement_rate(&counts, None),
            content_type: ContentType::Other,
            caption: String::new(),
            hashtags: Vec::new(),
            url: String::new(),
            thumbnail_url: None,
            title: None,
        }
    }

    #[must_use]
    pub fn with_follower_count(mut self, follower_count: Option<u64>) -> Self {
        self.follower_count = follower_count;
        self.engagement_rate = engagement_rate(&self.counts, follower_count);
        self
    }

    #[must_use]
    pub fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = content_type;
        self
    }

    /// Sets the caption and re-extracts its hashtags.
    #[must_use]
    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = caption.into();
        self.hashtags = extract_hashtags(&self.caption);
        self
    }

    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    #[must_use]
    pub fn with_thumbnail(mut self, thumbnail_url: Option<String>) -> Self {
        self.thumbnail_url = thumbnail_url;
        self
    }

    #[must_use]
    pub fn with_title(mut self, title: Option<String>) -> Self {
        self.title = title;
        self
    }

    #[must_use]
    pub fn engagement_rate(&self) -> f64 {
        self.engagement_rate
    }

    /// Hour of day (0–23) the post was published, in UTC.
    #[must_use]
    pub fn publish_hour_utc(&self) -> u32 {
        self.published_at.hour()
    }
}

/// Wire shape used when reading a [`PostMetric`] back from a cache or store.
/// Any serialized `engagement_rate` is ignored and recomputed.
#[derive(Deserialize)]
struct StoredPostMetric {
    id: String,
    provider: Provider,
    published_at: DateTime<Utc>,
    counts: EngagementCounts,
    follower_count: Option<u64>,
    content_type: ContentType,
    caption: String,
    hashtags: Vec<String>,
    url: String,
    thumbnail_url: Option<String>,
    title: Option<String>,
}

impl From<StoredPostMetric> for PostMetric {
    fn from(stored: StoredPostMetric) -> Self {
        Self {
            engagement_rate: engagement_rate(&stored.counts, stored.follower_count),
            id: stored.id,
            provider: stored.provider,
            published_at: stored.published_at,
            counts: stored.counts,
            follower_count: stored.follower_count,
            content_type: stored.content_type,
            caption: stored.caption,
            hashtags: stored.hashtags,
            url: stored.url,
            thumbnail_url: stored.thumbnail_url,
            title: stored.title,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn counts(views: u64, likes: u64, comments: u64, shares: u64) -> EngagementCounts {
        EngagementCounts {
            views,
            likes,
            comments,
            shares,
            saves: None,
        }
    }

    #[test]
    fn weighted_formula_uses_views() {
        let rate = engagement_rate(&counts(1000, 10, 5, 2), None);
        assert!((rate - 2.6).abs() < 1e-9, "got {rate}");
    }

    #[test]
    fn falls_back_to_follower_count_without_views() {
        let rate = engagement_rate(&counts(0, 10, 5, 2), Some(200));
        assert!((rate - 13.0).abs() < 1e-9, "got {rate}");
    }

    #[test]
    fn views_preferred_over_followers() {
        let rate = engagement_rate(&counts(1000, 10, 5, 2), Some(50));
        assert!((rate - 2.6).abs() < 1e-9, "got {rate}");
    }

    #[test]
    fn zero_denominator_is_floored_at_one() {
        let rate = engagement_rate(&counts(0, 1, 0, 0), None);
        assert!((rate - 100.0).abs() < 1e-9);
        assert!(engagement_rate(&EngagementCounts::default(), None).abs() < f64::EPSILON);
    }

    #[test]
    fn hashtags_are_lowercased_and_deduplicated() {
        let tags = extract_hashtags("Morning #Coffee run #coffee #día_1 and #2024!");
        assert_eq!(tags, vec!["coffee", "día_1", "2024"]);
    }

    #[test]
    fn builder_recomputes_rate_with_followers() {
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 14, 30, 0).unwrap();
        let post = PostMetric::new(Provider::Instagram, "abc", at, counts(0, 4, 3, 0))
            .with_follower_count(Some(100))
            .with_caption("launch day #NewDrop");
        assert_eq!(post.id, "instagram:abc");
        assert!((post.engagement_rate() - 10.0).abs() < 1e-9);
        assert_eq!(post.hashtags, vec!["newdrop"]);
        assert_eq!(post.publish_hour_utc(), 14);
    }

    #[test]
    fn deserialization_ignores_supplied_rate() {
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        let post = PostMetric::new(Provider::TikTok, "1", at, counts(1000, 10, 5, 2));
        let mut value = serde_json::to_value(&post).unwrap();
        value["engagement_rate"] = serde_json::json!(999.0);
        let back: PostMetric = serde_json::from_value(value).unwrap();
        assert!((back.engagement_rate() - 2.6).abs() < 1e-9);
        assert_eq!(back, post);
    }
}
