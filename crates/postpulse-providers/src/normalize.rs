//! Mapping from raw provider payloads to [`PostMetric`].

use std::sync::LazyLock;

use chrono::{DateTime, TimeZone, Utc};
use postpulse_core::{ContentType, EngagementCounts, PostMetric, Provider};
use regex::Regex;

use crate::types::{InstagramMedia, RawPost, TikTokVideo, YouTubeVideo};

/// Videos at or under this length are classified as shorts.
pub const SHORT_VIDEO_MAX_SECS: u64 = 60;

static ISO_DURATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^P(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?)?$")
        .expect("valid regex")
});

impl RawPost {
    #[must_use]
    pub fn provider(&self) -> Provider {
        match self {
            RawPost::TikTok(_) => Provider::TikTok,
            RawPost::Instagram(_) => Provider::Instagram,
            RawPost::YouTube(_) => Provider::YouTube,
        }
    }

    /// The provider's own post identifier.
    #[must_use]
    pub fn native_id(&self) -> &str {
        match self {
            RawPost::TikTok(v) => &v.id,
            RawPost::Instagram(m) => &m.id,
            RawPost::YouTube(v) => &v.id,
        }
    }

    /// Publish time, or `None` when missing or unparseable.
    #[must_use]
    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        match self {
            RawPost::TikTok(v) => v
                .create_time
                .and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
            RawPost::Instagram(m) => m.timestamp.as_deref().and_then(parse_instagram_timestamp),
            RawPost::YouTube(v) => v
                .snippet
                .as_ref()
                .and_then(|s| s.published_at.as_deref())
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc)),
        }
    }

    /// Builds the canonical metric. Engagement rate is always recomputed from
    /// the raw counts. Returns `None` if the payload has no usable publish
    /// time.
    #[must_use]
    pub fn to_metric(&self, follower_count: Option<u64>) -> Option<PostMetric> {
        let published_at = self.published_at()?;
        let metric = match self {
            RawPost::TikTok(v) => tiktok_metric(v, published_at),
            RawPost::Instagram(m) => instagram_metric(m, published_at),
            RawPost::YouTube(v) => youtube_metric(v, published_at),
        };
        Some(metric.with_follower_count(follower_count))
    }
}

fn tiktok_metric(v: &TikTokVideo, published_at: DateTime<Utc>) -> PostMetric {
    let counts = EngagementCounts {
        views: v.view_count.unwrap_or(0),
        likes: v.like_count.unwrap_or(0),
        comments: v.comment_count.unwrap_or(0),
        shares: v.share_count.unwrap_or(0),
        saves: None,
    };
    let caption = v
        .video_description
        .as_deref()
        .or(v.title.as_deref())
        .unwrap_or_default();
    PostMetric::new(Provider::TikTok, &v.id, published_at, counts)
        .with_content_type(classify_video_duration(v.duration))
        .with_caption(caption)
        .with_url(v.share_url.clone().unwrap_or_default())
        .with_thumbnail(v.cover_image_url.clone())
        .with_title(v.title.clone())
}

fn instagram_metric(m: &InstagramMedia, published_at: DateTime<Utc>) -> PostMetric {
    let insights = m.insights.clone().unwrap_or_default();
    let counts = EngagementCounts {
        views: insights
            .metric("views")
            .or_else(|| insights.metric("plays"))
            .unwrap_or(0),
        likes: m.like_count.unwrap_or(0),
        comments: m.comments_count.unwrap_or(0),
        shares: insights.metric("shares").unwrap_or(0),
        saves: insights.metric("saved"),
    };
    PostMetric::new(Provider::Instagram, &m.id, published_at, counts)
        .with_content_type(classify_instagram(
            m.media_type.as_deref(),
            m.media_product_type.as_deref(),
        ))
        .with_caption(m.caption.clone().unwrap_or_default())
        .with_url(m.permalink.clone().unwrap_or_default())
        .with_thumbnail(m.thumbnail_url.clone().or_else(|| m.media_url.clone()))
}

fn youtube_metric(v: &YouTubeVideo, published_at: DateTime<Utc>) -> PostMetric {
    let stats = v.statistics.clone().unwrap_or_default();
    let counts = EngagementCounts {
        views: stats.view_count.unwrap_or(0),
        likes: stats.like_count.unwrap_or(0),
        comments: stats.comment_count.unwrap_or(0),
        shares: 0,
        saves: None,
    };
    let duration = v
        .content_details
        .as_ref()
        .and_then(|d| d.duration.as_deref())
        .and_then(parse_iso8601_duration);
    let snippet = v.snippet.as_ref();
    PostMetric::new(Provider::YouTube, &v.id, published_at, counts)
        .with_content_type(classify_video_duration(duration))
        .with_caption(
            snippet
                .and_then(|s| s.description.clone())
                .unwrap_or_default(),
        )
        .with_url(format!("https://www.youtube.com/watch?v={}", v.id))
        .with_thumbnail(
            snippet
                .and_then(|s| s.thumbnails.as_ref())
                .and_then(|t| t.best())
                .map(str::to_owned),
        )
        .with_title(snippet.and_then(|s| s.title.clone()))
}

/// Short/long split for video providers. Unknown length counts as a
/// regular video.
#[must_use]
pub fn classify_video_duration(duration_secs: Option<u64>) -> ContentType {
    match duration_secs {
        Some(secs) if secs <= SHORT_VIDEO_MAX_SECS => ContentType::Short,
        _ => ContentType::Video,
    }
}

/// Instagram exposes the format explicitly: the product type wins for reels
/// and stories, otherwise the media type decides.
#[must_use]
pub fn classify_instagram(media_type: Option<&str>, product_type: Option<&str>) -> ContentType {
    match product_type {
        Some("REELS") => return ContentType::Short,
        Some("STORY") => return ContentType::Story,
        _ => {}
    }
    match media_type {
        Some("IMAGE") => ContentType::Image,
        Some("VIDEO") => ContentType::Video,
        Some("CAROUSEL_ALBUM") => ContentType::Carousel,
        _ => ContentType::Other,
    }
}

/// Parses an ISO 8601 duration such as `PT1H2M3S` or `P1DT30M` into
/// seconds.
#[must_use]
pub fn parse_iso8601_duration(value: &str) -> Option<u64> {
    let caps = ISO_DURATION.captures(value.trim())?;
    if caps.iter().skip(1).all(|c| c.is_none()) {
        return None;
    }
    let part = |idx: usize| -> Option<u64> {
        caps.get(idx)
            .map_or(Some(0), |m| m.as_str().parse::<u64>().ok())
    };
    let secs = part(1)? * 86_400 + part(2)? * 3_600 + part(3)? * 60 + part(4)?;
    Some(secs)
}

/// The Graph API uses `+0000` offsets; RFC 3339 is accepted as well.
fn parse_instagram_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%z")
        .or_else(|_| DateTime::parse_from_rfc3339(value))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
#[path = "normalize_test.rs"]
mod tests;
