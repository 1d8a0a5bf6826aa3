//! Raw provider payloads and the page/response wrappers shared by adapters.
//!
//! Each provider's post payload is its own struct; [`RawPost`] is the tagged
//! union the ingestion client works with. Fields the upstream may omit are
//! `Option`s so a partially populated listing record still deserializes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};

/// Upstream quota reported in `x-ratelimit-*` response headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaSnapshot {
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: Option<DateTime<Utc>>,
}

/// A parsed response body plus any quota headers that came with it.
#[derive(Debug, Clone)]
pub struct ApiResponse<T> {
    pub body: T,
    pub quota: Option<QuotaSnapshot>,
}

impl<T> ApiResponse<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ApiResponse<U> {
        ApiResponse {
            body: f(self.body),
            quota: self.quota,
        }
    }
}

/// One page of a post listing.
#[derive(Debug, Clone, Default)]
pub struct ListingPage {
    pub items: Vec<RawPost>,
    /// Opaque cursor for the next page, if the provider returned one.
    pub next_cursor: Option<String>,
    pub has_more: bool,
    /// Account follower count, when the listing endpoint reports it.
    pub follower_count: Option<u64>,
}

/// Provider-specific post payload.
#[derive(Debug, Clone, PartialEq)]
pub enum RawPost {
    TikTok(TikTokVideo),
    Instagram(InstagramMedia),
    YouTube(YouTubeVideo),
}

// ---------------------------------------------------------------------------
// TikTok
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TikTokVideo {
    pub id: String,
    /// Unix seconds.
    pub create_time: Option<i64>,
    pub title: Option<String>,
    pub video_description: Option<String>,
    /// Seconds.
    pub duration: Option<u64>,
    pub cover_image_url: Option<String>,
    pub share_url: Option<String>,
    pub view_count: Option<u64>,
    pub like_count: Option<u64>,
    pub comment_count: Option<u64>,
    pub share_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TikTokEnvelope<T> {
    pub data: T,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TikTokVideoList {
    #[serde(default)]
    pub videos: Vec<TikTokVideo>,
    pub cursor: Option<i64>,
    #[serde(default)]
    pub has_more: bool,
}

// ---------------------------------------------------------------------------
// Instagram (Graph API)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InstagramMedia {
    pub id: String,
    pub caption: Option<String>,
    /// `IMAGE`, `VIDEO`, or `CAROUSEL_ALBUM`.
    pub media_type: Option<String>,
    /// `FEED`, `REELS`, `STORY`, ...
    pub media_product_type: Option<String>,
    pub permalink: Option<String>,
    pub thumbnail_url: Option<String>,
    pub media_url: Option<String>,
    /// e.g. `2024-05-01T12:00:00+0000`.
    pub timestamp: Option<String>,
    pub like_count: Option<u64>,
    pub comments_count: Option<u64>,
    pub insights: Option<InstagramInsights>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct InstagramInsights {
    #[serde(default)]
    pub data: Vec<InstagramInsight>,
}

impl InstagramInsights {
    /// First value of the named insight metric.
    #[must_use]
    pub fn metric(&self, name: &str) -> Option<u64> {
        self.data
            .iter()
            .find(|m| m.name == name)
            .and_then(|m| m.values.first())
            .map(|v| v.value)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InstagramInsight {
    pub name: String,
    #[serde(default)]
    pub values: Vec<InstagramInsightValue>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InstagramInsightValue {
    #[serde(default)]
    pub value: u64,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct InstagramMediaPage {
    #[serde(default)]
    pub data: Vec<InstagramMedia>,
    pub paging: Option<InstagramPaging>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct InstagramPaging {
    pub cursors: Option<InstagramCursors>,
    /// Present only when another page exists.
    pub next: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct InstagramCursors {
    pub after: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BusinessDiscoveryResponse {
    pub business_discovery: BusinessDiscovery,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BusinessDiscovery {
    pub followers_count: Option<u64>,
    pub media: Option<InstagramMediaPage>,
}

// ---------------------------------------------------------------------------
// YouTube (Data API v3)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YouTubeVideo {
    pub id: String,
    pub snippet: Option<YouTubeSnippet>,
    pub statistics: Option<YouTubeStatistics>,
    pub content_details: Option<YouTubeContentDetails>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YouTubeSnippet {
    /// RFC 3339.
    pub published_at: Option<String>,
    pub channel_id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub thumbnails: Option<YouTubeThumbnails>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct YouTubeThumbnails {
    pub default: Option<YouTubeThumbnail>,
    pub medium: Option<YouTubeThumbnail>,
    pub high: Option<YouTubeThumbnail>,
}

impl YouTubeThumbnails {
    /// Largest available thumbnail URL.
    #[must_use]
    pub fn best(&self) -> Option<&str> {
        self.high
            .as_ref()
            .or(self.medium.as_ref())
            .or(self.default.as_ref())
            .map(|t| t.url.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct YouTubeThumbnail {
    pub url: String,
}

/// The Data API encodes counts as decimal strings.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YouTubeStatistics {
    #[serde(default, deserialize_with = "count")]
    pub view_count: Option<u64>,
    #[serde(default, deserialize_with = "count")]
    pub like_count: Option<u64>,
    #[serde(default, deserialize_with = "count")]
    pub comment_count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct YouTubeContentDetails {
    /// ISO 8601 duration, e.g. `PT1M30S`.
    pub duration: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct YouTubeSearchResponse {
    #[serde(default)]
    pub items: Vec<YouTubeSearchItem>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct YouTubeSearchItem {
    pub id: YouTubeSearchId,
    pub snippet: Option<YouTubeSnippet>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct YouTubeSearchId {
    pub video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct YouTubeVideoListResponse {
    #[serde(default)]
    pub items: Vec<YouTubeVideo>,
}

/// Accepts a count as either a JSON number or a numeric string.
fn count<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Count {
        Number(u64),
        Text(String),
    }

    match Option::<Count>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Count::Number(n)) => Ok(Some(n)),
        Some(Count::Text(s)) => s.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn youtube_statistics_accept_string_counts() {
        let stats: YouTubeStatistics = serde_json::from_value(serde_json::json!({
            "viewCount": "1200",
            "likeCount": 45,
        }))
        .unwrap();
        assert_eq!(stats.view_count, Some(1200));
        assert_eq!(stats.like_count, Some(45));
        assert_eq!(stats.comment_count, None);
    }

    #[test]
    fn youtube_statistics_reject_garbage_counts() {
        let result: Result<YouTubeStatistics, _> =
            serde_json::from_value(serde_json::json!({ "viewCount": "lots" }));
        assert!(result.is_err());
    }

    #[test]
    fn instagram_insight_lookup() {
        let insights: InstagramInsights = serde_json::from_value(serde_json::json!({
            "data": [
                { "name": "views", "values": [{ "value": 900 }] },
                { "name": "saved", "values": [] }
            ]
        }))
        .unwrap();
        assert_eq!(insights.metric("views"), Some(900));
        assert_eq!(insights.metric("saved"), None);
        assert_eq!(insights.metric("shares"), None);
    }

    #[test]
    fn thumbnails_prefer_highest_resolution() {
        let thumbs = YouTubeThumbnails {
            default: Some(YouTubeThumbnail {
                url: "d".to_owned(),
            }),
            medium: Some(YouTubeThumbnail {
                url: "m".to_owned(),
            }),
            high: None,
        };
        assert_eq!(thumbs.best(), Some("m"));
    }
}
