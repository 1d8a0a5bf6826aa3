use async_trait::async_trait;
use postpulse_core::{IngestError, PostMetric, Provider};
use serde::{Deserialize, Serialize};

/// Page budget for one listing walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    pub max_pages: u32,
    pub max_per_page: u32,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            max_pages: 10,
            max_per_page: 20,
        }
    }
}

/// Why a listing walk stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The provider reported no further pages.
    Exhausted,
    /// `max_pages` pages were fetched.
    MaxPages,
    /// A page reached back past the start of the lookback window.
    LookbackReached,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub pages_fetched: u32,
    pub has_more: bool,
    pub next_cursor: Option<String>,
    pub stop_reason: StopReason,
}

/// Posts from one listing walk, newest first as the provider returned them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostBatch {
    pub posts: Vec<PostMetric>,
    pub pagination: Pagination,
}

/// Provider-agnostic post fetching, as consumed by the scan engine.
#[async_trait]
pub trait PostSource: Send + Sync {
    fn provider(&self) -> Provider;

    /// Posts published by `user_id` within the last `lookback_days` days.
    async fn get_user_posts(
        &self,
        user_id: &str,
        lookback_days: u32,
        limits: PageLimits,
    ) -> Result<PostBatch, IngestError>;

    /// Posts published by the public account `handle` within the last
    /// `lookback_days` days, fetched with `user_id`'s credentials.
    async fn get_competitor_posts(
        &self,
        user_id: &str,
        handle: &str,
        lookback_days: u32,
        limits: PageLimits,
    ) -> Result<PostBatch, IngestError>;

    /// Full metrics for one post, fetched with `user_id`'s credentials.
    async fn get_post_metrics(&self, user_id: &str, post_id: &str) -> Result<PostMetric, IngestError>;
}
