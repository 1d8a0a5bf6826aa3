//! YouTube Data API v3 adapter.
//!
//! Listing goes through `search` (newest first), which returns snippets only;
//! statistics and duration come from `videos` during enrichment.

use async_trait::async_trait;
use postpulse_core::{IngestError, Provider};

use crate::api::{ListTarget, PlatformApi};
use crate::credentials::Credentials;
use crate::error::ClientBuildError;
use crate::http::{ApiHttp, HttpOptions};
use crate::types::{
    ApiResponse, ListingPage, RawPost, YouTubeSearchResponse, YouTubeVideo,
    YouTubeVideoListResponse,
};

pub const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";

const MAX_PAGE_SIZE: u32 = 50;

#[derive(Debug, Clone)]
pub struct YouTubeApi {
    http: ApiHttp,
}

impl YouTubeApi {
    /// # Errors
    ///
    /// See [`ApiHttp::new`].
    pub fn new(options: &HttpOptions) -> Result<Self, ClientBuildError> {
        Self::with_base_url(DEFAULT_BASE_URL, options)
    }

    /// # Errors
    ///
    /// See [`ApiHttp::new`].
    pub fn with_base_url(base_url: &str, options: &HttpOptions) -> Result<Self, ClientBuildError> {
        Ok(Self {
            http: ApiHttp::new(Provider::YouTube, base_url, options)?,
        })
    }
}

#[async_trait]
impl PlatformApi for YouTubeApi {
    fn provider(&self) -> Provider {
        Provider::YouTube
    }

    async fn list_page(
        &self,
        credentials: &Credentials,
        target: ListTarget<'_>,
        cursor: Option<&str>,
        page_size: u32,
    ) -> Result<ApiResponse<ListingPage>, IngestError> {
        let mut url = self.http.endpoint("search")?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("part", "snippet")
                .append_pair("type", "video")
                .append_pair("order", "date")
                .append_pair("maxResults", &page_size.clamp(1, MAX_PAGE_SIZE).to_string());
            match target {
                ListTarget::Own { .. } => query.append_pair("forMine", "true"),
                ListTarget::Competitor { handle, .. } => query.append_pair("channelId", handle),
            };
            if let Some(token) = cursor {
                query.append_pair("pageToken", token);
            }
        }

        let request = self.http.get(url, &credentials.access_token);
        let response = self
            .http
            .send::<YouTubeSearchResponse>(request, "search")
            .await?;
        Ok(response.map(|search| {
            let items = search
                .items
                .into_iter()
                .filter_map(|item| {
                    item.id.video_id.map(|id| {
                        RawPost::YouTube(YouTubeVideo {
                            id,
                            snippet: item.snippet,
                            statistics: None,
                            content_details: None,
                        })
                    })
                })
                .collect();
            ListingPage {
                items,
                has_more: search.next_page_token.is_some(),
                next_cursor: search.next_page_token,
                follower_count: None,
            }
        }))
    }

    async fn fetch_item(
        &self,
        credentials: &Credentials,
        post_id: &str,
    ) -> Result<ApiResponse<RawPost>, IngestError> {
        let mut url = self.http.endpoint("videos")?;
        url.query_pairs_mut()
            .append_pair("part", "snippet,statistics,contentDetails")
            .append_pair("id", post_id);
        let request = self.http.get(url, &credentials.access_token);
        let response = self
            .http
            .send::<YouTubeVideoListResponse>(request, "videos")
            .await?;
        let quota = response.quota;
        let video = response
            .body
            .items
            .into_iter()
            .next()
            .ok_or_else(|| IngestError::PermanentProvider {
                provider: Provider::YouTube,
                status: 404,
                message: format!("video {post_id} not found"),
            })?;
        Ok(ApiResponse {
            body: RawPost::YouTube(video),
            quota,
        })
    }
}
