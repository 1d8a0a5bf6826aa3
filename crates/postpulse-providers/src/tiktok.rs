//! TikTok adapter: the Display API video list for the user's own account and
//! the Research API video query for public competitor accounts.

use async_trait::async_trait;
use postpulse_core::{IngestError, Provider};
use serde_json::{json, Map, Value};

use crate::api::{ListTarget, PlatformApi};
use crate::credentials::Credentials;
use crate::error::ClientBuildError;
use crate::http::{ApiHttp, HttpOptions};
use crate::types::{ApiResponse, ListingPage, RawPost, TikTokEnvelope, TikTokVideoList};

pub const DEFAULT_BASE_URL: &str = "https://open.tiktokapis.com";

const VIDEO_FIELDS: &str = "id,create_time,title,video_description,duration,cover_image_url,\
share_url,view_count,like_count,comment_count,share_count";

/// Upper bound the video list endpoint accepts for `max_count`.
const MAX_PAGE_SIZE: u32 = 20;

#[derive(Debug, Clone)]
pub struct TikTokApi {
    http: ApiHttp,
}

impl TikTokApi {
    /// # Errors
    ///
    /// See [`ApiHttp::new`].
    pub fn new(options: &HttpOptions) -> Result<Self, ClientBuildError> {
        Self::with_base_url(DEFAULT_BASE_URL, options)
    }

    /// Points the adapter at a different host (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// See [`ApiHttp::new`].
    pub fn with_base_url(base_url: &str, options: &HttpOptions) -> Result<Self, ClientBuildError> {
        Ok(Self {
            http: ApiHttp::new(Provider::TikTok, base_url, options)?,
        })
    }

    async fn query_videos(
        &self,
        credentials: &Credentials,
        path: &str,
        body: Value,
        context: &str,
    ) -> Result<ApiResponse<TikTokVideoList>, IngestError> {
        let mut url = self.http.endpoint(path)?;
        url.query_pairs_mut().append_pair("fields", VIDEO_FIELDS);
        let request = self.http.post(url, &credentials.access_token).json(&body);
        let response = self
            .http
            .send::<TikTokEnvelope<TikTokVideoList>>(request, context)
            .await?;
        Ok(response.map(|envelope| envelope.data))
    }
}

#[async_trait]
impl PlatformApi for TikTokApi {
    fn provider(&self) -> Provider {
        Provider::TikTok
    }

    async fn list_page(
        &self,
        credentials: &Credentials,
        target: ListTarget<'_>,
        cursor: Option<&str>,
        page_size: u32,
    ) -> Result<ApiResponse<ListingPage>, IngestError> {
        let mut body = Map::new();
        body.insert("max_count".to_owned(), json!(page_size.clamp(1, MAX_PAGE_SIZE)));
        if let Some(cursor) = cursor {
            let value: i64 = cursor
                .parse()
                .map_err(|e| IngestError::Validation(format!("invalid tiktok cursor \"{cursor}\": {e}")))?;
            body.insert("cursor".to_owned(), json!(value));
        }

        let path = match target {
            ListTarget::Own { .. } => "v2/video/list/",
            ListTarget::Competitor { handle, .. } => {
                body.insert(
                    "query".to_owned(),
                    json!({
                        "and": [{
                            "operation": "EQ",
                            "field_name": "username",
                            "field_values": [handle],
                        }]
                    }),
                );
                "v2/research/video/query/"
            }
        };

        let response = self
            .query_videos(credentials, path, Value::Object(body), "video list")
            .await?;
        Ok(response.map(|list| {
            let has_more = list.has_more;
            ListingPage {
                next_cursor: list.cursor.filter(|_| has_more).map(|c| c.to_string()),
                has_more,
                items: list.videos.into_iter().map(RawPost::TikTok).collect(),
                follower_count: None,
            }
        }))
    }

    async fn fetch_item(
        &self,
        credentials: &Credentials,
        post_id: &str,
    ) -> Result<ApiResponse<RawPost>, IngestError> {
        let body = json!({ "filters": { "video_ids": [post_id] } });
        let response = self
            .query_videos(credentials, "v2/video/query/", body, "video query")
            .await?;
        let quota = response.quota;
        let video = response
            .body
            .videos
            .into_iter()
            .find(|v| v.id == post_id)
            .ok_or_else(|| IngestError::PermanentProvider {
                provider: Provider::TikTok,
                status: 404,
                message: format!("video {post_id} not found"),
            })?;
        Ok(ApiResponse {
            body: RawPost::TikTok(video),
            quota,
        })
    }
}
