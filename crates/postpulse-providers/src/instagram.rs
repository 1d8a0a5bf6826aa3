//! Instagram Graph API adapter.
//!
//! Own posts come from `me/media`; competitor posts from the
//! `business_discovery` field expansion, which also reports the account's
//! follower count.

use std::sync::LazyLock;

use async_trait::async_trait;
use postpulse_core::{IngestError, Provider};
use regex::Regex;

use crate::api::{ListTarget, PlatformApi};
use crate::credentials::Credentials;
use crate::error::ClientBuildError;
use crate::http::{ApiHttp, HttpOptions};
use crate::types::{
    ApiResponse, BusinessDiscoveryResponse, InstagramMedia, InstagramMediaPage, ListingPage,
    RawPost,
};

pub const DEFAULT_BASE_URL: &str = "https://graph.facebook.com/v19.0";

const MEDIA_FIELDS: &str = "id,caption,media_type,media_product_type,permalink,thumbnail_url,\
media_url,timestamp,like_count,comments_count";

const INSIGHT_METRICS: &str = "views,shares,saved";

const MAX_PAGE_SIZE: u32 = 100;

static HANDLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._]{1,30}$").expect("valid regex"));

#[derive(Debug, Clone)]
pub struct InstagramApi {
    http: ApiHttp,
}

impl InstagramApi {
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
            http: ApiHttp::new(Provider::Instagram, base_url, options)?,
        })
    }
}

fn into_listing(page: InstagramMediaPage, follower_count: Option<u64>) -> ListingPage {
    let (has_more, next_cursor) = match page.paging {
        Some(paging) => {
            let after = paging.cursors.and_then(|c| c.after);
            let has_more = paging.next.is_some() && after.is_some();
            (has_more, after.filter(|_| has_more))
        }
        None => (false, None),
    };
    ListingPage {
        items: page.data.into_iter().map(RawPost::Instagram).collect(),
        next_cursor,
        has_more,
        follower_count,
    }
}

#[async_trait]
impl PlatformApi for InstagramApi {
    fn provider(&self) -> Provider {
        Provider::Instagram
    }

    async fn list_page(
        &self,
        credentials: &Credentials,
        target: ListTarget<'_>,
        cursor: Option<&str>,
        page_size: u32,
    ) -> Result<ApiResponse<ListingPage>, IngestError> {
        let limit = page_size.clamp(1, MAX_PAGE_SIZE);
        match target {
            ListTarget::Own { .. } => {
                let mut url = self.http.endpoint("me/media")?;
                {
                    let mut query = url.query_pairs_mut();
                    query
                        .append_pair("fields", MEDIA_FIELDS)
                        .append_pair("limit", &limit.to_string());
                    if let Some(after) = cursor {
                        query.append_pair("after", after);
                    }
                }
                let request = self.http.get(url, &credentials.access_token);
                let response = self
                    .http
                    .send::<InstagramMediaPage>(request, "media list")
                    .await?;
                Ok(response.map(|page| into_listing(page, None)))
            }
            ListTarget::Competitor { handle, .. } => {
                if !HANDLE_RE.is_match(handle) {
                    return Err(IngestError::Validation(format!(
                        "invalid instagram handle \"{handle}\""
                    )));
                }
                let after = cursor.map(|c| format!(".after({c})")).unwrap_or_default();
                let fields = format!(
                    "business_discovery.username({handle}){{followers_count,media.limit({limit}){after}{{{MEDIA_FIELDS}}}}}"
                );
                let mut url = self.http.endpoint("me")?;
                url.query_pairs_mut().append_pair("fields", &fields);
                let request = self.http.get(url, &credentials.access_token);
                let response = self
                    .http
                    .send::<BusinessDiscoveryResponse>(request, "business discovery")
                    .await?;
                Ok(response.map(|r| {
                    let discovery = r.business_discovery;
                    into_listing(discovery.media.unwrap_or_default(), discovery.followers_count)
                }))
            }
        }
    }

    async fn fetch_item(
        &self,
        credentials: &Credentials,
        post_id: &str,
    ) -> Result<ApiResponse<RawPost>, IngestError> {
        let mut url = self.http.endpoint(post_id)?;
        url.query_pairs_mut().append_pair(
            "fields",
            &format!("{MEDIA_FIELDS},insights.metric({INSIGHT_METRICS})"),
        );
        let request = self.http.get(url, &credentials.access_token);
        let response = self
            .http
            .send::<InstagramMedia>(request, "media detail")
            .await?;
        Ok(response.map(RawPost::Instagram))
    }
}
