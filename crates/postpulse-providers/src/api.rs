use async_trait::async_trait;
use postpulse_core::{IngestError, Provider};

use crate::credentials::Credentials;
use crate::types::{ApiResponse, ListingPage, RawPost};

/// Whose posts a listing call is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListTarget<'a> {
    /// The authenticated user's own account.
    Own { user_id: &'a str },
    /// A public account looked up on behalf of `user_id`.
    Competitor { user_id: &'a str, handle: &'a str },
}

impl ListTarget<'_> {
    #[must_use]
    pub fn user_id(&self) -> &str {
        match self {
            ListTarget::Own { user_id } | ListTarget::Competitor { user_id, .. } => user_id,
        }
    }
}

/// The two upstream calls a provider must support. Rate limiting, retries,
/// pagination, and enrichment batching live in
/// [`IngestionClient`](crate::IngestionClient), not here.
#[async_trait]
pub trait PlatformApi: Send + Sync {
    fn provider(&self) -> Provider;

    /// Fetches one listing page. `cursor` is `None` for the first page.
    async fn list_page(
        &self,
        credentials: &Credentials,
        target: ListTarget<'_>,
        cursor: Option<&str>,
        page_size: u32,
    ) -> Result<ApiResponse<ListingPage>, IngestError>;

    /// Fetches the full metrics for one post.
    async fn fetch_item(
        &self,
        credentials: &Credentials,
        post_id: &str,
    ) -> Result<ApiResponse<RawPost>, IngestError>;
}
