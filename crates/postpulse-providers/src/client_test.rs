use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use postpulse_core::ContentType;
use postpulse_resilience::RateLimiterOptions;

use super::*;
use crate::credentials::StaticCredentialProvider;
use crate::types::{ListingPage, QuotaSnapshot, TikTokVideo};

fn video(id: &str, age_days: i64) -> TikTokVideo {
    TikTokVideo {
        id: id.to_owned(),
        create_time: Some((Utc::now() - chrono::Duration::days(age_days)).timestamp()),
        title: None,
        video_description: Some(format!("listing caption {id}")),
        duration: Some(30),
        cover_image_url: None,
        share_url: None,
        view_count: Some(100),
        like_count: Some(1),
        comment_count: Some(0),
        share_count: Some(0),
    }
}

/// Scripted adapter: page `n` is served for cursor `n` (no cursor = page 0).
#[derive(Default)]
struct FakeApi {
    pages: Vec<Vec<TikTokVideo>>,
    follower_count: Option<u64>,
    failing_items: HashSet<String>,
    /// Number of leading list calls that fail with a 503.
    list_failures: AtomicU32,
    quota: Option<QuotaSnapshot>,
    list_calls: AtomicU32,
    item_calls: AtomicU32,
    cursors_seen: Mutex<Vec<Option<String>>>,
}

impl FakeApi {
    fn with_pages(pages: Vec<Vec<TikTokVideo>>) -> Self {
        Self {
            pages,
            ..Self::default()
        }
    }
}

#[async_trait]
impl PlatformApi for FakeApi {
    fn provider(&self) -> Provider {
        Provider::TikTok
    }

    async fn list_page(
        &self,
        _credentials: &Credentials,
        _target: ListTarget<'_>,
        cursor: Option<&str>,
        _page_size: u32,
    ) -> Result<ApiResponse<ListingPage>, IngestError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self
            .list_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(IngestError::TransientProvider {
                provider: Provider::TikTok,
                status: Some(503),
                message: "try again".to_owned(),
            });
        }
        self.cursors_seen
            .lock()
            .unwrap()
            .push(cursor.map(str::to_owned));

        let index: usize = cursor.map_or(0, |c| c.parse().unwrap());
        let has_more = index + 1 < self.pages.len();
        Ok(ApiResponse {
            body: ListingPage {
                items: self.pages[index].iter().cloned().map(RawPost::TikTok).collect(),
                next_cursor: has_more.then(|| (index + 1).to_string()),
                has_more,
                follower_count: self.follower_count,
            },
            quota: self.quota,
        })
    }

    async fn fetch_item(
        &self,
        _credentials: &Credentials,
        post_id: &str,
    ) -> Result<ApiResponse<RawPost>, IngestError> {
        self.item_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_items.contains(post_id) {
            return Err(IngestError::PermanentProvider {
                provider: Provider::TikTok,
                status: 403,
                message: "private video".to_owned(),
            });
        }
        let mut full = self
            .pages
            .iter()
            .flatten()
            .find(|v| v.id == post_id)
            .cloned()
            .unwrap();
        full.like_count = Some(50);
        full.video_description = Some(format!("full caption {post_id} #enriched"));
        Ok(ApiResponse {
            body: RawPost::TikTok(full),
            quota: None,
        })
    }
}

fn client(api: FakeApi) -> IngestionClient<FakeApi> {
    client_with(api, StaticCredentialProvider::new().with_token(Provider::TikTok, "token"))
}

fn client_with(api: FakeApi, credentials: StaticCredentialProvider) -> IngestionClient<FakeApi> {
    IngestionClient::new(
        api,
        Arc::new(credentials),
        RateLimiter::new(
            "tiktok",
            RateLimiterOptions {
                requests_per_minute: 6_000,
                burst_capacity: 100,
            },
        ),
        RetryPolicy::none(),
        IngestionOptions {
            batch_size: 5,
            inter_batch_delay: Duration::ZERO,
        },
    )
}

fn limits(max_pages: u32) -> PageLimits {
    PageLimits {
        max_pages,
        max_per_page: 20,
    }
}

#[tokio::test]
async fn stops_after_page_whose_oldest_post_predates_window() {
    let api = FakeApi::with_pages(vec![
        vec![video("a", 1), video("b", 2)],
        vec![video("c", 4), video("d", 5)],
        vec![video("e", 6), video("f", 9)],
        vec![video("g", 10)],
        vec![video("h", 12)],
    ]);
    let client = client(api);
    let batch = client.get_user_posts("user-1", 7, limits(10)).await.unwrap();

    assert_eq!(client.api.list_calls.load(Ordering::SeqCst), 3);
    assert_eq!(batch.pagination.pages_fetched, 3);
    assert_eq!(batch.pagination.stop_reason, StopReason::LookbackReached);
    assert!(batch.pagination.has_more);
    assert_eq!(batch.pagination.next_cursor.as_deref(), Some("3"));

    let ids: Vec<_> = batch.posts.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["tiktok:a", "tiktok:b", "tiktok:c", "tiktok:d", "tiktok:e"]);
}

#[tokio::test]
async fn stops_at_max_pages() {
    let api = FakeApi::with_pages(vec![
        vec![video("a", 1)],
        vec![video("b", 1)],
        vec![video("c", 1)],
    ]);
    let client = client(api);
    let batch = client.get_user_posts("user-1", 30, limits(2)).await.unwrap();
    assert_eq!(batch.pagination.stop_reason, StopReason::MaxPages);
    assert_eq!(batch.posts.len(), 2);
    assert_eq!(
        *client.api.cursors_seen.lock().unwrap(),
        vec![None, Some("1".to_owned())]
    );
}

#[tokio::test]
async fn stops_when_provider_has_no_more_pages() {
    let api = FakeApi::with_pages(vec![vec![video("a", 1)], vec![video("b", 2)]]);
    let client = client(api);
    let batch = client.get_user_posts("user-1", 30, limits(10)).await.unwrap();
    assert_eq!(batch.pagination.stop_reason, StopReason::Exhausted);
    assert!(!batch.pagination.has_more);
    assert_eq!(batch.posts.len(), 2);
}

#[tokio::test]
async fn empty_listing_yields_empty_batch() {
    let client = client(FakeApi::with_pages(vec![Vec::new()]));
    let batch = client.get_user_posts("user-1", 7, limits(10)).await.unwrap();
    assert!(batch.posts.is_empty());
    assert_eq!(client.api.item_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn enrichment_replaces_listing_fields() {
    let client = client(FakeApi::with_pages(vec![vec![video("a", 1)]]));
    let batch = client.get_user_posts("user-1", 7, limits(10)).await.unwrap();
    let post = &batch.posts[0];
    assert_eq!(post.counts.likes, 50);
    assert_eq!(post.hashtags, vec!["enriched"]);
    assert_eq!(post.content_type, ContentType::Short);
}

#[tokio::test]
async fn failed_enrichment_degrades_to_listing_record() {
    let mut api = FakeApi::with_pages(vec![vec![video("a", 1), video("b", 1), video("c", 1)]]);
    api.failing_items.insert("b".to_owned());
    let client = client(api);

    let batch = client.get_user_posts("user-1", 7, limits(10)).await.unwrap();
    assert_eq!(batch.posts.len(), 3);
    let b = batch.posts.iter().find(|p| p.id == "tiktok:b").unwrap();
    assert_eq!(b.counts.likes, 1, "listing counts kept");
    assert_eq!(b.caption, "listing caption b");
    let a = batch.posts.iter().find(|p| p.id == "tiktok:a").unwrap();
    assert_eq!(a.counts.likes, 50);
}

#[tokio::test]
async fn missing_credentials_fail_fast_without_calls() {
    let client = client_with(
        FakeApi::with_pages(vec![vec![video("a", 1)]]),
        StaticCredentialProvider::new(),
    );
    let err = client.get_user_posts("user-1", 7, limits(10)).await.unwrap_err();
    assert!(matches!(err, IngestError::Auth { provider: Provider::TikTok, ref user_id } if user_id == "user-1"));
    assert_eq!(client.api.list_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn transient_page_failure_is_retried() {
    let api = FakeApi::with_pages(vec![vec![video("a", 1)]]);
    api.list_failures.store(2, Ordering::SeqCst);
    let mut client = client(api);
    client.retry = RetryPolicy {
        max_retries: 3,
        initial_delay: Duration::ZERO,
        max_delay: Duration::ZERO,
        backoff_factor: 2.0,
        jitter: false,
    };

    let batch = client.get_user_posts("user-1", 7, limits(10)).await.unwrap();
    assert_eq!(batch.posts.len(), 1);
    assert_eq!(client.api.list_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn exhausted_page_retries_surface_the_error() {
    let api = FakeApi::with_pages(vec![vec![video("a", 1)]]);
    api.list_failures.store(5, Ordering::SeqCst);
    let client = client(api);
    let err = client.get_user_posts("user-1", 7, limits(10)).await.unwrap_err();
    assert!(matches!(err, IngestError::TransientProvider { status: Some(503), .. }));
}

#[tokio::test(start_paused = true)]
async fn batches_run_sequentially_with_delay() {
    let page: Vec<_> = (0..5).map(|i| video(&format!("v{i}"), 1)).collect();
    let mut client = client(FakeApi::with_pages(vec![page]));
    client.options = IngestionOptions {
        batch_size: 2,
        inter_batch_delay: Duration::from_secs(1),
    };

    let start = tokio::time::Instant::now();
    let batch = client.get_user_posts("user-1", 7, limits(10)).await.unwrap();
    assert_eq!(batch.posts.len(), 5);
    assert_eq!(client.api.item_calls.load(Ordering::SeqCst), 5);
    // Three batches, two pauses between them.
    assert_eq!(start.elapsed(), Duration::from_secs(2));
}

#[tokio::test]
async fn quota_headers_reconcile_the_limiter() {
    let mut api = FakeApi::with_pages(vec![vec![video("a", 1)]]);
    api.quota = Some(QuotaSnapshot {
        limit: 500,
        remaining: 400,
        reset_at: None,
    });
    let client = client(api);
    client.get_user_posts("user-1", 7, limits(10)).await.unwrap();

    let snapshot = client.limiter().snapshot();
    assert!((snapshot.capacity - 500.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn follower_count_feeds_engagement_when_views_missing() {
    let mut listing = video("a", 1);
    listing.view_count = None;
    let mut api = FakeApi::with_pages(vec![vec![listing]]);
    api.follower_count = Some(10_000);
    api.failing_items.insert("a".to_owned());
    let client = client(api);

    let batch = client.get_user_posts("user-1", 7, limits(10)).await.unwrap();
    let post = &batch.posts[0];
    assert_eq!(post.follower_count, Some(10_000));
    assert!((post.engagement_rate() - 0.01).abs() < 1e-9);
}

#[tokio::test]
async fn get_post_metrics_fetches_single_item() {
    let client = client(FakeApi::with_pages(vec![vec![video("a", 1)]]));
    let metric = client.get_post_metrics("user-1", "a").await.unwrap();
    assert_eq!(metric.id, "tiktok:a");
    assert_eq!(metric.counts.likes, 50);
}
