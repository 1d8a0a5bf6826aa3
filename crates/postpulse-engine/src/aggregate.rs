//! Scan aggregate metrics.

use std::collections::{BTreeMap, HashSet};

use chrono::{FixedOffset, Timelike};
use postpulse_core::{PeakTime, PostMetric, ScanResults};

/// Number of posts kept in [`ScanResults::top_performing_posts`].
pub const TOP_POSTS: usize = 10;

/// Flattens fetched posts into scan results.
///
/// Posts are de-duplicated by id (first occurrence wins). Peak-time buckets
/// use the publish hour in `offset` and are ranked by average engagement,
/// highest first; hours with no posts are omitted.
#[must_use]
pub fn aggregate(posts: Vec<PostMetric>, offset: FixedOffset) -> ScanResults {
    let mut seen = HashSet::new();
    let mut posts: Vec<PostMetric> = posts
        .into_iter()
        .filter(|p| seen.insert(p.id.clone()))
        .collect();

    if posts.is_empty() {
        return ScanResults {
            total_posts: 0,
            average_engagement: 0.0,
            peak_times: Vec::new(),
            top_performing_posts: Vec::new(),
        };
    }

    let rates: Vec<f64> = posts.iter().map(PostMetric::engagement_rate).collect();
    #[allow(clippy::cast_precision_loss)]
    let average_engagement = rates.iter().sum::<f64>() / rates.len() as f64;

    let mut buckets: BTreeMap<u32, (usize, f64)> = BTreeMap::new();
    for (post, rate) in posts.iter().zip(&rates) {
        let hour = post.published_at.with_timezone(&offset).hour();
        let bucket = buckets.entry(hour).or_insert((0, 0.0));
        bucket.0 += 1;
        bucket.1 += rate;
    }
    let mut peak_times: Vec<PeakTime> = buckets
        .into_iter()
        .map(|(hour, (post_count, total_engagement))| {
            #[allow(clippy::cast_precision_loss)]
            let average_engagement = total_engagement / post_count as f64;
            PeakTime {
                hour,
                post_count,
                total_engagement,
                average_engagement,
            }
        })
        .collect();
    peak_times.sort_by(|a, b| {
        b.average_engagement
            .total_cmp(&a.average_engagement)
            .then(a.hour.cmp(&b.hour))
    });

    let total_posts = posts.len();
    posts.sort_by(|a, b| b.engagement_rate().total_cmp(&a.engagement_rate()));
    posts.truncate(TOP_POSTS);

    ScanResults {
        total_posts,
        average_engagement,
        peak_times,
        top_performing_posts: posts,
    }
}
