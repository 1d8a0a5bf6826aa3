use postpulse_core::ContentType;

use super::*;
use crate::types::{
    InstagramInsight, InstagramInsightValue, InstagramInsights, YouTubeContentDetails,
    YouTubeSnippet, YouTubeStatistics,
};

fn tiktok(duration: Option<u64>) -> TikTokVideo {
    TikTokVideo {
        id: "7300".to_owned(),
        create_time: Some(1_700_000_000),
        title: Some("Morning routine".to_owned()),
        video_description: Some("Coffee first #Morning #coffee #morning".to_owned()),
        duration,
        cover_image_url: Some("https://cdn.example/cover.jpg".to_owned()),
        share_url: Some("https://www.tiktok.com/@me/video/7300".to_owned()),
        view_count: Some(1_000),
        like_count: Some(10),
        comment_count: Some(5),
        share_count: Some(2),
    }
}

fn instagram(media_type: &str, product_type: Option<&str>) -> InstagramMedia {
    InstagramMedia {
        id: "1789".to_owned(),
        caption: Some("New drop #launch".to_owned()),
        media_type: Some(media_type.to_owned()),
        media_product_type: product_type.map(str::to_owned),
        permalink: Some("https://www.instagram.com/p/abc/".to_owned()),
        thumbnail_url: None,
        media_url: Some("https://cdn.example/media.jpg".to_owned()),
        timestamp: Some("2024-05-01T12:30:00+0000".to_owned()),
        like_count: Some(40),
        comments_count: Some(4),
        insights: None,
    }
}

#[test]
fn tiktok_maps_counts_caption_and_rate() {
    let metric = RawPost::TikTok(tiktok(Some(45))).to_metric(None).unwrap();
    assert_eq!(metric.id, "tiktok:7300");
    assert_eq!(metric.content_type, ContentType::Short);
    assert_eq!(metric.hashtags, vec!["morning", "coffee"]);
    assert_eq!(metric.published_at.timestamp(), 1_700_000_000);
    assert!((metric.engagement_rate() - 2.6).abs() < 1e-9);
    assert_eq!(metric.thumbnail_url.as_deref(), Some("https://cdn.example/cover.jpg"));
}

#[test]
fn tiktok_longer_than_a_minute_is_video() {
    let metric = RawPost::TikTok(tiktok(Some(61))).to_metric(None).unwrap();
    assert_eq!(metric.content_type, ContentType::Video);
}

#[test]
fn missing_publish_time_yields_no_metric() {
    let mut video = tiktok(None);
    video.create_time = None;
    assert!(RawPost::TikTok(video).to_metric(None).is_none());
}

#[test]
fn instagram_product_type_beats_media_type() {
    assert_eq!(classify_instagram(Some("VIDEO"), Some("REELS")), ContentType::Short);
    assert_eq!(classify_instagram(Some("IMAGE"), Some("STORY")), ContentType::Story);
    assert_eq!(classify_instagram(Some("CAROUSEL_ALBUM"), Some("FEED")), ContentType::Carousel);
    assert_eq!(classify_instagram(Some("IMAGE"), None), ContentType::Image);
    assert_eq!(classify_instagram(None, None), ContentType::Other);
}

#[test]
fn instagram_uses_insights_and_follower_denominator() {
    let mut media = instagram("IMAGE", Some("FEED"));
    let without_views = RawPost::Instagram(media.clone()).to_metric(Some(1_000)).unwrap();
    // No views: (40 + 2*4) / 1000 followers.
    assert!((without_views.engagement_rate() - 4.8).abs() < 1e-9);
    assert_eq!(without_views.thumbnail_url.as_deref(), Some("https://cdn.example/media.jpg"));

    media.insights = Some(InstagramInsights {
        data: vec![
            InstagramInsight {
                name: "views".to_owned(),
                values: vec![InstagramInsightValue { value: 2_000 }],
            },
            InstagramInsight {
                name: "shares".to_owned(),
                values: vec![InstagramInsightValue { value: 4 }],
            },
            InstagramInsight {
                name: "saved".to_owned(),
                values: vec![InstagramInsightValue { value: 9 }],
            },
        ],
    });
    let metric = RawPost::Instagram(media).to_metric(Some(1_000)).unwrap();
    assert_eq!(metric.counts.views, 2_000);
    assert_eq!(metric.counts.saves, Some(9));
    // (40 + 8 + 12) / 2000 views.
    assert!((metric.engagement_rate() - 3.0).abs() < 1e-9);
    assert_eq!(metric.published_at.to_rfc3339(), "2024-05-01T12:30:00+00:00");
}

#[test]
fn youtube_uses_duration_and_string_statistics() {
    let video = YouTubeVideo {
        id: "dQw4w9WgXcQ".to_owned(),
        snippet: Some(YouTubeSnippet {
            published_at: Some("2024-03-10T08:00:00Z".to_owned()),
            channel_id: Some("UC123".to_owned()),
            title: Some("Launch day".to_owned()),
            description: Some("Behind the scenes #BTS".to_owned()),
            thumbnails: None,
        }),
        statistics: Some(YouTubeStatistics {
            view_count: Some(500),
            like_count: Some(20),
            comment_count: Some(5),
        }),
        content_details: Some(YouTubeContentDetails {
            duration: Some("PT4M13S".to_owned()),
        }),
    };
    let metric = RawPost::YouTube(video).to_metric(None).unwrap();
    assert_eq!(metric.content_type, ContentType::Video);
    assert_eq!(metric.url, "https://www.youtube.com/watch?v=dQw4w9WgXcQ");
    assert_eq!(metric.title.as_deref(), Some("Launch day"));
    assert_eq!(metric.hashtags, vec!["bts"]);
    assert!((metric.engagement_rate() - 6.0).abs() < 1e-9);
}

#[test]
fn iso8601_durations() {
    assert_eq!(parse_iso8601_duration("PT45S"), Some(45));
    assert_eq!(parse_iso8601_duration("PT1M"), Some(60));
    assert_eq!(parse_iso8601_duration("PT1H2M3S"), Some(3_723));
    assert_eq!(parse_iso8601_duration("P1DT1S"), Some(86_401));
    assert_eq!(parse_iso8601_duration("P0D"), Some(0));
    assert_eq!(parse_iso8601_duration("PT"), None);
    assert_eq!(parse_iso8601_duration("P"), None);
    assert_eq!(parse_iso8601_duration("4:13"), None);
}

#[test]
fn unknown_duration_is_video() {
    assert_eq!(classify_video_duration(None), ContentType::Video);
    assert_eq!(classify_video_duration(Some(60)), ContentType::Short);
}
