//! Provider ingestion clients.
//!
//! Each platform adapter ([`TikTokApi`], [`InstagramApi`], [`YouTubeApi`])
//! implements the two-call [`PlatformApi`] capability. [`IngestionClient`]
//! composes an adapter with credentials, a shared rate limiter, and a retry
//! policy, and exposes the result as a [`PostSource`].

pub mod api;
pub mod client;
pub mod credentials;
pub mod error;
pub mod http;
pub mod instagram;
pub mod normalize;
pub mod source;
pub mod tiktok;
pub mod types;
pub mod youtube;

pub use api::{ListTarget, PlatformApi};
pub use client::{build_source, ClientSettings, IngestionClient, IngestionOptions};
pub use credentials::{CredentialProvider, Credentials, StaticCredentialProvider};
pub use error::ClientBuildError;
pub use http::HttpOptions;
pub use instagram::InstagramApi;
pub use source::{PageLimits, Pagination, PostBatch, PostSource, StopReason};
pub use tiktok::TikTokApi;
pub use types::{ApiResponse, ListingPage, QuotaSnapshot, RawPost};
pub use youtube::YouTubeApi;
