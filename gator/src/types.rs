use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::store::StoreError;

/// A registered syndication source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Feed {
    pub id: Uuid,
    pub name: String,
    pub url: String,
    pub user_id: Uuid,
    pub last_fetched_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewFeed {
    pub name: String,
    pub url: String,
    pub user_id: Uuid,
}

/// A user's subscription to a feed. Browsing shows posts from followed feeds only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct FeedFollow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub feed_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The persisted, deduplicated record of a feed item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Post {
    pub id: Uuid,
    pub feed_id: Uuid,
    pub title: String,
    pub url: String,
    pub description: String,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub feed_id: Uuid,
    pub title: String,
    pub url: String,
    pub description: String,
    pub published_at: Option<DateTime<Utc>>,
}

/// A decoded feed, produced fresh on every fetch and never stored as is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedDocument {
    pub title: String,
    pub link: String,
    pub description: String,
    pub items: Vec<FeedItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedItem {
    pub title: String,
    pub link: String,
    pub description: String,
    /// Raw `pubDate` text, empty when the element is missing.
    pub pub_date: String,
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_feed_size_mb: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "gator".to_string(),
            timeout_seconds: 30,
            max_feed_size_mb: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How many least-recently-fetched feeds a single tick selects.
    pub feeds_per_tick: usize,
    pub max_concurrent_fetches: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            feeds_per_tick: 1,
            max_concurrent_fetches: 1,
        }
    }
}

/// Counters for one document's worth of ingestion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub items: usize,
    pub saved: usize,
    pub duplicates: usize,
    pub failed: usize,
}

/// Outcome of one feed's fetch-normalize-persist cycle.
#[derive(Debug)]
pub struct FeedReport {
    pub feed_id: Uuid,
    pub feed_url: String,
    pub outcome: Result<IngestReport>,
}

impl FeedReport {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AggregatorError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("bad status code {status} from {url}")]
    BadStatus { status: u16, url: String },

    #[error("Feed parse error: {0}")]
    Parse(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Unsupported feed URL: {url}")]
    UnsupportedUrl { url: String },

    #[error("invalid interval {input:?}: {reason}")]
    InvalidInterval { input: String, reason: String },

    #[error("interval must be at least 1 second, got {interval:?}")]
    IntervalTooShort { interval: Duration },

    #[error("Feed size exceeds limit: {size_mb}MB")]
    FeedTooLarge { size_mb: usize },

    #[error("fetch of {url} cancelled")]
    Cancelled { url: String },

    #[error("General error: {0}")]
    General(String),
}

impl From<quick_xml::Error> for AggregatorError {
    fn from(err: quick_xml::Error) -> Self {
        AggregatorError::Parse(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AggregatorError>;
