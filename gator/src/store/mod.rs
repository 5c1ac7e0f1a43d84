pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgFeedStore;

use crate::types::{Feed, FeedFollow, NewFeed, NewPost, Post};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A post with this link already exists. Callers treat this as "already ingested".
    #[error("post already exists for link {link}")]
    DuplicateLink { link: String },

    #[error("feed already registered: {url}")]
    DuplicateFeedUrl { url: String },

    #[error("Feed not found: {id}")]
    FeedNotFound { id: Uuid },

    #[error("No feed registered for {url}")]
    FeedUrlNotFound { url: String },

    #[error("user {user_id} already follows feed {feed_id}")]
    AlreadyFollowing { user_id: Uuid, feed_id: Uuid },

    #[error("user {user_id} does not follow feed {feed_id}")]
    NotFollowing { user_id: Uuid, feed_id: Uuid },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Persistence contract consumed by the aggregator.
///
/// Implementations provide their own atomicity for marking a feed fetched and
/// for inserting a post; the aggregator never spans both in a transaction.
#[async_trait]
pub trait FeedStore: Send + Sync {
    /// Up to `limit` feeds ordered by last fetch time, never-fetched feeds first.
    async fn next_feeds_to_fetch(&self, limit: usize) -> StoreResult<Vec<Feed>>;

    async fn next_feed_to_fetch(&self) -> StoreResult<Option<Feed>> {
        Ok(self.next_feeds_to_fetch(1).await?.into_iter().next())
    }

    async fn mark_feed_fetched(&self, feed_id: Uuid, fetched_at: DateTime<Utc>) -> StoreResult<()>;

    /// Fails with [`StoreError::DuplicateLink`] when a post with the same url exists.
    async fn create_post(&self, post: NewPost) -> StoreResult<Post>;

    /// Fails with [`StoreError::DuplicateFeedUrl`] when the url is already registered.
    async fn create_feed(&self, feed: NewFeed) -> StoreResult<Feed>;

    async fn list_feeds(&self) -> StoreResult<Vec<Feed>>;

    async fn feed_by_url(&self, url: &str) -> StoreResult<Option<Feed>>;

    /// Fails with [`StoreError::AlreadyFollowing`] on a repeat follow and
    /// [`StoreError::FeedNotFound`] when the feed does not exist.
    async fn follow_feed(&self, user_id: Uuid, feed_id: Uuid) -> StoreResult<FeedFollow>;

    /// Fails with [`StoreError::NotFollowing`] when there is nothing to remove.
    async fn unfollow_feed(&self, user_id: Uuid, feed_id: Uuid) -> StoreResult<()>;

    /// Feeds followed by `user_id`, oldest follow first.
    async fn followed_feeds(&self, user_id: Uuid) -> StoreResult<Vec<Feed>>;

    /// Newest posts first. With `user_id`, only posts from feeds that user follows.
    async fn recent_posts(&self, user_id: Option<Uuid>, limit: usize) -> StoreResult<Vec<Post>>;
}
