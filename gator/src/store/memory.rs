use super::{FeedStore, StoreError, StoreResult};
use crate::types::{Feed, FeedFollow, NewFeed, NewPost, Post};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-process implementation of [`FeedStore`] with the same uniqueness rules as Postgres.
#[derive(Default)]
pub struct MemoryStore {
    feeds: RwLock<Vec<Feed>>,
    posts: RwLock<Vec<Post>>,
    follows: RwLock<Vec<FeedFollow>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a feed with an explicit last fetch time.
    pub async fn insert_feed(&self, feed: Feed) -> StoreResult<()> {
        let mut feeds = self.feeds.write().await;
        if feeds.iter().any(|f| f.url == feed.url) {
            return Err(StoreError::DuplicateFeedUrl { url: feed.url });
        }
        feeds.push(feed);
        Ok(())
    }

    pub async fn feed(&self, feed_id: Uuid) -> Option<Feed> {
        self.feeds.read().await.iter().find(|f| f.id == feed_id).cloned()
    }

    pub async fn posts(&self) -> Vec<Post> {
        self.posts.read().await.clone()
    }

    pub async fn posts_for_feed(&self, feed_id: Uuid) -> Vec<Post> {
        self.posts
            .read()
            .await
            .iter()
            .filter(|p| p.feed_id == feed_id)
            .cloned()
            .collect()
    }

    async fn followed_feed_ids(&self, user_id: Uuid) -> Vec<Uuid> {
        let mut follows: Vec<FeedFollow> = self
            .follows
            .read()
            .await
            .iter()
            .filter(|f| f.user_id == user_id)
            .cloned()
            .collect();
        follows.sort_by_key(|f| f.created_at);
        follows.into_iter().map(|f| f.feed_id).collect()
    }
}

fn fetch_order(a: &Feed, b: &Feed) -> Ordering {
    let by_fetch = match (a.last_fetched_at, b.last_fetched_at) {
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (x, y) => x.cmp(&y),
    };
    by_fetch.then_with(|| a.created_at.cmp(&b.created_at))
}

#[async_trait]
impl FeedStore for MemoryStore {
    async fn next_feeds_to_fetch(&self, limit: usize) -> StoreResult<Vec<Feed>> {
        let mut feeds = self.feeds.read().await.clone();
        feeds.sort_by(fetch_order);
        feeds.truncate(limit);
        Ok(feeds)
    }

    async fn mark_feed_fetched(&self, feed_id: Uuid, fetched_at: DateTime<Utc>) -> StoreResult<()> {
        let mut feeds = self.feeds.write().await;
        let feed = feeds
            .iter_mut()
            .find(|f| f.id == feed_id)
            .ok_or(StoreError::FeedNotFound { id: feed_id })?;
        feed.last_fetched_at = Some(fetched_at);
        feed.updated_at = fetched_at;
        Ok(())
    }

    async fn create_post(&self, post: NewPost) -> StoreResult<Post> {
        let mut posts = self.posts.write().await;
        if posts.iter().any(|p| p.url == post.url) {
            return Err(StoreError::DuplicateLink { link: post.url });
        }

        let now = Utc::now();
        let created = Post {
            id: Uuid::new_v4(),
            feed_id: post.feed_id,
            title: post.title,
            url: post.url,
            description: post.description,
            published_at: post.published_at,
            created_at: now,
            updated_at: now,
        };
        posts.push(created.clone());
        Ok(created)
    }

    async fn create_feed(&self, feed: NewFeed) -> StoreResult<Feed> {
        let now = Utc::now();
        let created = Feed {
            id: Uuid::new_v4(),
            name: feed.name,
            url: feed.url,
            user_id: feed.user_id,
            last_fetched_at: None,
            created_at: now,
            updated_at: now,
        };
        self.insert_feed(created.clone()).await?;
        Ok(created)
    }

    async fn list_feeds(&self) -> StoreResult<Vec<Feed>> {
        let mut feeds = self.feeds.read().await.clone();
        feeds.sort_by_key(|f| f.created_at);
        Ok(feeds)
    }

    async fn feed_by_url(&self, url: &str) -> StoreResult<Option<Feed>> {
        Ok(self.feeds.read().await.iter().find(|f| f.url == url).cloned())
    }

    async fn follow_feed(&self, user_id: Uuid, feed_id: Uuid) -> StoreResult<FeedFollow> {
        if self.feed(feed_id).await.is_none() {
            return Err(StoreError::FeedNotFound { id: feed_id });
        }

        let mut follows = self.follows.write().await;
        if follows.iter().any(|f| f.user_id == user_id && f.feed_id == feed_id) {
            return Err(StoreError::AlreadyFollowing { user_id, feed_id });
        }

        let now = Utc::now();
        let follow = FeedFollow {
            id: Uuid::new_v4(),
            user_id,
            feed_id,
            created_at: now,
            updated_at: now,
        };
        follows.push(follow.clone());
        Ok(follow)
    }

    async fn unfollow_feed(&self, user_id: Uuid, feed_id: Uuid) -> StoreResult<()> {
        let mut follows = self.follows.write().await;
        let before = follows.len();
        follows.retain(|f| !(f.user_id == user_id && f.feed_id == feed_id));
        if follows.len() == before {
            return Err(StoreError::NotFollowing { user_id, feed_id });
        }
        Ok(())
    }

    async fn followed_feeds(&self, user_id: Uuid) -> StoreResult<Vec<Feed>> {
        let feed_ids = self.followed_feed_ids(user_id).await;
        let feeds = self.feeds.read().await;
        Ok(feed_ids
            .iter()
            .filter_map(|id| feeds.iter().find(|f| f.id == *id).cloned())
            .collect())
    }

    async fn recent_posts(&self, user_id: Option<Uuid>, limit: usize) -> StoreResult<Vec<Post>> {
        let followed = match user_id {
            Some(user_id) => Some(self.followed_feed_ids(user_id).await),
            None => None,
        };

        let mut posts: Vec<Post> = self
            .posts
            .read()
            .await
            .iter()
            .filter(|p| followed.as_ref().map_or(true, |ids| ids.contains(&p.feed_id)))
            .cloned()
            .collect();

        // Newest publish time first, undated posts last, then newest created.
        posts.sort_by(|a, b| {
            let by_published = match (a.published_at, b.published_at) {
                (Some(x), Some(y)) => y.cmp(&x),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };
            by_published.then_with(|| b.created_at.cmp(&a.created_at))
        });
        posts.truncate(limit);
        Ok(posts)
    }
}
