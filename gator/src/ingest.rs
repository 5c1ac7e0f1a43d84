use crate::store::{FeedStore, StoreError};
use crate::timestamp;
use crate::types::{Feed, FeedDocument, IngestReport, NewPost};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Turns the items of a normalized document into posts.
///
/// Items are handled one at a time in source order. A link that is already
/// stored counts as a duplicate and is skipped silently; any other store error
/// is logged and skips only that item.
pub struct PostIngester {
    store: Arc<dyn FeedStore>,
}

impl PostIngester {
    pub fn new(store: Arc<dyn FeedStore>) -> Self {
        Self { store }
    }

    pub async fn ingest(&self, feed: &Feed, doc: &FeedDocument) -> IngestReport {
        let mut report = IngestReport {
            items: doc.items.len(),
            ..IngestReport::default()
        };

        for item in &doc.items {
            let link = item.link.trim();
            if link.is_empty() {
                warn!(feed_url = %feed.url, title = %item.title, "Skipping item without a link");
                report.failed += 1;
                continue;
            }

            let post = NewPost {
                feed_id: feed.id,
                title: item.title.clone(),
                url: link.to_string(),
                description: item.description.clone(),
                published_at: timestamp::resolve(&item.pub_date),
            };

            match self.store.create_post(post).await {
                Ok(saved) => {
                    info!("Saved: {}", saved.title);
                    report.saved += 1;
                }
                Err(StoreError::DuplicateLink { .. }) => {
                    report.duplicates += 1;
                }
                Err(e) => {
                    error!(
                        feed_url = %feed.url,
                        title = %item.title,
                        error = %e,
                        "Error creating post"
                    );
                    report.failed += 1;
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, StoreResult};
    use crate::types::{FeedFollow, FeedItem, NewFeed, Post};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use uuid::Uuid;

    fn item(title: &str, link: &str, pub_date: &str) -> FeedItem {
        FeedItem {
            title: title.to_string(),
            link: link.to_string(),
            description: format!("about {title}"),
            pub_date: pub_date.to_string(),
        }
    }

    async fn registered_feed(store: &MemoryStore) -> Feed {
        store
            .create_feed(NewFeed {
                name: "blog".to_string(),
                url: "https://blog.test/index.xml".to_string(),
                user_id: Uuid::new_v4(),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn saves_items_in_order_with_resolved_dates() {
        let store = Arc::new(MemoryStore::new());
        let feed = registered_feed(&store).await;
        let doc = FeedDocument {
            items: vec![
                item("first", "https://blog.test/1", "Sun, 08 Jan 2023 00:00:00 +0000"),
                item("second", "https://blog.test/2", "not a date"),
            ],
            ..FeedDocument::default()
        };

        let report = PostIngester::new(store.clone()).ingest(&feed, &doc).await;

        assert_eq!(report, IngestReport { items: 2, saved: 2, duplicates: 0, failed: 0 });
        let posts = store.posts().await;
        assert_eq!(posts[0].title, "first");
        assert!(posts[0].published_at.is_some());
        assert_eq!(posts[1].title, "second");
        assert!(posts[1].published_at.is_none());
    }

    #[tokio::test]
    async fn same_link_twice_persists_one_post() {
        let store = Arc::new(MemoryStore::new());
        let feed = registered_feed(&store).await;
        let doc = FeedDocument {
            items: vec![
                item("original", "https://blog.test/same", ""),
                item("repost", "https://blog.test/same", ""),
            ],
            ..FeedDocument::default()
        };
        let ingester = PostIngester::new(store.clone());

        let first = ingester.ingest(&feed, &doc).await;
        let second = ingester.ingest(&feed, &doc).await;

        assert_eq!(first.saved, 1);
        assert_eq!(first.duplicates, 1);
        assert_eq!(second.saved, 0);
        assert_eq!(second.duplicates, 2);
        assert_eq!(second.failed, 0);
        assert_eq!(store.posts().await.len(), 1);
    }

    #[tokio::test]
    async fn items_without_link_are_skipped() {
        let store = Arc::new(MemoryStore::new());
        let feed = registered_feed(&store).await;
        let doc = FeedDocument {
            items: vec![item("no link", "  ", ""), item("ok", "https://blog.test/ok", "")],
            ..FeedDocument::default()
        };

        let report = PostIngester::new(store.clone()).ingest(&feed, &doc).await;

        assert_eq!(report.failed, 1);
        assert_eq!(report.saved, 1);
    }

    /// Fails every insert whose link contains "broken".
    struct FlakyStore {
        inner: MemoryStore,
    }

    #[async_trait]
    impl FeedStore for FlakyStore {
        async fn next_feeds_to_fetch(&self, limit: usize) -> StoreResult<Vec<Feed>> {
            self.inner.next_feeds_to_fetch(limit).await
        }

        async fn mark_feed_fetched(&self, feed_id: Uuid, at: DateTime<Utc>) -> StoreResult<()> {
            self.inner.mark_feed_fetched(feed_id, at).await
        }

        async fn create_post(&self, post: NewPost) -> StoreResult<Post> {
            if post.url.contains("broken") {
                return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
            }
            self.inner.create_post(post).await
        }

        async fn create_feed(&self, feed: NewFeed) -> StoreResult<Feed> {
            self.inner.create_feed(feed).await
        }

        async fn list_feeds(&self) -> StoreResult<Vec<Feed>> {
            self.inner.list_feeds().await
        }

        async fn feed_by_url(&self, url: &str) -> StoreResult<Option<Feed>> {
            self.inner.feed_by_url(url).await
        }

        async fn follow_feed(&self, user_id: Uuid, feed_id: Uuid) -> StoreResult<FeedFollow> {
            self.inner.follow_feed(user_id, feed_id).await
        }

        async fn unfollow_feed(&self, user_id: Uuid, feed_id: Uuid) -> StoreResult<()> {
            self.inner.unfollow_feed(user_id, feed_id).await
        }

        async fn followed_feeds(&self, user_id: Uuid) -> StoreResult<Vec<Feed>> {
            self.inner.followed_feeds(user_id).await
        }

        async fn recent_posts(
            &self,
            user_id: Option<Uuid>,
            limit: usize,
        ) -> StoreResult<Vec<Post>> {
            self.inner.recent_posts(user_id, limit).await
        }
    }

    #[tokio::test]
    async fn store_failure_skips_only_that_item() {
        let store = Arc::new(FlakyStore { inner: MemoryStore::new() });
        let feed = registered_feed(&store.inner).await;
        let doc = FeedDocument {
            items: vec![
                item("a", "https://blog.test/a", ""),
                item("b", "https://blog.test/broken", ""),
                item("c", "https://blog.test/c", ""),
            ],
            ..FeedDocument::default()
        };

        let report = PostIngester::new(store.clone()).ingest(&feed, &doc).await;

        assert_eq!(report, IngestReport { items: 3, saved: 2, duplicates: 0, failed: 1 });
        let links: Vec<_> = store.inner.posts().await.into_iter().map(|p| p.url).collect();
        assert_eq!(links, ["https://blog.test/a", "https://blog.test/c"]);
    }
}
