use super::{FeedStore, StoreError, StoreResult};
use crate::types::{Feed, FeedFollow, NewFeed, NewPost, Post};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Pool, Postgres};
use tracing::{debug, info};
use uuid::Uuid;

const FEED_COLUMNS: &str = "id, name, url, user_id, last_fetched_at, created_at, updated_at";
const FOLLOW_COLUMNS: &str = "id, user_id, feed_id, created_at, updated_at";
const POST_COLUMNS: &str =
    "id, feed_id, title, url, description, published_at, created_at, updated_at";

pub struct PgFeedStore {
    db: Pool<Postgres>,
}

impl PgFeedStore {
    pub async fn new(database_url: &str) -> StoreResult<Self> {
        let db = PgPool::connect(database_url).await?;
        Ok(Self { db })
    }

    pub fn from_pool(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn setup_schema(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS feeds (
                id UUID PRIMARY KEY,
                name TEXT NOT NULL,
                url TEXT NOT NULL UNIQUE,
                user_id UUID NOT NULL,
                last_fetched_at TIMESTAMP WITH TIME ZONE,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL,
                updated_at TIMESTAMP WITH TIME ZONE NOT NULL
            )
            "#,
        )
        .execute(&self.db)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS posts (
                id UUID PRIMARY KEY,
                feed_id UUID NOT NULL REFERENCES feeds(id) ON DELETE CASCADE,
                title TEXT NOT NULL,
                url TEXT NOT NULL UNIQUE,
                description TEXT NOT NULL,
                published_at TIMESTAMP WITH TIME ZONE,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL,
                updated_at TIMESTAMP WITH TIME ZONE NOT NULL
            )
            "#,
        )
        .execute(&self.db)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS feed_follows (
                id UUID PRIMARY KEY,
                user_id UUID NOT NULL,
                feed_id UUID NOT NULL REFERENCES feeds(id) ON DELETE CASCADE,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL,
                updated_at TIMESTAMP WITH TIME ZONE NOT NULL,
                UNIQUE (user_id, feed_id)
            )
            "#,
        )
        .execute(&self.db)
        .await?;

        debug!("Feed schema ready");
        Ok(())
    }
}

/// SQLSTATE 23505. Anything else stays a database error.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation())
}

#[async_trait]
impl FeedStore for PgFeedStore {
    async fn next_feeds_to_fetch(&self, limit: usize) -> StoreResult<Vec<Feed>> {
        let feeds = sqlx::query_as::<_, Feed>(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds
             ORDER BY last_fetched_at ASC NULLS FIRST, created_at ASC
             LIMIT $1"
        ))
        .bind(limit as i64)
        .fetch_all(&self.db)
        .await?;

        Ok(feeds)
    }

    async fn mark_feed_fetched(&self, feed_id: Uuid, fetched_at: DateTime<Utc>) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE feeds SET last_fetched_at = $1, updated_at = $1 WHERE id = $2",
        )
        .bind(fetched_at)
        .bind(feed_id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::FeedNotFound { id: feed_id });
        }
        Ok(())
    }

    async fn create_post(&self, post: NewPost) -> StoreResult<Post> {
        let now = Utc::now();

        sqlx::query_as::<_, Post>(&format!(
            "INSERT INTO posts ({POST_COLUMNS})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
             RETURNING {POST_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(post.feed_id)
        .bind(&post.title)
        .bind(&post.url)
        .bind(&post.description)
        .bind(post.published_at)
        .bind(now)
        .fetch_one(&self.db)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::DuplicateLink { link: post.url.clone() }
            } else {
                StoreError::Database(e)
            }
        })
    }

    async fn create_feed(&self, feed: NewFeed) -> StoreResult<Feed> {
        let now = Utc::now();

        let created = sqlx::query_as::<_, Feed>(&format!(
            "INSERT INTO feeds ({FEED_COLUMNS})
             VALUES ($1, $2, $3, $4, NULL, $5, $5)
             RETURNING {FEED_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&feed.name)
        .bind(&feed.url)
        .bind(feed.user_id)
        .bind(now)
        .fetch_one(&self.db)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::DuplicateFeedUrl { url: feed.url.clone() }
            } else {
                StoreError::Database(e)
            }
        })?;

        info!("Added new feed: {} with ID: {}", created.url, created.id);
        Ok(created)
    }

    async fn list_feeds(&self) -> StoreResult<Vec<Feed>> {
        let feeds = sqlx::query_as::<_, Feed>(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds ORDER BY created_at"
        ))
        .fetch_all(&self.db)
        .await?;

        Ok(feeds)
    }

    async fn feed_by_url(&self, url: &str) -> StoreResult<Option<Feed>> {
        let feed = sqlx::query_as::<_, Feed>(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds WHERE url = $1"
        ))
        .bind(url)
        .fetch_optional(&self.db)
        .await?;

        Ok(feed)
    }

    async fn follow_feed(&self, user_id: Uuid, feed_id: Uuid) -> StoreResult<FeedFollow> {
        let now = Utc::now();

        sqlx::query_as::<_, FeedFollow>(&format!(
            "INSERT INTO feed_follows ({FOLLOW_COLUMNS})
             VALUES ($1, $2, $3, $4, $4)
             RETURNING {FOLLOW_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(feed_id)
        .bind(now)
        .fetch_one(&self.db)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::AlreadyFollowing { user_id, feed_id }
            } else if is_foreign_key_violation(&e) {
                StoreError::FeedNotFound { id: feed_id }
            } else {
                StoreError::Database(e)
            }
        })
    }

    async fn unfollow_feed(&self, user_id: Uuid, feed_id: Uuid) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM feed_follows WHERE user_id = $1 AND feed_id = $2")
            .bind(user_id)
            .bind(feed_id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFollowing { user_id, feed_id });
        }
        Ok(())
    }

    async fn followed_feeds(&self, user_id: Uuid) -> StoreResult<Vec<Feed>> {
        let feeds = sqlx::query_as::<_, Feed>(
            r#"
            SELECT f.id, f.name, f.url, f.user_id, f.last_fetched_at, f.created_at, f.updated_at
            FROM feed_follows ff
            JOIN feeds f ON f.id = ff.feed_id
            WHERE ff.user_id = $1
            ORDER BY ff.created_at
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;

        Ok(feeds)
    }

    async fn recent_posts(&self, user_id: Option<Uuid>, limit: usize) -> StoreResult<Vec<Post>> {
        let posts = sqlx::query_as::<_, Post>(
            r#"
            SELECT p.id, p.feed_id, p.title, p.url, p.description, p.published_at,
                   p.created_at, p.updated_at
            FROM posts p
            WHERE $1::uuid IS NULL
               OR p.feed_id IN (SELECT feed_id FROM feed_follows WHERE user_id = $1)
            ORDER BY p.published_at DESC NULLS LAST, p.created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.db)
        .await?;

        Ok(posts)
    }
}
