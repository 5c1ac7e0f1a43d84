use crate::config::parse_interval;
use crate::fetcher::Fetcher;
use crate::ingest::PostIngester;
use crate::normalizer::normalize;
use crate::shutdown::Shutdown;
use crate::store::{FeedStore, StoreError};
use crate::types::{
    AggregatorError, Feed, FeedFollow, FeedReport, FetchConfig, IngestReport, NewFeed, Result,
    SchedulerConfig,
};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

/// Polls registered feeds and stores their new items as posts.
///
/// Each cycle takes the least recently fetched feed(s) from the store, stamps
/// them as fetched before any network I/O, then runs fetch, normalize and
/// ingest per feed. Failures stay local to the feed that caused them.
pub struct Aggregator {
    store: Arc<dyn FeedStore>,
    fetcher: Fetcher,
    ingester: PostIngester,
    config: SchedulerConfig,
}

impl Aggregator {
    pub fn new(
        store: Arc<dyn FeedStore>,
        fetch_config: FetchConfig,
        config: SchedulerConfig,
    ) -> Result<Self> {
        Ok(Self {
            ingester: PostIngester::new(store.clone()),
            fetcher: Fetcher::new(fetch_config)?,
            store,
            config,
        })
    }

    /// Registers a feed after checking that the URL serves a readable document.
    ///
    /// The registering user follows the new feed straight away.
    pub async fn add_feed(&self, name: &str, url: &str, user_id: Uuid) -> Result<Feed> {
        let parsed = Url::parse(url)?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.host().is_none() {
            return Err(AggregatorError::UnsupportedUrl { url: url.to_string() });
        }

        let doc = self.fetcher.fetch(url, &Shutdown::never()).await?;
        debug!("Feed {} looks valid ({} items)", url, doc.items.len());

        let feed = self
            .store
            .create_feed(NewFeed {
                name: name.to_string(),
                url: url.to_string(),
                user_id,
            })
            .await?;

        self.store.follow_feed(user_id, feed.id).await?;

        info!("Registered feed {} ({})", feed.name, feed.url);
        Ok(feed)
    }

    pub async fn follow_feed(&self, user_id: Uuid, url: &str) -> Result<FeedFollow> {
        let feed = self.registered_feed(url).await?;
        let follow = self.store.follow_feed(user_id, feed.id).await?;
        info!("User {} is now following {}", user_id, feed.name);
        Ok(follow)
    }

    pub async fn unfollow_feed(&self, user_id: Uuid, url: &str) -> Result<()> {
        let feed = self.registered_feed(url).await?;
        self.store.unfollow_feed(user_id, feed.id).await?;
        info!("User {} unfollowed {}", user_id, feed.name);
        Ok(())
    }

    async fn registered_feed(&self, url: &str) -> Result<Feed> {
        self.store
            .feed_by_url(url)
            .await?
            .ok_or_else(|| StoreError::FeedUrlNotFound { url: url.to_string() }.into())
    }

    /// Parses `interval` and runs the loop until `stop` fires.
    ///
    /// A bad interval is returned before anything is fetched.
    pub async fn run_every(&self, interval: &str, stop: Shutdown, abort: Shutdown) -> Result<()> {
        let interval = parse_interval(interval)?;
        self.run(interval, stop, abort).await;
        Ok(())
    }

    /// The first cycle starts immediately. Errors inside a cycle are logged and never end the loop.
    ///
    /// `stop` is only checked between cycles, so a fetch in flight when it
    /// fires still completes and is persisted. `abort` cancels in-flight fetches.
    pub async fn run(&self, interval: Duration, stop: Shutdown, abort: Shutdown) {
        info!("Collecting feeds every {}", humantime::format_duration(interval));

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut tick: u64 = 0;

        loop {
            tokio::select! {
                biased;
                _ = stop.wait() => break,
                _ = abort.wait() => break,
                _ = ticker.tick() => {}
            }

            tick += 1;
            debug!("Tick {}", tick);
            if let Err(e) = self.scrape_once(&abort).await {
                error!("Error getting next feed to fetch: {}", e);
            }
        }

        info!("Aggregator stopped after {} ticks", tick);
    }

    /// Runs a single fetch-normalize-persist cycle.
    ///
    /// Only a failure to select feeds is returned as an error; per-feed
    /// failures are reported in the returned [`FeedReport`]s.
    pub async fn scrape_once(&self, shutdown: &Shutdown) -> Result<Vec<FeedReport>> {
        let feeds = if self.config.feeds_per_tick <= 1 {
            self.store.next_feed_to_fetch().await?.into_iter().collect()
        } else {
            self.store.next_feeds_to_fetch(self.config.feeds_per_tick).await?
        };

        if feeds.is_empty() {
            info!("No feeds registered, nothing to fetch");
            return Ok(Vec::new());
        }

        // Stamp first so a hanging fetch cannot get the same feed picked again next tick.
        let fetched_at = Utc::now();
        for feed in &feeds {
            if let Err(e) = self.store.mark_feed_fetched(feed.id, fetched_at).await {
                warn!("Failed to mark feed {} as fetched: {}", feed.url, e);
            }
        }

        let reports = stream::iter(feeds)
            .map(|feed| self.scrape_feed(feed, shutdown))
            .buffered(self.config.max_concurrent_fetches.max(1))
            .collect::<Vec<_>>()
            .await;

        Ok(reports)
    }

    async fn scrape_feed(&self, feed: Feed, shutdown: &Shutdown) -> FeedReport {
        let outcome = self.fetch_and_ingest(&feed, shutdown).await;

        match &outcome {
            Ok(report) => info!(
                "Feed {}: {} items, {} saved, {} already known, {} failed",
                feed.url, report.items, report.saved, report.duplicates, report.failed
            ),
            Err(AggregatorError::Cancelled { .. }) => {
                info!("Fetch of {} cancelled by shutdown", feed.url)
            }
            Err(e) => error!(feed_url = %feed.url, "Error fetching feed: {}", e),
        }

        FeedReport {
            feed_id: feed.id,
            feed_url: feed.url,
            outcome,
        }
    }

    async fn fetch_and_ingest(&self, feed: &Feed, shutdown: &Shutdown) -> Result<IngestReport> {
        let doc = self.fetcher.fetch(&feed.url, shutdown).await?;
        let doc = normalize(doc, &feed.url);
        Ok(self.ingester.ingest(feed, &doc).await)
    }
}
