use crate::parser::parse_feed;
use crate::shutdown::Shutdown;
use crate::types::{AggregatorError, FeedDocument, FetchConfig, Result};
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, info};

const BYTES_PER_MB: usize = 1024 * 1024;

pub struct Fetcher {
    client: Client,
    config: FetchConfig,
}

impl Fetcher {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .build()?;

        Ok(Self { client, config })
    }

    /// Fetches and decodes one feed.
    ///
    /// Returns [`AggregatorError::Cancelled`] as soon as `shutdown` fires,
    /// even mid-request.
    pub async fn fetch(&self, url: &str, shutdown: &Shutdown) -> Result<FeedDocument> {
        tokio::select! {
            biased;
            _ = shutdown.wait() => Err(AggregatorError::Cancelled { url: url.to_string() }),
            result = self.fetch_document(url) => result,
        }
    }

    async fn fetch_document(&self, url: &str) -> Result<FeedDocument> {
        let start_time = Instant::now();
        debug!("Fetching feed: {}", url);

        let mut response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AggregatorError::BadStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let limit = self.config.max_feed_size_mb * BYTES_PER_MB;
        if let Some(content_length) = response.content_length() {
            if content_length as usize > limit {
                return Err(AggregatorError::FeedTooLarge {
                    size_mb: content_length as usize / BYTES_PER_MB,
                });
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            body.extend_from_slice(&chunk);
            if body.len() > limit {
                return Err(AggregatorError::FeedTooLarge {
                    size_mb: body.len() / BYTES_PER_MB,
                });
            }
        }

        info!(
            "Fetched feed: {} ({} bytes in {}ms)",
            url,
            body.len(),
            start_time.elapsed().as_millis()
        );

        parse_feed(&body)
    }
}
