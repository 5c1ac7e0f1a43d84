pub mod types;
pub mod store;
pub mod parser;
pub mod normalizer;
pub mod timestamp;
pub mod fetcher;
pub mod ingest;
pub mod shutdown;
pub mod config;
pub mod aggregator;

pub use types::*;
pub use store::{FeedStore, MemoryStore, PgFeedStore, StoreError};
pub use fetcher::Fetcher;
pub use normalizer::normalize;
pub use ingest::PostIngester;
pub use shutdown::{Shutdown, ShutdownTrigger};
pub use config::{parse_interval, AppConfig};
pub use aggregator::Aggregator;
