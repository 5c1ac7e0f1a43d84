use anyhow::Context;
use clap::{Parser, Subcommand};
use gator::{parse_interval, shutdown, Aggregator, AppConfig, FeedStore, PgFeedStore, Shutdown};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "gator", about = "Polls RSS feeds and stores their posts")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Poll feeds forever, one cycle every INTERVAL (e.g. 30s, 5m, 1h)
    Agg { interval: String },
    /// Run a single fetch cycle and exit
    Scrape,
    /// Register a feed after checking that it can be fetched
    Addfeed {
        name: String,
        url: String,
        #[arg(long, env = "GATOR_USER_ID")]
        user_id: Uuid,
    },
    /// Follow a registered feed by url
    Follow {
        url: String,
        #[arg(long, env = "GATOR_USER_ID")]
        user_id: Uuid,
    },
    /// Stop following a feed by url
    Unfollow {
        url: String,
        #[arg(long, env = "GATOR_USER_ID")]
        user_id: Uuid,
    },
    /// List the feeds a user follows
    Following {
        #[arg(long, env = "GATOR_USER_ID")]
        user_id: Uuid,
        #[arg(long)]
        json: bool,
    },
    /// List registered feeds
    Feeds {
        #[arg(long)]
        json: bool,
    },
    /// Show the most recent posts, from followed feeds when a user is given
    Browse {
        #[arg(long, default_value_t = 2)]
        limit: usize,
        #[arg(long, env = "GATOR_USER_ID")]
        user_id: Option<Uuid>,
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;

    // Startup errors surface before the database is touched.
    let interval = match &cli.command {
        Command::Agg { interval } => Some(parse_interval(interval)?),
        _ => None,
    };

    let store = PgFeedStore::new(&config.database_url)
        .await
        .with_context(|| format!("failed to connect to {}", redact(&config.database_url)))?;
    store.setup_schema().await?;
    let store: Arc<dyn FeedStore> = Arc::new(store);

    let aggregator = Aggregator::new(store.clone(), config.fetch, config.scheduler)?;

    match cli.command {
        Command::Agg { .. } => {
            let interval = interval.context("interval was not parsed")?;
            let (stop_trigger, stop) = shutdown::channel();
            let (abort_trigger, abort) = shutdown::channel();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Shutdown signal received, finishing the current cycle");
                    stop_trigger.trigger();
                }
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Second shutdown signal received, aborting in-flight fetches");
                    abort_trigger.trigger();
                }
            });
            aggregator.run(interval, stop, abort).await;
        }
        Command::Scrape => {
            let reports = aggregator.scrape_once(&Shutdown::never()).await?;
            for report in reports {
                match report.outcome {
                    Ok(ingest) => println!(
                        "{}: {} saved, {} already known, {} failed",
                        report.feed_url, ingest.saved, ingest.duplicates, ingest.failed
                    ),
                    Err(e) => println!("{}: {}", report.feed_url, e),
                }
            }
        }
        Command::Addfeed { name, url, user_id } => {
            let feed = aggregator.add_feed(&name, &url, user_id).await?;
            println!("Added to feeds:");
            println!("  id:      {}", feed.id);
            println!("  name:    {}", feed.name);
            println!("  url:     {}", feed.url);
            println!("  user_id: {}", feed.user_id);
        }
        Command::Follow { url, user_id } => {
            let follow = aggregator.follow_feed(user_id, &url).await?;
            println!("User {} is now following {}", follow.user_id, url);
        }
        Command::Unfollow { url, user_id } => {
            aggregator.unfollow_feed(user_id, &url).await?;
            println!("User {} no longer follows {}", user_id, url);
        }
        Command::Following { user_id, json } => {
            let feeds = store.followed_feeds(user_id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&feeds)?);
            } else {
                println!("User {} is following:", user_id);
                for feed in feeds {
                    println!("  * {}", feed.name);
                }
            }
        }
        Command::Feeds { json } => {
            let feeds = store.list_feeds().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&feeds)?);
            } else {
                for feed in feeds {
                    let last = feed
                        .last_fetched_at
                        .map(|t| t.to_rfc2822())
                        .unwrap_or_else(|| "never".to_string());
                    println!(
                        "* {} <{}> (owner {}, last fetched {})",
                        feed.name, feed.url, feed.user_id, last
                    );
                }
            }
        }
        Command::Browse { limit, user_id, json } => {
            let posts = store.recent_posts(user_id, limit).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&posts)?);
            } else {
                for post in posts {
                    println!("{}", post.title);
                    println!("{}", post.url);
                    if let Some(published) = post.published_at {
                        println!("{}", published.to_rfc2822());
                    }
                    println!();
                    println!("{}", post.description);
                    println!();
                }
            }
        }
    }

    Ok(())
}

/// Hides the password part of a connection string in logs.
fn redact(database_url: &str) -> String {
    match url::Url::parse(database_url) {
        Ok(mut parsed) if parsed.password().is_some() => match parsed.set_password(Some("***")) {
            Ok(()) => parsed.to_string(),
            Err(()) => "<redacted>".to_string(),
        },
        _ => database_url.to_string(),
    }
}
