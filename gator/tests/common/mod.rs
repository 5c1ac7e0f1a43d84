#![allow(dead_code)]

use chrono::{DateTime, Utc};
use gator::{Feed, FetchConfig, MemoryStore};
use std::sync::{Arc, Mutex, Once};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

static INIT: Once = Once::new();

pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Collects the messages of error-level events seen by a subscriber.
#[derive(Clone, Default)]
pub struct ErrorCapture {
    messages: Arc<Mutex<Vec<String>>>,
}

impl ErrorCapture {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl<S: Subscriber> Layer<S> for ErrorCapture {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() != Level::ERROR {
            return;
        }
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        self.messages.lock().unwrap().push(visitor.0);
    }
}

#[derive(Default)]
struct MessageVisitor(String);

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{value:?}");
        }
    }
}

pub fn test_fetch_config() -> FetchConfig {
    FetchConfig {
        user_agent: "gator".to_string(),
        timeout_seconds: 5,
        max_feed_size_mb: 1,
    }
}

/// Builds an RSS 2.0 document. Items are `(title, link, pubDate)`.
pub fn rss_body(title: &str, link: &str, items: &[(&str, &str, &str)]) -> String {
    let items: String = items
        .iter()
        .map(|(title, link, pub_date)| {
            format!(
                "<item><title>{title}</title><link>{link}</link>\
                 <description>about {title}</description><pubDate>{pub_date}</pubDate></item>"
            )
        })
        .collect();

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel><title>{title}</title><link>{link}</link>
<description>test feed</description>{items}</channel></rss>"#
    )
}

pub async fn mount_feed(server: &MockServer, route: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/rss+xml")
                .set_body_string(body),
        )
        .mount(server)
        .await;
}

pub async fn mount_status(server: &MockServer, route: &str, status: u16) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

/// Inserts a feed straight into the store with a chosen last fetch time.
pub async fn seed_feed(
    store: &MemoryStore,
    name: &str,
    url: String,
    last_fetched_at: Option<DateTime<Utc>>,
) -> Feed {
    let now = Utc::now();
    let feed = Feed {
        id: Uuid::new_v4(),
        name: name.to_string(),
        url,
        user_id: Uuid::new_v4(),
        last_fetched_at,
        created_at: now,
        updated_at: now,
    };
    store.insert_feed(feed.clone()).await.unwrap();
    feed
}
