#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use newsletter_pipeline::fetcher::FetchDocument;
use newsletter_pipeline::store::Store;
use newsletter_pipeline::types::{
    Feed, FeedRefresh, NewFeed, ParsedArticle, ParsedFeedMetadata, PipelineError, Result,
};
use std::collections::HashMap;
use std::io;
use tokio::sync::Mutex;
use uuid::Uuid;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .try_init();
}

/// Scripted document fetcher: serves a canned body or failure per URL and
/// records every URL it was asked for.
pub struct StubFetcher {
    responses: HashMap<String, StubResponse>,
    calls: Mutex<Vec<String>>,
}

enum StubResponse {
    Document(Vec<u8>),
    Failure(String),
}

impl StubFetcher {
    pub fn new() -> Self {
        Self {
            responses: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_document(mut self, url: &str, body: &str) -> Self {
        self.responses
            .insert(url.to_string(), StubResponse::Document(body.as_bytes().to_vec()));
        self
    }

    pub fn with_failure(mut self, url: &str, message: &str) -> Self {
        self.responses
            .insert(url.to_string(), StubResponse::Failure(message.to_string()));
        self
    }

    /// URLs fetched so far, in request order.
    pub async fn requested(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl FetchDocument for StubFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        self.calls.lock().await.push(url.to_string());

        match self.responses.get(url) {
            Some(StubResponse::Document(body)) => Ok(body.clone()),
            Some(StubResponse::Failure(message)) => Err(PipelineError::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                message.clone(),
            ))),
            None => Err(PipelineError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no scripted response for {}", url),
            ))),
        }
    }
}

/// Minimal RSS 2.0 document around pre-rendered `<item>` blocks.
pub fn rss_document(channel_title: &str, items: &[String]) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
<channel>
<title>{}</title>
<link>https://example.com</link>
<description>Fixture feed</description>
{}
</channel>
</rss>"#,
        channel_title,
        items.join("\n")
    )
}

pub fn rss_item(
    title: &str,
    link: &str,
    guid: Option<&str>,
    published_at: DateTime<Utc>,
) -> String {
    let guid_tag = guid
        .map(|value| format!("<guid isPermaLink=\"false\">{}</guid>", value))
        .unwrap_or_default();

    format!(
        "<item><title>{}</title><link>{}</link>{}<pubDate>{}</pubDate><description>Summary of {}</description></item>",
        title,
        link,
        guid_tag,
        published_at.to_rfc2822(),
        title
    )
}

pub async fn seed_feed(store: &dyn Store, url: &str) -> Feed {
    store
        .add_feed(NewFeed {
            url: url.to_string(),
            title: None,
            description: None,
        })
        .await
        .expect("seed feed")
}

pub async fn mark_fetched(store: &dyn Store, feed_id: Uuid, fetched_at: DateTime<Utc>) {
    store
        .record_refresh(
            feed_id,
            FeedRefresh {
                fetched_at,
                metadata: ParsedFeedMetadata::default(),
            },
        )
        .await
        .expect("stamp refresh");
}

/// Article factory for seeding stores directly.
pub fn parsed_article(
    guid: &str,
    feed_id: Uuid,
    title: &str,
    published_at: DateTime<Utc>,
) -> ParsedArticle {
    ParsedArticle {
        guid: guid.to_string(),
        feed_id,
        title: title.to_string(),
        link: format!("https://example.com/{}", guid),
        content: Some(format!("Full body of {}", title)),
        summary: Some(format!("Summary of {}", title)),
        author: None,
        categories: Vec::new(),
        image_url: None,
        published_at,
    }
}
