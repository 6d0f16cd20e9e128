use super::Store;
use crate::types::{
    Article, ArticleUpsert, Feed, FeedRefresh, NewFeed, ParsedArticle, PipelineError, Result,
    WindowQuery,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

/// In-process store used by tests and demos. A single mutex around the maps
/// serializes every write, which makes the per-guid upsert trivially atomic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    feeds: HashMap<Uuid, Feed>,
    articles: HashMap<String, Article>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn add_feed(&self, feed: NewFeed) -> Result<Feed> {
        let record = Feed {
            id: Uuid::new_v4(),
            url: feed.url,
            title: feed.title,
            description: feed.description,
            link: None,
            image_url: None,
            language: None,
            last_fetched: None,
            active: true,
            created_at: Utc::now(),
        };

        let mut inner = self.inner.lock().await;
        inner.feeds.insert(record.id, record.clone());

        info!("Added feed: {} with ID: {}", record.url, record.id);
        Ok(record)
    }

    async fn feed(&self, id: Uuid) -> Result<Feed> {
        let inner = self.inner.lock().await;
        inner
            .feeds
            .get(&id)
            .cloned()
            .ok_or(PipelineError::FeedNotFound { id })
    }

    async fn list_feeds(&self) -> Result<Vec<Feed>> {
        let inner = self.inner.lock().await;
        let mut feeds: Vec<Feed> = inner.feeds.values().cloned().collect();
        feeds.sort_by_key(|feed| feed.created_at);
        Ok(feeds)
    }

    async fn set_feed_active(&self, id: Uuid, active: bool) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let feed = inner
            .feeds
            .get_mut(&id)
            .ok_or(PipelineError::FeedNotFound { id })?;
        feed.active = active;
        Ok(())
    }

    async fn remove_feed(&self, id: Uuid) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.feeds.remove(&id).is_none() {
            return Err(PipelineError::FeedNotFound { id });
        }

        // Drop only articles no other feed has ever sighted.
        inner
            .articles
            .retain(|_, article| article.source_feed_ids.iter().any(|sid| *sid != id));

        Ok(())
    }

    async fn latest_fetch_for_url(&self, url: &str) -> Result<Option<DateTime<Utc>>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .feeds
            .values()
            .filter(|feed| feed.url == url)
            .filter_map(|feed| feed.last_fetched)
            .max())
    }

    async fn record_refresh(&self, feed_id: Uuid, refresh: FeedRefresh) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let feed = inner
            .feeds
            .get_mut(&feed_id)
            .ok_or(PipelineError::FeedNotFound { id: feed_id })?;

        if let Some(current) = feed.last_fetched {
            if current >= refresh.fetched_at {
                debug!("Refresh for feed {} raced by a newer one, dropping", feed_id);
                return Ok(());
            }
        }

        feed.last_fetched = Some(refresh.fetched_at);
        let metadata = refresh.metadata;
        if metadata.title.is_some() {
            feed.title = metadata.title;
        }
        if metadata.description.is_some() {
            feed.description = metadata.description;
        }
        if metadata.link.is_some() {
            feed.link = metadata.link;
        }
        if metadata.image_url.is_some() {
            feed.image_url = metadata.image_url;
        }
        if metadata.language.is_some() {
            feed.language = metadata.language;
        }

        Ok(())
    }

    async fn upsert_article(&self, article: &ParsedArticle) -> Result<ArticleUpsert> {
        let mut inner = self.inner.lock().await;

        match inner.articles.entry(article.guid.clone()) {
            Entry::Occupied(mut existing) => {
                existing.get_mut().source_feed_ids.push(article.feed_id);
                Ok(ArticleUpsert::Merged)
            }
            Entry::Vacant(slot) => {
                slot.insert(Article {
                    guid: article.guid.clone(),
                    feed_id: article.feed_id,
                    source_feed_ids: vec![article.feed_id],
                    title: article.title.clone(),
                    link: article.link.clone(),
                    content: article.content.clone(),
                    summary: article.summary.clone(),
                    author: article.author.clone(),
                    categories: article.categories.clone(),
                    image_url: article.image_url.clone(),
                    published_at: article.published_at,
                    created_at: Utc::now(),
                });
                Ok(ArticleUpsert::Created)
            }
        }
    }

    async fn article(&self, guid: &str) -> Result<Option<Article>> {
        let inner = self.inner.lock().await;
        Ok(inner.articles.get(guid).cloned())
    }

    async fn articles_in_window(&self, query: &WindowQuery) -> Result<Vec<Article>> {
        let inner = self.inner.lock().await;

        let mut matched: Vec<Article> = inner
            .articles
            .values()
            .filter(|article| {
                let requested = query.feed_ids.contains(&article.feed_id)
                    || article
                        .source_feed_ids
                        .iter()
                        .any(|sid| query.feed_ids.contains(sid));
                requested
                    && article.published_at >= query.start
                    && article.published_at <= query.end
            })
            .cloned()
            .collect();

        matched.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        matched.truncate(query.limit);

        Ok(matched)
    }
}
