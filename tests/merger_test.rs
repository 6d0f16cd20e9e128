mod common;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{init_tracing, parsed_article, seed_feed};
use newsletter_pipeline::merger::merge_articles;
use newsletter_pipeline::store::{MemoryStore, Store};
use newsletter_pipeline::types::{
    Article, ArticleUpsert, Feed, FeedRefresh, NewFeed, ParsedArticle, PipelineError, Result,
    WindowQuery,
};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

#[tokio::test]
async fn new_articles_are_created() {
    init_tracing();
    let store = MemoryStore::new();
    let feed = seed_feed(&store, "https://example.com/feed.xml").await;

    let articles = vec![
        parsed_article("urn:a", feed.id, "First", Utc::now()),
        parsed_article("urn:b", feed.id, "Second", Utc::now()),
    ];

    let report = merge_articles(&store, &articles).await;

    assert_eq!(report.created, 2);
    assert_eq!(report.skipped, 0);
    assert_eq!(report.errored, 0);
}

#[tokio::test]
async fn resighted_guid_appends_provenance_without_dedup() {
    init_tracing();
    let store = MemoryStore::new();
    let first = seed_feed(&store, "https://example.com/one.xml").await;
    let second = seed_feed(&store, "https://example.com/two.xml").await;

    let from_first = parsed_article("urn:shared", first.id, "Shared story", Utc::now());
    let from_second = parsed_article("urn:shared", second.id, "Shared story", Utc::now());

    let report = merge_articles(&store, &[from_first.clone()]).await;
    assert_eq!(report.created, 1);

    let report = merge_articles(&store, &[from_second]).await;
    assert_eq!(report.skipped, 1, "a known guid merges instead of creating");

    // The same feed re-sighting the story appends again; the source list is
    // a multiset, not a set.
    let report = merge_articles(&store, &[from_first]).await;
    assert_eq!(report.skipped, 1);

    let article = store.article("urn:shared").await.expect("lookup").expect("row");
    assert_eq!(article.source_feed_ids, vec![first.id, second.id, first.id]);

    let window = WindowQuery::new(
        vec![first.id, second.id],
        Utc::now() - chrono::Duration::hours(1),
        Utc::now() + chrono::Duration::hours(1),
    );
    let rows = store.articles_in_window(&window).await.expect("window");
    assert_eq!(rows.len(), 1, "three sightings still make one canonical row");
}

#[tokio::test]
async fn first_writer_owns_the_content() {
    let store = MemoryStore::new();
    let first = seed_feed(&store, "https://example.com/one.xml").await;
    let second = seed_feed(&store, "https://example.com/two.xml").await;

    let original = parsed_article("urn:story", first.id, "Original headline", Utc::now());
    let mut rival = parsed_article("urn:story", second.id, "Rewritten headline", Utc::now());
    rival.content = Some("Different body".to_string());

    merge_articles(&store, &[original]).await;
    merge_articles(&store, &[rival]).await;

    let article = store.article("urn:story").await.expect("lookup").expect("row");
    assert_eq!(article.title, "Original headline");
    assert_eq!(article.feed_id, first.id, "the primary feed never changes");
    assert_eq!(
        article.content.as_deref(),
        Some("Full body of Original headline")
    );
}

/// Store wrapper that fails upserts for scripted guids and delegates the
/// rest to an in-memory store.
struct ScriptedStore {
    inner: MemoryStore,
    failures: HashMap<String, ScriptedFailure>,
}

enum ScriptedFailure {
    Conflict,
    Backend,
}

#[async_trait]
impl Store for ScriptedStore {
    async fn add_feed(&self, feed: NewFeed) -> Result<Feed> {
        self.inner.add_feed(feed).await
    }

    async fn feed(&self, id: Uuid) -> Result<Feed> {
        self.inner.feed(id).await
    }

    async fn list_feeds(&self) -> Result<Vec<Feed>> {
        self.inner.list_feeds().await
    }

    async fn set_feed_active(&self, id: Uuid, active: bool) -> Result<()> {
        self.inner.set_feed_active(id, active).await
    }

    async fn remove_feed(&self, id: Uuid) -> Result<()> {
        self.inner.remove_feed(id).await
    }

    async fn latest_fetch_for_url(&self, url: &str) -> Result<Option<DateTime<Utc>>> {
        self.inner.latest_fetch_for_url(url).await
    }

    async fn record_refresh(&self, feed_id: Uuid, refresh: FeedRefresh) -> Result<()> {
        self.inner.record_refresh(feed_id, refresh).await
    }

    async fn upsert_article(&self, article: &ParsedArticle) -> Result<ArticleUpsert> {
        match self.failures.get(&article.guid) {
            Some(ScriptedFailure::Conflict) => Err(PipelineError::Conflict(format!(
                "duplicate key value on {}",
                article.guid
            ))),
            Some(ScriptedFailure::Backend) => Err(PipelineError::Store {
                op: "upsert_article",
                message: "connection reset by peer".to_string(),
            }),
            None => self.inner.upsert_article(article).await,
        }
    }

    async fn article(&self, guid: &str) -> Result<Option<Article>> {
        self.inner.article(guid).await
    }

    async fn articles_in_window(&self, query: &WindowQuery) -> Result<Vec<Article>> {
        self.inner.articles_in_window(query).await
    }
}

#[tokio::test]
async fn failures_are_counted_and_never_abort_the_batch() {
    init_tracing();
    let feed_id = Uuid::new_v4();

    let mut failures = HashMap::new();
    failures.insert("urn:raced".to_string(), ScriptedFailure::Conflict);
    failures.insert("urn:broken".to_string(), ScriptedFailure::Backend);
    let store = ScriptedStore {
        inner: MemoryStore::new(),
        failures,
    };

    let articles = vec![
        parsed_article("urn:raced", feed_id, "Raced", Utc::now()),
        parsed_article("urn:broken", feed_id, "Broken", Utc::now()),
        parsed_article("urn:fine", feed_id, "Fine", Utc::now()),
    ];

    let report = merge_articles(&store, &articles).await;

    assert_eq!(report.created, 1, "the good record still lands");
    assert_eq!(report.skipped, 1, "a duplicate-key race counts as skipped");
    assert_eq!(report.errored, 1);
    assert!(store.article("urn:fine").await.expect("lookup").is_some());
}

#[tokio::test]
async fn concurrent_same_guid_upserts_make_one_row() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let feed_ids: Vec<Uuid> = (0..16).map(|_| Uuid::new_v4()).collect();

    let mut handles = Vec::new();
    for feed_id in &feed_ids {
        let store = Arc::clone(&store);
        let article = parsed_article("urn:hot", *feed_id, "Hot story", Utc::now());
        handles.push(tokio::spawn(async move {
            store.upsert_article(&article).await
        }));
    }

    let mut created = 0;
    for handle in handles {
        match handle.await.expect("join") {
            Ok(ArticleUpsert::Created) => created += 1,
            Ok(ArticleUpsert::Merged) => {}
            Err(error) => panic!("unexpected upsert failure: {}", error),
        }
    }

    assert_eq!(created, 1, "exactly one writer wins the canonical row");

    let article = store.article("urn:hot").await.expect("lookup").expect("row");
    assert_eq!(article.source_feed_ids.len(), 16);
    for feed_id in &feed_ids {
        assert!(article.source_feed_ids.contains(feed_id));
    }
}

#[tokio::test]
async fn removing_a_feed_cascades_only_sole_subscriber_articles() {
    let store = MemoryStore::new();
    let doomed = seed_feed(&store, "https://example.com/doomed.xml").await;
    let survivor = seed_feed(&store, "https://example.com/survivor.xml").await;

    merge_articles(
        &store,
        &[
            parsed_article("urn:solo", doomed.id, "Solo", Utc::now()),
            parsed_article("urn:shared", doomed.id, "Shared", Utc::now()),
        ],
    )
    .await;
    merge_articles(
        &store,
        &[parsed_article("urn:shared", survivor.id, "Shared", Utc::now())],
    )
    .await;

    store.remove_feed(doomed.id).await.expect("remove");

    assert!(matches!(
        store.feed(doomed.id).await,
        Err(PipelineError::FeedNotFound { .. })
    ));
    assert!(
        store.article("urn:solo").await.expect("lookup").is_none(),
        "an article only the removed feed carried goes with it"
    );

    let shared = store.article("urn:shared").await.expect("lookup").expect("row");
    assert_eq!(
        shared.source_feed_ids,
        vec![doomed.id, survivor.id],
        "provenance keeps the removed feed as history"
    );
}
