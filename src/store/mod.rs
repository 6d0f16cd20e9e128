mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::types::{
    Article, ArticleUpsert, Feed, FeedRefresh, NewFeed, ParsedArticle, Result, WindowQuery,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Persistence boundary for the pipeline. The engine behind it is swappable;
/// the contract below is what the components rely on.
///
/// The one hard concurrency requirement is `upsert_article`: insert-or-append
/// must be atomic per guid. Two batches racing on the same guid must end with
/// one canonical row whose provenance multiset contains both appends, never a
/// lost update. Implementations serialize the operation or push it down to a
/// conditional atomic statement; a read-then-write is not acceptable here.
#[async_trait]
pub trait Store: Send + Sync {
    async fn add_feed(&self, feed: NewFeed) -> Result<Feed>;

    /// Point lookup; `FeedNotFound` if the id is unknown.
    async fn feed(&self, id: Uuid) -> Result<Feed>;

    async fn list_feeds(&self) -> Result<Vec<Feed>>;

    async fn set_feed_active(&self, id: Uuid, active: bool) -> Result<()>;

    /// Remove a feed. Cascades only to articles whose provenance multiset
    /// references no other feed; shared articles survive, and the removed id
    /// stays in their source sets as historical provenance.
    async fn remove_feed(&self, id: Uuid) -> Result<()>;

    /// Most recent `last_fetched` across **all** feeds sharing `url`, the
    /// basis of cross-tenant freshness sharing.
    async fn latest_fetch_for_url(&self, url: &str) -> Result<Option<DateTime<Utc>>>;

    /// Stamp a successful refresh: always advances `last_fetched`, and
    /// backfills metadata fields from the parse. A refresh that lost the race
    /// to a newer one is dropped whole; the newer data is already in place.
    async fn record_refresh(&self, feed_id: Uuid, refresh: FeedRefresh) -> Result<()>;

    /// Atomic insert-or-append keyed by guid. Absent: create the canonical
    /// row with `source_feed_ids = [feed_id]`. Present: append `feed_id` to
    /// the multiset and leave every other field untouched (first writer wins
    /// on content). The append is deliberately not set-deduplicated: a feed
    /// sighting the same guid twice appends twice and inflates the source
    /// count, as the importance signal is defined over the multiset.
    async fn upsert_article(&self, article: &ParsedArticle) -> Result<ArticleUpsert>;

    async fn article(&self, guid: &str) -> Result<Option<Article>>;

    /// Articles matched by primary feed or provenance overlap, publish date
    /// inclusive within the window, newest first, truncated to the limit.
    async fn articles_in_window(&self, query: &WindowQuery) -> Result<Vec<Article>>;
}
