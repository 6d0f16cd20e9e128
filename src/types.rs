use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A subscribed syndication source. Many `Feed` rows may share one `url`:
/// each subscriber gets its own row, but fetch freshness is shared per URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feed {
    pub id: Uuid,
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub link: Option<String>,
    pub image_url: Option<String>,
    pub language: Option<String>,
    pub last_fetched: Option<DateTime<Utc>>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewFeed {
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
}

/// Canonical deduplicated article, keyed by `guid` across the whole corpus.
///
/// `feed_id` is the feed that first produced the article; `source_feed_ids`
/// is the append-only provenance multiset of every feed that has sighted it
/// since, duplicates included (the multiset length is the importance signal).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub guid: String,
    pub feed_id: Uuid,
    pub source_feed_ids: Vec<Uuid>,
    pub title: String,
    pub link: String,
    pub content: Option<String>,
    pub summary: Option<String>,
    pub author: Option<String>,
    pub categories: Vec<String>,
    pub image_url: Option<String>,
    pub published_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Feed-level metadata extracted by a successful parse, used to backfill the
/// owning `Feed` row on refresh.
#[derive(Debug, Clone, Default)]
pub struct ParsedFeedMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    pub link: Option<String>,
    pub image_url: Option<String>,
    pub language: Option<String>,
}

/// One normalized article awaiting persistence, tagged with the producing
/// feed and carrying its derived identity key.
#[derive(Debug, Clone)]
pub struct ParsedArticle {
    pub guid: String,
    pub feed_id: Uuid,
    pub title: String,
    pub link: String,
    pub content: Option<String>,
    pub summary: Option<String>,
    pub author: Option<String>,
    pub categories: Vec<String>,
    pub image_url: Option<String>,
    pub published_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct ParsedFeed {
    pub metadata: ParsedFeedMetadata,
    pub articles: Vec<ParsedArticle>,
}

/// Metadata patch applied to a feed after a successful refresh.
#[derive(Debug, Clone)]
pub struct FeedRefresh {
    pub fetched_at: DateTime<Utc>,
    pub metadata: ParsedFeedMetadata,
}

/// Outcome of a single article upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArticleUpsert {
    /// No row existed for the guid; a new canonical record was created.
    Created,
    /// A row already existed; the producing feed id was appended to its
    /// provenance multiset and all other fields were left untouched.
    Merged,
}

/// Aggregate counts for one batch of article upserts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub created: usize,
    pub skipped: usize,
    pub errored: usize,
}

impl MergeReport {
    pub fn total(&self) -> usize {
        self.created + self.skipped + self.errored
    }
}

/// Stale/fresh partition of a set of requested feeds.
#[derive(Debug, Clone, Default)]
pub struct FreshnessReport {
    pub stale: Vec<Uuid>,
    pub fresh: Vec<Uuid>,
}

/// Per-feed result of one orchestrated refresh pass. Failures carry the
/// captured error message instead of propagating.
#[derive(Debug, Clone)]
pub struct FeedRefreshOutcome {
    pub feed_id: Uuid,
    pub result: std::result::Result<MergeReport, String>,
}

#[derive(Debug, Clone, Default)]
pub struct RefreshReport {
    pub succeeded: usize,
    pub failed: usize,
    pub outcomes: Vec<FeedRefreshOutcome>,
}

impl RefreshReport {
    /// Feed ids whose refresh failed, with the captured cause.
    pub fn failures(&self) -> impl Iterator<Item = (Uuid, &str)> {
        self.outcomes.iter().filter_map(|outcome| {
            outcome
                .result
                .as_ref()
                .err()
                .map(|msg| (outcome.feed_id, msg.as_str()))
        })
    }
}

pub const DEFAULT_WINDOW_LIMIT: usize = 100;

/// Retrieval parameters: which feeds, which inclusive publish-date window,
/// and the result cap.
#[derive(Debug, Clone)]
pub struct WindowQuery {
    pub feed_ids: Vec<Uuid>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub limit: usize,
}

impl WindowQuery {
    pub fn new(feed_ids: Vec<Uuid>, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            feed_ids,
            start,
            end,
            limit: DEFAULT_WINDOW_LIMIT,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// An article augmented with its source-count importance score.
#[derive(Debug, Clone, Serialize)]
pub struct RankedArticle {
    pub article: Article,
    pub source_count: usize,
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub follow_redirects: bool,
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "newsletter-pipeline/1.0".to_string(),
            timeout_seconds: 10,
            follow_redirects: true,
            max_redirects: 5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// How long a fetch stays valid for every feed sharing the same URL.
    pub cache_window: Duration,
    /// Cap on the number of articles a windowed retrieval returns.
    pub max_articles: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cache_window: Duration::hours(3),
            max_articles: DEFAULT_WINDOW_LIMIT,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("feed parse error: {0}")]
    Parse(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("feed not found: {id}")]
    FeedNotFound { id: Uuid },

    #[error("feed is inactive: {id}")]
    InactiveFeed { id: Uuid },

    /// Unique-constraint violation on an article upsert. Stores surface this
    /// distinctly so the merger can classify the record as skipped rather
    /// than errored.
    #[error("duplicate key: {0}")]
    Conflict(String),

    #[error("store error during {op}: {message}")]
    Store { op: &'static str, message: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The requested window matched zero articles after refresh. Raised by
    /// the pipeline coordinator, not by retrieval itself.
    #[error("no articles published between {start} and {end} for the requested feeds")]
    EmptyWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("synthesis failed: {0}")]
    Synthesis(String),

    /// Plan/entitlement gating lives outside the core but is representable
    /// at the boundary.
    #[error("not entitled: {0}")]
    Entitlement(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Short machine-readable tag used by the event stream.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Http(_) => "http",
            PipelineError::Parse(_) => "parse",
            PipelineError::Database(_) => "database",
            PipelineError::InvalidUrl(_) => "invalid_url",
            PipelineError::FeedNotFound { .. } => "feed_not_found",
            PipelineError::InactiveFeed { .. } => "inactive_feed",
            PipelineError::Conflict(_) => "conflict",
            PipelineError::Store { .. } => "store",
            PipelineError::InvalidRequest(_) => "invalid_request",
            PipelineError::EmptyWindow { .. } => "empty_window",
            PipelineError::Synthesis(_) => "synthesis",
            PipelineError::Entitlement(_) => "entitlement",
            PipelineError::Serialization(_) => "serialization",
            PipelineError::Io(_) => "io",
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
