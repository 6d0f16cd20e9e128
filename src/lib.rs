pub mod types;
pub mod fetcher;
pub mod parser;
pub mod store;
pub mod freshness;
pub mod merger;
pub mod refresh;
pub mod retrieval;
pub mod synthesis;
pub mod pipeline;

pub use types::*;
pub use fetcher::{FetchDocument, HttpFetcher};
pub use parser::FeedParser;
pub use store::{MemoryStore, PgStore, Store};
pub use freshness::FreshnessClassifier;
pub use merger::merge_articles;
pub use refresh::RefreshOrchestrator;
pub use retrieval::retrieve;
pub use synthesis::{
    ArticleDigest, ContentSynthesizer, NewsletterContent, NewsletterDraft, SynthesisRequest,
    SynthesisStream, SynthesisUpdate, TemplateSynthesizer,
};
pub use pipeline::{GenerateRequest, NewsletterPipeline, PipelineEvent};
