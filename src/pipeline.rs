use crate::fetcher::FetchDocument;
use crate::freshness::FreshnessClassifier;
use crate::parser::{truncate_chars, FeedParser, SUMMARY_MAX_CHARS};
use crate::refresh::RefreshOrchestrator;
use crate::retrieval::retrieve;
use crate::store::Store;
use crate::synthesis::{
    ArticleDigest, ContentSynthesizer, NewsletterContent, NewsletterDraft, SynthesisRequest,
    SynthesisUpdate,
};
use crate::types::{
    Feed, FreshnessReport, NewFeed, PipelineConfig, PipelineError, RankedArticle, RefreshReport,
    Result, WindowQuery,
};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

/// One newsletter request: which feeds to draw from, the inclusive publish
/// window, and optional free-form instructions for synthesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub feed_ids: Vec<Uuid>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub instructions: Option<String>,
}

/// Lifecycle events streamed to the pipeline's caller, in fixed order:
/// zero-or-one `Refreshing`, one `Analyzing`, one `Metadata`, zero-or-more
/// `Partial`, then exactly one of `Complete` or `Error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PipelineEvent {
    Refreshing { stale: usize, fresh: usize },
    Analyzing { articles: usize },
    Metadata {
        articles: Vec<ArticleDigest>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    Partial { draft: NewsletterDraft },
    Complete { content: NewsletterContent },
    Error { kind: String, message: String },
}

/// Composes the whole assembly: freshness classification, concurrent refresh
/// of the stale subset, windowed retrieval, then content synthesis.
///
/// The parts are usable on their own; this type owns their wiring plus the
/// subscription-management facade the CLI and transport layer call into.
pub struct NewsletterPipeline {
    store: Arc<dyn Store>,
    fetcher: Arc<dyn FetchDocument>,
    synthesizer: Arc<dyn ContentSynthesizer>,
    classifier: FreshnessClassifier,
    orchestrator: RefreshOrchestrator,
    parser: FeedParser,
    config: PipelineConfig,
}

impl NewsletterPipeline {
    pub fn new(
        store: Arc<dyn Store>,
        fetcher: Arc<dyn FetchDocument>,
        synthesizer: Arc<dyn ContentSynthesizer>,
        config: PipelineConfig,
    ) -> Self {
        let classifier = FreshnessClassifier::new(config.cache_window);
        let orchestrator = RefreshOrchestrator::new(store.clone(), fetcher.clone());

        Self {
            store,
            fetcher,
            synthesizer,
            classifier,
            orchestrator,
            parser: FeedParser::new(),
            config,
        }
    }

    /// Subscribe to a feed URL. The URL must be well formed and prove
    /// fetchable and parseable before a row is created.
    pub async fn add_feed(&self, url: String, title: Option<String>) -> Result<Feed> {
        Url::parse(&url)?;
        if !self.validate_source_url(&url).await {
            return Err(PipelineError::InvalidRequest(format!(
                "URL is not a fetchable feed: {}",
                url
            )));
        }

        let feed = self
            .store
            .add_feed(NewFeed {
                url,
                title,
                description: None,
            })
            .await?;

        info!("Subscribed to feed {} ({})", feed.id, feed.url);
        Ok(feed)
    }

    pub async fn list_feeds(&self) -> Result<Vec<Feed>> {
        self.store.list_feeds().await
    }

    pub async fn set_feed_active(&self, id: Uuid, active: bool) -> Result<()> {
        self.store.set_feed_active(id, active).await
    }

    pub async fn remove_feed(&self, id: Uuid) -> Result<()> {
        self.store.remove_feed(id).await
    }

    /// Probe whether `url` serves a parseable feed document, bounded by the
    /// fetcher's timeout. Reports false on any failure instead of erroring.
    pub async fn validate_source_url(&self, url: &str) -> bool {
        match self.fetcher.fetch(url).await {
            Ok(document) => self.parser.parse(Uuid::nil(), &document).is_ok(),
            Err(error) => {
                debug!("URL validation failed for {}: {}", url, error);
                false
            }
        }
    }

    /// Classify the given feeds and refresh the stale subset, exactly as a
    /// scheduled pass would. Per-feed failures are captured in the report.
    pub async fn refresh(&self, feed_ids: &[Uuid]) -> Result<(FreshnessReport, RefreshReport)> {
        let freshness = self.classify(feed_ids).await?;
        let report = if freshness.stale.is_empty() {
            RefreshReport::default()
        } else {
            self.refresh_stale(&freshness).await
        };
        Ok((freshness, report))
    }

    /// Assemble the windowed article set: classify, refresh the stale
    /// subset, retrieve. Zero matches is an error at this level; retrieval
    /// alone stays neutral about empty windows.
    pub async fn assemble(&self, request: &GenerateRequest) -> Result<Vec<RankedArticle>> {
        self.validate(request)?;

        let freshness = self.classify(&request.feed_ids).await?;
        if !freshness.stale.is_empty() {
            self.refresh_stale(&freshness).await;
        }

        self.retrieve_window(request).await
    }

    /// Drive a request to completion and return the finished newsletter,
    /// without the event stream. Used by the CLI and tests.
    pub async fn generate(&self, request: &GenerateRequest) -> Result<NewsletterContent> {
        let articles = self.assemble(request).await?;
        let digests = self.digests(&articles).await?;

        let mut updates = self
            .synthesizer
            .synthesize(self.synthesis_request(request, digests))
            .await?;

        while let Some(update) = updates.next().await {
            if let SynthesisUpdate::Complete(content) = update? {
                return Ok(content);
            }
        }

        Err(PipelineError::Synthesis(
            "synthesizer stream ended without a complete newsletter".to_string(),
        ))
    }

    /// Run a request end to end, streaming lifecycle events. The returned
    /// stream always terminates with `Complete` or `Error`.
    pub fn run(self: Arc<Self>, request: GenerateRequest) -> UnboundedReceiverStream<PipelineEvent> {
        let (events, receiver) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            if let Err(failure) = self.drive(&request, &events).await {
                error!("Pipeline run failed: {}", failure);
                let _ = events.send(PipelineEvent::Error {
                    kind: failure.kind().to_string(),
                    message: failure.to_string(),
                });
            }
        });

        UnboundedReceiverStream::new(receiver)
    }

    async fn drive(
        &self,
        request: &GenerateRequest,
        events: &mpsc::UnboundedSender<PipelineEvent>,
    ) -> Result<()> {
        self.validate(request)?;

        let freshness = self.classify(&request.feed_ids).await?;
        if !freshness.stale.is_empty() {
            let _ = events.send(PipelineEvent::Refreshing {
                stale: freshness.stale.len(),
                fresh: freshness.fresh.len(),
            });
            self.refresh_stale(&freshness).await;
        }

        let articles = self.retrieve_window(request).await?;
        let _ = events.send(PipelineEvent::Analyzing {
            articles: articles.len(),
        });

        let digests = self.digests(&articles).await?;
        let _ = events.send(PipelineEvent::Metadata {
            articles: digests.clone(),
            start: request.start,
            end: request.end,
        });

        let mut updates = self
            .synthesizer
            .synthesize(self.synthesis_request(request, digests))
            .await?;

        while let Some(update) = updates.next().await {
            match update? {
                SynthesisUpdate::Partial(draft) => {
                    let _ = events.send(PipelineEvent::Partial { draft });
                }
                SynthesisUpdate::Complete(content) => {
                    let _ = events.send(PipelineEvent::Complete { content });
                    return Ok(());
                }
            }
        }

        Err(PipelineError::Synthesis(
            "synthesizer stream ended without a complete newsletter".to_string(),
        ))
    }

    fn validate(&self, request: &GenerateRequest) -> Result<()> {
        if request.feed_ids.is_empty() {
            return Err(PipelineError::InvalidRequest(
                "at least one feed id is required".to_string(),
            ));
        }
        if request.start > request.end {
            return Err(PipelineError::InvalidRequest(format!(
                "window start {} is after its end {}",
                request.start, request.end
            )));
        }
        Ok(())
    }

    async fn classify(&self, feed_ids: &[Uuid]) -> Result<FreshnessReport> {
        let freshness = self.classifier.classify(self.store.as_ref(), feed_ids).await?;
        info!(
            "Classified {} feeds: {} stale, {} fresh",
            feed_ids.len(),
            freshness.stale.len(),
            freshness.fresh.len()
        );
        Ok(freshness)
    }

    async fn refresh_stale(&self, freshness: &FreshnessReport) -> RefreshReport {
        let report = self.orchestrator.refresh_all(&freshness.stale).await;
        for (feed_id, message) in report.failures() {
            warn!("Continuing without feed {}: {}", feed_id, message);
        }
        report
    }

    async fn retrieve_window(&self, request: &GenerateRequest) -> Result<Vec<RankedArticle>> {
        let query = WindowQuery::new(request.feed_ids.clone(), request.start, request.end)
            .with_limit(self.config.max_articles);

        let articles = retrieve(self.store.as_ref(), &query).await?;
        if articles.is_empty() {
            return Err(PipelineError::EmptyWindow {
                start: request.start,
                end: request.end,
            });
        }
        Ok(articles)
    }

    /// Build the synthesis tuples, resolving each article's primary feed to
    /// a display name. A primary feed that has since been removed degrades
    /// to a placeholder name rather than failing the run.
    async fn digests(&self, articles: &[RankedArticle]) -> Result<Vec<ArticleDigest>> {
        let mut source_names: HashMap<Uuid, String> = HashMap::new();
        let mut digests = Vec::with_capacity(articles.len());

        for ranked in articles {
            let feed_id = ranked.article.feed_id;
            if !source_names.contains_key(&feed_id) {
                let name = match self.store.feed(feed_id).await {
                    Ok(feed) => feed.title.unwrap_or(feed.url),
                    Err(PipelineError::FeedNotFound { .. }) => "Unknown source".to_string(),
                    Err(error) => return Err(error),
                };
                source_names.insert(feed_id, name);
            }

            let excerpt = ranked
                .article
                .summary
                .clone()
                .or_else(|| {
                    ranked
                        .article
                        .content
                        .as_deref()
                        .map(|text| truncate_chars(text, SUMMARY_MAX_CHARS))
                })
                .unwrap_or_default();

            digests.push(ArticleDigest {
                title: ranked.article.title.clone(),
                source_name: source_names[&feed_id].clone(),
                published_at: ranked.article.published_at,
                excerpt,
                link: ranked.article.link.clone(),
            });
        }

        Ok(digests)
    }

    fn synthesis_request(
        &self,
        request: &GenerateRequest,
        digests: Vec<ArticleDigest>,
    ) -> SynthesisRequest {
        SynthesisRequest {
            articles: digests,
            instructions: request.instructions.clone(),
            start: request.start,
            end: request.end,
        }
    }
}
