use crate::fetcher::FetchDocument;
use crate::merger::merge_articles;
use crate::parser::FeedParser;
use crate::store::Store;
use crate::types::{FeedRefresh, FeedRefreshOutcome, MergeReport, PipelineError, RefreshReport, Result};
use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

/// Refreshes a set of stale feeds concurrently.
///
/// Every feed gets its own future; the pass joins on settled outcomes, so
/// one feed failing (network, parse, inactive) never aborts its siblings.
/// Failures are captured per feed and summarized, and nothing is retried
/// inside a pass — the next staleness check is the only retry mechanism.
pub struct RefreshOrchestrator {
    store: Arc<dyn Store>,
    fetcher: Arc<dyn FetchDocument>,
    parser: FeedParser,
}

impl RefreshOrchestrator {
    pub fn new(store: Arc<dyn Store>, fetcher: Arc<dyn FetchDocument>) -> Self {
        Self {
            store,
            fetcher,
            parser: FeedParser::new(),
        }
    }

    pub async fn refresh_all(&self, feed_ids: &[Uuid]) -> RefreshReport {
        info!("Refreshing {} stale feeds", feed_ids.len());

        let outcomes: Vec<FeedRefreshOutcome> = join_all(feed_ids.iter().map(|&feed_id| async move {
            let result = self
                .refresh_feed(feed_id)
                .await
                .map_err(|e| e.to_string());
            FeedRefreshOutcome { feed_id, result }
        }))
        .await;

        let mut report = RefreshReport::default();
        for outcome in outcomes {
            match &outcome.result {
                Ok(_) => report.succeeded += 1,
                Err(message) => {
                    error!("Failed to refresh feed {}: {}", outcome.feed_id, message);
                    report.failed += 1;
                }
            }
            report.outcomes.push(outcome);
        }

        info!(
            "Refreshed {}/{} feeds ({} failed)",
            report.succeeded,
            report.outcomes.len(),
            report.failed
        );

        report
    }

    /// One feed's refresh, strictly sequential: fetch, parse, merge
    /// articles, then stamp the feed row.
    async fn refresh_feed(&self, feed_id: Uuid) -> Result<MergeReport> {
        let feed = self.store.feed(feed_id).await?;
        if !feed.active {
            return Err(PipelineError::InactiveFeed { id: feed_id });
        }

        let document = self.fetcher.fetch(&feed.url).await?;
        let parsed = self.parser.parse(feed_id, &document)?;

        let report = merge_articles(self.store.as_ref(), &parsed.articles).await;

        self.store
            .record_refresh(
                feed_id,
                FeedRefresh {
                    fetched_at: Utc::now(),
                    metadata: parsed.metadata,
                },
            )
            .await?;

        Ok(report)
    }
}
