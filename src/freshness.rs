use crate::store::Store;
use crate::types::{FreshnessReport, Result};
use chrono::{Duration, Utc};
use tracing::debug;
use uuid::Uuid;

/// Decides which of the requested feeds are due for a refresh.
///
/// Staleness is shared per source URL, not per feed row: the most recent
/// fetch across every feed subscribed to the same URL counts for all of
/// them, so one tenant's refresh keeps the others fresh.
#[derive(Debug, Clone)]
pub struct FreshnessClassifier {
    cache_window: Duration,
}

impl FreshnessClassifier {
    pub fn new(cache_window: Duration) -> Self {
        Self { cache_window }
    }

    pub fn cache_window(&self) -> Duration {
        self.cache_window
    }

    /// Partition `feed_ids` into stale and fresh. One point lookup per
    /// requested feed; ids sharing a URL each do their own lookup rather
    /// than being collapsed.
    pub async fn classify(&self, store: &dyn Store, feed_ids: &[Uuid]) -> Result<FreshnessReport> {
        let now = Utc::now();
        let mut report = FreshnessReport::default();

        for &feed_id in feed_ids {
            let feed = store.feed(feed_id).await?;
            let latest = store.latest_fetch_for_url(&feed.url).await?;

            let stale = match latest {
                None => true,
                Some(fetched_at) => now - fetched_at > self.cache_window,
            };

            if stale {
                debug!("Feed {} ({}) is stale", feed_id, feed.url);
                report.stale.push(feed_id);
            } else {
                debug!("Feed {} ({}) is fresh", feed_id, feed.url);
                report.fresh.push(feed_id);
            }
        }

        Ok(report)
    }
}
