use crate::store::Store;
use crate::types::{ArticleUpsert, MergeReport, ParsedArticle, PipelineError};
use tracing::{info, warn};

/// Upsert a batch of parsed articles into the canonical corpus.
///
/// Each record lands as `created` (new canonical row), `skipped` (the guid
/// already existed — its provenance multiset got the producing feed id
/// appended, or a store raced us into a duplicate-key conflict), or
/// `errored` (anything else; logged and counted, never aborts the batch).
pub async fn merge_articles(store: &dyn Store, articles: &[ParsedArticle]) -> MergeReport {
    let mut report = MergeReport::default();

    for article in articles {
        match store.upsert_article(article).await {
            Ok(ArticleUpsert::Created) => report.created += 1,
            Ok(ArticleUpsert::Merged) => report.skipped += 1,
            Err(PipelineError::Conflict(message)) => {
                warn!("Duplicate-key race on article {}: {}", article.guid, message);
                report.skipped += 1;
            }
            Err(error) => {
                warn!("Failed to upsert article {}: {}", article.guid, error);
                report.errored += 1;
            }
        }
    }

    info!(
        "Merged {} articles: {} created, {} skipped, {} errored",
        report.total(),
        report.created,
        report.skipped,
        report.errored
    );

    report
}
