use crate::store::Store;
use crate::types::{RankedArticle, Result, WindowQuery};
use tracing::debug;

/// Fetch the windowed article view and attach the source-count importance
/// score. An empty result is a legitimate outcome here; the pipeline
/// coordinator decides whether empty is an error for its caller.
pub async fn retrieve(store: &dyn Store, query: &WindowQuery) -> Result<Vec<RankedArticle>> {
    let articles = store.articles_in_window(query).await?;

    debug!(
        "Window [{} .. {}] matched {} articles for {} feeds",
        query.start,
        query.end,
        articles.len(),
        query.feed_ids.len()
    );

    Ok(articles
        .into_iter()
        .map(|article| {
            let source_count = article.source_feed_ids.len();
            RankedArticle {
                article,
                source_count,
            }
        })
        .collect())
}
