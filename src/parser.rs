use crate::types::{ParsedArticle, ParsedFeed, ParsedFeedMetadata, PipelineError, Result};
use chrono::{DateTime, Utc};
use feed_rs::model::{Entry, Feed};
use feed_rs::parser;
use feed_rs::parser::Parser;
use tracing::{debug, info};
use uuid::Uuid;

/// Longest summary we keep when falling back to truncated body text.
pub const SUMMARY_MAX_CHARS: usize = 300;

/// Derive the canonical identity key for an item. The fallback order is a
/// contract: native guid, then link, then `"{feedId}-{title}"`. Never empty.
pub fn derive_guid(feed_id: Uuid, native_id: &str, link: Option<&str>, title: &str) -> String {
    if !native_id.is_empty() {
        return native_id.to_string();
    }
    if let Some(link) = link {
        if !link.is_empty() {
            return link.to_string();
        }
    }
    format!("{}-{}", feed_id, title)
}

/// Normalizes fetched feed documents into `ParsedFeed`s.
///
/// Field extraction follows fixed priority orders so output is deterministic:
/// content is the full body then the summary; the summary is the feed's own
/// snippet then truncated body text; the author is the first author then the
/// first contributor; the publish date is the structured publish timestamp,
/// then the legacy updated timestamp, then ingestion time.
pub struct FeedParser;

impl FeedParser {
    pub fn new() -> Self {
        Self
    }

    // feed-rs's `Parser` boxes its hooks without `Send + Sync`, so it can't
    // live in a struct that crosses `tokio::spawn`; build it per parse.
    fn parser() -> Parser {
        // feed-rs fills a missing item id with a synthesized hash, which
        // would shadow the link and composite fallbacks; keep absent ids
        // empty so the guid chain can see them.
        parser::Builder::new()
            .id_generator(|_links, _title, _uri| String::new())
            .build()
    }

    /// Parse a raw feed document owned by `feed_id`. Structural failure is a
    /// typed `Parse` error carrying the underlying cause.
    pub fn parse(&self, feed_id: Uuid, document: &[u8]) -> Result<ParsedFeed> {
        debug!("Parsing feed document ({} bytes)", document.len());

        let feed = Self::parser()
            .parse(document)
            .map_err(|e| PipelineError::Parse(format!("failed to parse feed: {}", e)))?;

        let metadata = feed_metadata(&feed);
        let fetched_at = Utc::now();

        let articles: Vec<ParsedArticle> = feed
            .entries
            .into_iter()
            .map(|entry| normalize_entry(feed_id, entry, fetched_at))
            .collect();

        info!("Parsed feed with {} articles", articles.len());

        Ok(ParsedFeed { metadata, articles })
    }
}

impl Default for FeedParser {
    fn default() -> Self {
        Self::new()
    }
}

fn feed_metadata(feed: &Feed) -> ParsedFeedMetadata {
    ParsedFeedMetadata {
        title: feed.title.as_ref().map(|t| t.content.clone()),
        description: feed.description.as_ref().map(|d| d.content.clone()),
        link: feed.links.first().map(|l| l.href.clone()),
        image_url: feed
            .logo
            .as_ref()
            .or(feed.icon.as_ref())
            .map(|image| image.uri.clone()),
        language: feed.language.clone(),
    }
}

fn normalize_entry(feed_id: Uuid, entry: Entry, ingested_at: DateTime<Utc>) -> ParsedArticle {
    let title = entry
        .title
        .map(|t| t.content)
        .unwrap_or_else(|| "Untitled".to_string());

    let link = entry.links.first().map(|l| l.href.clone());
    let guid = derive_guid(feed_id, &entry.id, link.as_deref(), &title);

    let snippet = entry.summary.map(|s| s.content);
    let body = entry.content.and_then(|c| c.body);

    // Content prefers the full body; summary prefers the snippet over a
    // truncation of whatever content we ended up with.
    let content = body.clone().or_else(|| snippet.clone());
    let summary = snippet
        .clone()
        .or_else(|| body.as_deref().map(|text| truncate_chars(text, SUMMARY_MAX_CHARS)));

    let author = entry
        .authors
        .iter()
        .chain(entry.contributors.iter())
        .map(|person| person.name.trim())
        .find(|name| !name.is_empty())
        .map(|name| name.to_string());

    let categories: Vec<String> = entry
        .categories
        .into_iter()
        .filter_map(|category| {
            if !category.term.is_empty() {
                Some(category.term)
            } else {
                category.label.filter(|label| !label.is_empty())
            }
        })
        .collect();

    let image_url = entry
        .media
        .iter()
        .flat_map(|media| media.content.iter())
        .find(|content| {
            content
                .content_type
                .as_ref()
                .map(|mime| mime.essence_str().starts_with("image/"))
                .unwrap_or(false)
        })
        .and_then(|content| content.url.as_ref().map(|url| url.to_string()));

    let published_at = entry
        .published
        .or(entry.updated)
        .unwrap_or(ingested_at);

    ParsedArticle {
        guid,
        feed_id,
        title,
        link: link.unwrap_or_default(),
        content,
        summary,
        author,
        categories,
        image_url,
        published_at,
    }
}

/// Char-boundary-safe truncation with an ellipsis marker.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(max_chars).collect();
    truncated.push_str("...");
    truncated
}
