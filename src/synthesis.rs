use crate::parser::truncate_chars;
use crate::types::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::info;

/// What the pipeline hands to synthesis, one tuple per selected article.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleDigest {
    pub title: String,
    pub source_name: String,
    pub published_at: DateTime<Utc>,
    pub excerpt: String,
    pub link: String,
}

#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    pub articles: Vec<ArticleDigest>,
    pub instructions: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Incrementally-filled synthesis output; each partial shows the fields
/// settled so far.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsletterDraft {
    pub suggested_titles: Vec<String>,
    pub suggested_subject_lines: Vec<String>,
    pub body: Option<String>,
    pub top_announcements: Vec<String>,
    pub additional_info: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsletterContent {
    pub suggested_titles: Vec<String>,
    pub suggested_subject_lines: Vec<String>,
    pub body: String,
    pub top_announcements: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_info: Option<String>,
}

#[derive(Debug, Clone)]
pub enum SynthesisUpdate {
    Partial(NewsletterDraft),
    Complete(NewsletterContent),
}

pub type SynthesisStream = BoxStream<'static, Result<SynthesisUpdate>>;

/// The generative step behind the pipeline. Implementations stream zero or
/// more partial drafts and finish with exactly one complete newsletter; how
/// the text gets made is their business.
#[async_trait]
pub trait ContentSynthesizer: Send + Sync {
    fn name(&self) -> String;

    async fn synthesize(&self, request: SynthesisRequest) -> Result<SynthesisStream>;
}

/// Deterministic built-in synthesizer. Composes the newsletter from the
/// article tuples alone, streaming drafts field-group by field-group the
/// way a model-backed implementation would stream partial objects.
pub struct TemplateSynthesizer;

impl TemplateSynthesizer {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TemplateSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentSynthesizer for TemplateSynthesizer {
    fn name(&self) -> String {
        "template".to_string()
    }

    async fn synthesize(&self, request: SynthesisRequest) -> Result<SynthesisStream> {
        info!(
            "Synthesizing newsletter from {} articles ({} to {})",
            request.articles.len(),
            request.start,
            request.end
        );

        let suggested_titles = suggest_titles(&request);
        let suggested_subject_lines = suggest_subject_lines(&request);
        let top_announcements = top_announcements(&request);
        let additional_info = request
            .instructions
            .as_ref()
            .map(|instructions| format!("Requested focus: {}", instructions));
        let body = compose_body(&request);

        let updates = vec![
            Ok(SynthesisUpdate::Partial(NewsletterDraft {
                suggested_titles: suggested_titles.clone(),
                ..Default::default()
            })),
            Ok(SynthesisUpdate::Partial(NewsletterDraft {
                suggested_titles: suggested_titles.clone(),
                suggested_subject_lines: suggested_subject_lines.clone(),
                ..Default::default()
            })),
            Ok(SynthesisUpdate::Partial(NewsletterDraft {
                suggested_titles: suggested_titles.clone(),
                suggested_subject_lines: suggested_subject_lines.clone(),
                top_announcements: top_announcements.clone(),
                ..Default::default()
            })),
            Ok(SynthesisUpdate::Complete(NewsletterContent {
                suggested_titles,
                suggested_subject_lines,
                body,
                top_announcements,
                additional_info,
            })),
        ];

        Ok(stream::iter(updates).boxed())
    }
}

fn range_label(start: DateTime<Utc>, end: DateTime<Utc>) -> String {
    format!(
        "{} to {}",
        start.format("%B %d, %Y"),
        end.format("%B %d, %Y")
    )
}

fn suggest_titles(request: &SynthesisRequest) -> Vec<String> {
    let range = range_label(request.start, request.end);
    let top_title = request
        .articles
        .first()
        .map(|article| article.title.clone())
        .unwrap_or_else(|| "Your Sources".to_string());

    vec![
        format!("The Roundup: {}", range),
        format!("Top Story: {}", top_title),
        format!("{} Stories Worth Your Time", request.articles.len()),
        format!("What You Missed: {}", range),
        "Highlights from Your Feeds".to_string(),
    ]
}

fn suggest_subject_lines(request: &SynthesisRequest) -> Vec<String> {
    let range = range_label(request.start, request.end);
    let top_title = request
        .articles
        .first()
        .map(|article| truncate_chars(&article.title, 60))
        .unwrap_or_else(|| "your latest stories".to_string());
    let runner_up = request
        .articles
        .get(1)
        .map(|article| truncate_chars(&article.title, 60))
        .unwrap_or_else(|| top_title.clone());

    vec![
        format!("Your digest for {}", range),
        format!("{} and more", top_title),
        format!("{} new stories inside", request.articles.len()),
        "Fresh from your sources".to_string(),
        format!("Don't miss: {}", runner_up),
    ]
}

fn top_announcements(request: &SynthesisRequest) -> Vec<String> {
    request
        .articles
        .iter()
        .take(5)
        .map(|article| article.title.clone())
        .collect()
}

fn compose_body(request: &SynthesisRequest) -> String {
    let mut body = String::new();

    body.push_str(&format!(
        "# Newsletter: {}\n\n",
        range_label(request.start, request.end)
    ));
    body.push_str(&format!(
        "{} stories from your sources this period.\n\n",
        request.articles.len()
    ));

    if let Some(instructions) = &request.instructions {
        body.push_str(&format!("*Editor focus: {}*\n\n", instructions));
    }

    for article in &request.articles {
        body.push_str(&format!("## {}\n", article.title));
        body.push_str(&format!(
            "*{} - {}*\n\n",
            article.source_name,
            article.published_at.format("%B %d, %Y")
        ));
        if !article.excerpt.is_empty() {
            body.push_str(&format!("{}\n\n", article.excerpt));
        }
        if !article.link.is_empty() {
            body.push_str(&format!("[Read more]({})\n\n", article.link));
        }
    }

    body
}
