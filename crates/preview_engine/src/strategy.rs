//! Pure fetch-versus-render decision.
//!
//! Everything the orchestrator needs to branch on after a fetch is folded
//! into a [`Strategy`] here, so the policy is testable without IO.

use crate::extract::ExtractedPage;
use crate::{FailureKind, FetchOutput, FetchResult};

/// What kind of usable content a successful fetch carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Html,
    /// The bookmark points straight at an image.
    Image,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderReason {
    Forced,
    FetchFailed(FailureKind),
    NearEmpty { body_text_len: usize },
    Challenge,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    AcceptContent(ContentKind),
    Render(RenderReason),
    Fail(FailureKind),
}

#[derive(Debug, Clone, Copy)]
pub struct StrategyInputs<'a> {
    pub force_render: bool,
    pub min_body_text_len: usize,
    /// Parse of the fetched HTML, when the body was HTML.
    pub page: Option<&'a ExtractedPage>,
}

/// Decide what to do with a final (post-retry) fetch result.
pub fn choose_strategy(fetch_result: &FetchResult, inputs: &StrategyInputs<'_>) -> Strategy {
    let output = match fetch_result {
        Ok(output) => output,
        Err(err) => {
            return match &err.kind {
                // The server answered; a browser would get the same answer.
                FailureKind::HttpStatus(_)
                | FailureKind::InvalidUrl
                | FailureKind::TooLarge { .. }
                | FailureKind::Cancelled => Strategy::Fail(err.kind.clone()),
                other => Strategy::Render(RenderReason::FetchFailed(other.clone())),
            };
        }
    };

    match classify(output) {
        Classified::Download(content_type) => {
            Strategy::Fail(FailureKind::UnsupportedContent { content_type })
        }
        Classified::Image => Strategy::AcceptContent(ContentKind::Image),
        Classified::Html => {
            if inputs.force_render {
                return Strategy::Render(RenderReason::Forced);
            }
            match inputs.page {
                Some(page) if page.is_challenge => Strategy::Render(RenderReason::Challenge),
                Some(page) if page.body_text_len < inputs.min_body_text_len => {
                    Strategy::Render(RenderReason::NearEmpty {
                        body_text_len: page.body_text_len,
                    })
                }
                Some(_) => Strategy::AcceptContent(ContentKind::Html),
                None => Strategy::Render(RenderReason::NearEmpty { body_text_len: 0 }),
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Classified {
    Html,
    Image,
    Download(String),
}

/// Whether the fetched body is something to parse as HTML.
pub fn is_html_like(output: &FetchOutput) -> bool {
    classify(output) == Classified::Html
}

fn classify(output: &FetchOutput) -> Classified {
    let content_type = output
        .metadata
        .content_type
        .as_deref()
        .map(|ct| ct.split(';').next().unwrap_or(ct).trim().to_ascii_lowercase())
        .unwrap_or_default();

    let attachment = output
        .metadata
        .content_disposition
        .as_deref()
        .is_some_and(|cd| cd.to_ascii_lowercase().contains("attachment"));

    if content_type.starts_with("image/") && !attachment {
        return Classified::Image;
    }
    if attachment {
        return Classified::Download(if content_type.is_empty() {
            "attachment".to_string()
        } else {
            content_type
        });
    }
    // Missing content types are treated as HTML, as browsers sniff them.
    if content_type.is_empty()
        || content_type == "text/html"
        || content_type == "application/xhtml+xml"
        || (content_type.starts_with("text/") && content_type.contains("xml"))
        || content_type == "text/plain"
    {
        return Classified::Html;
    }
    Classified::Download(content_type)
}
