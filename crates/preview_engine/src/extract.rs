use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::Metadata;

const FALLBACK_FAVICON_PATH: &str = "/favicon.ico";
const INVISIBLE_TAGS: &[&str] = &["script", "style", "noscript", "template", "svg"];

/// Everything the pipeline reads out of one HTML document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPage {
    pub metadata: Metadata,
    /// Visible body characters after whitespace collapsing.
    pub body_text_len: usize,
    /// The page is an anti-bot interstitial rather than the real content.
    pub is_challenge: bool,
}

pub trait Extractor: Send + Sync {
    fn extract(&self, html: &str, page_url: &str) -> ExtractedPage;
}

/// Metadata extractor over a forgiving HTML5 parse:
/// - title: `<title>`, then `og:title`, then the first `<h1>`/`<h2>`
/// - description: `meta name=description`, then `og:description`, then `twitter:description`
/// - favicon: `link rel=icon` family resolved against `<base>` or the page URL,
///   else `/favicon.ico` on the page origin.
#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlMetadataExtractor;

impl Extractor for HtmlMetadataExtractor {
    fn extract(&self, html: &str, page_url: &str) -> ExtractedPage {
        let doc = Html::parse_document(html);
        let base = document_base(&doc, page_url);

        let title = first_text(&doc, "title")
            .or_else(|| meta_content(&doc, &["og:title", "twitter:title"]))
            .or_else(|| first_text(&doc, "h1"))
            .or_else(|| first_text(&doc, "h2"));
        let description =
            meta_content(&doc, &["description", "og:description", "twitter:description"]);
        let favicon_url = base.as_ref().and_then(|base| favicon(&doc, base));

        let is_challenge = looks_like_challenge(title.as_deref(), page_url);

        ExtractedPage {
            metadata: Metadata {
                url: page_url.to_string(),
                title,
                description,
                favicon_url,
            },
            body_text_len: body_text_len(&doc),
            is_challenge,
        }
    }
}

/// Matches the interstitials served by common bot-protection layers.
pub fn looks_like_challenge(title: Option<&str>, page_url: &str) -> bool {
    if page_url.contains("/cdn-cgi/challenge") || page_url.contains("challenges.cloudflare.com") {
        return true;
    }
    let Some(title) = title else {
        return false;
    };
    let title = title.to_lowercase();
    title.contains("just a moment")
        || title.contains("checking your browser")
        || (title.contains("attention required") && title.contains("cloudflare"))
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn first_text(doc: &Html, css: &str) -> Option<String> {
    let sel = selector(css)?;
    doc.select(&sel)
        .map(|node| collapse_whitespace(&node.text().collect::<String>()))
        .find(|text| !text.is_empty())
}

/// First non-empty `content` of a `<meta>` whose `name` or `property` is in `keys`,
/// honouring the order of `keys`.
fn meta_content(doc: &Html, keys: &[&str]) -> Option<String> {
    let sel = selector("meta[content]")?;
    let metas: Vec<ElementRef> = doc.select(&sel).collect();
    keys.iter().find_map(|key| {
        metas.iter().find_map(|meta| {
            let el = meta.value();
            let matches = [el.attr("name"), el.attr("property")]
                .into_iter()
                .flatten()
                .any(|name| name.trim().eq_ignore_ascii_case(key));
            if !matches {
                return None;
            }
            let content = collapse_whitespace(el.attr("content").unwrap_or_default());
            (!content.is_empty()).then_some(content)
        })
    })
}

fn document_base(doc: &Html, page_url: &str) -> Option<Url> {
    let page = Url::parse(page_url).ok()?;
    let base_href = selector("base[href]")
        .and_then(|sel| doc.select(&sel).next())
        .and_then(|el| el.value().attr("href"))
        .and_then(|href| page.join(href.trim()).ok());
    Some(base_href.unwrap_or(page))
}

fn favicon(doc: &Html, base: &Url) -> Option<String> {
    let sel = selector("link[rel][href]")?;
    let mut icon = None;
    let mut touch_icon = None;
    for link in doc.select(&sel) {
        let el = link.value();
        let rel = el.attr("rel").unwrap_or_default().to_ascii_lowercase();
        let href = el.attr("href").unwrap_or_default().trim();
        if href.is_empty() {
            continue;
        }
        let tokens: Vec<&str> = rel.split_whitespace().collect();
        if icon.is_none() && tokens.contains(&"icon") {
            icon = Some(href);
        } else if touch_icon.is_none()
            && tokens
                .iter()
                .any(|t| *t == "apple-touch-icon" || *t == "apple-touch-icon-precomposed")
        {
            touch_icon = Some(href);
        }
    }

    let resolved = icon
        .or(touch_icon)
        .and_then(|href| base.join(href).ok())
        .filter(|url| matches!(url.scheme(), "http" | "https"));
    match resolved {
        Some(url) => Some(url.to_string()),
        None => base.join(FALLBACK_FAVICON_PATH).ok().map(|u| u.to_string()),
    }
}

fn body_text_len(doc: &Html) -> usize {
    let root = selector("body")
        .and_then(|sel| doc.select(&sel).next())
        .unwrap_or_else(|| doc.root_element());

    let mut text = String::new();
    for node in root.descendants() {
        let Node::Text(chunk) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| INVISIBLE_TAGS.contains(&el.name()))
        });
        if !hidden {
            text.push_str(chunk);
            text.push(' ');
        }
    }
    collapse_whitespace(&text).chars().count()
}
