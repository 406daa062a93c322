//! Bookmark sources: browser exports parsed into an ordered list of
//! [`Bookmark`]s, plus folder selection and de-duplication.
//!
//! Parsers take the file contents; reading the file is up to the caller.

use std::collections::HashSet;

use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use thiserror::Error;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bookmark {
    pub url: String,
    pub title: Option<String>,
    /// Folder names from the outermost folder inwards.
    pub folder: Vec<String>,
}

impl Bookmark {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: None,
            folder: Vec::new(),
        }
    }

    pub fn folder_path(&self) -> String {
        self.folder.join("/")
    }
}

#[derive(Debug, Error)]
pub enum BookmarkError {
    #[error("not a bookmark export: {0}")]
    Format(String),
    #[error("invalid bookmarks json: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookmarkFormat {
    /// Netscape bookmark file, as exported by every major browser.
    NetscapeHtml,
    /// Chrome's `Bookmarks` profile file.
    ChromeJson,
    /// One URL per line; blank lines and `#` comments are skipped.
    UrlList,
}

impl BookmarkFormat {
    pub fn parse(self, text: &str) -> Result<Vec<Bookmark>, BookmarkError> {
        match self {
            BookmarkFormat::NetscapeHtml => parse_netscape_html(text),
            BookmarkFormat::ChromeJson => parse_chrome_json(text),
            BookmarkFormat::UrlList => Ok(parse_url_list(text)),
        }
    }
}

/// Parses a Netscape bookmark export. Folder paths follow the nesting of
/// `<DL>` lists under their `<H3>` headings. Only http(s) links are kept.
pub fn parse_netscape_html(html: &str) -> Result<Vec<Bookmark>, BookmarkError> {
    let document = Html::parse_document(html);
    let lists = selector("dl")?;
    if document.select(&lists).next().is_none() {
        return Err(BookmarkError::Format("no <DL> bookmark list".to_string()));
    }

    let anchors = selector("a[href]")?;
    let bookmarks = document
        .select(&anchors)
        .filter_map(|anchor| {
            let href = anchor.value().attr("href")?.trim();
            if !is_web_url(href) {
                return None;
            }
            Some(Bookmark {
                url: href.to_string(),
                title: collapse_text(anchor),
                folder: folder_path(anchor),
            })
        })
        .collect();
    Ok(bookmarks)
}

fn selector(css: &str) -> Result<Selector, BookmarkError> {
    Selector::parse(css).map_err(|err| BookmarkError::Format(err.to_string()))
}

fn folder_path(anchor: ElementRef<'_>) -> Vec<String> {
    let mut path: Vec<String> = anchor
        .ancestors()
        .filter_map(ElementRef::wrap)
        .filter(|element| element.value().name() == "dl")
        .filter_map(folder_heading)
        .collect();
    path.reverse();
    path
}

/// The `<H3>` directly before a `<DL>` names the folder it holds.
fn folder_heading(list: ElementRef<'_>) -> Option<String> {
    list.prev_siblings()
        .filter_map(ElementRef::wrap)
        .find(|element| element.value().name() != "p")
        .filter(|element| element.value().name() == "h3")
        .and_then(collapse_text)
}

fn collapse_text(element: ElementRef<'_>) -> Option<String> {
    let text = element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ");
    (!text.is_empty()).then_some(text)
}

#[derive(Deserialize)]
struct ChromeFile {
    roots: ChromeRoots,
}

#[derive(Deserialize)]
struct ChromeRoots {
    bookmark_bar: Option<ChromeNode>,
    other: Option<ChromeNode>,
    synced: Option<ChromeNode>,
}

#[derive(Deserialize)]
struct ChromeNode {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    name: String,
    url: Option<String>,
    #[serde(default)]
    children: Vec<ChromeNode>,
}

/// Parses Chrome's `Bookmarks` JSON. Roots are visited bookmark bar, other,
/// synced; each root's name is the first folder segment.
pub fn parse_chrome_json(json: &str) -> Result<Vec<Bookmark>, BookmarkError> {
    let file: ChromeFile = serde_json::from_str(json)?;
    let mut bookmarks = Vec::new();
    for root in [file.roots.bookmark_bar, file.roots.other, file.roots.synced]
        .into_iter()
        .flatten()
    {
        walk_chrome_node(&root, &mut Vec::new(), &mut bookmarks);
    }
    Ok(bookmarks)
}

fn walk_chrome_node(node: &ChromeNode, path: &mut Vec<String>, out: &mut Vec<Bookmark>) {
    match (node.kind.as_str(), &node.url) {
        ("url", Some(url)) => {
            let url = url.trim();
            if is_web_url(url) {
                let name = node.name.trim();
                out.push(Bookmark {
                    url: url.to_string(),
                    title: (!name.is_empty()).then(|| name.to_string()),
                    folder: path.clone(),
                });
            }
        }
        _ => {
            path.push(node.name.trim().to_string());
            for child in &node.children {
                walk_chrome_node(child, path, out);
            }
            path.pop();
        }
    }
}

pub fn parse_url_list(text: &str) -> Vec<Bookmark> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(Bookmark::new)
        .collect()
}

/// Keeps bookmarks inside the named folder, subfolders included.
///
/// A query containing `/` must match a folder path from the top; otherwise
/// any folder with that name matches. Comparison ignores case. An empty query
/// keeps everything.
pub fn select_folder(bookmarks: &[Bookmark], query: &str) -> Vec<Bookmark> {
    let wanted: Vec<String> = query
        .split('/')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(str::to_lowercase)
        .collect();
    if wanted.is_empty() {
        return bookmarks.to_vec();
    }
    let by_path = query.contains('/');

    bookmarks
        .iter()
        .filter(|bookmark| {
            let folder: Vec<String> = bookmark.folder.iter().map(|s| s.to_lowercase()).collect();
            if by_path {
                folder.starts_with(&wanted)
            } else {
                folder.iter().any(|segment| *segment == wanted[0])
            }
        })
        .cloned()
        .collect()
}

/// Drops later bookmarks whose URL normalises to one already seen.
pub fn dedupe(bookmarks: Vec<Bookmark>) -> Vec<Bookmark> {
    let mut seen = HashSet::new();
    bookmarks
        .into_iter()
        .filter(|bookmark| {
            let key = normalize_url_for_dedupe(&bookmark.url)
                .unwrap_or_else(|| bookmark.url.trim().to_string());
            seen.insert(key)
        })
        .collect()
}

/// Scheme and host lower-cased, default port dropped, fragment stripped and
/// query pairs sorted. `None` for anything that is not an http(s) URL.
pub fn normalize_url_for_dedupe(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let mut url = Url::parse(trimmed)
        .or_else(|_| Url::parse(&format!("https://{trimmed}")))
        .ok()?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none_or(str::is_empty) {
        return None;
    }
    url.set_fragment(None);
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if pairs.is_empty() {
        url.set_query(None);
    } else {
        pairs.sort();
        url.query_pairs_mut().clear().extend_pairs(pairs);
    }
    Some(url.to_string())
}

fn is_web_url(raw: &str) -> bool {
    Url::parse(raw).is_ok_and(|url| matches!(url.scheme(), "http" | "https"))
}
