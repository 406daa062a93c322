use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use preview_core::Bookmark;
use preview_engine::{
    cache_key, thumbnail_file_name, AtomicFileWriter, BatchSummary, EnrichmentResult,
    FailureKind, Outcome, PersistError, ThumbnailSource,
};
use preview_logging::preview_info;
use serde::Serialize;

pub const SUMMARY_FILE: &str = "summary.json";

#[derive(Debug, Serialize)]
struct SummaryFile<'a> {
    generated_at: DateTime<Utc>,
    #[serde(flatten)]
    counts: BatchSummary,
    failure_rate: f64,
    entries: Vec<SummaryEntry<'a>>,
}

#[derive(Debug, Serialize)]
struct SummaryEntry<'a> {
    index: usize,
    url: &'a str,
    folder: String,
    bookmark_title: Option<&'a str>,
    title: Option<&'a str>,
    description: Option<&'a str>,
    favicon_url: Option<&'a str>,
    outcome: Option<Outcome>,
    error: Option<String>,
    error_kind: Option<&'a FailureKind>,
    thumbnail: Option<String>,
    thumbnail_source: Option<ThumbnailSource>,
    fetched_at: Option<DateTime<Utc>>,
}

/// Writes one `NNNN_<hash>.jpg` per real thumbnail and a `summary.json`
/// listing every bookmark in input order. Placeholders are not written.
pub fn write_report(
    out_dir: &Path,
    bookmarks: &[Bookmark],
    results: &[EnrichmentResult],
    generated_at: DateTime<Utc>,
) -> Result<PathBuf, PersistError> {
    let writer = AtomicFileWriter::new(out_dir.to_path_buf());
    let by_key: HashMap<String, &EnrichmentResult> =
        results.iter().map(|r| (lookup_key(&r.url), r)).collect();

    let mut written = 0;
    let mut entries = Vec::with_capacity(bookmarks.len());
    for (offset, bookmark) in bookmarks.iter().enumerate() {
        let index = offset + 1;
        let result = by_key.get(&lookup_key(&bookmark.url)).copied();

        let mut thumbnail = None;
        if let Some(thumb) = result.and_then(|r| r.thumbnail.as_ref()) {
            if thumb.source != ThumbnailSource::Placeholder {
                let name = thumbnail_file_name(index, &bookmark.url);
                writer.write(&name, &thumb.image_bytes)?;
                written += 1;
                thumbnail = Some(name);
            }
        }

        let metadata = result.and_then(|r| r.metadata.as_ref());
        entries.push(SummaryEntry {
            index,
            url: &bookmark.url,
            folder: bookmark.folder_path(),
            bookmark_title: bookmark.title.as_deref(),
            title: metadata.and_then(|m| m.title.as_deref()),
            description: metadata.and_then(|m| m.description.as_deref()),
            favicon_url: metadata.and_then(|m| m.favicon_url.as_deref()),
            outcome: result.map(|r| r.outcome),
            error: result.and_then(|r| r.error_kind.as_ref()).map(ToString::to_string),
            error_kind: result.and_then(|r| r.error_kind.as_ref()),
            thumbnail_source: result.and_then(|r| r.thumbnail.as_ref()).map(|t| t.source),
            thumbnail,
            fetched_at: result.map(|r| r.fetched_at),
        });
    }

    let counts = BatchSummary::from_results(results);
    let summary = SummaryFile {
        generated_at,
        counts,
        failure_rate: counts.failure_rate(),
        entries,
    };
    let json = serde_json::to_vec_pretty(&summary).map_err(std::io::Error::other)?;
    let path = writer.write(SUMMARY_FILE, &json)?;
    preview_info!(
        "wrote {} thumbnails and {} to {}",
        written,
        SUMMARY_FILE,
        out_dir.display()
    );
    Ok(path)
}

fn lookup_key(url: &str) -> String {
    cache_key(url).unwrap_or_else(|_| url.trim().to_string())
}
