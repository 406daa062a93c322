use std::collections::HashSet;

use crate::bookmarks::{normalize_url_for_dedupe, Bookmark};
use crate::view_model::{AppViewModel, BookmarkRowView};

/// Index of a row in load order.
pub type RowId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Running,
    Cancelling,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowStage {
    Pending,
    Queued,
    Fetching,
    Retrying,
    Rendering,
    Extracting,
    Thumbnailing,
    Done,
}

impl RowStage {
    pub fn label(self) -> &'static str {
        match self {
            RowStage::Pending => "pending",
            RowStage::Queued => "queued",
            RowStage::Fetching => "fetching",
            RowStage::Retrying => "retrying",
            RowStage::Rendering => "rendering",
            RowStage::Extracting => "extracting",
            RowStage::Thumbnailing => "thumbnailing",
            RowStage::Done => "done",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOutcome {
    Ok,
    /// Something usable was produced; `reason` names what went wrong.
    Partial { reason: String },
    Failed { reason: String },
}

/// Encoded thumbnail ready for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewImage {
    pub width: u32,
    pub height: u32,
    pub jpeg: Vec<u8>,
    pub placeholder: bool,
}

/// Final state of one URL, as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewUpdate {
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub outcome: RowOutcome,
    pub thumbnail: Option<PreviewImage>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Row {
    bookmark: Bookmark,
    key: String,
    stage: RowStage,
    preview: Option<PreviewUpdate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AppState {
    session: SessionState,
    rows: Vec<Row>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session(&self) -> SessionState {
        self.session
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn view(&self) -> AppViewModel {
        let rows: Vec<BookmarkRowView> = self
            .rows
            .iter()
            .enumerate()
            .map(|(id, row)| {
                BookmarkRowView::new(id, &row.bookmark, row.stage, row.preview.as_ref())
            })
            .collect();
        let resolved = rows.iter().filter(|row| row.outcome.is_some()).count();
        let failed = rows
            .iter()
            .filter(|row| matches!(row.outcome, Some(RowOutcome::Failed { .. })))
            .count();
        AppViewModel {
            session: self.session,
            total: rows.len(),
            resolved,
            failed,
            rows,
        }
    }

    /// Replaces the rows and returns the unique URLs to enrich in load order.
    pub(crate) fn load(&mut self, bookmarks: Vec<Bookmark>) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut urls = Vec::new();
        self.rows = bookmarks
            .into_iter()
            .map(|bookmark| {
                let key = row_key(&bookmark.url);
                if seen.insert(key.clone()) {
                    urls.push(bookmark.url.clone());
                }
                Row {
                    bookmark,
                    key,
                    stage: RowStage::Pending,
                    preview: None,
                }
            })
            .collect();
        urls
    }

    pub(crate) fn apply_progress(&mut self, url: &str, stage: RowStage) {
        let key = row_key(url);
        for row in self.rows.iter_mut().filter(|row| row.key == key) {
            if row.preview.is_none() {
                row.stage = stage;
            }
        }
    }

    pub(crate) fn apply_result(&mut self, update: PreviewUpdate) {
        let key = row_key(&update.url);
        for row in self.rows.iter_mut().filter(|row| row.key == key) {
            row.stage = RowStage::Done;
            row.preview = Some(update.clone());
        }
    }

    pub(crate) fn all_resolved(&self) -> bool {
        self.rows.iter().all(|row| row.preview.is_some())
    }

    pub(crate) fn set_session(&mut self, session: SessionState) {
        self.session = session;
    }
}

fn row_key(url: &str) -> String {
    normalize_url_for_dedupe(url).unwrap_or_else(|| url.trim().to_string())
}
