use crate::bookmarks::Bookmark;
use crate::{PreviewImage, PreviewUpdate, RowId, RowOutcome, RowStage, SessionState};

/// Status label shown for rows that failed outright.
pub const PREVIEW_UNAVAILABLE: &str = "preview unavailable";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AppViewModel {
    pub session: SessionState,
    pub rows: Vec<BookmarkRowView>,
    pub total: usize,
    pub resolved: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookmarkRowView {
    pub id: RowId,
    pub url: String,
    /// Folder path joined with `/`; empty at the root.
    pub folder: String,
    /// Page title, then bookmark title, then the URL.
    pub title: String,
    pub description: Option<String>,
    pub stage: RowStage,
    pub status: String,
    pub outcome: Option<RowOutcome>,
    pub thumbnail: Option<PreviewImage>,
}

impl BookmarkRowView {
    pub(crate) fn new(
        id: RowId,
        bookmark: &Bookmark,
        stage: RowStage,
        preview: Option<&PreviewUpdate>,
    ) -> Self {
        let title = preview
            .and_then(|p| p.title.clone())
            .or_else(|| bookmark.title.clone())
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| bookmark.url.clone());
        let outcome = preview.map(|p| p.outcome.clone());
        Self {
            id,
            url: bookmark.url.clone(),
            folder: bookmark.folder_path(),
            title,
            description: preview.and_then(|p| p.description.clone()),
            stage,
            status: status_label(stage, outcome.as_ref()),
            outcome,
            thumbnail: preview.and_then(|p| p.thumbnail.clone()),
        }
    }
}

fn status_label(stage: RowStage, outcome: Option<&RowOutcome>) -> String {
    match outcome {
        None => stage.label().to_string(),
        Some(RowOutcome::Ok) => "ready".to_string(),
        Some(RowOutcome::Partial { reason }) => format!("partial: {reason}"),
        Some(RowOutcome::Failed { .. }) => PREVIEW_UNAVAILABLE.to_string(),
    }
}
