//! Bookmark preview core: pure viewer state and bookmark sources.
mod bookmarks;
mod effect;
mod msg;
mod state;
mod update;
mod view_model;

pub use bookmarks::{
    dedupe, normalize_url_for_dedupe, parse_chrome_json, parse_netscape_html, parse_url_list,
    select_folder, Bookmark, BookmarkError, BookmarkFormat,
};
pub use effect::Effect;
pub use msg::Msg;
pub use state::{AppState, PreviewImage, PreviewUpdate, RowId, RowOutcome, RowStage, SessionState};
pub use update::update;
pub use view_model::{AppViewModel, BookmarkRowView, PREVIEW_UNAVAILABLE};
