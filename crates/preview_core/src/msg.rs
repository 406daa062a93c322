#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Msg {
    /// A bookmark source was read; replaces the current rows.
    BookmarksLoaded(Vec<crate::Bookmark>),
    /// Engine progress for a URL.
    Progress { url: String, stage: crate::RowStage },
    /// Engine finished a URL.
    ResultReady(crate::PreviewUpdate),
    /// User clicked Cancel.
    CancelClicked,
}
