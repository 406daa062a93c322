use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of a single fetch or the fetch half of a render.
pub type FetchResult = Result<FetchOutput, FetchError>;

/// A bookmark as supplied by the bookmark source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookmarkEntry {
    pub url: String,
    pub title: Option<String>,
}

impl BookmarkEntry {
    pub fn new(url: impl Into<String>, title: Option<String>) -> Self {
        Self {
            url: url.into(),
            title,
        }
    }
}

/// One unit of work submitted to the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichmentRequest {
    pub url: String,
    /// Higher priorities are dispatched first.
    pub priority: i32,
    pub force_render: bool,
}

impl EnrichmentRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            priority: 0,
            force_render: false,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_force_render(mut self, force_render: bool) -> Self {
        self.force_render = force_render;
        self
    }
}

impl From<&str> for EnrichmentRequest {
    fn from(url: &str) -> Self {
        Self::new(url)
    }
}

impl From<String> for EnrichmentRequest {
    fn from(url: String) -> Self {
        Self::new(url)
    }
}

impl From<&BookmarkEntry> for EnrichmentRequest {
    fn from(entry: &BookmarkEntry) -> Self {
        Self::new(entry.url.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Queued,
    Fetching,
    Retrying,
    Rendering,
    Extracting,
    Thumbnailing,
}

/// Events streamed to front ends while a batch runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    Progress { url: String, stage: Stage },
    Completed(EnrichmentResult),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutput {
    pub bytes: Vec<u8>,
    pub metadata: FetchMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchMetadata {
    pub original_url: String,
    pub final_url: String,
    pub redirect_count: usize,
    pub content_type: Option<String>,
    pub content_disposition: Option<String>,
    pub byte_len: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    pub kind: FailureKind,
    pub message: String,
}

impl FetchError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub(crate) fn cancelled() -> Self {
        Self::new(FailureKind::Cancelled, "cancelled")
    }

    pub(crate) fn timeout(what: &str) -> Self {
        Self::new(FailureKind::Timeout, format!("{what} timed out"))
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for FetchError {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    InvalidUrl,
    Network,
    Timeout,
    HttpStatus(u16),
    TooManyRedirects,
    TooLarge { max_bytes: u64, actual: Option<u64> },
    UnsupportedContent { content_type: String },
    RenderCrash,
    DecodeFailure,
    /// The enrichment task itself failed, e.g. a panic in a collaborator.
    Internal,
    Cancelled,
}

impl FailureKind {
    /// Transport-level failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FailureKind::Network | FailureKind::Timeout)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidUrl => write!(f, "invalid url"),
            FailureKind::Network => write!(f, "network error"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::TooManyRedirects => write!(f, "too many redirects"),
            FailureKind::TooLarge { max_bytes, actual } => {
                write!(f, "response too large (max {max_bytes}, actual {actual:?})")
            }
            FailureKind::UnsupportedContent { content_type } => {
                write!(f, "unsupported content type {content_type}")
            }
            FailureKind::RenderCrash => write!(f, "renderer crashed"),
            FailureKind::DecodeFailure => write!(f, "decode failure"),
            FailureKind::Internal => write!(f, "internal error"),
            FailureKind::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub favicon_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThumbnailSource {
    Screenshot,
    Favicon,
    /// The bookmark itself points at an image.
    Image,
    Placeholder,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thumbnail {
    pub url: String,
    #[serde(with = "base64_bytes")]
    pub image_bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub source: ThumbnailSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Ok,
    PartialFailure,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentResult {
    pub url: String,
    pub metadata: Option<Metadata>,
    pub thumbnail: Option<Thumbnail>,
    pub fetched_at: DateTime<Utc>,
    pub outcome: Outcome,
    pub error_kind: Option<FailureKind>,
}

impl EnrichmentResult {
    pub fn title(&self) -> Option<&str> {
        self.metadata.as_ref().and_then(|m| m.title.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub url: String,
    pub result: EnrichmentResult,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
