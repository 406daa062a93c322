//! Bookmark preview engine: fetch, render, extract, thumbnail and cache.
mod cache;
mod chromium;
mod decode;
mod extract;
mod fetch;
mod filename;
mod handle;
mod normalize;
mod persist;
mod pipeline;
mod render;
mod settings;
mod sink;
mod strategy;
mod summary;
mod thumbnail;
mod types;

pub use cache::{Cache, CacheError, DiskCache, MemoryCache};
pub use chromium::ChromiumSessionFactory;
pub use decode::{decode_html, DecodedHtml};
pub use extract::{looks_like_challenge, ExtractedPage, Extractor, HtmlMetadataExtractor};
pub use fetch::{Fetcher, ReqwestFetcher};
pub use filename::{cache_file_name, thumbnail_file_name};
pub use handle::PipelineHandle;
pub use normalize::cache_key;
pub use persist::{ensure_dir, AtomicFileWriter, PersistError};
pub use pipeline::{Pipeline, PipelineBuilder, RequestState};
pub use render::{
    PooledRenderer, RenderOutput, RenderResult, RenderSession, Renderer, SessionFactory,
    SessionLease, SessionPool, MAX_CONSECUTIVE_SESSION_ERRORS,
};
pub use settings::{
    Clock, FetchSettings, PipelineSettings, RenderSettings, SettingsError, ThumbnailSize,
    DEFAULT_USER_AGENT,
};
pub use sink::{ChannelProgressSink, NullSink, ProgressSink};
pub use strategy::{
    choose_strategy, is_html_like, ContentKind, RenderReason, Strategy, StrategyInputs,
};
pub use summary::BatchSummary;
pub use thumbnail::{ImageThumbnailer, ThumbnailError, Thumbnailer};
pub use types::{
    BookmarkEntry, CacheEntry, EnrichmentRequest, EnrichmentResult, FailureKind, FetchError,
    FetchMetadata, FetchOutput, FetchResult, Metadata, Outcome, PipelineEvent, Stage, Thumbnail,
    ThumbnailSource,
};
