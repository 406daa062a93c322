//! Batch orchestration.
//!
//! Each request is driven through an explicit [`RequestState`] machine:
//! cache lookup, bounded fetch with retries, an optional single render
//! fallback, then extraction, thumbnailing and cache write-back. Every
//! request yields exactly one [`EnrichmentResult`], cancellation included.
//!
//! Once started, a request is bounded by
//! `fetch_timeout * (1 + max_retries) + render_timeout`. Fetch attempts and
//! retry backoff share the first part; the render gets the rest.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use preview_logging::{preview_debug, preview_error, preview_info, preview_warn};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::cache::{Cache, MemoryCache};
use crate::chromium::ChromiumSessionFactory;
use crate::decode::decode_html;
use crate::extract::{ExtractedPage, Extractor, HtmlMetadataExtractor};
use crate::fetch::{Fetcher, ReqwestFetcher};
use crate::normalize::cache_key;
use crate::render::{
    PooledRenderer, RenderOutput, RenderResult, Renderer, SessionFactory, SessionPool,
};
use crate::sink::{NullSink, ProgressSink};
use crate::strategy::{
    choose_strategy, is_html_like, ContentKind, RenderReason, Strategy, StrategyInputs,
};
use crate::thumbnail::{ImageThumbnailer, Thumbnailer};
use crate::{
    EnrichmentRequest, EnrichmentResult, FailureKind, FetchError, FetchOutput, FetchResult,
    Metadata, Outcome, PipelineEvent, PipelineSettings, SettingsError, Stage, Thumbnail,
    ThumbnailSource,
};

/// Where one request currently is. `Done` is terminal.
#[derive(Debug)]
pub enum RequestState {
    Pending,
    Fetching {
        attempt: u32,
    },
    Retrying {
        attempt: u32,
        delay: Duration,
        error: FetchError,
    },
    Rendering {
        reason: RenderReason,
        last_error: Option<FetchError>,
    },
    Done(EnrichmentResult),
}

struct Inner {
    settings: PipelineSettings,
    fetcher: Arc<dyn Fetcher>,
    renderer: Arc<dyn Renderer>,
    extractor: Arc<dyn Extractor>,
    thumbnailer: Arc<dyn Thumbnailer>,
    cache: Arc<dyn Cache>,
    cancel: CancellationToken,
}

/// The enrichment orchestrator. Cloning shares collaborators and the
/// cancellation token; once cancelled, a pipeline stays cancelled.
#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<Inner>,
}

pub struct PipelineBuilder {
    settings: PipelineSettings,
    fetcher: Option<Arc<dyn Fetcher>>,
    renderer: Option<Arc<dyn Renderer>>,
    session_factory: Option<Arc<dyn SessionFactory>>,
    extractor: Option<Arc<dyn Extractor>>,
    thumbnailer: Option<Arc<dyn Thumbnailer>>,
    cache: Option<Arc<dyn Cache>>,
}

impl PipelineBuilder {
    pub fn fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Replaces the pooled renderer entirely; `session_factory` is then unused.
    pub fn renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Sessions for the default pooled renderer (Chromium when unset).
    pub fn session_factory(mut self, factory: Arc<dyn SessionFactory>) -> Self {
        self.session_factory = Some(factory);
        self
    }

    pub fn extractor(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn thumbnailer(mut self, thumbnailer: Arc<dyn Thumbnailer>) -> Self {
        self.thumbnailer = Some(thumbnailer);
        self
    }

    pub fn cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn build(self) -> Result<Pipeline, SettingsError> {
        self.settings.validate()?;
        let settings = self.settings;
        let cancel = CancellationToken::new();

        let renderer: Arc<dyn Renderer> = match self.renderer {
            Some(renderer) => renderer,
            None => {
                let factory: Arc<dyn SessionFactory> = match self.session_factory {
                    Some(factory) => factory,
                    None => Arc::new(ChromiumSessionFactory::new(settings.render.clone())),
                };
                let pool = SessionPool::new(
                    factory,
                    settings.render_concurrency_limit,
                    cancel.child_token(),
                );
                Arc::new(PooledRenderer::new(
                    pool,
                    settings.render.settle_delay,
                    settings.render.partial_capture_grace,
                ))
            }
        };
        let fetcher: Arc<dyn Fetcher> = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(ReqwestFetcher::new(settings.fetch.clone())),
        };
        let extractor: Arc<dyn Extractor> = match self.extractor {
            Some(extractor) => extractor,
            None => Arc::new(HtmlMetadataExtractor),
        };
        let thumbnailer: Arc<dyn Thumbnailer> = match self.thumbnailer {
            Some(thumbnailer) => thumbnailer,
            None => Arc::new(ImageThumbnailer::new(settings.max_thumbnail_bytes)),
        };
        let cache: Arc<dyn Cache> = match self.cache {
            Some(cache) => cache,
            None => Arc::new(MemoryCache::new()),
        };

        Ok(Pipeline {
            inner: Arc::new(Inner {
                settings,
                fetcher,
                renderer,
                extractor,
                thumbnailer,
                cache,
                cancel,
            }),
        })
    }
}

/// A request that survived de-duplication.
enum Queued {
    Valid(EnrichmentRequest),
    Invalid(EnrichmentRequest, FetchError),
}

/// Sort by descending priority (stable) and keep the first request per
/// cache key. Duplicates contribute their `force_render` flag.
fn prepare(mut requests: Vec<EnrichmentRequest>) -> Vec<Queued> {
    requests.sort_by_key(|request| std::cmp::Reverse(request.priority));

    let mut queue: Vec<Queued> = Vec::with_capacity(requests.len());
    let mut seen: HashMap<String, usize> = HashMap::new();
    for request in requests {
        let (key, error) = match cache_key(&request.url) {
            Ok(key) => (key, None),
            Err(err) => (request.url.trim().to_string(), Some(err)),
        };
        if let Some(&index) = seen.get(&key) {
            if let Queued::Valid(existing) = &mut queue[index] {
                existing.force_render |= request.force_render;
            }
            continue;
        }
        seen.insert(key, queue.len());
        queue.push(match error {
            None => Queued::Valid(request),
            Some(err) => Queued::Invalid(request, err),
        });
    }
    queue
}

/// Far enough out to stand in for "no deadline".
const FAR_FUTURE: Duration = Duration::from_secs(30 * 365 * 24 * 60 * 60);

fn deadline_after(start: Instant, budget: Duration) -> Instant {
    start
        .checked_add(budget)
        .unwrap_or_else(|| start + FAR_FUTURE)
}

/// Per-request context carried across state transitions.
struct Job {
    request: EnrichmentRequest,
    started: Instant,
    /// Fetch slot; released before rendering.
    permit: Option<OwnedSemaphorePermit>,
    /// Parse of the fetched page, kept in case the render fails.
    fetched: Option<ExtractedPage>,
}

fn progress(url: &str, stage: Stage) -> PipelineEvent {
    PipelineEvent::Progress {
        url: url.to_string(),
        stage,
    }
}

impl Pipeline {
    pub fn builder(settings: PipelineSettings) -> PipelineBuilder {
        PipelineBuilder {
            settings,
            fetcher: None,
            renderer: None,
            session_factory: None,
            extractor: None,
            thumbnailer: None,
            cache: None,
        }
    }

    pub fn new(settings: PipelineSettings) -> Result<Self, SettingsError> {
        Self::builder(settings).build()
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.inner.settings
    }

    /// Cooperatively cancel all work. In-flight requests resolve as `Cancelled`.
    pub fn cancel(&self) {
        self.inner.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Cancel and wait for every renderer session to be torn down.
    pub async fn shutdown(&self) {
        self.cancel();
        self.inner.renderer.shutdown().await;
    }

    /// Enrich a batch, returning one result per unique URL in completion order.
    pub async fn enrich_all<I>(
        &self,
        requests: I,
        concurrency_limit: usize,
    ) -> Vec<EnrichmentResult>
    where
        I: IntoIterator,
        I::Item: Into<EnrichmentRequest>,
    {
        self.run(requests, concurrency_limit, Arc::new(NullSink)).await
    }

    /// Like [`Pipeline::enrich_all`], streaming progress and each result to `sink`
    /// as soon as it is ready.
    pub async fn run<I>(
        &self,
        requests: I,
        concurrency_limit: usize,
        sink: Arc<dyn ProgressSink>,
    ) -> Vec<EnrichmentResult>
    where
        I: IntoIterator,
        I::Item: Into<EnrichmentRequest>,
    {
        let requests: Vec<EnrichmentRequest> = requests.into_iter().map(Into::into).collect();
        let submitted = requests.len();
        let queue = prepare(requests);
        let limit = concurrency_limit.max(1);
        preview_info!(
            "enriching {} urls ({} unique) with concurrency {}",
            submitted,
            queue.len(),
            limit
        );

        let mut results = Vec::with_capacity(queue.len());
        let emit = |result: EnrichmentResult, results: &mut Vec<EnrichmentResult>| {
            sink.emit(PipelineEvent::Completed(result.clone()));
            results.push(result);
        };

        // Cache hits resolve before any slot is taken.
        let mut misses = Vec::new();
        for queued in queue {
            match queued {
                Queued::Invalid(request, err) => {
                    preview_warn!("skipping {}: {}", request.url, err);
                    emit(self.failed_result(&request.url, err.kind, None), &mut results);
                }
                Queued::Valid(request) => match self.cached(&request).await {
                    Some(result) => emit(result, &mut results),
                    None => {
                        sink.emit(progress(&request.url, Stage::Queued));
                        misses.push(request);
                    }
                },
            }
        }

        let permits = Arc::new(Semaphore::new(limit));
        let mut tasks = JoinSet::new();
        let mut in_flight: HashMap<tokio::task::Id, String> = HashMap::new();
        let mut pending = misses.into_iter();
        while let Some(request) = pending.next() {
            let permit = tokio::select! {
                biased;
                _ = self.inner.cancel.cancelled() => None,
                permit = permits.clone().acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                for request in std::iter::once(request).chain(pending.by_ref()) {
                    emit(self.cancelled_result(&request.url), &mut results);
                }
                break;
            };

            let url = request.url.clone();
            let pipeline = self.clone();
            let task_sink = sink.clone();
            let handle = tasks.spawn(async move {
                let result = pipeline.process(request, permit, task_sink.as_ref()).await;
                task_sink.emit(PipelineEvent::Completed(result.clone()));
                result
            });
            in_flight.insert(handle.id(), url);
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((id, result)) => {
                    in_flight.remove(&id);
                    results.push(result);
                }
                Err(err) => {
                    let url = in_flight.remove(&err.id()).unwrap_or_default();
                    let kind = if err.is_cancelled() {
                        FailureKind::Cancelled
                    } else {
                        preview_error!("enrichment of {} panicked: {}", url, err);
                        FailureKind::Internal
                    };
                    emit(self.failed_result(&url, kind, None), &mut results);
                }
            }
        }

        let failed = results
            .iter()
            .filter(|result| result.outcome == Outcome::Failure)
            .count();
        preview_info!(
            "enrichment finished: {} results, {} failed",
            results.len(),
            failed
        );
        results
    }

    async fn cached(&self, request: &EnrichmentRequest) -> Option<EnrichmentResult> {
        if request.force_render {
            return None;
        }
        let entry = self.inner.cache.get(&request.url).await?;
        if entry.is_fresh(self.inner.settings.now()) {
            preview_debug!("cache hit for {}", request.url);
            Some(entry.result)
        } else {
            preview_debug!("cache entry for {} expired at {}", request.url, entry.expires_at);
            None
        }
    }

    async fn process(
        &self,
        request: EnrichmentRequest,
        permit: OwnedSemaphorePermit,
        sink: &dyn ProgressSink,
    ) -> EnrichmentResult {
        let url = request.url.clone();
        let mut job = Job {
            request,
            started: Instant::now(),
            permit: Some(permit),
            fetched: None,
        };

        let mut state = RequestState::Pending;
        let result = loop {
            state = match state {
                RequestState::Done(result) => break result,
                current => tokio::select! {
                    biased;
                    _ = self.inner.cancel.cancelled() => {
                        RequestState::Done(self.cancelled_result(&url))
                    }
                    next = self.step(&mut job, current, sink) => next,
                },
            };
        };
        job.permit = None;

        if result.error_kind != Some(FailureKind::Cancelled) {
            self.write_back(&url, &result).await;
        }
        result
    }

    async fn step(
        &self,
        job: &mut Job,
        state: RequestState,
        sink: &dyn ProgressSink,
    ) -> RequestState {
        let settings = &self.inner.settings;
        let url = job.request.url.clone();
        match state {
            RequestState::Pending => RequestState::Fetching { attempt: 1 },
            RequestState::Fetching { attempt } => {
                sink.emit(progress(&url, Stage::Fetching));
                let fetch_deadline = self.fetch_deadline(job);
                let budget = fetch_deadline.saturating_duration_since(Instant::now());
                match self.fetch_once(&url, settings.fetch_timeout.min(budget)).await {
                    Err(error) if error.kind.is_retryable() && attempt <= settings.max_retries => {
                        let delay = settings.backoff_delay(attempt);
                        if Instant::now() + delay < fetch_deadline {
                            RequestState::Retrying {
                                attempt,
                                delay,
                                error,
                            }
                        } else {
                            preview_debug!("no time left to retry {} after {}", url, error);
                            self.after_fetch(job, Err(error), sink).await
                        }
                    }
                    result => self.after_fetch(job, result, sink).await,
                }
            }
            RequestState::Retrying {
                attempt,
                delay,
                error,
            } => {
                preview_debug!(
                    "attempt {} for {} failed ({}); retrying in {:?}",
                    attempt,
                    url,
                    error,
                    delay
                );
                sink.emit(progress(&url, Stage::Retrying));
                tokio::time::sleep(delay).await;
                RequestState::Fetching {
                    attempt: attempt + 1,
                }
            }
            RequestState::Rendering { reason, last_error } => {
                job.permit = None;
                match &last_error {
                    Some(err) => preview_info!("rendering {} after fetch failure: {}", url, err),
                    None => preview_info!("rendering {} ({:?})", url, reason),
                }
                sink.emit(progress(&url, Stage::Rendering));
                let remaining = self.deadline(job).saturating_duration_since(Instant::now());
                let timeout = settings.render_timeout.min(remaining);
                let render = self.inner.renderer.render(&url, timeout);
                let rendered = match tokio::time::timeout(timeout, render).await {
                    Ok(rendered) => rendered,
                    Err(_) => {
                        preview_warn!("render of {} did not resolve within {:?}", url, timeout);
                        Err(FetchError::timeout("render"))
                    }
                };
                RequestState::Done(self.after_render(job, rendered, sink))
            }
            RequestState::Done(result) => RequestState::Done(result),
        }
    }

    /// End of the fetch phase: every attempt and backoff fits before it.
    fn fetch_deadline(&self, job: &Job) -> Instant {
        let settings = &self.inner.settings;
        let attempts = settings.max_retries.saturating_add(1);
        deadline_after(job.started, settings.fetch_timeout.saturating_mul(attempts))
    }

    /// Hard end of the request: the fetch phase plus one render.
    fn deadline(&self, job: &Job) -> Instant {
        deadline_after(self.fetch_deadline(job), self.inner.settings.render_timeout)
    }

    async fn fetch_once(&self, url: &str, timeout: Duration) -> FetchResult {
        match tokio::time::timeout(timeout, self.inner.fetcher.fetch(url, timeout)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::timeout("fetch")),
        }
    }

    async fn after_fetch(
        &self,
        job: &mut Job,
        result: FetchResult,
        sink: &dyn ProgressSink,
    ) -> RequestState {
        let url = job.request.url.clone();
        let page = match &result {
            Ok(output) if is_html_like(output) => {
                sink.emit(progress(&url, Stage::Extracting));
                let decoded = decode_html(&output.bytes, output.metadata.content_type.as_deref());
                Some(
                    self.inner
                        .extractor
                        .extract(&decoded.html, &output.metadata.final_url),
                )
            }
            _ => None,
        };

        let inputs = StrategyInputs {
            force_render: job.request.force_render,
            min_body_text_len: self.inner.settings.min_body_text_len,
            page: page.as_ref(),
        };
        let strategy = choose_strategy(&result, &inputs);

        match (strategy, result) {
            (Strategy::AcceptContent(ContentKind::Html), Ok(_)) => match page {
                Some(page) => {
                    let deadline = self.deadline(job);
                    RequestState::Done(self.finalize_page(&url, page, deadline, sink).await)
                }
                None => RequestState::Done(self.failed_result(
                    &url,
                    FailureKind::DecodeFailure,
                    None,
                )),
            },
            (Strategy::AcceptContent(ContentKind::Image), Ok(output)) => {
                RequestState::Done(self.finalize_image(&url, &output, sink))
            }
            (Strategy::AcceptContent(_), Err(err)) => {
                RequestState::Done(self.failed_result(&url, err.kind, None))
            }
            (Strategy::Render(reason), result) => {
                job.fetched = page;
                RequestState::Rendering {
                    reason,
                    last_error: result.err(),
                }
            }
            (Strategy::Fail(kind), Ok(output)) => {
                preview_info!("{} is not a page ({}), not rendering", url, kind);
                let metadata = file_metadata(&output.metadata.final_url);
                RequestState::Done(self.failed_result(&url, kind, Some(metadata)))
            }
            (Strategy::Fail(kind), Err(err)) => {
                preview_warn!("enrichment of {} failed: {}", url, err);
                RequestState::Done(self.failed_result(&url, kind, None))
            }
        }
    }

    async fn finalize_page(
        &self,
        url: &str,
        page: ExtractedPage,
        deadline: Instant,
        sink: &dyn ProgressSink,
    ) -> EnrichmentResult {
        sink.emit(progress(url, Stage::Thumbnailing));
        let thumbnail = match self.favicon_thumbnail(url, &page.metadata, deadline).await {
            Some(thumbnail) => thumbnail,
            None => self.placeholder(url),
        };
        EnrichmentResult {
            url: url.to_string(),
            metadata: Some(page.metadata),
            thumbnail: Some(thumbnail),
            fetched_at: self.inner.settings.now(),
            outcome: Outcome::Ok,
            error_kind: None,
        }
    }

    /// Single attempt; any failure just means no favicon.
    async fn favicon_thumbnail(
        &self,
        url: &str,
        metadata: &Metadata,
        deadline: Instant,
    ) -> Option<Thumbnail> {
        if !self.inner.settings.favicon_thumbnails {
            return None;
        }
        let favicon_url = metadata.favicon_url.as_deref()?;
        let remaining = deadline.saturating_duration_since(Instant::now());
        let timeout = self.inner.settings.fetch_timeout.min(remaining);
        let output = match self.fetch_once(favicon_url, timeout).await {
            Ok(output) => output,
            Err(err) => {
                preview_debug!("favicon {} unavailable: {}", favicon_url, err);
                return None;
            }
        };
        let (thumbnail, error) = self.inner.thumbnailer.make_thumbnail(
            url,
            Some(&output.bytes),
            self.inner.settings.thumbnail_size,
            ThumbnailSource::Favicon,
        );
        match error {
            None => Some(thumbnail),
            Some(_) => None,
        }
    }

    fn finalize_image(
        &self,
        url: &str,
        output: &FetchOutput,
        sink: &dyn ProgressSink,
    ) -> EnrichmentResult {
        sink.emit(progress(url, Stage::Thumbnailing));
        let (thumbnail, error) = self.inner.thumbnailer.make_thumbnail(
            url,
            Some(&output.bytes),
            self.inner.settings.thumbnail_size,
            ThumbnailSource::Image,
        );
        EnrichmentResult {
            url: url.to_string(),
            metadata: Some(file_metadata(&output.metadata.final_url)),
            thumbnail: Some(thumbnail),
            fetched_at: self.inner.settings.now(),
            outcome: if error.is_some() {
                Outcome::PartialFailure
            } else {
                Outcome::Ok
            },
            error_kind: error,
        }
    }

    fn after_render(
        &self,
        job: &mut Job,
        rendered: RenderResult,
        sink: &dyn ProgressSink,
    ) -> EnrichmentResult {
        let url = job.request.url.as_str();
        match rendered {
            Ok(output) => self.finalize_render(job, output, sink),
            Err(err) if err.kind == FailureKind::Cancelled => self.cancelled_result(url),
            Err(err) => {
                preview_warn!("enrichment of {} failed: {}", url, err);
                // Whatever the fetched page told us still goes with the failure.
                let metadata = job.fetched.take().map(|page| page.metadata);
                self.failed_result(url, err.kind, metadata)
            }
        }
    }

    fn finalize_render(
        &self,
        job: &mut Job,
        output: RenderOutput,
        sink: &dyn ProgressSink,
    ) -> EnrichmentResult {
        let url = job.request.url.as_str();
        sink.emit(progress(url, Stage::Extracting));
        let rendered = output
            .html
            .as_deref()
            .map(|html| self.inner.extractor.extract(html, &output.final_url).metadata);
        let fetched = job.fetched.take().map(|page| page.metadata);
        let metadata = match (rendered, fetched) {
            (Some(rendered), Some(fetched)) => Some(merge_metadata(rendered, fetched)),
            (rendered, fetched) => rendered.or(fetched),
        };

        sink.emit(progress(url, Stage::Thumbnailing));
        let (thumbnail, decode_error) = self.inner.thumbnailer.make_thumbnail(
            url,
            output.screenshot.as_deref(),
            self.inner.settings.thumbnail_size,
            ThumbnailSource::Screenshot,
        );

        let error_kind = output.partial.or(decode_error);
        EnrichmentResult {
            url: url.to_string(),
            metadata,
            thumbnail: Some(thumbnail),
            fetched_at: self.inner.settings.now(),
            outcome: if error_kind.is_some() {
                Outcome::PartialFailure
            } else {
                Outcome::Ok
            },
            error_kind,
        }
    }

    async fn write_back(&self, url: &str, result: &EnrichmentResult) {
        let settings = &self.inner.settings;
        let ttl = match result.outcome {
            Outcome::Ok => settings.cache_ttl,
            Outcome::PartialFailure | Outcome::Failure => settings.failure_cache_ttl,
        };
        if ttl.is_zero() {
            return;
        }
        if let Err(err) = self.inner.cache.put(url, result, ttl).await {
            preview_warn!("could not cache result for {}: {}", url, err);
        }
    }

    fn placeholder(&self, url: &str) -> Thumbnail {
        self.inner
            .thumbnailer
            .placeholder(url, self.inner.settings.thumbnail_size)
    }

    /// A terminal result for `kind`. Download-only content is a partial failure.
    fn failed_result(
        &self,
        url: &str,
        kind: FailureKind,
        metadata: Option<Metadata>,
    ) -> EnrichmentResult {
        let outcome = match kind {
            FailureKind::UnsupportedContent { .. } => Outcome::PartialFailure,
            _ => Outcome::Failure,
        };
        EnrichmentResult {
            url: url.to_string(),
            metadata,
            thumbnail: Some(self.placeholder(url)),
            fetched_at: self.inner.settings.now(),
            outcome,
            error_kind: Some(kind),
        }
    }

    fn cancelled_result(&self, url: &str) -> EnrichmentResult {
        self.failed_result(url, FailureKind::Cancelled, None)
    }
}

fn merge_metadata(primary: Metadata, fallback: Metadata) -> Metadata {
    Metadata {
        url: primary.url,
        title: primary.title.or(fallback.title),
        description: primary.description.or(fallback.description),
        favicon_url: primary.favicon_url.or(fallback.favicon_url),
    }
}

/// Metadata for a non-page resource: the file name stands in for a title.
fn file_metadata(url: &str) -> Metadata {
    let title = Url::parse(url).ok().and_then(|parsed| {
        parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back().map(str::to_string))
            .filter(|name| !name.is_empty())
    });
    Metadata {
        url: url.to_string(),
        title,
        description: None,
        favicon_url: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepare_dedupes_by_normalised_url_and_sorts_by_priority() {
        let queue = prepare(vec![
            EnrichmentRequest::new("https://example.com/a#top"),
            EnrichmentRequest::new("https://example.com/b").with_priority(5),
            EnrichmentRequest::new("HTTPS://EXAMPLE.com/a").with_force_render(true),
            EnrichmentRequest::new("ftp://example.com/file"),
        ]);
        let urls: Vec<(&str, bool, bool)> = queue
            .iter()
            .map(|queued| match queued {
                Queued::Valid(request) => (request.url.as_str(), request.force_render, true),
                Queued::Invalid(request, _) => (request.url.as_str(), request.force_render, false),
            })
            .collect();
        assert_eq!(
            urls,
            vec![
                ("https://example.com/b", false, true),
                ("https://example.com/a#top", true, true),
                ("ftp://example.com/file", false, false),
            ]
        );
    }

    #[test]
    fn file_metadata_uses_last_path_segment() {
        assert_eq!(
            file_metadata("https://example.com/docs/report.pdf").title.as_deref(),
            Some("report.pdf")
        );
        assert_eq!(file_metadata("https://example.com/").title, None);
    }

    #[test]
    fn merged_metadata_prefers_rendered_fields() {
        let rendered = Metadata {
            url: "https://example.com/".to_string(),
            title: Some("Rendered".to_string()),
            description: None,
            favicon_url: None,
        };
        let fetched = Metadata {
            url: "https://example.com/".to_string(),
            title: Some("Fetched".to_string()),
            description: Some("From the raw page".to_string()),
            favicon_url: None,
        };
        let merged = merge_metadata(rendered, fetched);
        assert_eq!(merged.title.as_deref(), Some("Rendered"));
        assert_eq!(merged.description.as_deref(), Some("From the raw page"));
    }
}
