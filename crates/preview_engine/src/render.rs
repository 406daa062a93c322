//! Headless rendering behind a bounded, explicitly owned session pool.
//!
//! A [`SessionPool`] hands out [`SessionLease`]s under its own semaphore. A
//! lease returns its session on drop unless the session failed twice in a
//! row or the pool was cancelled, in which case the session is shut down.
//! [`PooledRenderer`] drives one capture per lease. A single deadline covers
//! waiting for a session, launching it and the capture itself.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use preview_logging::{preview_debug, preview_info, preview_warn};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{FailureKind, FetchError};

/// Consecutive failures after which a session is discarded.
pub const MAX_CONSECUTIVE_SESSION_ERRORS: u32 = 2;
const SHUTDOWN_POLL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOutput {
    pub final_url: String,
    /// Final DOM; absent when the page timed out before it could be read.
    pub html: Option<String>,
    pub screenshot: Option<Vec<u8>>,
    /// Set when the capture is incomplete, e.g. `Timeout` with a partial screenshot.
    pub partial: Option<FailureKind>,
}

pub type RenderResult = Result<RenderOutput, FetchError>;

#[async_trait::async_trait]
pub trait Renderer: Send + Sync {
    /// Capture `url`, resolving within `timeout`. Waiting for or launching a
    /// session counts against it.
    async fn render(&self, url: &str, timeout: Duration) -> RenderResult;

    /// Tear down every session; in-flight renders resolve as `Cancelled`.
    async fn shutdown(&self);
}

/// One live browser (or fake) able to capture pages, one at a time.
#[async_trait::async_trait]
pub trait RenderSession: Send {
    async fn navigate(&mut self, url: &str) -> Result<(), FetchError>;

    /// Wait until the network goes quiet, at most `max_wait`.
    async fn settle(&mut self, max_wait: Duration);

    async fn screenshot(&mut self) -> Result<Vec<u8>, FetchError>;

    async fn html(&mut self) -> Result<String, FetchError>;

    async fn current_url(&mut self) -> Option<String>;

    async fn shutdown(self: Box<Self>);
}

#[async_trait::async_trait]
pub trait SessionFactory: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn RenderSession>, FetchError>;
}

struct PooledSession {
    session: Box<dyn RenderSession>,
    consecutive_errors: u32,
}

struct PoolInner {
    factory: Arc<dyn SessionFactory>,
    permits: Arc<Semaphore>,
    idle: Mutex<Vec<PooledSession>>,
    live: AtomicUsize,
    cancel: CancellationToken,
}

impl PoolInner {
    fn take_idle(&self) -> Option<PooledSession> {
        self.idle.lock().ok()?.pop()
    }

    fn drain_idle(&self) -> Vec<PooledSession> {
        match self.idle.lock() {
            Ok(mut idle) => idle.drain(..).collect(),
            Err(poisoned) => poisoned.into_inner().drain(..).collect(),
        }
    }

    async fn retire(&self, pooled: PooledSession) {
        pooled.session.shutdown().await;
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Shared, bounded set of renderer sessions. Cloning shares the pool.
#[derive(Clone)]
pub struct SessionPool {
    inner: Arc<PoolInner>,
}

impl SessionPool {
    pub fn new(factory: Arc<dyn SessionFactory>, size: usize, cancel: CancellationToken) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                factory,
                permits: Arc::new(Semaphore::new(size.max(1))),
                idle: Mutex::new(Vec::new()),
                live: AtomicUsize::new(0),
                cancel,
            }),
        }
    }

    /// Sessions launched and not yet shut down.
    pub fn live_sessions(&self) -> usize {
        self.inner.live.load(Ordering::SeqCst)
    }

    pub fn idle_sessions(&self) -> usize {
        self.inner.idle.lock().map(|idle| idle.len()).unwrap_or(0)
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    pub async fn acquire(&self) -> Result<SessionLease, FetchError> {
        let inner = &self.inner;
        let permit = tokio::select! {
            _ = inner.cancel.cancelled() => return Err(FetchError::cancelled()),
            permit = inner.permits.clone().acquire_owned() => permit
                .map_err(|_| FetchError::cancelled())?,
        };

        let pooled = match inner.take_idle() {
            Some(pooled) => pooled,
            None => {
                let launched = tokio::select! {
                    _ = inner.cancel.cancelled() => return Err(FetchError::cancelled()),
                    launched = inner.factory.launch() => launched,
                };
                let session = launched.map_err(|err| {
                    preview_warn!("renderer session failed to launch: {}", err);
                    FetchError::new(FailureKind::RenderCrash, err.message)
                })?;
                inner.live.fetch_add(1, Ordering::SeqCst);
                preview_debug!("renderer session launched ({} live)", self.live_sessions());
                PooledSession {
                    session,
                    consecutive_errors: 0,
                }
            }
        };

        Ok(SessionLease {
            pooled: Some(pooled),
            pool: self.inner.clone(),
            _permit: permit,
            runtime: tokio::runtime::Handle::current(),
        })
    }

    /// Cancel the pool and wait until every session, idle or leased, is gone.
    pub async fn shutdown(&self, grace: Duration) {
        self.inner.cancel.cancel();
        for pooled in self.inner.drain_idle() {
            self.inner.retire(pooled).await;
        }

        let deadline = Instant::now() + grace;
        while self.live_sessions() > 0 && Instant::now() < deadline {
            tokio::time::sleep(SHUTDOWN_POLL).await;
        }
        let remaining = self.live_sessions();
        if remaining > 0 {
            preview_warn!("{} renderer sessions still alive after shutdown grace", remaining);
        } else {
            preview_info!("renderer pool shut down");
        }
    }
}

/// Exclusive use of one session plus one pool permit.
pub struct SessionLease {
    pooled: Option<PooledSession>,
    pool: Arc<PoolInner>,
    _permit: OwnedSemaphorePermit,
    runtime: tokio::runtime::Handle,
}

impl SessionLease {
    pub fn session(&mut self) -> &mut dyn RenderSession {
        match self.pooled.as_mut() {
            Some(pooled) => pooled.session.as_mut(),
            // Only `Drop` takes the session out.
            None => unreachable!("session lease used after release"),
        }
    }

    pub fn record_success(&mut self) {
        if let Some(pooled) = self.pooled.as_mut() {
            pooled.consecutive_errors = 0;
        }
    }

    pub fn record_error(&mut self) {
        if let Some(pooled) = self.pooled.as_mut() {
            pooled.consecutive_errors += 1;
        }
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.pooled
            .as_ref()
            .map(|pooled| pooled.consecutive_errors)
            .unwrap_or(0)
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        let Some(pooled) = self.pooled.take() else {
            return;
        };
        let healthy = pooled.consecutive_errors < MAX_CONSECUTIVE_SESSION_ERRORS;
        if healthy && !self.pool.cancel.is_cancelled() {
            if let Ok(mut idle) = self.pool.idle.lock() {
                idle.push(pooled);
                return;
            }
        }
        if !healthy {
            preview_warn!(
                "discarding renderer session after {} consecutive errors",
                pooled.consecutive_errors
            );
        }
        // Drop cannot await; hand the teardown to the runtime.
        let pool = self.pool.clone();
        self.runtime.spawn(async move {
            pool.retire(pooled).await;
        });
    }
}

/// Renderer over a [`SessionPool`]: navigate, settle, screenshot, read DOM.
pub struct PooledRenderer {
    pool: SessionPool,
    settle_delay: Duration,
    partial_capture_grace: Duration,
    shutdown_grace: Duration,
}

impl PooledRenderer {
    pub fn new(pool: SessionPool, settle_delay: Duration, partial_capture_grace: Duration) -> Self {
        Self {
            pool,
            settle_delay,
            partial_capture_grace,
            shutdown_grace: Duration::from_secs(5),
        }
    }

    pub fn pool(&self) -> &SessionPool {
        &self.pool
    }

    /// Navigation and the screenshot must finish by `soft_deadline`; the
    /// time up to `deadline` is left for a partial capture.
    async fn capture(
        &self,
        lease: &mut SessionLease,
        url: &str,
        soft_deadline: Instant,
        deadline: Instant,
    ) -> RenderResult {
        match tokio::time::timeout_at(soft_deadline, lease.session().navigate(url)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                lease.record_error();
                return Err(err);
            }
            Err(_) => return self.partial_after_timeout(lease, url, deadline).await,
        }

        let remaining = soft_deadline.saturating_duration_since(Instant::now());
        lease.session().settle(self.settle_delay.min(remaining)).await;

        let screenshot = lease.session().screenshot();
        let screenshot = match tokio::time::timeout_at(soft_deadline, screenshot).await {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(err)) => {
                lease.record_error();
                return Err(err);
            }
            Err(_) => return self.partial_after_timeout(lease, url, deadline).await,
        };

        let current_url = lease.session().current_url();
        let final_url = tokio::time::timeout_at(deadline, current_url)
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| url.to_string());

        match tokio::time::timeout_at(deadline, lease.session().html()).await {
            Ok(Ok(html)) => {
                lease.record_success();
                Ok(RenderOutput {
                    final_url,
                    html: Some(html),
                    screenshot: Some(screenshot),
                    partial: None,
                })
            }
            Ok(Err(err)) => {
                lease.record_error();
                Ok(RenderOutput {
                    final_url,
                    html: None,
                    screenshot: Some(screenshot),
                    partial: Some(err.kind),
                })
            }
            Err(_) => {
                lease.record_error();
                Ok(RenderOutput {
                    final_url,
                    html: None,
                    screenshot: Some(screenshot),
                    partial: Some(FailureKind::Timeout),
                })
            }
        }
    }

    /// The page did not load in time: keep whatever the viewport shows, if
    /// anything, before `deadline`.
    async fn partial_after_timeout(
        &self,
        lease: &mut SessionLease,
        url: &str,
        deadline: Instant,
    ) -> RenderResult {
        lease.record_error();
        match tokio::time::timeout_at(deadline, lease.session().screenshot()).await {
            Ok(Ok(bytes)) if !bytes.is_empty() => {
                preview_debug!("render of {} timed out; kept partial screenshot", url);
                Ok(RenderOutput {
                    final_url: url.to_string(),
                    html: None,
                    screenshot: Some(bytes),
                    partial: Some(FailureKind::Timeout),
                })
            }
            _ => Err(FetchError::timeout("render")),
        }
    }
}

#[async_trait::async_trait]
impl Renderer for PooledRenderer {
    async fn render(&self, url: &str, timeout: Duration) -> RenderResult {
        let deadline = Instant::now() + timeout;
        let soft_deadline = deadline - self.partial_capture_grace.min(timeout / 2);
        let cancel = self.pool.inner.cancel.clone();

        let mut lease = match tokio::time::timeout_at(deadline, self.pool.acquire()).await {
            Ok(lease) => lease?,
            Err(_) => {
                preview_warn!("no renderer session for {} within {:?}", url, timeout);
                return Err(FetchError::timeout("render"));
            }
        };
        tokio::select! {
            // Dropping the lease after cancellation tears the session down.
            _ = cancel.cancelled() => Err(FetchError::cancelled()),
            result = self.capture(&mut lease, url, soft_deadline, deadline) => result,
        }
    }

    async fn shutdown(&self) {
        self.pool.shutdown(self.shutdown_grace).await;
    }
}
