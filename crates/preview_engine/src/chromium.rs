//! Chromium sessions driven over CDP by `chromiumoxide`.
//!
//! Each session owns one browser process with a private temporary profile,
//! so concurrent sessions never contend for profile locks.

use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures_util::StreamExt;
use preview_logging::{preview_debug, preview_warn};
use tempfile::TempDir;
use tokio::task::JoinHandle;

use crate::render::{RenderSession, SessionFactory};
use crate::{FailureKind, FetchError, RenderSettings};

const QUIET_POLL: Duration = Duration::from_millis(250);
const CLOSE_TIMEOUT: Duration = Duration::from_secs(3);
/// Resource count read from the Performance API; stable across two polls means idle.
const RESOURCE_COUNT_JS: &str = "performance.getEntriesByType('resource').length";

#[derive(Debug, Clone)]
pub struct ChromiumSessionFactory {
    settings: RenderSettings,
}

impl ChromiumSessionFactory {
    pub fn new(settings: RenderSettings) -> Self {
        Self { settings }
    }

    fn browser_config(&self, profile: &TempDir) -> Result<BrowserConfig, FetchError> {
        let settings = &self.settings;
        let mut builder = BrowserConfig::builder()
            .user_data_dir(profile.path())
            .window_size(settings.viewport_width, settings.viewport_height)
            .viewport(Some(Viewport {
                width: settings.viewport_width,
                height: settings.viewport_height,
                device_scale_factor: Some(1.0),
                ..Default::default()
            }))
            .args([
                "--disable-gpu",
                "--disable-dev-shm-usage",
                "--disable-extensions",
                "--disable-background-networking",
                "--disable-sync",
                "--no-first-run",
                "--mute-audio",
                "--hide-scrollbars",
            ])
            .arg(format!("--user-agent={}", settings.user_agent));
        if settings.no_sandbox {
            builder = builder.no_sandbox();
        }
        builder
            .build()
            .map_err(|err| FetchError::new(FailureKind::RenderCrash, err))
    }
}

#[async_trait::async_trait]
impl SessionFactory for ChromiumSessionFactory {
    async fn launch(&self) -> Result<Box<dyn RenderSession>, FetchError> {
        let profile = TempDir::new()
            .map_err(|err| FetchError::new(FailureKind::RenderCrash, err.to_string()))?;
        let config = self.browser_config(&profile)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|err| FetchError::new(FailureKind::RenderCrash, err.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    preview_debug!("chromium handler stopped: {}", err);
                    break;
                }
            }
        });

        Ok(Box::new(ChromiumSession {
            browser,
            handler_task,
            page: None,
            _profile: profile,
        }))
    }
}

struct ChromiumSession {
    browser: Browser,
    handler_task: JoinHandle<()>,
    page: Option<Page>,
    _profile: TempDir,
}

fn crash(err: impl std::fmt::Display) -> FetchError {
    FetchError::new(FailureKind::RenderCrash, err.to_string())
}

impl ChromiumSession {
    fn page(&self) -> Result<&Page, FetchError> {
        self.page
            .as_ref()
            .ok_or_else(|| FetchError::new(FailureKind::RenderCrash, "no page open"))
    }

    async fn close_page(&mut self) {
        if let Some(page) = self.page.take() {
            if let Err(err) = page.close().await {
                preview_debug!("closing page failed: {}", err);
            }
        }
    }
}

#[async_trait::async_trait]
impl RenderSession for ChromiumSession {
    async fn navigate(&mut self, url: &str) -> Result<(), FetchError> {
        self.close_page().await;
        let page = self.browser.new_page("about:blank").await.map_err(crash)?;
        // Keep the page even if navigation stalls, so a partial capture is possible.
        self.page = Some(page);
        let page = self.page()?;
        page.goto(url)
            .await
            .map_err(|err| FetchError::new(FailureKind::Network, err.to_string()))?;
        Ok(())
    }

    async fn settle(&mut self, max_wait: Duration) {
        let Ok(page) = self.page() else {
            return;
        };
        let settle = async {
            let mut previous: Option<u64> = None;
            loop {
                let count = match page.evaluate(RESOURCE_COUNT_JS).await {
                    Ok(value) => value.into_value::<u64>().ok(),
                    Err(_) => None,
                };
                if count.is_some() && count == previous {
                    break;
                }
                previous = count;
                tokio::time::sleep(QUIET_POLL).await;
            }
        };
        let _ = tokio::time::timeout(max_wait, settle).await;
        let _ = page.evaluate("window.scrollTo(0, 0)").await;
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, FetchError> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(false)
            .build();
        self.page()?.screenshot(params).await.map_err(crash)
    }

    async fn html(&mut self) -> Result<String, FetchError> {
        self.page()?.content().await.map_err(crash)
    }

    async fn current_url(&mut self) -> Option<String> {
        self.page().ok()?.url().await.ok().flatten()
    }

    async fn shutdown(mut self: Box<Self>) {
        self.close_page().await;
        match tokio::time::timeout(CLOSE_TIMEOUT, self.browser.close()).await {
            Ok(Ok(_)) => {
                let _ = tokio::time::timeout(CLOSE_TIMEOUT, self.browser.wait()).await;
            }
            Ok(Err(err)) => preview_warn!("browser close failed: {}", err),
            Err(_) => preview_warn!("browser close timed out"),
        }
        // Whatever state close left us in, make sure the process is gone.
        if let Some(Err(err)) = self.browser.kill().await {
            preview_debug!("browser kill: {}", err);
        }
        self.handler_task.abort();
    }
}
