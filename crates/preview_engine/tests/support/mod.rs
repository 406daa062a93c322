//! Counting fakes shared by the pipeline and render pool tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use preview_engine::{
    FailureKind, FetchError, FetchMetadata, FetchOutput, FetchResult, Fetcher, PipelineEvent,
    ProgressSink, RenderOutput, RenderResult, RenderSession, Renderer, SessionFactory,
};

pub fn png(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 200) as u8, (y % 200) as u8, 120])
    });
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

/// A page with a title and well over 200 characters of body text.
pub fn article(title: &str) -> String {
    let paragraph = "Plenty of readable server-rendered text lives in this paragraph. ".repeat(8);
    format!(
        "<html><head><title>{title}</title>\
         <meta name=\"description\" content=\"About {title}\"></head>\
         <body><p>{paragraph}</p></body></html>"
    )
}

/// A client-rendered shell with no visible text.
pub fn app_shell(title: &str) -> String {
    format!(
        "<html><head><title>{title}</title><script src=\"/app.js\"></script></head>\
         <body><div id=\"root\"></div></body></html>"
    )
}

#[derive(Debug, Clone)]
pub enum Reply {
    Html(String),
    Body {
        content_type: &'static str,
        bytes: Vec<u8>,
    },
    Fail(FailureKind),
    /// Never answers; the caller's timeout has to fire.
    Hang,
}

/// Scripted fetcher. The n-th call for a URL gets the n-th reply; the last
/// reply repeats. Unknown URLs answer 404.
#[derive(Default)]
pub struct FakeFetcher {
    replies: Mutex<HashMap<String, Vec<Reply>>>,
    calls: Mutex<Vec<String>>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, url: &str, replies: Vec<Reply>) -> Self {
        self.replies.lock().unwrap().insert(url.to_string(), replies);
        self
    }

    pub fn calls_for(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|u| *u == url).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn call_log(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(&self, url: &str, _timeout: Duration) -> FetchResult {
        let reply = {
            let mut calls = self.calls.lock().unwrap();
            let attempt = calls.iter().filter(|u| *u == url).count();
            calls.push(url.to_string());
            let replies = self.replies.lock().unwrap();
            match replies.get(url) {
                Some(list) if !list.is_empty() => list[attempt.min(list.len() - 1)].clone(),
                _ => Reply::Fail(FailureKind::HttpStatus(404)),
            }
        };

        let (content_type, bytes) = match reply {
            Reply::Html(html) => ("text/html; charset=utf-8", html.into_bytes()),
            Reply::Body {
                content_type,
                bytes,
            } => (content_type, bytes),
            Reply::Fail(kind) => return Err(FetchError::new(kind, "scripted failure")),
            Reply::Hang => return std::future::pending().await,
        };
        Ok(FetchOutput {
            metadata: FetchMetadata {
                original_url: url.to_string(),
                final_url: url.to_string(),
                redirect_count: 0,
                content_type: Some(content_type.to_string()),
                content_disposition: None,
                byte_len: bytes.len() as u64,
            },
            bytes,
        })
    }
}

#[derive(Debug, Clone)]
pub enum RenderReply {
    Page { html: String, delay: Duration },
    Fail(FailureKind),
    /// Runs into the render timeout.
    Hang,
}

/// Renderer answering per URL; unknown URLs crash.
#[derive(Default)]
pub struct FakeRenderer {
    replies: Mutex<HashMap<String, RenderReply>>,
    calls: Mutex<Vec<String>>,
    pub shutdowns: AtomicUsize,
}

impl FakeRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, url: &str, reply: RenderReply) -> Self {
        self.replies.lock().unwrap().insert(url.to_string(), reply);
        self
    }

    pub fn calls_for(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|u| *u == url).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl Renderer for FakeRenderer {
    async fn render(&self, url: &str, timeout: Duration) -> RenderResult {
        self.calls.lock().unwrap().push(url.to_string());
        let reply = self.replies.lock().unwrap().get(url).cloned();
        match reply {
            Some(RenderReply::Page { html, delay }) => {
                tokio::time::sleep(delay).await;
                Ok(RenderOutput {
                    final_url: url.to_string(),
                    html: Some(html),
                    screenshot: Some(png(640, 400)),
                    partial: None,
                })
            }
            Some(RenderReply::Fail(kind)) => Err(FetchError::new(kind, "scripted render failure")),
            Some(RenderReply::Hang) => {
                tokio::time::sleep(timeout).await;
                Err(FetchError::new(FailureKind::Timeout, "render timed out"))
            }
            None => Err(FetchError::new(FailureKind::RenderCrash, "no script")),
        }
    }

    async fn shutdown(&self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionBehaviour {
    Healthy,
    NavigateFails,
    /// Navigation never completes but the viewport can still be captured.
    StallsWithViewport,
    /// Navigation and screenshots never complete.
    Frozen,
    /// `launch` itself never completes.
    NeverLaunches,
}

#[derive(Default)]
pub struct SessionStats {
    pub launched: AtomicUsize,
    pub shut_down: AtomicUsize,
    pub navigations: AtomicUsize,
}

pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached");
}

impl SessionStats {
    pub fn alive(&self) -> usize {
        self.launched.load(Ordering::SeqCst) - self.shut_down.load(Ordering::SeqCst)
    }
}

pub struct FakeSessionFactory {
    behaviour: Arc<Mutex<SessionBehaviour>>,
    pub stats: Arc<SessionStats>,
}

impl FakeSessionFactory {
    pub fn new(behaviour: SessionBehaviour) -> Self {
        Self {
            behaviour: Arc::new(Mutex::new(behaviour)),
            stats: Arc::new(SessionStats::default()),
        }
    }

    /// Applies to live sessions as well as future ones.
    pub fn set_behaviour(&self, behaviour: SessionBehaviour) {
        *self.behaviour.lock().unwrap() = behaviour;
    }
}

#[async_trait::async_trait]
impl SessionFactory for FakeSessionFactory {
    async fn launch(&self) -> Result<Box<dyn RenderSession>, FetchError> {
        if *self.behaviour.lock().unwrap() == SessionBehaviour::NeverLaunches {
            return std::future::pending().await;
        }
        self.stats.launched.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            behaviour: self.behaviour.clone(),
            stats: self.stats.clone(),
            url: None,
        }))
    }
}

struct FakeSession {
    behaviour: Arc<Mutex<SessionBehaviour>>,
    stats: Arc<SessionStats>,
    url: Option<String>,
}

#[async_trait::async_trait]
impl RenderSession for FakeSession {
    async fn navigate(&mut self, url: &str) -> Result<(), FetchError> {
        self.stats.navigations.fetch_add(1, Ordering::SeqCst);
        self.url = Some(url.to_string());
        let behaviour = *self.behaviour.lock().unwrap();
        match behaviour {
            SessionBehaviour::Healthy | SessionBehaviour::NeverLaunches => Ok(()),
            SessionBehaviour::NavigateFails => {
                Err(FetchError::new(FailureKind::Network, "net::ERR_CONNECTION_RESET"))
            }
            SessionBehaviour::StallsWithViewport | SessionBehaviour::Frozen => {
                std::future::pending().await
            }
        }
    }

    async fn settle(&mut self, _max_wait: Duration) {}

    async fn screenshot(&mut self) -> Result<Vec<u8>, FetchError> {
        let behaviour = *self.behaviour.lock().unwrap();
        match behaviour {
            SessionBehaviour::Frozen => std::future::pending().await,
            _ => Ok(png(640, 400)),
        }
    }

    async fn html(&mut self) -> Result<String, FetchError> {
        Ok(article("Rendered page"))
    }

    async fn current_url(&mut self) -> Option<String> {
        self.url.clone()
    }

    async fn shutdown(self: Box<Self>) {
        self.stats.shut_down.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<PipelineEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressSink for RecordingSink {
    fn emit(&self, event: PipelineEvent) {
        self.events.lock().unwrap().push(event);
    }
}
