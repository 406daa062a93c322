use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_DISPOSITION, CONTENT_TYPE,
};

use crate::{FailureKind, FetchError, FetchMetadata, FetchOutput, FetchResult, FetchSettings};

#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    /// Single GET of `url`, bounded by `timeout`. Never retries.
    async fn fetch(&self, url: &str, timeout: Duration) -> FetchResult;
}

#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    settings: FetchSettings,
}

impl ReqwestFetcher {
    pub fn new(settings: FetchSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &FetchSettings {
        &self.settings
    }
}

fn build_client(
    settings: &FetchSettings,
    redirect_counter: Arc<AtomicUsize>,
) -> Result<reqwest::Client, FetchError> {
    let redirect_limit = settings.redirect_limit;
    let policy = reqwest::redirect::Policy::custom(move |attempt| {
        let count = attempt.previous().len();
        redirect_counter.store(count, Ordering::Relaxed);
        if count >= redirect_limit {
            attempt.error("redirect limit exceeded")
        } else if attempt.previous().iter().any(|seen| seen == attempt.url()) {
            attempt.error("redirect loop")
        } else {
            attempt.follow()
        }
    });

    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/*;q=0.8,*/*;q=0.7",
        ),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

    reqwest::Client::builder()
        .connect_timeout(settings.connect_timeout)
        .user_agent(settings.user_agent.clone())
        .default_headers(headers)
        .redirect(policy)
        .build()
        .map_err(|err| FetchError::new(FailureKind::Network, err.to_string()))
}

#[async_trait::async_trait]
impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, url: &str, timeout: Duration) -> FetchResult {
        let parsed = reqwest::Url::parse(url)
            .map_err(|err| FetchError::new(FailureKind::InvalidUrl, err.to_string()))?;

        // The whole exchange, body included, shares one deadline.
        match tokio::time::timeout(timeout, self.fetch_inner(parsed, url)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::timeout("fetch")),
        }
    }
}

impl ReqwestFetcher {
    async fn fetch_inner(&self, parsed: reqwest::Url, url: &str) -> FetchResult {
        let redirect_counter = Arc::new(AtomicUsize::new(0));
        let client = build_client(&self.settings, redirect_counter.clone())?;

        let response = client
            .get(parsed)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::new(
                FailureKind::HttpStatus(status.as_u16()),
                status.to_string(),
            ));
        }

        let max_bytes = self.settings.max_bytes;
        if let Some(content_len) = response.content_length() {
            if content_len > max_bytes {
                return Err(FetchError::new(
                    FailureKind::TooLarge {
                        max_bytes,
                        actual: Some(content_len),
                    },
                    "response too large",
                ));
            }
        }

        let final_url = response.url().to_string();
        let content_type = header_string(response.headers(), CONTENT_TYPE);
        let content_disposition = header_string(response.headers(), CONTENT_DISPOSITION);

        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            let next_len = bytes.len() as u64 + chunk.len() as u64;
            if next_len > max_bytes {
                return Err(FetchError::new(
                    FailureKind::TooLarge {
                        max_bytes,
                        actual: Some(next_len),
                    },
                    "response too large",
                ));
            }
            bytes.extend_from_slice(&chunk);
        }

        let metadata = FetchMetadata {
            original_url: url.to_string(),
            final_url,
            redirect_count: redirect_counter.load(Ordering::Relaxed),
            content_type,
            content_disposition,
            byte_len: bytes.len() as u64,
        };

        Ok(FetchOutput { bytes, metadata })
    }
}

fn header_string(headers: &HeaderMap, name: HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string())
}

fn map_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        return FetchError::new(FailureKind::Timeout, err.to_string());
    }
    if err.is_redirect() {
        return FetchError::new(FailureKind::TooManyRedirects, err.to_string());
    }
    FetchError::new(FailureKind::Network, err.to_string())
}
