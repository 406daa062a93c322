use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThumbnailSize {
    pub width: u32,
    pub height: u32,
}

impl ThumbnailSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for ThumbnailSize {
    fn default() -> Self {
        Self::new(320, 200)
    }
}

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub connect_timeout: Duration,
    pub redirect_limit: usize,
    pub max_bytes: u64,
    pub user_agent: String,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            redirect_limit: 5,
            max_bytes: 5 * 1024 * 1024,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// Upper bound on the wait for the network to go quiet after load.
    pub settle_delay: Duration,
    /// Part of the render timeout kept back for a screenshot of a page that
    /// did not finish loading. Capped at half the timeout.
    pub partial_capture_grace: Duration,
    pub no_sandbox: bool,
    pub user_agent: String,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            viewport_width: 1280,
            viewport_height: 800,
            settle_delay: Duration::from_millis(1500),
            partial_capture_grace: Duration::from_secs(2),
            no_sandbox: false,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

#[derive(Clone)]
pub struct PipelineSettings {
    pub concurrency_limit: usize,
    pub render_concurrency_limit: usize,
    pub fetch_timeout: Duration,
    pub render_timeout: Duration,
    pub cache_ttl: Duration,
    /// Zero disables caching of failed results.
    pub failure_cache_ttl: Duration,
    pub thumbnail_size: ThumbnailSize,
    pub max_thumbnail_bytes: usize,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
    /// Pages with less visible body text than this are rendered instead.
    pub min_body_text_len: usize,
    /// Accept a favicon as the final preview when no screenshot was taken.
    pub favicon_thumbnails: bool,
    pub fetch: FetchSettings,
    pub render: RenderSettings,
    pub clock: Clock,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            concurrency_limit: 8,
            render_concurrency_limit: 2,
            fetch_timeout: Duration::from_secs(10),
            render_timeout: Duration::from_secs(25),
            cache_ttl: Duration::from_secs(7 * 24 * 60 * 60),
            failure_cache_ttl: Duration::from_secs(10 * 60),
            thumbnail_size: ThumbnailSize::default(),
            max_thumbnail_bytes: 64 * 1024,
            max_retries: 2,
            retry_base_delay: Duration::from_millis(250),
            retry_max_delay: Duration::from_secs(5),
            min_body_text_len: 200,
            favicon_thumbnails: true,
            fetch: FetchSettings::default(),
            render: RenderSettings::default(),
            clock: Arc::new(Utc::now),
        }
    }
}

impl fmt::Debug for PipelineSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineSettings")
            .field("concurrency_limit", &self.concurrency_limit)
            .field("render_concurrency_limit", &self.render_concurrency_limit)
            .field("fetch_timeout", &self.fetch_timeout)
            .field("render_timeout", &self.render_timeout)
            .field("cache_ttl", &self.cache_ttl)
            .field("failure_cache_ttl", &self.failure_cache_ttl)
            .field("thumbnail_size", &self.thumbnail_size)
            .field("max_thumbnail_bytes", &self.max_thumbnail_bytes)
            .field("max_retries", &self.max_retries)
            .field("retry_base_delay", &self.retry_base_delay)
            .field("min_body_text_len", &self.min_body_text_len)
            .field("favicon_thumbnails", &self.favicon_thumbnails)
            .field("fetch", &self.fetch)
            .field("render", &self.render)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

impl PipelineSettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.concurrency_limit == 0 {
            return Err(SettingsError::Zero("concurrency_limit"));
        }
        if self.render_concurrency_limit == 0 {
            return Err(SettingsError::Zero("render_concurrency_limit"));
        }
        if self.fetch_timeout.is_zero() {
            return Err(SettingsError::Zero("fetch_timeout"));
        }
        if self.render_timeout.is_zero() {
            return Err(SettingsError::Zero("render_timeout"));
        }
        if self.thumbnail_size.width == 0 || self.thumbnail_size.height == 0 {
            return Err(SettingsError::Zero("thumbnail_size"));
        }
        if self.max_thumbnail_bytes == 0 {
            return Err(SettingsError::Zero("max_thumbnail_bytes"));
        }
        Ok(())
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// Delay before retry number `attempt` (1-based), doubling each time.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self.retry_base_delay.saturating_mul(1u32 << exponent);
        delay.min(self.retry_max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_is_capped() {
        let settings = PipelineSettings {
            retry_base_delay: Duration::from_millis(100),
            retry_max_delay: Duration::from_millis(350),
            ..PipelineSettings::default()
        };
        assert_eq!(settings.backoff_delay(1), Duration::from_millis(100));
        assert_eq!(settings.backoff_delay(2), Duration::from_millis(200));
        assert_eq!(settings.backoff_delay(3), Duration::from_millis(350));
        assert_eq!(settings.backoff_delay(40), Duration::from_millis(350));
    }

    #[test]
    fn zero_limits_are_rejected() {
        let settings = PipelineSettings {
            render_concurrency_limit: 0,
            ..PipelineSettings::default()
        };
        assert_eq!(
            settings.validate(),
            Err(SettingsError::Zero("render_concurrency_limit"))
        );
        assert!(PipelineSettings::default().validate().is_ok());
    }
}
