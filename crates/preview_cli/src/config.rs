use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use preview_engine::{PipelineSettings, ThumbnailSize};
use ron::extensions::Extensions;
use serde::Deserialize;

use crate::cli::Cli;

pub const DEFAULT_MAX_FAILURE_RATE: f64 = 0.5;

/// Options read from a `--config` RON file. Every key is optional; missing
/// keys keep the built-in defaults.
///
/// ```ron
/// (
///     concurrency_limit: 4,
///     fetch_timeout_secs: 15,
///     thumbnail_width: 480,
///     thumbnail_height: 300,
/// )
/// ```
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub concurrency_limit: Option<usize>,
    pub render_concurrency_limit: Option<usize>,
    pub fetch_timeout_secs: Option<u64>,
    pub render_timeout_secs: Option<u64>,
    pub connect_timeout_secs: Option<u64>,
    pub cache_ttl_secs: Option<u64>,
    pub failure_cache_ttl_secs: Option<u64>,
    pub thumbnail_width: Option<u32>,
    pub thumbnail_height: Option<u32>,
    pub max_thumbnail_bytes: Option<usize>,
    pub max_retries: Option<u32>,
    pub retry_base_delay_ms: Option<u64>,
    pub min_body_text_len: Option<usize>,
    pub favicon_thumbnails: Option<bool>,
    pub redirect_limit: Option<usize>,
    pub max_bytes: Option<u64>,
    pub user_agent: Option<String>,
    pub viewport_width: Option<u32>,
    pub viewport_height: Option<u32>,
    pub settle_delay_ms: Option<u64>,
    pub no_sandbox: Option<bool>,
    pub force_render: Option<bool>,
    pub max_failure_rate: Option<f64>,
}

impl FileConfig {
    pub fn parse(text: &str) -> Result<Self, ron::error::SpannedError> {
        ron::Options::default()
            .with_default_extension(Extensions::IMPLICIT_SOME)
            .from_str(text)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn apply(&self, settings: &mut PipelineSettings) {
        set(&mut settings.concurrency_limit, self.concurrency_limit);
        set(
            &mut settings.render_concurrency_limit,
            self.render_concurrency_limit,
        );
        set(&mut settings.fetch_timeout, self.fetch_timeout_secs.map(Duration::from_secs));
        set(&mut settings.render_timeout, self.render_timeout_secs.map(Duration::from_secs));
        set(&mut settings.cache_ttl, self.cache_ttl_secs.map(Duration::from_secs));
        set(
            &mut settings.failure_cache_ttl,
            self.failure_cache_ttl_secs.map(Duration::from_secs),
        );
        set(&mut settings.max_thumbnail_bytes, self.max_thumbnail_bytes);
        set(&mut settings.max_retries, self.max_retries);
        set(
            &mut settings.retry_base_delay,
            self.retry_base_delay_ms.map(Duration::from_millis),
        );
        set(&mut settings.min_body_text_len, self.min_body_text_len);
        set(&mut settings.favicon_thumbnails, self.favicon_thumbnails);
        if self.thumbnail_width.is_some() || self.thumbnail_height.is_some() {
            settings.thumbnail_size = ThumbnailSize::new(
                self.thumbnail_width.unwrap_or(settings.thumbnail_size.width),
                self.thumbnail_height.unwrap_or(settings.thumbnail_size.height),
            );
        }

        let fetch = &mut settings.fetch;
        set(
            &mut fetch.connect_timeout,
            self.connect_timeout_secs.map(Duration::from_secs),
        );
        set(&mut fetch.redirect_limit, self.redirect_limit);
        set(&mut fetch.max_bytes, self.max_bytes);

        let render = &mut settings.render;
        set(&mut render.viewport_width, self.viewport_width);
        set(&mut render.viewport_height, self.viewport_height);
        set(&mut render.settle_delay, self.settle_delay_ms.map(Duration::from_millis));
        set(&mut render.no_sandbox, self.no_sandbox);

        if let Some(user_agent) = &self.user_agent {
            settings.fetch.user_agent = user_agent.clone();
            settings.render.user_agent = user_agent.clone();
        }
    }
}

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

/// Settings for one run: defaults, then the config file, then flags.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub settings: PipelineSettings,
    pub force_render: bool,
    pub max_failure_rate: f64,
}

impl RunOptions {
    pub fn resolve(cli: &Cli, file: &FileConfig) -> Self {
        let mut settings = PipelineSettings::default();
        file.apply(&mut settings);

        let overrides = &cli.overrides;
        set(&mut settings.concurrency_limit, overrides.concurrency);
        set(
            &mut settings.render_concurrency_limit,
            overrides.render_concurrency,
        );
        set(&mut settings.fetch_timeout, overrides.fetch_timeout.map(Duration::from_secs));
        set(&mut settings.render_timeout, overrides.render_timeout.map(Duration::from_secs));
        set(&mut settings.max_retries, overrides.max_retries);
        set(
            &mut settings.cache_ttl,
            overrides
                .cache_ttl_hours
                .map(|hours| Duration::from_secs(hours.saturating_mul(3600))),
        );
        if overrides.no_sandbox {
            settings.render.no_sandbox = true;
        }
        if cli.no_favicons {
            settings.favicon_thumbnails = false;
        }

        Self {
            settings,
            force_render: cli.force_render || file.force_render.unwrap_or(false),
            max_failure_rate: cli
                .max_failure_rate
                .or(file.max_failure_rate)
                .unwrap_or(DEFAULT_MAX_FAILURE_RATE),
        }
    }
}
