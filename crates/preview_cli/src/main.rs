mod cli;
mod config;
mod effects;
mod report;

use std::fs;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use chrono::Utc;
use clap::Parser;
use log::LevelFilter;
use preview_core::{dedupe, select_folder, update, AppState, Bookmark, Msg};
use preview_engine::{BatchSummary, DiskCache, EnrichmentResult, Pipeline, PipelineEvent};
use preview_logging::{preview_error, preview_info, preview_warn, LogDestination};

use crate::cli::Cli;
use crate::config::{FileConfig, RunOptions};
use crate::effects::{to_msg, EffectRunner};

const EXIT_TOO_MANY_FAILURES: u8 = 1;
const EXIT_UNREADABLE_INPUT: u8 = 2;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(&cli);

    let bookmarks = match load_bookmarks(&cli) {
        Ok(bookmarks) => bookmarks,
        Err(err) => {
            preview_error!("{:#}", err);
            eprintln!("error: {err:#}");
            return Ok(ExitCode::from(EXIT_UNREADABLE_INPUT));
        }
    };

    let file_config = match &cli.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let options = RunOptions::resolve(&cli, &file_config);

    let mut builder = Pipeline::builder(options.settings.clone());
    if let Some(dir) = &cli.cache_dir {
        let cache = DiskCache::open(dir)
            .with_context(|| format!("opening cache {}", dir.display()))?;
        if cli.clear_cache {
            let removed = cache.clear()?;
            preview_info!("cleared {} cached entries", removed);
        }
        builder = builder.cache(Arc::new(cache));
    }
    let pipeline = builder.build()?;

    let results = run_batch(&pipeline, &bookmarks, options.force_render).await;
    pipeline.shutdown().await;
    let results = results?;

    let summary = BatchSummary::from_results(&results);
    let summary_path = report::write_report(&cli.out, &bookmarks, &results, Utc::now())
        .with_context(|| format!("writing report to {}", cli.out.display()))?;

    println!(
        "{} bookmarks: {} ok, {} partial, {} failed ({} cancelled). Summary: {}",
        summary.total,
        summary.ok,
        summary.partial,
        summary.failed,
        summary.cancelled,
        summary_path.display()
    );

    if summary.exceeds(options.max_failure_rate) {
        preview_warn!(
            "failure rate {:.2} is above {:.2}",
            summary.failure_rate(),
            options.max_failure_rate
        );
        return Ok(ExitCode::from(EXIT_TOO_MANY_FAILURES));
    }
    Ok(ExitCode::SUCCESS)
}

fn init_logging(cli: &Cli) {
    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let destination = match &cli.log_file {
        Some(path) => LogDestination::Both(path.clone()),
        None => LogDestination::Terminal,
    };
    preview_logging::initialize(destination, level);
}

fn load_bookmarks(cli: &Cli) -> anyhow::Result<Vec<Bookmark>> {
    let (format, path) = cli
        .source
        .resolve()
        .ok_or_else(|| anyhow!("no bookmark source given"))?;
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let mut bookmarks = format
        .parse(&text)
        .with_context(|| format!("parsing {}", path.display()))?;
    let parsed = bookmarks.len();

    if let Some(folder) = &cli.folder {
        bookmarks = select_folder(&bookmarks, folder);
        if bookmarks.is_empty() {
            preview_warn!("no bookmarks in folder {:?}", folder);
        }
    }
    bookmarks = dedupe(bookmarks);
    if let Some(limit) = cli.limit {
        bookmarks.truncate(limit);
    }

    preview_info!(
        "loaded {} bookmarks from {} ({} selected)",
        parsed,
        path.display(),
        bookmarks.len()
    );
    Ok(bookmarks)
}

/// Drives the viewer state with pipeline events until every bookmark has a
/// result. Ctrl-C cancels the outstanding work.
async fn run_batch(
    pipeline: &Pipeline,
    bookmarks: &[Bookmark],
    force_render: bool,
) -> anyhow::Result<Vec<EnrichmentResult>> {
    let (mut runner, mut events) = EffectRunner::new(pipeline.clone(), force_render);
    let (mut state, effects) = update(
        AppState::new(),
        Msg::BookmarksLoaded(bookmarks.to_vec()),
    );
    runner.perform(effects);
    runner.close();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                let finished = match &event {
                    PipelineEvent::Completed(result) => Some(result.url.clone()),
                    PipelineEvent::Progress { .. } => None,
                };
                let (next, effects) = update(state, to_msg(event));
                state = next;
                runner.perform(effects);
                if let Some(url) = finished {
                    print_progress(&state, &url);
                }
            }
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                preview_warn!("interrupted");
                let (next, effects) = update(state, Msg::CancelClicked);
                state = next;
                runner.perform(effects);
            }
        }
    }

    runner.finish().await
}

/// One line per finished bookmark.
fn print_progress(state: &AppState, url: &str) {
    let view = state.view();
    if let Some(row) = view.rows.iter().find(|row| row.url == url) {
        println!("[{}/{}] {:<24} {}", view.resolved, view.total, row.status, url);
    }
}
