use std::path::{Path, PathBuf};

use clap::{Args, Parser};
use preview_core::BookmarkFormat;

#[derive(Debug, Parser)]
#[command(
    name = "bookmark-preview",
    version,
    about = "Fetch titles, descriptions and thumbnails for browser bookmarks"
)]
pub struct Cli {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Only bookmarks in this folder: a path like `Bookmarks bar/Reading`, or a folder name.
    #[arg(long)]
    pub folder: Option<String>,

    /// Enrich at most this many bookmarks.
    #[arg(long)]
    pub limit: Option<usize>,

    /// Directory for thumbnails and `summary.json`.
    #[arg(long, value_name = "DIR", default_value = "previews")]
    pub out: PathBuf,

    /// Keep results between runs in this directory.
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Empty the cache directory before starting.
    #[arg(long, requires = "cache_dir")]
    pub clear_cache: bool,

    /// RON file with pipeline options.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Render every page in the browser, ignoring cached results.
    #[arg(long)]
    pub force_render: bool,

    /// Use placeholders instead of favicons when no screenshot was taken.
    #[arg(long)]
    pub no_favicons: bool,

    #[command(flatten)]
    pub overrides: Overrides,

    /// Exit with status 1 when more than this share of bookmarks fail [default: 0.5].
    #[arg(long, value_name = "RATE")]
    pub max_failure_rate: Option<f64>,

    /// Log at debug level.
    #[arg(short, long)]
    pub verbose: bool,

    /// Also write the log to this file.
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
pub struct SourceArgs {
    /// Netscape bookmark export (what browsers write on "Export bookmarks").
    #[arg(long, value_name = "FILE")]
    pub html: Option<PathBuf>,

    /// Chrome `Bookmarks` profile file.
    #[arg(long, value_name = "FILE")]
    pub chrome: Option<PathBuf>,

    /// Plain text file with one URL per line.
    #[arg(long, value_name = "FILE")]
    pub urls: Option<PathBuf>,
}

impl SourceArgs {
    pub fn resolve(&self) -> Option<(BookmarkFormat, &Path)> {
        if let Some(path) = &self.html {
            return Some((BookmarkFormat::NetscapeHtml, path));
        }
        if let Some(path) = &self.chrome {
            return Some((BookmarkFormat::ChromeJson, path));
        }
        self.urls
            .as_deref()
            .map(|path| (BookmarkFormat::UrlList, path))
    }
}

/// Command-line overrides for values that can also come from `--config`.
#[derive(Debug, Default, Args)]
pub struct Overrides {
    /// Requests in flight at once.
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Browser sessions at once.
    #[arg(long)]
    pub render_concurrency: Option<usize>,

    #[arg(long, value_name = "SECS")]
    pub fetch_timeout: Option<u64>,

    #[arg(long, value_name = "SECS")]
    pub render_timeout: Option<u64>,

    /// Extra fetch attempts after a network error or timeout.
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// How long successful results stay cached.
    #[arg(long, value_name = "HOURS")]
    pub cache_ttl_hours: Option<u64>,

    /// Launch the browser without its sandbox (needed in some containers).
    #[arg(long)]
    pub no_sandbox: bool,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn exactly_one_source_is_required() {
        assert!(Cli::try_parse_from(["bookmark-preview"]).is_err());
        assert!(Cli::try_parse_from([
            "bookmark-preview",
            "--html",
            "a.html",
            "--urls",
            "b.txt"
        ])
        .is_err());

        let cli = Cli::try_parse_from(["bookmark-preview", "--chrome", "Bookmarks"]).unwrap();
        let (format, path) = cli.source.resolve().unwrap();
        assert_eq!(format, BookmarkFormat::ChromeJson);
        assert_eq!(path, Path::new("Bookmarks"));
        assert_eq!(cli.out, PathBuf::from("previews"));
    }

    #[test]
    fn clearing_the_cache_needs_a_cache_dir() {
        assert!(Cli::try_parse_from(["bookmark-preview", "--urls", "u.txt", "--clear-cache"])
            .is_err());
        let cli = Cli::try_parse_from([
            "bookmark-preview",
            "--urls",
            "u.txt",
            "--cache-dir",
            "cache",
            "--clear-cache",
            "--concurrency",
            "3",
        ])
        .unwrap();
        assert!(cli.clear_cache);
        assert_eq!(cli.overrides.concurrency, Some(3));
    }
}
