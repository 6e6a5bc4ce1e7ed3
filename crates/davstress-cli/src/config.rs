//! Command-line surface: one `webdav` driver mode and one `getlist`
//! secondary mode, matching the flag tables in `urltest_webdav.c` and
//! `urltest_getlist.c`.
//!
//! Grounded in clap-derive idioms from the teacher's bastion CLI
//! (flattened arg groups, `env = "..."` fallbacks, `ValueEnum`).

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(
    name = "davstress",
    version,
    about = "WebDAV load and correctness exerciser"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Drive discovered filesystem entities through the WebDAV lifecycle.
    Webdav(WebdavArgs),
    /// GET every URL in a list file (or stdin) and aggregate stats.
    Getlist(GetlistArgs),
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq, Default)]
pub enum StatsFormat {
    #[default]
    Table,
    Csv,
    Tsv,
}

/// Parsed form of `-t[=fmt[:path]]`.
#[derive(Debug, Clone)]
pub struct StatsSink {
    pub format: StatsFormat,
    pub path: Option<PathBuf>,
}

impl std::str::FromStr for StatsSink {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (fmt, path) = match s.split_once(':') {
            Some((fmt, path)) => (fmt, Some(PathBuf::from(path))),
            None => (s, None),
        };
        let format = match fmt {
            "" | "table" => StatsFormat::Table,
            "csv" => StatsFormat::Csv,
            "tsv" => StatsFormat::Tsv,
            other => anyhow::bail!("unknown stats format '{other}' (expected table|csv|tsv)"),
        };
        Ok(StatsSink { format, path })
    }
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq, Default)]
pub enum TreeListing {
    #[default]
    None,
    Short,
    Long,
}

#[derive(Debug, Args)]
pub struct WebdavArgs {
    /// Local paths to exercise. With `--base-url` every path shares it;
    /// otherwise each path must be followed by its own destination URL.
    #[arg(required = true, trailing_var_arg = true)]
    pub paths_and_urls: Vec<String>,

    /// Destination URL shared by every local path.
    #[arg(short = 'U', long = "base-url")]
    pub base_url: Option<String>,

    /// Tree listing style before the run.
    #[arg(short = 'l', long = "long-listing", conflicts_with_all = ["short_listing", "no_listing"])]
    pub long_listing: bool,
    #[arg(short = 's', long = "short-listing")]
    pub short_listing: bool,
    #[arg(short = 'n', long = "no-listing")]
    pub no_listing: bool,

    /// ASCII-only glyphs in listings.
    #[arg(short = 'a', long)]
    pub ascii: bool,

    /// Driver-level verbose trace (one line per step).
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Transport-level verbose trace.
    #[arg(short = 'V', long = "transport-verbose")]
    pub transport_verbose: bool,

    /// Select and advance state without issuing any transport calls.
    #[arg(short = 'd', long = "dry-run")]
    pub dry_run: bool,

    /// Emit stats at end of run: `table`, `csv`, or `tsv`, optionally
    /// `fmt:path` to write to a file instead of stdout.
    #[arg(short = 't', long = "stats", num_args = 0..=1, default_missing_value = "table")]
    pub stats: Option<StatsSink>,

    /// Maximum number of lifecycle generations to run.
    #[arg(short = 'g', long = "max-generations", default_value_t = 1)]
    pub max_generations: u64,

    /// Static `host:port:ip` DNS override; may be repeated.
    #[arg(short = 'm', long = "resolve")]
    pub host_mappings: Vec<String>,

    #[arg(short = 'u', long, env = "URLTEST_WEBDAV_USER")]
    pub username: Option<String>,
    #[arg(short = 'p', long, env = "URLTEST_WEBDAV_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Disable TLS peer verification.
    #[arg(short = 'k', long = "insecure")]
    pub insecure: bool,

    /// Depth-first walk instead of the default random walk.
    #[arg(short = 'W', long = "depth-first")]
    pub depth_first: bool,

    /// Do not follow 3xx responses.
    #[arg(short = 'F', long = "no-follow")]
    pub no_follow: bool,

    /// Disable the delete/delete_sub states.
    #[arg(short = 'D', long = "no-delete")]
    pub no_delete: bool,

    /// Enable the download_range state.
    #[arg(short = 'r', long = "range")]
    pub download_range: bool,

    /// Disable the options state.
    #[arg(short = 'O', long = "no-options")]
    pub no_options: bool,

    #[command(flatten)]
    pub logging: LoggingArgs,
}

impl WebdavArgs {
    pub fn listing(&self) -> TreeListing {
        if self.long_listing {
            TreeListing::Long
        } else if self.short_listing {
            TreeListing::Short
        } else {
            TreeListing::None
        }
    }
}

#[derive(Debug, Args)]
pub struct GetlistArgs {
    /// Path to a newline-delimited URL list, or `-` for stdin.
    #[arg(short = 'l', long = "list", required = true)]
    pub list: String,

    /// Prefix applied to every relative URL in the list.
    #[arg(short = 'U', long = "base-url")]
    pub base_url: Option<String>,

    #[arg(short = 'v', long)]
    pub verbose: bool,
    #[arg(short = 'V', long = "transport-verbose")]
    pub transport_verbose: bool,
    #[arg(short = 'd', long = "dry-run")]
    pub dry_run: bool,

    #[arg(short = 't', long = "stats", num_args = 0..=1, default_missing_value = "table")]
    pub stats: Option<StatsSink>,

    #[arg(short = 'm', long = "resolve")]
    pub host_mappings: Vec<String>,

    #[arg(short = 'u', long, env = "URLTEST_GETLIST_USER")]
    pub username: Option<String>,
    #[arg(short = 'p', long, env = "URLTEST_GETLIST_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Retries per URL on transport-layer failure.
    #[arg(short = 'r', long = "retries", default_value_t = 1)]
    pub retries: u32,

    #[arg(short = 'k', long = "insecure")]
    pub insecure: bool,

    /// Follow 3xx responses (off by default, unlike the webdav driver).
    #[arg(short = 'f', long = "follow")]
    pub follow: bool,

    #[command(flatten)]
    pub logging: LoggingArgs,
}

#[derive(Debug, Args, Default)]
pub struct LoggingArgs {
    /// Overrides RUST_LOG; defaults to "info".
    #[arg(long = "log", env = "DAVSTRESS_LOG")]
    pub log: Option<String>,
}
