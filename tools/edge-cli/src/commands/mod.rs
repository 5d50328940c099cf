//! CLI command implementations.

pub mod index;
pub mod purge;
pub mod render;
pub mod validate;

use clap::Args;

/// Arguments for the validate command.
#[derive(Args)]
pub struct ValidateArgs {
    /// Print the configuration with all defaults filled in.
    #[arg(long)]
    pub show: bool,
}

/// Arguments for the index command.
#[derive(Args)]
pub struct IndexArgs {
    /// Only report what this URL would invalidate.
    #[arg(long = "match", value_name = "URL")]
    pub match_url: Option<String>,
}

/// Arguments for the render command.
#[derive(Args)]
pub struct RenderArgs {
    /// URL or origin-relative path to request.
    pub url: String,

    /// Send as a plain request instead of a top-level navigation.
    #[arg(long)]
    pub no_navigate: bool,

    /// Site id header value (needs --locale too).
    #[arg(long, requires = "locale")]
    pub site: Option<String>,

    /// Locale header value (needs --site too).
    #[arg(long, requires = "site")]
    pub locale: Option<String>,

    /// Extra request headers, as `name: value`.
    #[arg(short = 'H', long = "header", value_name = "HEADER")]
    pub headers: Vec<String>,

    /// Print status and headers before the body.
    #[arg(short, long)]
    pub include: bool,

    /// Write the body to a file instead of stdout.
    #[arg(short, long)]
    pub output: Option<String>,
}

/// Arguments for the purge command.
#[derive(Args)]
pub struct PurgeArgs {
    /// Delete every generation, including the current one.
    #[arg(long, conflicts_with = "suffix")]
    pub all: bool,

    /// Delete only keyed entries with these suffixes from the current generation.
    #[arg(short, long)]
    pub suffix: Vec<String>,

    /// Show what would be deleted without deleting.
    #[arg(long)]
    pub dry_run: bool,
}
