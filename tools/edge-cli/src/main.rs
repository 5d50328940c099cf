//! edge-stitch CLI - Inspect and exercise a fragment caching worker.
//!
//! Commands:
//! - `edge-stitch validate` - Check a worker configuration
//! - `edge-stitch index` - Print the invalidation index
//! - `edge-stitch render` - Run one request through the worker
//! - `edge-stitch purge` - Delete cache generations or entries on disk

mod commands;
mod context;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{IndexArgs, PurgeArgs, RenderArgs, ValidateArgs};

/// edge-stitch - fragment caching worker tools
#[derive(Parser)]
#[command(name = "edge-stitch")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use JSON output format
    #[arg(long, global = true)]
    json: bool,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Cache directory (default: ~/.local/share/edge-stitch/cache)
    #[arg(long, global = true)]
    cache_dir: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the worker configuration
    Validate(ValidateArgs),

    /// Print which trigger URLs invalidate which cache suffixes
    Index(IndexArgs),

    /// Run one request through the worker and print the response
    Render(RenderArgs),

    /// Delete cache generations or entries
    Purge(PurgeArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    edge_observability::init_tracing(level, cli.json);

    let output = output::Output::new(cli.verbose, cli.json);
    let loaded = context::Context::load(
        cli.config.as_deref(),
        cli.cache_dir.as_deref(),
        output.clone(),
    );
    let ctx = match loaded {
        Ok(ctx) => ctx,
        Err(e) => {
            output.error(&format!("{:#}", e));
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Validate(args) => commands::validate::run(args, &ctx).await,
        Commands::Index(args) => commands::index::run(args, &ctx).await,
        Commands::Render(args) => commands::render::run(args, &ctx).await,
        Commands::Purge(args) => commands::purge::run(args, &ctx).await,
    };

    if let Err(e) = result {
        ctx.output.error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}
