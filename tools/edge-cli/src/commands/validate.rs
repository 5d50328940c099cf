//! Configuration validation.

use anyhow::Result;
use edge_cache::{CacheGeneration, InvalidationIndex};
use edge_core::WorkerConfig;
use serde::Serialize;

use super::ValidateArgs;
use crate::context::Context;

/// Run the validate command.
pub async fn run(args: ValidateArgs, ctx: &Context) -> Result<()> {
    let config = ctx.worker_config()?;
    let summary = Summary::of(&config);

    if ctx.output.is_json() {
        let mut value = serde_json::json!({ "valid": true, "summary": summary });
        if args.show {
            value["config"] = serde_json::to_value(&config)?;
        }
        ctx.output.json(&value);
        return Ok(());
    }

    ctx.output
        .success(&format!("{} is valid", ctx.config_path.display()));
    ctx.output.kv("Origin", &config.origin);
    ctx.output.kv("Generation", &summary.generation);
    ctx.output.kv("Default identity", &summary.default_identity);
    ctx.output.kv("Fragments", &summary.fragments.to_string());
    ctx.output.kv("Keyed URLs", &summary.keyed_urls.to_string());
    ctx.output.kv("Triggers", &summary.triggers.to_string());
    if !config.sw_enabled {
        ctx.output
            .warn("Kill switch engaged: the worker unregisters on activation");
    }

    if args.show {
        ctx.output.header("Configuration");
        println!("{}", serde_json::to_string_pretty(&config)?);
    }

    Ok(())
}

/// Counts shown for a valid configuration.
#[derive(Debug, Serialize)]
struct Summary {
    generation: String,
    default_identity: String,
    fragments: usize,
    keyed_urls: usize,
    triggers: usize,
}

impl Summary {
    fn of(config: &WorkerConfig) -> Self {
        Self {
            generation: CacheGeneration::from_config(config).to_string(),
            default_identity: config.default_identity().to_string(),
            fragments: config.cached_parts.len(),
            keyed_urls: config.cached_urls.len(),
            triggers: InvalidationIndex::from_config(config).len(),
        }
    }
}
