//! Invalidation index inspection.

use anyhow::Result;
use edge_cache::InvalidationIndex;
use edge_core::{InterceptedRequest, WorkerConfig};

use super::IndexArgs;
use crate::context::Context;

/// Run the index command.
pub async fn run(args: IndexArgs, ctx: &Context) -> Result<()> {
    let config = ctx.worker_config()?;
    let index = InvalidationIndex::from_config(&config);

    match args.match_url {
        Some(url) => match_url(&config, &index, &url, ctx),
        None => list_rules(&index, ctx),
    }
}

fn list_rules(index: &InvalidationIndex, ctx: &Context) -> Result<()> {
    if ctx.output.is_json() {
        ctx.output.json(&index.rules());
        return Ok(());
    }

    ctx.output.header("Invalidation index");
    if index.is_empty() {
        ctx.output.info("No invalidation triggers configured.");
        return Ok(());
    }

    let width = index
        .rules()
        .iter()
        .map(|r| r.trigger.len())
        .max()
        .unwrap_or(0)
        .max("TRIGGER".len());
    ctx.output.table_row(&["TRIGGER", "SUFFIXES"], &[width, 0]);
    for rule in index.rules() {
        let suffixes = rule.suffixes.join(", ");
        ctx.output
            .table_row(&[rule.trigger.as_str(), suffixes.as_str()], &[width, 0]);
    }
    Ok(())
}

fn match_url(
    config: &WorkerConfig,
    index: &InvalidationIndex,
    url: &str,
    ctx: &Context,
) -> Result<()> {
    let absolute = config.absolute_url(url)?;
    let identity = InterceptedRequest::get(absolute.clone()).identity(config);
    let suffixes = index.match_trigger(&absolute, &identity).unwrap_or(&[]);

    if ctx.output.is_json() {
        ctx.output.json(&serde_json::json!({
            "url": absolute.as_str(),
            "identity": identity.to_string(),
            "suffixes": suffixes,
        }));
        return Ok(());
    }

    ctx.output.kv("URL", absolute.as_str());
    ctx.output.kv("Identity", &identity.to_string());
    if suffixes.is_empty() {
        ctx.output.info("No trigger matches this URL.");
    } else {
        ctx.output.info("Invalidates, for every site and locale:");
        for suffix in suffixes {
            ctx.output.list_item(suffix);
        }
    }
    Ok(())
}
