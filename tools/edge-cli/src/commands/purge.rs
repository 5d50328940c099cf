//! Cache purging.

use anyhow::Result;
use edge_cache::{affected_keys, CacheGeneration, CacheKey, CacheStore, DiskStore, EntryKey};
use serde::Serialize;

use super::PurgeArgs;
use crate::context::Context;
use crate::output::format_age;

/// What a purge removes.
#[derive(Debug, Default, Serialize, PartialEq, Eq)]
struct PurgePlan {
    /// Whole generations.
    generations: Vec<CacheGeneration>,
    /// Single entries of the current generation.
    entries: Vec<CacheKey>,
}

impl PurgePlan {
    fn is_empty(&self) -> bool {
        self.generations.is_empty() && self.entries.is_empty()
    }
}

/// Run the purge command.
pub async fn run(args: PurgeArgs, ctx: &Context) -> Result<()> {
    let config = ctx.worker_config()?;
    let current = CacheGeneration::from_config(&config);
    let store = DiskStore::new(&ctx.cache_dir);

    let plan = plan(&store, &current, args.all, &args.suffix).await?;

    if !args.dry_run {
        execute(&store, &plan).await?;
    }

    if ctx.output.is_json() {
        ctx.output.json(&serde_json::json!({
            "dry_run": args.dry_run,
            "generations": plan.generations,
            "entries": plan.entries,
        }));
        return Ok(());
    }

    if plan.is_empty() {
        ctx.output.info("Nothing to purge.");
        return Ok(());
    }

    let verb = if args.dry_run { "Would delete" } else { "Deleted" };
    for generation in &plan.generations {
        let count = store.keys(generation).await.map(|k| k.len()).unwrap_or(0);
        let marker = if generation == &current { " (current)" } else { "" };
        ctx.output
            .list_item(&format!("{}{} [{} entries]", generation, marker, count));
    }
    for key in &plan.entries {
        match store.get(key).await {
            Ok(Some(entry)) if args.dry_run => ctx
                .output
                .list_item(&format!("{} (age {})", key.entry, format_age(entry.age()))),
            _ => ctx.output.list_item(&key.entry.to_string()),
        }
    }
    ctx.output.success(&format!(
        "{} {} generation(s) and {} entr{}",
        verb,
        plan.generations.len(),
        plan.entries.len(),
        if plan.entries.len() == 1 { "y" } else { "ies" }
    ));
    Ok(())
}

/// Decide what to delete.
///
/// With suffixes, only keyed entries of the current generation with those
/// suffixes go (for every site and locale). Otherwise every generation but
/// the current one goes, or all of them with `all`.
async fn plan(
    store: &dyn CacheStore,
    current: &CacheGeneration,
    all: bool,
    suffixes: &[String],
) -> Result<PurgePlan> {
    if !suffixes.is_empty() {
        let keys: Vec<EntryKey> = store.keys(current).await?;
        let entries = affected_keys(&keys, suffixes)
            .map(|entry| CacheKey::new(current.clone(), entry.clone()))
            .collect();
        return Ok(PurgePlan {
            generations: Vec::new(),
            entries,
        });
    }

    let generations = store
        .generations()
        .await?
        .into_iter()
        .filter(|generation| all || generation != current)
        .collect();
    Ok(PurgePlan {
        generations,
        entries: Vec::new(),
    })
}

async fn execute(store: &dyn CacheStore, plan: &PurgePlan) -> Result<()> {
    for generation in &plan.generations {
        store.delete_generation(generation).await?;
    }
    for key in &plan.entries {
        store.delete(key).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use edge_cache::{CachedResponse, MemoryStore};
    use edge_core::SiteLocale;

    use super::*;

    fn keyed(generation: &CacheGeneration, site: &str, suffix: &str) -> CacheKey {
        CacheKey::new(
            generation.clone(),
            EntryKey::keyed(&SiteLocale::new(site, "en_US"), suffix),
        )
    }

    async fn seeded() -> (MemoryStore, CacheGeneration, CacheGeneration) {
        let store = MemoryStore::new();
        let old = CacheGeneration::new("1.0.0", "v1");
        let current = CacheGeneration::new("1.1.0", "v1");
        for key in [
            keyed(&old, "RefArch", "header"),
            keyed(&current, "RefArch", "header"),
            keyed(&current, "Outlet", "header"),
            keyed(&current, "RefArch", "footer"),
            CacheKey::new(current.clone(), EntryKey::url("https://cdn.example.com/static/a.css")),
        ] {
            store.put(&key, CachedResponse::ok("x")).await.unwrap();
        }
        (store, old, current)
    }

    #[tokio::test]
    async fn test_default_purge_keeps_current_generation() {
        let (store, old, current) = seeded().await;
        let plan = plan(&store, &current, false, &[]).await.unwrap();
        assert_eq!(plan.generations, vec![old]);

        execute(&store, &plan).await.unwrap();
        assert_eq!(store.generations().await.unwrap(), vec![current]);
    }

    #[tokio::test]
    async fn test_purge_all() {
        let (store, _, current) = seeded().await;
        let plan = plan(&store, &current, true, &[]).await.unwrap();
        assert_eq!(plan.generations.len(), 2);

        execute(&store, &plan).await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_purge_suffix_spans_identities() {
        let (store, old, current) = seeded().await;
        let plan = plan(&store, &current, false, &["header".to_string()])
            .await
            .unwrap();
        assert!(plan.generations.is_empty());
        assert_eq!(plan.entries.len(), 2);

        execute(&store, &plan).await.unwrap();
        assert!(store.get(&keyed(&current, "RefArch", "header")).await.unwrap().is_none());
        assert!(store.get(&keyed(&current, "Outlet", "header")).await.unwrap().is_none());
        assert!(store.get(&keyed(&current, "RefArch", "footer")).await.unwrap().is_some());
        assert!(store.get(&keyed(&old, "RefArch", "header")).await.unwrap().is_some());
    }
}
