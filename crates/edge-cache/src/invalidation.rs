//! Trigger-driven invalidation of keyed entries.
//!
//! Every cached fragment and keyed URL may name trigger URLs (e.g. an
//! add-to-cart endpoint). A request whose URL contains a trigger deletes the
//! owner's entries for every site and locale of the active generation.

use edge_core::{path_and_query, strip_identity, SiteLocale, WorkerConfig};
use serde::Serialize;
use url::Url;

use crate::key::{CacheGeneration, CacheKey, EntryKey};
use crate::store::{CacheResult, CacheStore};

/// One trigger and the suffixes it invalidates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvalidationRule {
    /// Trigger path and query with the identity segments removed.
    pub trigger: String,
    /// Suffixes to delete, in configuration order.
    pub suffixes: Vec<String>,
}

/// Precomputed trigger → suffixes mapping.
#[derive(Debug, Clone, Default)]
pub struct InvalidationIndex {
    rules: Vec<InvalidationRule>,
}

impl InvalidationIndex {
    /// Build the index from the fragments and keyed URLs of a configuration.
    pub fn from_config(config: &WorkerConfig) -> Self {
        let identity = config.default_identity();
        let owners = config
            .cached_parts
            .iter()
            .map(|p| (&p.cache_suffix, &p.invalidation_triggers))
            .chain(
                config
                    .cached_urls
                    .iter()
                    .map(|u| (&u.cache_suffix, &u.invalidation_triggers)),
            );

        let mut index = Self::default();
        for (suffix, triggers) in owners {
            for trigger in triggers.iter().filter(|t| !t.is_empty()) {
                match config.absolute_url(trigger) {
                    Ok(url) => {
                        let normalized = path_and_query(&strip_identity(&url, &identity));
                        index.add(&normalized, suffix);
                    }
                    Err(e) => tracing::warn!(%trigger, error = %e, "ignoring invalid trigger"),
                }
            }
        }
        index
    }

    /// Register `suffix` under an already normalized trigger.
    pub fn add(&mut self, trigger: &str, suffix: &str) {
        match self.rules.iter_mut().find(|r| r.trigger == trigger) {
            Some(rule) => {
                if !rule.suffixes.iter().any(|s| s == suffix) {
                    rule.suffixes.push(suffix.to_string());
                }
            }
            None => self.rules.push(InvalidationRule {
                trigger: trigger.to_string(),
                suffixes: vec![suffix.to_string()],
            }),
        }
    }

    /// Rules in insertion order.
    pub fn rules(&self) -> &[InvalidationRule] {
        &self.rules
    }

    /// Number of triggers.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether no trigger is configured.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Suffixes invalidated by a request, if any.
    ///
    /// The request's path and query are normalized by removing the request's
    /// own identity segments; the first trigger contained in them wins.
    pub fn match_trigger(&self, request_url: &Url, identity: &SiteLocale) -> Option<&[String]> {
        if self.rules.is_empty() {
            return None;
        }
        let normalized = path_and_query(&strip_identity(request_url, identity));
        self.rules
            .iter()
            .find(|rule| normalized.contains(rule.trigger.as_str()))
            .map(|rule| rule.suffixes.as_slice())
    }

    /// Delete every keyed entry of `generation` whose suffix is listed,
    /// across all sites and locales. Returns the number deleted.
    pub async fn invalidate(
        &self,
        store: &dyn CacheStore,
        generation: &CacheGeneration,
        suffixes: &[String],
    ) -> CacheResult<usize> {
        let mut deleted = 0;
        for entry in store.keys(generation).await? {
            let listed = entry
                .suffix()
                .is_some_and(|s| suffixes.iter().any(|wanted| wanted == s));
            if listed && store.delete(&CacheKey::new(generation.clone(), entry)).await? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    /// Match a request and invalidate what it triggers.
    pub async fn check(
        &self,
        store: &dyn CacheStore,
        generation: &CacheGeneration,
        request_url: &Url,
        identity: &SiteLocale,
    ) -> CacheResult<usize> {
        let Some(suffixes) = self.match_trigger(request_url, identity) else {
            return Ok(0);
        };
        let deleted = self.invalidate(store, generation, suffixes).await?;
        tracing::debug!(url = %request_url, ?suffixes, deleted, "invalidated");
        Ok(deleted)
    }
}

/// Entry keys a suffix list would remove, for previews.
pub fn affected_keys<'a>(
    keys: &'a [EntryKey],
    suffixes: &'a [String],
) -> impl Iterator<Item = &'a EntryKey> {
    keys.iter().filter(move |k| {
        k.suffix()
            .is_some_and(|s| suffixes.iter().any(|wanted| wanted == s))
    })
}
