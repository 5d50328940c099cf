//! CLI execution context.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context as _, Result};
use edge_core::WorkerConfig;

use crate::output::Output;

/// Config file names searched for, in order, from the working directory up.
const CONFIG_NAMES: [&str; 3] = ["edge-stitch.toml", ".edge-stitch.toml", "edge-stitch.json"];

/// Execution context for CLI commands.
pub struct Context {
    /// Worker configuration file.
    pub config_path: PathBuf,
    /// Disk cache root.
    pub cache_dir: PathBuf,
    /// Output handler.
    pub output: Output,
}

impl Context {
    /// Locate the config file and cache directory.
    pub fn load(
        config_path: Option<&str>,
        cache_dir: Option<&str>,
        output: Output,
    ) -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to get current directory")?;

        let config_path = match config_path {
            Some(path) => resolve_path(&cwd, path),
            None => match find_config(&cwd) {
                Some(path) => path,
                None => bail!(
                    "No config file found (looked for {} from {} upwards); pass --config",
                    CONFIG_NAMES.join(", "),
                    cwd.display()
                ),
            },
        };
        output.debug(&format!("Using config {}", config_path.display()));

        let cache_dir = match cache_dir {
            Some(dir) => resolve_path(&cwd, dir),
            None => dirs_path().join("edge-stitch").join("cache"),
        };

        Ok(Self {
            config_path,
            cache_dir,
            output,
        })
    }

    /// Load and validate the worker configuration.
    pub fn worker_config(&self) -> Result<WorkerConfig> {
        WorkerConfig::load(&self.config_path)
            .with_context(|| format!("Invalid config {}", self.config_path.display()))
    }

    /// Create the cache directory if needed.
    pub fn ensure_cache_dir(&self) -> Result<&Path> {
        std::fs::create_dir_all(&self.cache_dir).with_context(|| {
            format!("Failed to create cache directory {}", self.cache_dir.display())
        })?;
        Ok(&self.cache_dir)
    }
}

/// Find a config file in the directory tree.
fn find_config(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();
    loop {
        for name in CONFIG_NAMES {
            let candidate = current.join(name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }

        if !current.pop() {
            return None;
        }
    }
}

/// Resolve a path relative to the working directory.
fn resolve_path(cwd: &Path, path: &str) -> PathBuf {
    let path = PathBuf::from(path);
    if path.is_absolute() {
        path
    } else {
        cwd.join(path)
    }
}

/// Get the platform-specific data directory.
fn dirs_path() -> PathBuf {
    if let Some(home) = std::env::var_os("HOME") {
        PathBuf::from(home).join(".local").join("share")
    } else {
        PathBuf::from("/tmp")
    }
}
