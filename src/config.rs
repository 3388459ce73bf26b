// src/config.rs

//! Configuration loading.
//!
//! Unlike seed-style data, the crawl configuration is never defaulted: an
//! unreadable or invalid file aborts the cycle before any source is touched.

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::models::Config;

pub const CONFIG_FILE: &str = "config.toml";

/// `{storage_dir}/config.toml` unless an explicit path is given.
pub fn config_path(storage_dir: &Path, explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| storage_dir.join(CONFIG_FILE))
}

/// Load, apply environment overrides, and validate.
pub fn load_config(path: &Path) -> Result<Config> {
    load_config_with(path, |key| std::env::var(key).ok())
}

/// Like [`load_config`] with a custom variable lookup.
pub fn load_config_with<F>(path: &Path, lookup: F) -> Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = Config::load(path)?;
    config.apply_overrides(lookup);
    config.validate()?;
    log::debug!(
        "Loaded {} with {} sources",
        path.display(),
        config.sources.len()
    );
    Ok(config)
}
