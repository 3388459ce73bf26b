//! Application configuration structures.
//!
//! ```toml
//! [crawler]
//! max_concurrent = 4
//!
//! [[sources]]
//! id = "acme"
//! url = "https://acme.example/pricing"
//! change_detection = "urls"
//!
//! [[sources.targets]]
//! name = "tariff"
//! keywords = ["tariff", "price list"]
//! extensions = ["pdf"]
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::SourceConfig;

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// HTTP and crawling behavior settings
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// Where datasets and the change registry live
    #[serde(default)]
    pub storage: StorageConfig,

    /// Sanity checks applied to extracted payloads
    #[serde(default)]
    pub validation: ValidationConfig,

    /// Monitored sources
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            AppError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Apply `CRAWL_TIMEOUT_SECS`, `MAX_CONCURRENT` and `REQUEST_DELAY_MS` overrides.
    ///
    /// Unparseable values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(secs) = lookup("CRAWL_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.crawler.timeout_secs = secs;
        }
        if let Some(n) = lookup("MAX_CONCURRENT").and_then(|v| v.parse().ok()) {
            self.crawler.max_concurrent = n;
        }
        if let Some(ms) = lookup("REQUEST_DELAY_MS").and_then(|v| v.parse().ok()) {
            self.crawler.request_delay_ms = ms;
        }
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.crawler.user_agent.trim().is_empty() {
            return Err(AppError::config("crawler.user_agent is empty"));
        }
        if self.crawler.timeout_secs == 0 {
            return Err(AppError::config("crawler.timeout_secs must be > 0"));
        }
        if self.crawler.manifest_timeout_secs == 0 {
            return Err(AppError::config("crawler.manifest_timeout_secs must be > 0"));
        }
        if self.crawler.extract_timeout_secs == 0 {
            return Err(AppError::config("crawler.extract_timeout_secs must be > 0"));
        }
        if self.crawler.max_concurrent == 0 {
            return Err(AppError::config("crawler.max_concurrent must be > 0"));
        }
        if self.crawler.max_concurrent_documents == 0 {
            return Err(AppError::config(
                "crawler.max_concurrent_documents must be > 0",
            ));
        }
        if self.sources.is_empty() {
            return Err(AppError::config("No sources defined"));
        }

        let mut seen = HashSet::new();
        for source in &self.sources {
            source.validate()?;
            if !seen.insert(source.id.as_str()) {
                return Err(AppError::config(format!(
                    "duplicate source id '{}'",
                    source.id
                )));
            }
        }
        Ok(())
    }
}

/// HTTP client and crawling behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// HTTP client timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Budget for one adapter manifest call; content hashing is bounded per
    /// document by `extract_timeout_secs`
    #[serde(default = "defaults::manifest_timeout")]
    pub manifest_timeout_secs: u64,

    /// Budget for one document extraction
    #[serde(default = "defaults::extract_timeout")]
    pub extract_timeout_secs: u64,

    /// Delay between document extractions of one source, in milliseconds
    #[serde(default = "defaults::request_delay")]
    pub request_delay_ms: u64,

    /// Sources processed concurrently in each phase
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,

    /// Documents of one source extracted concurrently
    #[serde(default = "defaults::max_concurrent_documents")]
    pub max_concurrent_documents: usize,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            manifest_timeout_secs: defaults::manifest_timeout(),
            extract_timeout_secs: defaults::extract_timeout(),
            request_delay_ms: defaults::request_delay(),
            max_concurrent: defaults::max_concurrent(),
            max_concurrent_documents: defaults::max_concurrent_documents(),
        }
    }
}

/// Storage locations, relative paths resolve against the storage directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "defaults::datasets_dir")]
    pub datasets_dir: PathBuf,

    #[serde(default = "defaults::registry_dir")]
    pub registry_dir: PathBuf,
}

impl StorageConfig {
    /// Dataset root resolved against `base`.
    pub fn datasets_path(&self, base: &Path) -> PathBuf {
        base.join(&self.datasets_dir)
    }

    /// Registry directory resolved against `base`.
    pub fn registry_path(&self, base: &Path) -> PathBuf {
        base.join(&self.registry_dir)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            datasets_dir: defaults::datasets_dir(),
            registry_dir: defaults::registry_dir(),
        }
    }
}

/// What to do with a unit whose payload fails validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ValidationPolicy {
    /// Leave the unit out of the batch, keep the rest
    #[default]
    DropUnit,
    /// Refuse to persist anything for the source this cycle
    RejectBatch,
}

/// Payload sanity settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    #[serde(default)]
    pub policy: ValidationPolicy,

    /// Minimum extracted characters for a unit to be kept
    #[serde(default = "defaults::min_chars")]
    pub min_chars: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            policy: ValidationPolicy::default(),
            min_chars: defaults::min_chars(),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    // Crawler defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; pricewatch/0.1)".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn manifest_timeout() -> u64 {
        60
    }
    pub fn extract_timeout() -> u64 {
        180
    }
    pub fn request_delay() -> u64 {
        100
    }
    pub fn max_concurrent() -> usize {
        5
    }
    pub fn max_concurrent_documents() -> usize {
        2
    }

    // Storage defaults
    pub fn datasets_dir() -> PathBuf {
        PathBuf::from("datasets")
    }
    pub fn registry_dir() -> PathBuf {
        PathBuf::from("registry")
    }

    // Validation defaults
    pub fn min_chars() -> usize {
        1
    }
}
