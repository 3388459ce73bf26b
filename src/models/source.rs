//! Source definitions.

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// How a source's changes are detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ChangeDetection {
    /// Compare the set of document URLs
    #[default]
    Urls,
    /// Also compare per-URL content hashes when the URL set is unchanged
    ContentHash,
}

/// A monitored provider page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Unique identifier, also the dataset directory and file stem
    pub id: String,

    /// Entry page the adapter scans
    pub url: String,

    /// Name of the adapter strategy
    #[serde(default = "default_adapter")]
    pub adapter: String,

    /// Name of the extractor strategy
    #[serde(default = "default_extractor")]
    pub extractor: String,

    #[serde(default)]
    pub change_detection: ChangeDetection,

    /// Documents the adapter looks for, opaque to the orchestrator
    #[serde(default)]
    pub targets: Vec<TargetDocument>,
}

fn default_adapter() -> String {
    "link-scan".into()
}

fn default_extractor() -> String {
    "http-text".into()
}

impl SourceConfig {
    /// Create a source with default strategies and no targets.
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            adapter: default_adapter(),
            extractor: default_extractor(),
            change_detection: ChangeDetection::default(),
            targets: Vec::new(),
        }
    }

    /// Whether Phase A must hash each document.
    pub fn uses_content_hash(&self) -> bool {
        self.change_detection == ChangeDetection::ContentHash
    }

    /// Check the id is usable as a file name and the URL parses.
    pub fn validate(&self) -> Result<()> {
        let id = self.id.trim();
        if id.is_empty() {
            return Err(AppError::config("source id is empty"));
        }
        let safe = id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !safe || id.starts_with('.') {
            return Err(AppError::config(format!(
                "source id '{}' must use only [A-Za-z0-9._-] and not start with '.'",
                self.id
            )));
        }
        url::Url::parse(&self.url).map_err(|e| {
            AppError::config(format!("source '{}' has invalid url: {}", self.id, e))
        })?;
        Ok(())
    }
}

/// A named document an adapter should locate on the source page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetDocument {
    /// Document-type label, becomes the identity of single-valued targets
    pub name: String,

    /// Case-insensitive substrings matched against link text and href
    #[serde(default)]
    pub keywords: Vec<String>,

    /// CSS selector for candidate links
    #[serde(default)]
    pub selector: Option<String>,

    /// Accepted file extensions (without dot); empty accepts any
    #[serde(default)]
    pub extensions: Vec<String>,

    #[serde(default)]
    pub category: Option<String>,

    /// Keep every match instead of the most recent one
    #[serde(default)]
    pub multiple: bool,
}
