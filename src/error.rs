// src/error.rs

//! Unified error handling for the crawler.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for crawler operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Adapter could not produce a manifest for a source
    #[error("Manifest error for {source_id}: {message}")]
    Manifest { source_id: String, message: String },

    /// A single document could not be extracted
    #[error("Extraction error for {url}: {message}")]
    Extraction { url: String, message: String },

    /// Extracted payload failed a sanity check
    #[error("Validation error: {0}")]
    Validation(String),

    /// Dataset reconciliation failed
    #[error("Merge error: {0}")]
    Merge(String),

    /// Durable write or rename failed
    #[error("Store error at {path}: {message}")]
    Store { path: String, message: String },

    /// An adapter, extractor or hasher call exceeded its budget
    #[error("Timed out after {secs}s: {context}")]
    Timeout { context: String, secs: u64 },
}

impl AppError {
    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a manifest error for a source.
    pub fn manifest(source_id: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Manifest {
            source_id: source_id.into(),
            message: message.to_string(),
        }
    }

    /// Create an extraction error for a document.
    pub fn extraction(url: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Extraction {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a merge error.
    pub fn merge(message: impl Into<String>) -> Self {
        Self::Merge(message.into())
    }

    /// Create a store error for a path.
    pub fn store(path: impl AsRef<Path>, message: impl fmt::Display) -> Self {
        Self::Store {
            path: path.as_ref().display().to_string(),
            message: message.to_string(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(context: impl Into<String>, secs: u64) -> Self {
        Self::Timeout {
            context: context.into(),
            secs,
        }
    }

    /// The cycle stage this error is reported under.
    pub fn stage(&self) -> FailureStage {
        match self {
            Self::Manifest { .. } | Self::Selector { .. } | Self::Url(_) => FailureStage::Manifest,
            Self::Extraction { .. } | Self::Http(_) | Self::Timeout { .. } => {
                FailureStage::Extraction
            }
            Self::Validation(_) => FailureStage::Validation,
            Self::Merge(_) | Self::Json(_) => FailureStage::Merge,
            Self::Store { .. } | Self::Io(_) => FailureStage::Store,
            Self::Config(_) | Self::Toml(_) => FailureStage::Config,
        }
    }
}

/// Where in the cycle a source failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureStage {
    Manifest,
    Detection,
    Extraction,
    Validation,
    Merge,
    Store,
    Config,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Manifest => "manifest",
            Self::Detection => "detection",
            Self::Extraction => "extraction",
            Self::Validation => "validation",
            Self::Merge => "merge",
            Self::Store => "store",
            Self::Config => "config",
        };
        f.write_str(s)
    }
}
