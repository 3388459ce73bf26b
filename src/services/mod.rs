//! Source strategies.
//!
//! The cycle only talks to three capabilities:
//! - [`SourceAdapter`]: list a source's documents without downloading them
//! - [`ContentExtractor`]: download one document and turn it into a payload
//! - [`ContentHasher`]: fingerprint a document for content-hash sources
//!
//! Concrete implementations are looked up by name in [`Strategies`], so
//! per-source behavior is configuration data rather than code.

mod adapter;
mod extractor;
mod hasher;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::{DocumentReference, Extraction, SourceConfig, SourceManifest};

pub use adapter::{LINK_SCAN, LinkScanAdapter};
pub use extractor::{HTTP_TEXT, HttpTextExtractor};
pub use hasher::HttpContentHasher;

/// Produces a download-free listing of a source's documents.
///
/// Implementations must surface failures rather than retry internally.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    async fn fetch_manifest(&self, source: &SourceConfig) -> Result<SourceManifest>;
}

/// Downloads and extracts a single document.
#[async_trait]
pub trait ContentExtractor: Send + Sync {
    async fn extract(
        &self,
        source: &SourceConfig,
        document: &DocumentReference,
    ) -> Result<Extraction>;
}

/// Fingerprints a document's content.
#[async_trait]
pub trait ContentHasher: Send + Sync {
    async fn hash(&self, url: &str) -> Result<String>;
}

/// Named adapters and extractors plus the content hasher.
#[derive(Clone)]
pub struct Strategies {
    adapters: HashMap<String, Arc<dyn SourceAdapter>>,
    extractors: HashMap<String, Arc<dyn ContentExtractor>>,
    hasher: Arc<dyn ContentHasher>,
}

impl Strategies {
    /// Empty set with the given hasher.
    pub fn new(hasher: Arc<dyn ContentHasher>) -> Self {
        Self {
            adapters: HashMap::new(),
            extractors: HashMap::new(),
            hasher,
        }
    }

    /// Built-in `link-scan` adapter, `http-text` extractor and SHA-256 hasher.
    pub fn with_defaults(client: reqwest::Client) -> Self {
        Self::new(Arc::new(HttpContentHasher::new(client.clone())))
            .register_adapter(LINK_SCAN, Arc::new(LinkScanAdapter::new(client.clone())))
            .register_extractor(HTTP_TEXT, Arc::new(HttpTextExtractor::new(client)))
    }

    pub fn register_adapter(
        mut self,
        name: impl Into<String>,
        adapter: Arc<dyn SourceAdapter>,
    ) -> Self {
        self.adapters.insert(name.into(), adapter);
        self
    }

    pub fn register_extractor(
        mut self,
        name: impl Into<String>,
        extractor: Arc<dyn ContentExtractor>,
    ) -> Self {
        self.extractors.insert(name.into(), extractor);
        self
    }

    /// Adapter configured for `source`. Unknown names are manifest errors.
    pub fn adapter(&self, source: &SourceConfig) -> Result<Arc<dyn SourceAdapter>> {
        self.adapters.get(&source.adapter).cloned().ok_or_else(|| {
            AppError::manifest(&source.id, format!("unknown adapter '{}'", source.adapter))
        })
    }

    /// Extractor configured for `source`. Unknown names are extraction errors.
    pub fn extractor(&self, source: &SourceConfig) -> Result<Arc<dyn ContentExtractor>> {
        self.extractors.get(&source.extractor).cloned().ok_or_else(|| {
            AppError::extraction(
                &source.url,
                format!("unknown extractor '{}'", source.extractor),
            )
        })
    }

    pub fn hasher(&self) -> Arc<dyn ContentHasher> {
        Arc::clone(&self.hasher)
    }
}
