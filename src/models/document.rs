//! Document references and source manifests.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A candidate document found by an adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentReference {
    pub url: String,

    pub display_text: String,

    #[serde(default)]
    pub category: Option<String>,

    /// Semantic document-type label, preferred source of the identity key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<String>,
}

impl DocumentReference {
    pub fn new(url: impl Into<String>, display_text: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            display_text: display_text.into(),
            category: None,
            doc_type: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_doc_type(mut self, doc_type: impl Into<String>) -> Self {
        self.doc_type = Some(doc_type.into());
        self
    }
}

/// Download-free listing of a source's documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceManifest {
    pub source: String,

    pub documents: Vec<DocumentReference>,

    pub fetched_at: DateTime<Utc>,

    /// `url -> sha256` for content-hash sources, filled in by Phase A
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hashes: Option<BTreeMap<String, String>>,
}

impl SourceManifest {
    pub fn new(source: impl Into<String>, documents: Vec<DocumentReference>) -> Self {
        Self {
            source: source.into(),
            documents,
            fetched_at: Utc::now(),
            content_hashes: None,
        }
    }

    /// Document URLs as a set (order and duplicates ignored).
    pub fn url_set(&self) -> BTreeSet<String> {
        self.documents.iter().map(|d| d.url.clone()).collect()
    }

    /// Document URLs in manifest order, first occurrence wins.
    pub fn ordered_urls(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.documents
            .iter()
            .filter(|d| seen.insert(d.url.as_str()))
            .map(|d| d.url.clone())
            .collect()
    }

    /// Documents whose URL is in `urls`, in manifest order.
    pub fn select(&self, urls: &BTreeSet<String>) -> Vec<&DocumentReference> {
        let mut seen = BTreeSet::new();
        self.documents
            .iter()
            .filter(|d| urls.contains(&d.url) && seen.insert(d.url.as_str()))
            .collect()
    }

    /// Every document once, in manifest order.
    pub fn unique_documents(&self) -> Vec<&DocumentReference> {
        let mut seen = BTreeSet::new();
        self.documents
            .iter()
            .filter(|d| seen.insert(d.url.as_str()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest() -> SourceManifest {
        SourceManifest::new(
            "acme",
            vec![
                DocumentReference::new("https://acme.example/b.pdf", "B"),
                DocumentReference::new("https://acme.example/a.pdf", "A"),
                DocumentReference::new("https://acme.example/b.pdf", "B again"),
            ],
        )
    }

    #[test]
    fn test_ordered_urls_dedupes() {
        assert_eq!(
            manifest().ordered_urls(),
            vec!["https://acme.example/b.pdf", "https://acme.example/a.pdf"]
        );
        assert_eq!(manifest().url_set().len(), 2);
    }

    #[test]
    fn test_select_keeps_manifest_order() {
        let m = manifest();
        let wanted: BTreeSet<String> = ["https://acme.example/b.pdf".to_string()].into();
        let picked = m.select(&wanted);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].display_text, "B");
    }
}
