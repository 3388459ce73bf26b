//! Extracted units and their identity keys.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use unicode_segmentation::UnicodeSegmentation;

use crate::models::DocumentReference;

/// Reporting summary returned by an extractor, never used for merging.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionSummary {
    pub char_count: usize,
}

/// What a `ContentExtractor` produces for one document.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub payload: Value,
    pub summary: ExtractionSummary,
}

impl Extraction {
    pub fn new(payload: Value, char_count: usize) -> Self {
        Self {
            payload,
            summary: ExtractionSummary { char_count },
        }
    }
}

/// One logical document inside a consolidated dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedUnit {
    pub identity_key: String,

    pub source_url: String,

    #[serde(default)]
    pub display_text: String,

    #[serde(default)]
    pub category: Option<String>,

    #[serde(default)]
    pub payload: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<ExtractionSummary>,

    #[serde(default)]
    pub error: Option<String>,
}

impl ExtractedUnit {
    /// Unit for a successfully extracted document.
    pub fn extracted(document: &DocumentReference, extraction: Extraction) -> Self {
        Self {
            identity_key: identity_key(document),
            source_url: document.url.clone(),
            display_text: document.display_text.clone(),
            category: document.category.clone(),
            payload: extraction.payload,
            summary: Some(extraction.summary),
            error: None,
        }
    }

    /// Unit recording an extraction failure.
    pub fn failed(document: &DocumentReference, error: impl Into<String>) -> Self {
        Self {
            identity_key: identity_key(document),
            source_url: document.url.clone(),
            display_text: document.display_text.clone(),
            category: document.category.clone(),
            payload: Value::Null,
            summary: None,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Stable merge key for a document.
///
/// Document-type label (trimmed, case-folded), then normalized display text,
/// then the raw URL.
pub fn identity_key(document: &DocumentReference) -> String {
    derive_identity_key(
        document.doc_type.as_deref(),
        &document.display_text,
        &document.url,
    )
}

/// Identity key from its raw ingredients.
pub fn derive_identity_key(doc_type: Option<&str>, display_text: &str, url: &str) -> String {
    if let Some(label) = doc_type {
        let label = label.trim().to_lowercase();
        if !label.is_empty() {
            return label;
        }
    }

    let name = normalize_display(display_text);
    if !name.is_empty() {
        return name;
    }

    url.trim().to_string()
}

/// Lowercase words joined by single spaces, punctuation dropped.
pub fn normalize_display(text: &str) -> String {
    text.to_lowercase()
        .unicode_words()
        .collect::<Vec<_>>()
        .join(" ")
}
