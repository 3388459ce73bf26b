//! Change classification records.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Outcome of comparing a manifest with the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    New,
    Updated,
    Unchanged,
    Error,
}

impl Classification {
    /// Whether the source needs Phase B.
    pub fn needs_processing(self) -> bool {
        matches!(self, Self::New | Self::Updated)
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::New => "new",
            Self::Updated => "updated",
            Self::Unchanged => "unchanged",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// Per-source detector verdict for one cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    pub source: String,
    pub classification: Classification,
    pub old_urls: BTreeSet<String>,
    pub new_urls: BTreeSet<String>,
    /// URLs that must be re-extracted
    pub changed_refs: BTreeSet<String>,
    /// Human-readable change description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChangeRecord {
    pub fn error(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            classification: Classification::Error,
            old_urls: BTreeSet::new(),
            new_urls: BTreeSet::new(),
            changed_refs: BTreeSet::new(),
            summary: None,
            error: Some(message.into()),
        }
    }

    /// URLs that disappeared since the last cycle.
    pub fn removed_urls(&self) -> BTreeSet<String> {
        self.old_urls.difference(&self.new_urls).cloned().collect()
    }
}
