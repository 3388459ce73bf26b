//! Change detection between fresh manifests and the registry.
//!
//! Classifies every source as New, Updated, Unchanged or Error and computes
//! the subset of document URLs that must be re-extracted.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::Result;
use crate::models::{ChangeRecord, Classification, SourceManifest};
use crate::storage::RegistrySnapshot;

/// Compares manifests with the last known identities.
///
/// Content hashes are compared only for manifests that carry them, i.e.
/// sources configured for content-hash detection.
#[derive(Debug, Clone, Default)]
pub struct ChangeDetector;

impl ChangeDetector {
    pub fn new() -> Self {
        Self
    }

    /// Classify every Phase-A result, in input order.
    pub fn detect(
        &self,
        manifests: &[(String, Result<SourceManifest>)],
        registry: &RegistrySnapshot,
    ) -> Vec<ChangeRecord> {
        manifests
            .iter()
            .map(|(source, manifest)| match manifest {
                Ok(manifest) => self.classify(source, manifest, registry),
                Err(e) => ChangeRecord::error(source.as_str(), e.to_string()),
            })
            .collect()
    }

    /// Classify one successfully fetched manifest.
    pub fn classify(
        &self,
        source: &str,
        manifest: &SourceManifest,
        registry: &RegistrySnapshot,
    ) -> ChangeRecord {
        if manifest.documents.is_empty() {
            return ChangeRecord::error(source, "no documents found");
        }

        let current = manifest.url_set();
        let stored = registry.stored_urls(source);

        if stored.is_empty() {
            return ChangeRecord {
                source: source.to_string(),
                classification: Classification::New,
                old_urls: BTreeSet::new(),
                changed_refs: current.clone(),
                new_urls: current,
                summary: Some(format!("first crawl, {} documents", manifest_len(manifest))),
                error: None,
            };
        }

        // Retained URLs whose content hash moved, whether or not the set changed.
        let retained: BTreeSet<String> = current.intersection(&stored).cloned().collect();
        let mismatched = hash_mismatches(manifest, registry.stored_hashes(source), &retained);

        if current != stored {
            let added: BTreeSet<String> = current.difference(&stored).cloned().collect();
            let removed: BTreeSet<String> = stored.difference(&current).cloned().collect();
            let mut summary = describe_url_change(stored.len(), current.len(), &added, &removed);
            if !mismatched.is_empty() {
                summary.push_str(&format!("; {}", describe_content_change(&mismatched)));
            }
            return ChangeRecord {
                source: source.to_string(),
                classification: Classification::Updated,
                old_urls: stored,
                new_urls: current,
                changed_refs: added.union(&mismatched).cloned().collect(),
                summary: Some(summary),
                error: None,
            };
        }

        if !mismatched.is_empty() {
            return ChangeRecord {
                source: source.to_string(),
                classification: Classification::Updated,
                old_urls: stored,
                new_urls: current,
                summary: Some(describe_content_change(&mismatched)),
                changed_refs: mismatched,
                error: None,
            };
        }

        ChangeRecord {
            source: source.to_string(),
            classification: Classification::Unchanged,
            old_urls: stored,
            new_urls: current,
            changed_refs: BTreeSet::new(),
            summary: None,
            error: None,
        }
    }
}

/// URLs in `urls` whose current hash differs from the stored one. A URL
/// without a stored hash counts as changed.
fn hash_mismatches(
    manifest: &SourceManifest,
    stored: Option<&BTreeMap<String, String>>,
    urls: &BTreeSet<String>,
) -> BTreeSet<String> {
    let Some(current) = &manifest.content_hashes else {
        return BTreeSet::new();
    };
    current
        .iter()
        .filter(|(url, hash)| {
            urls.contains(*url) && stored.and_then(|s| s.get(*url)) != Some(*hash)
        })
        .map(|(url, _)| url.clone())
        .collect()
}

fn describe_content_change(urls: &BTreeSet<String>) -> String {
    format!(
        "content changed: {}",
        urls.iter().cloned().collect::<Vec<_>>().join(", ")
    )
}

fn manifest_len(manifest: &SourceManifest) -> usize {
    manifest.url_set().len()
}

fn describe_url_change(
    before: usize,
    after: usize,
    added: &BTreeSet<String>,
    removed: &BTreeSet<String>,
) -> String {
    let mut parts = vec![format!("document count {} -> {}", before, after)];
    if !added.is_empty() {
        parts.push(format!(
            "added: {}",
            added.iter().cloned().collect::<Vec<_>>().join(", ")
        ));
    }
    if !removed.is_empty() {
        parts.push(format!(
            "removed: {}",
            removed.iter().cloned().collect::<Vec<_>>().join(", ")
        ));
    }
    parts.join("; ")
}

/// Convenience function to classify manifests with hash fallback enabled.
pub fn detect_changes(
    manifests: &[(String, Result<SourceManifest>)],
    registry: &RegistrySnapshot,
) -> Vec<ChangeRecord> {
    ChangeDetector::new().detect(manifests, registry)
}
