//! Dataset reconciliation.
//!
//! Full mode replaces the dataset with the fresh batch. Selective mode puts
//! the fresh units first and keeps every existing unit whose identity key the
//! batch does not carry. Documents that disappeared from a source are never
//! pruned here.

use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Utc};

use crate::error::{AppError, Result};
use crate::models::{ConsolidatedDataset, ExtractedUnit, LastUpdate, MergeMode};

#[derive(Debug, Clone, Default)]
pub struct DatasetMerger;

impl DatasetMerger {
    pub fn new() -> Self {
        Self
    }

    /// Fold `fresh` into `existing` according to `mode`.
    ///
    /// Counters are recomputed from the resulting units. Duplicate identity
    /// keys in either input are a merge error.
    pub fn reconcile(
        &self,
        source: &str,
        fresh: Vec<ExtractedUnit>,
        existing: Option<&ConsolidatedDataset>,
        mode: MergeMode,
        crawled_at: DateTime<Utc>,
    ) -> Result<ConsolidatedDataset> {
        let fresh_keys = unique_keys(&fresh, "fresh batch")?;

        let last_update = LastUpdate {
            updated_count: fresh.len(),
            updated_urls: fresh.iter().map(|u| u.source_url.clone()).collect::<BTreeSet<_>>(),
            mode,
        };

        let units = match (mode, existing) {
            (MergeMode::Selective, Some(existing)) => {
                unique_keys(&existing.units, "existing dataset")?;
                let kept: Vec<ExtractedUnit> = existing
                    .units
                    .iter()
                    .filter(|u| !fresh_keys.contains(u.identity_key.as_str()))
                    .cloned()
                    .collect();
                let mut units = fresh;
                units.extend(kept);
                units
            }
            _ => fresh,
        };

        let dataset = ConsolidatedDataset::from_units(source, crawled_at, units, last_update);
        log::debug!(
            "Reconciled {} in {} mode: {} units ({} ok, {} failed)",
            source,
            mode,
            dataset.total_units,
            dataset.successful_units,
            dataset.failed_units
        );
        Ok(dataset)
    }
}

fn unique_keys<'a>(units: &'a [ExtractedUnit], what: &str) -> Result<HashSet<&'a str>> {
    let mut keys = HashSet::with_capacity(units.len());
    for unit in units {
        if !keys.insert(unit.identity_key.as_str()) {
            return Err(AppError::merge(format!(
                "identity key '{}' appears twice in {}",
                unit.identity_key, what
            )));
        }
    }
    Ok(keys)
}

/// Convenience function using the default merger.
pub fn reconcile(
    source: &str,
    fresh: Vec<ExtractedUnit>,
    existing: Option<&ConsolidatedDataset>,
    mode: MergeMode,
    crawled_at: DateTime<Utc>,
) -> Result<ConsolidatedDataset> {
    DatasetMerger::new().reconcile(source, fresh, existing, mode, crawled_at)
}
