//! Consolidated per-source dataset.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::ExtractedUnit;

/// How fresh units were folded into the dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeMode {
    /// Units replaced wholesale
    Full,
    /// Only units matching fresh identities replaced
    Selective,
}

impl fmt::Display for MergeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => f.write_str("full"),
            Self::Selective => f.write_str("selective"),
        }
    }
}

/// Bookkeeping for the most recent merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastUpdate {
    pub updated_count: usize,
    pub updated_urls: BTreeSet<String>,
    pub mode: MergeMode,
}

/// Persisted `<source>.json` contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidatedDataset {
    pub source: String,
    pub crawled_at: DateTime<Utc>,
    pub total_units: usize,
    pub successful_units: usize,
    pub failed_units: usize,
    pub units: Vec<ExtractedUnit>,
    pub last_update: LastUpdate,
}

impl ConsolidatedDataset {
    /// Build a dataset, deriving every counter from `units`.
    pub fn from_units(
        source: impl Into<String>,
        crawled_at: DateTime<Utc>,
        units: Vec<ExtractedUnit>,
        last_update: LastUpdate,
    ) -> Self {
        let successful_units = units.iter().filter(|u| u.is_success()).count();
        Self {
            source: source.into(),
            crawled_at,
            total_units: units.len(),
            successful_units,
            failed_units: units.len() - successful_units,
            units,
            last_update,
        }
    }

    /// Check the counter and uniqueness invariants.
    pub fn check_invariants(&self) -> std::result::Result<(), String> {
        if self.total_units != self.units.len() {
            return Err(format!(
                "totalUnits {} does not match {} units",
                self.total_units,
                self.units.len()
            ));
        }
        if self.successful_units + self.failed_units != self.total_units {
            return Err(format!(
                "successfulUnits {} + failedUnits {} != totalUnits {}",
                self.successful_units, self.failed_units, self.total_units
            ));
        }
        let mut keys = BTreeSet::new();
        for unit in &self.units {
            if !keys.insert(unit.identity_key.as_str()) {
                return Err(format!("duplicate identity key '{}'", unit.identity_key));
            }
        }
        Ok(())
    }

    pub fn find(&self, identity_key: &str) -> Option<&ExtractedUnit> {
        self.units.iter().find(|u| u.identity_key == identity_key)
    }
}
