//! Per-source outcomes and cycle reporting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FailureStage;
use crate::models::{ChangeRecord, Classification, MergeMode};

/// Final state of one source after a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    /// Manifest fetched, nothing to do
    Unchanged,
    /// Phase B wrote a dataset
    Updated,
    Failed,
}

/// What happened to one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceOutcome {
    pub source: String,
    pub status: OutcomeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<Classification>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<MergeMode>,
    /// Documents handed to the extractor
    pub processed_documents: usize,
    pub successful_units: usize,
    pub failed_units: usize,
    /// Units dropped by validation
    pub rejected_units: usize,
    /// Units in the dataset after the merge
    pub total_units: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<FailureStage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SourceOutcome {
    fn base(source: &str, status: OutcomeStatus, classification: Option<Classification>) -> Self {
        Self {
            source: source.to_string(),
            status,
            classification,
            mode: None,
            processed_documents: 0,
            successful_units: 0,
            failed_units: 0,
            rejected_units: 0,
            total_units: 0,
            dataset_path: None,
            stage: None,
            error: None,
        }
    }

    /// Source whose manifest matched the registry.
    pub fn unchanged(source: &str) -> Self {
        Self::base(source, OutcomeStatus::Unchanged, Some(Classification::Unchanged))
    }

    /// Source that wrote a dataset.
    pub fn updated(source: &str, classification: Classification, mode: MergeMode) -> Self {
        let mut outcome = Self::base(source, OutcomeStatus::Updated, Some(classification));
        outcome.mode = Some(mode);
        outcome
    }

    /// Source that failed at `stage`.
    pub fn failed(
        source: &str,
        classification: Option<Classification>,
        stage: FailureStage,
        error: impl Into<String>,
    ) -> Self {
        let mut outcome = Self::base(source, OutcomeStatus::Failed, classification);
        outcome.stage = Some(stage);
        outcome.error = Some(error.into());
        outcome
    }

    pub fn is_failure(&self) -> bool {
        self.status == OutcomeStatus::Failed
    }

    /// "N units failed to extract" when the source succeeded only partially.
    pub fn extraction_shortfall(&self) -> Option<String> {
        let missing = self.failed_units + self.rejected_units;
        if self.status == OutcomeStatus::Updated && missing > 0 {
            Some(format!("{} units failed to extract", missing))
        } else {
            None
        }
    }
}

/// Immutable result of one cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleResult {
    /// True when the gate found nothing to process
    pub no_op: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Detector verdicts, one per source
    pub changes: Vec<ChangeRecord>,
    pub succeeded: Vec<SourceOutcome>,
    pub failed: Vec<SourceOutcome>,
}

impl CycleResult {
    /// Build the caller-facing report.
    pub fn report(&self) -> CycleReport {
        let total_sources = self.succeeded.len() + self.failed.len();
        let changed = self
            .changes
            .iter()
            .filter(|c| c.classification.needs_processing())
            .count();
        let skipped_unchanged = self
            .succeeded
            .iter()
            .filter(|o| o.status == OutcomeStatus::Unchanged)
            .count();
        let change_rate_percent = if total_sources == 0 {
            0.0
        } else {
            (changed as f64 / total_sources as f64 * 1000.0).round() / 10.0
        };

        let mut details: Vec<SourceOutcome> = self
            .succeeded
            .iter()
            .chain(self.failed.iter())
            .cloned()
            .collect();
        details.sort_by(|a, b| a.source.cmp(&b.source));

        CycleReport {
            no_op: self.no_op,
            started_at: self.started_at,
            finished_at: self.finished_at,
            total_sources,
            succeeded: self.succeeded.len(),
            failed: self.failed.len(),
            skipped_unchanged,
            change_rate_percent,
            details,
        }
    }
}

/// Summary consumed by CLIs and notifiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    pub no_op: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub total_sources: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped_unchanged: usize,
    pub change_rate_percent: f64,
    pub details: Vec<SourceOutcome>,
}
