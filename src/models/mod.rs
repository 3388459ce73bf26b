// src/models/mod.rs

//! Domain models for the crawler.
//!
//! Configuration, the ephemeral per-cycle types (manifests, change records,
//! outcomes) and the durable dataset types.

mod change;
mod config;
mod dataset;
mod document;
mod report;
mod source;
mod unit;

// Re-export all public types
pub use change::{ChangeRecord, Classification};
pub use config::{Config, CrawlerConfig, StorageConfig, ValidationConfig, ValidationPolicy};
pub use dataset::{ConsolidatedDataset, LastUpdate, MergeMode};
pub use document::{DocumentReference, SourceManifest};
pub use report::{CycleReport, CycleResult, OutcomeStatus, SourceOutcome};
pub use source::{ChangeDetection, SourceConfig, TargetDocument};
pub use unit::{
    ExtractedUnit, Extraction, ExtractionSummary, derive_identity_key, identity_key,
    normalize_display,
};
