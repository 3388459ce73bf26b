//! Crawl cycle stages.
//!
//! - `detect`: classify manifests against the registry
//! - `merge`: fold fresh units into a consolidated dataset
//! - `validate`: payload and configuration sanity checks
//! - `cycle`: the two-phase orchestrator tying them together

pub mod cycle;
pub mod detect;
pub mod merge;
pub mod validate;

pub use cycle::{CrawlOrchestrator, CycleOptions};
pub use detect::{ChangeDetector, detect_changes};
pub use merge::{DatasetMerger, reconcile};
pub use validate::{run_validate, validate_extraction};
