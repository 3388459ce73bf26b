//! Per-source dataset files: `{datasets_dir}/<id>/<id>.json`.

use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};
use crate::models::ConsolidatedDataset;
use crate::storage::DurableStore;

#[derive(Debug, Clone)]
pub struct DatasetStore {
    root: PathBuf,
    store: DurableStore,
}

impl DatasetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            store: DurableStore::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, source: &str) -> PathBuf {
        self.root.join(source).join(format!("{source}.json"))
    }

    /// Load the existing dataset for `source`.
    ///
    /// A file that doesn't parse or violates the counter invariants is a
    /// merge error, so the source fails instead of being silently rebuilt.
    pub async fn load(&self, source: &str) -> Result<Option<ConsolidatedDataset>> {
        let path = self.path(source);
        let Some(bytes) = self.store.read_if_exists(&path).await? else {
            return Ok(None);
        };

        let dataset: ConsolidatedDataset = serde_json::from_slice(&bytes).map_err(|e| {
            AppError::merge(format!("malformed dataset {}: {}", path.display(), e))
        })?;
        dataset.check_invariants().map_err(|e| {
            AppError::merge(format!("malformed dataset {}: {}", path.display(), e))
        })?;
        Ok(Some(dataset))
    }

    /// Write the dataset atomically and return its path.
    pub async fn save(&self, dataset: &ConsolidatedDataset) -> Result<PathBuf> {
        let path = self.path(&dataset.source);
        self.store.write_json(&path, dataset).await?;
        log::info!(
            "Saved {} ({} units, {} failed)",
            path.display(),
            dataset.total_units,
            dataset.failed_units
        );
        Ok(path)
    }
}
