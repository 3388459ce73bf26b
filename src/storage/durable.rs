//! Atomic file persistence.
//!
//! Every durable write goes through the same protocol:
//!
//! 1. write the new bytes to `<name>.tmp` and flush
//! 2. copy the current target (if any) to `<name>.backup` (best effort)
//! 3. rename `<name>.tmp` onto `<name>`
//!
//! The rename is the commit point. A crash before it leaves the old file in
//! place, a crash after it leaves the new file complete. A failed staging
//! step never touches the target; a failed commit restores it from the
//! backup before the error is returned.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::{Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};

const TMP_SUFFIX: &str = ".tmp";
const BACKUP_SUFFIX: &str = ".backup";

/// Crash-safe reader/writer for whole files.
#[derive(Debug, Clone, Default)]
pub struct DurableStore;

impl DurableStore {
    pub fn new() -> Self {
        Self
    }

    /// Sibling temp path for `path`.
    pub fn temp_path(path: &Path) -> PathBuf {
        sibling(path, TMP_SUFFIX)
    }

    /// Sibling backup path for `path`.
    pub fn backup_path(path: &Path) -> PathBuf {
        sibling(path, BACKUP_SUFFIX)
    }

    /// Replace `path` with `bytes` atomically.
    pub async fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        ensure_parent(path).await?;

        let tmp = match self.stage(path, bytes).await {
            Ok(tmp) => tmp,
            Err(e) => {
                log::error!("Staging write to {} failed: {}", path.display(), e);
                let _ = tokio::fs::remove_file(Self::temp_path(path)).await;
                return Err(e);
            }
        };

        let backed_up = self.backup(path).await;
        self.commit_or_restore(&tmp, path, backed_up).await
    }

    /// Write `bytes` to the temp sibling without touching `path`.
    pub async fn stage(&self, path: &Path, bytes: &[u8]) -> Result<PathBuf> {
        let tmp = Self::temp_path(path);
        let mut file = tokio::fs::File::create(&tmp)
            .await
            .map_err(|e| AppError::store(&tmp, e))?;
        file.write_all(bytes)
            .await
            .map_err(|e| AppError::store(&tmp, e))?;
        file.flush().await.map_err(|e| AppError::store(&tmp, e))?;
        file.sync_all().await.map_err(|e| AppError::store(&tmp, e))?;
        drop(file);
        Ok(tmp)
    }

    /// Rename a staged temp file onto `path`.
    pub async fn commit(&self, tmp: &Path, path: &Path) -> Result<()> {
        tokio::fs::rename(tmp, path)
            .await
            .map_err(|e| AppError::store(path, format!("rename failed: {e}")))
    }

    /// Read bytes, returning None if the file doesn't exist.
    pub async fn read_if_exists(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::store(path, e)),
        }
    }

    /// Serialize `value` as pretty JSON and write it atomically.
    pub async fn write_json<T: Serialize + ?Sized>(&self, path: &Path, value: &T) -> Result<()> {
        let mut bytes = serde_json::to_vec_pretty(value)?;
        bytes.push(b'\n');
        self.write_atomic(path, &bytes).await
    }

    /// Read and parse JSON, returning None if the file doesn't exist.
    pub async fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>> {
        match self.read_if_exists(path).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Copy the current target to its backup sibling. Returns whether a backup exists.
    async fn backup(&self, path: &Path) -> bool {
        match tokio::fs::try_exists(path).await {
            Ok(true) => {}
            Ok(false) => return false,
            Err(e) => {
                log::warn!("Cannot check {} before backup: {}", path.display(), e);
                return false;
            }
        }

        let backup = Self::backup_path(path);
        match tokio::fs::copy(path, &backup).await {
            Ok(_) => true,
            Err(e) => {
                log::warn!(
                    "Backup of {} to {} failed: {}",
                    path.display(),
                    backup.display(),
                    e
                );
                false
            }
        }
    }

    async fn commit_or_restore(&self, tmp: &Path, path: &Path, backed_up: bool) -> Result<()> {
        let Err(e) = self.commit(tmp, path).await else {
            return Ok(());
        };
        log::error!("Durable write to {} failed: {}", path.display(), e);
        let _ = tokio::fs::remove_file(tmp).await;
        if backed_up {
            self.restore(path).await;
        }
        Err(e)
    }

    async fn restore(&self, path: &Path) {
        let backup = Self::backup_path(path);
        match tokio::fs::copy(&backup, path).await {
            Ok(_) => log::warn!("Restored {} from {}", path.display(), backup.display()),
            Err(e) => log::error!(
                "Restore of {} from {} failed: {}",
                path.display(),
                backup.display(),
                e
            ),
        }
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

async fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::store(parent, e))?;
        }
    }
    Ok(())
}
