//! Change registry: last known document identities per source.
//!
//! ```text
//! {registry_dir}/
//! ├── latest-urls.json     # sourceId -> url | [url, ...]
//! └── latest-hashes.json   # sourceId -> { url: sha256 }
//! ```
//!
//! Entries are replaced per source and never deleted. All writes go through
//! [`RegistryWriter`], a single task that applies one delta at a time, so
//! concurrent sources never lose each other's updates.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{AppError, Result};
use crate::storage::DurableStore;

pub const URLS_FILE: &str = "latest-urls.json";
pub const HASHES_FILE: &str = "latest-hashes.json";

const WRITER_QUEUE: usize = 64;

/// Stored URL identity for one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RegistryEntry {
    Single(String),
    Multiple(Vec<String>),
}

impl RegistryEntry {
    /// A lone URL is stored as a plain string, anything else as an array.
    pub fn from_urls(mut urls: Vec<String>) -> Self {
        if urls.len() == 1 {
            Self::Single(urls.remove(0))
        } else {
            Self::Multiple(urls)
        }
    }

    pub fn url_set(&self) -> BTreeSet<String> {
        match self {
            Self::Single(url) => BTreeSet::from([url.clone()]),
            Self::Multiple(urls) => urls.iter().cloned().collect(),
        }
    }
}

/// In-memory copy of both registry files, taken at cycle start.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegistrySnapshot {
    pub urls: BTreeMap<String, RegistryEntry>,
    pub hashes: BTreeMap<String, BTreeMap<String, String>>,
}

impl RegistrySnapshot {
    /// Stored URLs for a source (empty when unregistered).
    pub fn stored_urls(&self, source: &str) -> BTreeSet<String> {
        self.urls
            .get(source)
            .map(RegistryEntry::url_set)
            .unwrap_or_default()
    }

    pub fn stored_hashes(&self, source: &str) -> Option<&BTreeMap<String, String>> {
        self.hashes.get(source)
    }
}

/// Registry update for a single source.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryDelta {
    pub source: String,
    /// Full current URL set, manifest order
    pub urls: Vec<String>,
    /// Replacement hash map, only for content-hash sources
    pub hashes: Option<BTreeMap<String, String>>,
}

/// File-backed registry.
#[derive(Debug, Clone)]
pub struct ChangeRegistry {
    dir: PathBuf,
    store: DurableStore,
}

impl ChangeRegistry {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            store: DurableStore::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn urls_path(&self) -> PathBuf {
        self.dir.join(URLS_FILE)
    }

    pub fn hashes_path(&self) -> PathBuf {
        self.dir.join(HASHES_FILE)
    }

    /// Read both files. Missing files are an empty registry.
    pub async fn load(&self) -> Result<RegistrySnapshot> {
        let urls = self.read_map(&self.urls_path()).await?;
        let hashes = self.read_map(&self.hashes_path()).await?;
        Ok(RegistrySnapshot { urls, hashes })
    }

    /// Read-merge-write one delta into the files on disk.
    ///
    /// Not safe to call concurrently; use [`RegistryWriter`] for that.
    pub async fn apply(&self, delta: &RegistryDelta) -> Result<()> {
        let path = self.urls_path();
        let mut urls: BTreeMap<String, RegistryEntry> = self.read_map(&path).await?;
        urls.insert(
            delta.source.clone(),
            RegistryEntry::from_urls(delta.urls.clone()),
        );
        self.store.write_json(&path, &urls).await?;

        if let Some(hashes) = &delta.hashes {
            let path = self.hashes_path();
            let mut all: BTreeMap<String, BTreeMap<String, String>> =
                self.read_map(&path).await?;
            all.insert(delta.source.clone(), hashes.clone());
            self.store.write_json(&path, &all).await?;
        }

        log::info!(
            "Registry updated for {} ({} urls{})",
            delta.source,
            delta.urls.len(),
            if delta.hashes.is_some() { ", hashes" } else { "" }
        );
        Ok(())
    }

    async fn read_map<T>(&self, path: &Path) -> Result<BTreeMap<String, T>>
    where
        T: serde::de::DeserializeOwned,
    {
        match self.store.read_if_exists(path).await? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| AppError::store(path, format!("unreadable registry: {e}"))),
            None => Ok(BTreeMap::new()),
        }
    }
}

struct RegistryRequest {
    delta: RegistryDelta,
    ack: oneshot::Sender<Result<()>>,
}

/// Single writer task draining registry deltas in arrival order.
pub struct RegistryWriter {
    tx: mpsc::Sender<RegistryRequest>,
    handle: JoinHandle<()>,
    dir: PathBuf,
}

impl RegistryWriter {
    pub fn spawn(registry: ChangeRegistry) -> Self {
        let dir = registry.dir().to_path_buf();
        let (tx, mut rx) = mpsc::channel::<RegistryRequest>(WRITER_QUEUE);

        let handle = tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                let result = registry.apply(&request.delta).await;
                if let Err(e) = &result {
                    log::error!("Registry write for {} failed: {}", request.delta.source, e);
                }
                // Caller may have given up waiting
                let _ = request.ack.send(result);
            }
        });

        Self { tx, handle, dir }
    }

    /// Queue a delta and wait until it is durable.
    pub async fn submit(&self, delta: RegistryDelta) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(RegistryRequest { delta, ack })
            .await
            .map_err(|_| AppError::store(&self.dir, "registry writer stopped"))?;
        done.await
            .map_err(|_| AppError::store(&self.dir, "registry writer dropped the request"))?
    }

    /// Close the queue and wait for pending writes.
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.handle.await {
            log::error!("Registry writer task failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn delta(source: &str, urls: &[&str]) -> RegistryDelta {
        RegistryDelta {
            source: source.into(),
            urls: urls.iter().map(|u| u.to_string()).collect(),
            hashes: None,
        }
    }

    #[tokio::test]
    async fn test_empty_registry() {
        let tmp = TempDir::new().unwrap();
        let registry = ChangeRegistry::new(tmp.path());

        let snapshot = registry.load().await.unwrap();
        assert!(snapshot.urls.is_empty());
        assert!(snapshot.stored_urls("acme").is_empty());
    }

    #[tokio::test]
    async fn test_single_url_stored_as_string() {
        let tmp = TempDir::new().unwrap();
        let registry = ChangeRegistry::new(tmp.path());

        registry
            .apply(&delta("acme", &["https://acme.example/t.pdf"]))
            .await
            .unwrap();
        registry
            .apply(&delta("globex", &["https://g.example/1", "https://g.example/2"]))
            .await
            .unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(registry.urls_path()).unwrap()).unwrap();
        assert_eq!(raw["acme"], "https://acme.example/t.pdf");
        assert_eq!(raw["globex"][1], "https://g.example/2");

        let snapshot = registry.load().await.unwrap();
        assert_eq!(snapshot.stored_urls("globex").len(), 2);
    }

    #[tokio::test]
    async fn test_hashes_written_only_when_present() {
        let tmp = TempDir::new().unwrap();
        let registry = ChangeRegistry::new(tmp.path());

        registry.apply(&delta("acme", &["u1"])).await.unwrap();
        assert!(!registry.hashes_path().exists());

        let mut d = delta("acme", &["u1"]);
        d.hashes = Some(BTreeMap::from([("u1".to_string(), "abc".to_string())]));
        registry.apply(&d).await.unwrap();

        let snapshot = registry.load().await.unwrap();
        assert_eq!(snapshot.stored_hashes("acme").unwrap()["u1"], "abc");
    }

    #[tokio::test]
    async fn test_corrupt_registry_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let registry = ChangeRegistry::new(tmp.path());
        std::fs::write(registry.urls_path(), b"{ not json").unwrap();

        assert!(registry.load().await.is_err());
    }

    #[tokio::test]
    async fn test_writer_serializes_concurrent_deltas() {
        let tmp = TempDir::new().unwrap();
        let registry = ChangeRegistry::new(tmp.path());
        let writer = Arc::new(RegistryWriter::spawn(registry.clone()));

        let mut tasks = Vec::new();
        for i in 0..16 {
            let writer = Arc::clone(&writer);
            tasks.push(tokio::spawn(async move {
                let url = format!("https://s{i}.example/doc.pdf");
                writer.submit(delta(&format!("s{i}"), &[url.as_str()])).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let snapshot = registry.load().await.unwrap();
        assert_eq!(snapshot.urls.len(), 16);

        if let Ok(writer) = Arc::try_unwrap(writer) {
            writer.shutdown().await;
        }
    }
}
