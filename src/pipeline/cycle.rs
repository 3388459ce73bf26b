// src/pipeline/cycle.rs

//! Two-phase crawl cycle.
//!
//! Phase A fetches every source's manifest (cheap, no document downloads)
//! and hashes documents for content-hash sources. The change detector then
//! gates the cycle: if no source is New or Updated the cycle ends as a
//! no-op. Phase B extracts, merges and persists only the sources that
//! changed, then records their new identities in the registry.
//!
//! Every per-source failure is isolated into that source's outcome. Only
//! an unreadable registry aborts the cycle.

use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};

use crate::error::{AppError, FailureStage, Result};
use crate::models::{
    ChangeRecord, Classification, Config, CycleResult, DocumentReference, ExtractedUnit,
    Extraction, MergeMode, SourceConfig, SourceManifest, SourceOutcome, ValidationPolicy,
};
use crate::pipeline::{ChangeDetector, DatasetMerger, validate_extraction};
use crate::services::{ContentExtractor, Strategies};
use crate::storage::{ChangeRegistry, DatasetStore, RegistryDelta, RegistryWriter};

/// Per-run switches.
#[derive(Debug, Clone, Default)]
pub struct CycleOptions {
    /// Re-extract every reachable source in Full mode, ignoring the registry verdict
    pub force_full: bool,
    /// Restrict the cycle to these source ids (empty means all)
    pub only: Vec<String>,
}

/// Drives one crawl cycle over the configured sources.
pub struct CrawlOrchestrator {
    config: Arc<Config>,
    strategies: Strategies,
    datasets: DatasetStore,
    registry: ChangeRegistry,
    detector: ChangeDetector,
    merger: DatasetMerger,
}

impl CrawlOrchestrator {
    /// Orchestrator with stores resolved against `storage_dir`.
    pub fn new(config: Arc<Config>, strategies: Strategies, storage_dir: &Path) -> Self {
        let datasets = DatasetStore::new(config.storage.datasets_path(storage_dir));
        let registry = ChangeRegistry::new(config.storage.registry_path(storage_dir));
        Self::with_stores(config, strategies, datasets, registry)
    }

    pub fn with_stores(
        config: Arc<Config>,
        strategies: Strategies,
        datasets: DatasetStore,
        registry: ChangeRegistry,
    ) -> Self {
        Self {
            config,
            strategies,
            datasets,
            registry,
            detector: ChangeDetector::new(),
            merger: DatasetMerger::new(),
        }
    }

    pub fn datasets(&self) -> &DatasetStore {
        &self.datasets
    }

    pub fn registry(&self) -> &ChangeRegistry {
        &self.registry
    }

    /// Run a cycle over every configured source.
    pub async fn run(&self, options: &CycleOptions) -> Result<CycleResult> {
        self.run_cycle(&self.config.sources, options).await
    }

    /// Run a cycle over `sources`.
    pub async fn run_cycle(
        &self,
        sources: &[SourceConfig],
        options: &CycleOptions,
    ) -> Result<CycleResult> {
        let started_at = Utc::now();
        let sources = select_sources(sources, &options.only);
        let snapshot = self.registry.load().await?;
        let concurrency = self.config.crawler.max_concurrent.max(1);

        // Phase A
        log::info!("Fetching manifests for {} sources", sources.len());
        let manifests: Vec<(String, Result<SourceManifest>)> = stream::iter(sources.iter().copied())
            .map(|source| async move { (source.id.clone(), self.fetch_manifest(source).await) })
            .buffered(concurrency)
            .collect()
            .await;

        // Gate
        let changes = self.detector.detect(&manifests, &snapshot);

        let mut result = CycleResult {
            started_at: Some(started_at),
            ..CycleResult::default()
        };
        let mut jobs = Vec::new();

        for ((source, (_, manifest)), record) in sources.iter().zip(&manifests).zip(&changes) {
            log_classification(record);
            match (manifest, record.classification) {
                (Err(_), _) => result.failed.push(SourceOutcome::failed(
                    &source.id,
                    Some(Classification::Error),
                    FailureStage::Manifest,
                    record.error.clone().unwrap_or_default(),
                )),
                (Ok(_), Classification::Error) => result.failed.push(SourceOutcome::failed(
                    &source.id,
                    Some(Classification::Error),
                    FailureStage::Detection,
                    record.error.clone().unwrap_or_default(),
                )),
                (Ok(manifest), classification)
                    if options.force_full || classification.needs_processing() =>
                {
                    jobs.push((*source, manifest, record));
                }
                (Ok(_), _) => result.succeeded.push(SourceOutcome::unchanged(&source.id)),
            }
        }

        if jobs.is_empty() {
            log::info!(
                "No changes detected ({} unchanged, {} failed), skipping extraction",
                result.succeeded.len(),
                result.failed.len()
            );
            result.no_op = true;
            result.changes = changes;
            result.finished_at = Some(Utc::now());
            return Ok(result);
        }

        // Phase B
        log::info!("Processing {} changed sources", jobs.len());
        let writer = RegistryWriter::spawn(self.registry.clone());
        let registry_writer = &writer;

        let mut outcomes = stream::iter(jobs)
            .map(|(source, manifest, record)| async move {
                self.process_source(source, manifest, record, options, registry_writer)
                    .await
            })
            .buffer_unordered(concurrency);

        while let Some(outcome) = outcomes.next().await {
            if outcome.is_failure() {
                result.failed.push(outcome);
            } else {
                result.succeeded.push(outcome);
            }
        }
        drop(outcomes);
        writer.shutdown().await;

        result.changes = changes;
        result.finished_at = Some(Utc::now());
        log::info!(
            "Cycle finished: {} succeeded, {} failed",
            result.succeeded.len(),
            result.failed.len()
        );
        Ok(result)
    }

    /// Phase A for one source: manifest plus content hashes when configured.
    async fn fetch_manifest(&self, source: &SourceConfig) -> Result<SourceManifest> {
        let adapter = self.strategies.adapter(source)?;
        let secs = self.config.crawler.manifest_timeout_secs;
        let mut manifest = with_timeout(
            secs,
            format!("manifest for {}", source.id),
            adapter.fetch_manifest(source),
        )
        .await?;

        if source.uses_content_hash() && !manifest.documents.is_empty() {
            manifest.content_hashes = Some(self.hash_documents(&manifest).await?);
        }
        Ok(manifest)
    }

    async fn hash_documents(&self, manifest: &SourceManifest) -> Result<BTreeMap<String, String>> {
        let hasher = self.strategies.hasher();
        let secs = self.config.crawler.extract_timeout_secs;
        let concurrency = self.config.crawler.max_concurrent_documents.max(1);

        let results: Vec<(String, Result<String>)> = stream::iter(manifest.ordered_urls())
            .map(|url| {
                let hasher = Arc::clone(&hasher);
                async move {
                    let hash = with_timeout(secs, format!("hashing {url}"), hasher.hash(&url)).await;
                    (url, hash)
                }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let mut hashes = BTreeMap::new();
        for (url, hash) in results {
            hashes.insert(url, hash?);
        }
        Ok(hashes)
    }

    /// Phase B for one source, never failing the cycle.
    async fn process_source(
        &self,
        source: &SourceConfig,
        manifest: &SourceManifest,
        record: &ChangeRecord,
        options: &CycleOptions,
        writer: &RegistryWriter,
    ) -> SourceOutcome {
        match self.process(source, manifest, record, options, writer).await {
            Ok(outcome) => outcome,
            Err(e) => {
                log::error!("{}: failed at {} stage: {}", source.id, e.stage(), e);
                SourceOutcome::failed(&source.id, Some(record.classification), e.stage(), e.to_string())
            }
        }
    }

    async fn process(
        &self,
        source: &SourceConfig,
        manifest: &SourceManifest,
        record: &ChangeRecord,
        options: &CycleOptions,
        writer: &RegistryWriter,
    ) -> Result<SourceOutcome> {
        let existing = if options.force_full {
            None
        } else {
            self.datasets.load(&source.id).await?
        };

        let mode = if existing.is_some() && !record.changed_refs.is_empty() && !options.force_full {
            MergeMode::Selective
        } else {
            MergeMode::Full
        };
        let documents = match mode {
            MergeMode::Selective => manifest.select(&record.changed_refs),
            MergeMode::Full => manifest.unique_documents(),
        };
        log::info!(
            "{}: {} mode, extracting {} of {} documents",
            source.id,
            mode,
            documents.len(),
            manifest.url_set().len()
        );

        let extractor = self.strategies.extractor(source)?;
        let batch = self.extract_batch(source, &documents, &extractor).await?;

        if batch.successful == 0 {
            return Err(AppError::extraction(
                &source.url,
                format!(
                    "no document extracted successfully ({} failed, {} rejected)",
                    batch.failed, batch.rejected
                ),
            ));
        }

        let dataset = self.merger.reconcile(
            &source.id,
            batch.units,
            existing.as_ref(),
            mode,
            Utc::now(),
        )?;
        let path = self.datasets.save(&dataset).await?;

        writer
            .submit(RegistryDelta {
                source: source.id.clone(),
                urls: manifest.ordered_urls(),
                hashes: manifest.content_hashes.clone(),
            })
            .await?;

        let mut outcome = SourceOutcome::updated(&source.id, record.classification, mode);
        outcome.processed_documents = documents.len();
        outcome.successful_units = batch.successful;
        outcome.failed_units = batch.failed;
        outcome.rejected_units = batch.rejected;
        outcome.total_units = dataset.total_units;
        outcome.dataset_path = Some(path.display().to_string());

        if let Some(shortfall) = outcome.extraction_shortfall() {
            log::warn!("{}: {}", source.id, shortfall);
        }
        Ok(outcome)
    }

    /// Extract `documents` with bounded concurrency and apply the validation policy.
    async fn extract_batch(
        &self,
        source: &SourceConfig,
        documents: &[&DocumentReference],
        extractor: &Arc<dyn ContentExtractor>,
    ) -> Result<Batch> {
        let delay = Duration::from_millis(self.config.crawler.request_delay_ms);
        let concurrency = self.config.crawler.max_concurrent_documents.max(1);
        let secs = self.config.crawler.extract_timeout_secs;
        let policy = self.config.validation.policy;
        let min_chars = self.config.validation.min_chars;

        let mut results = stream::iter(documents.iter().copied())
            .map(|doc| async move {
                let extraction = with_timeout(
                    secs,
                    format!("extracting {}", doc.url),
                    extractor.extract(source, doc),
                )
                .await;
                (doc, extraction)
            })
            .buffered(concurrency);

        let mut batch = Batch::default();
        while let Some((doc, extraction)) = results.next().await {
            match extraction.and_then(|e| validate_extraction(&e, min_chars).map(|_| e)) {
                Ok(extraction) => batch.push_success(doc, extraction),
                Err(e @ AppError::Validation(_)) => match policy {
                    ValidationPolicy::DropUnit => {
                        log::warn!("{}: dropping {}: {}", source.id, doc.url, e);
                        batch.rejected += 1;
                    }
                    ValidationPolicy::RejectBatch => {
                        log::warn!("{}: rejecting batch, {}: {}", source.id, doc.url, e);
                        return Err(e);
                    }
                },
                Err(e) => {
                    log::warn!("{}: extraction failed for {}: {}", source.id, doc.url, e);
                    batch.push_failure(doc, &e);
                }
            }

            if delay.as_millis() > 0 {
                tokio::time::sleep(delay).await;
            }
        }
        Ok(batch)
    }
}

#[derive(Debug, Default)]
struct Batch {
    units: Vec<ExtractedUnit>,
    successful: usize,
    failed: usize,
    rejected: usize,
}

impl Batch {
    fn push_success(&mut self, doc: &DocumentReference, extraction: Extraction) {
        self.units.push(ExtractedUnit::extracted(doc, extraction));
        self.successful += 1;
    }

    fn push_failure(&mut self, doc: &DocumentReference, error: &AppError) {
        self.units.push(ExtractedUnit::failed(doc, error.to_string()));
        self.failed += 1;
    }
}

fn select_sources<'a>(sources: &'a [SourceConfig], only: &[String]) -> Vec<&'a SourceConfig> {
    if only.is_empty() {
        return sources.iter().collect();
    }
    let wanted: HashSet<&str> = only.iter().map(String::as_str).collect();
    for id in &wanted {
        if !sources.iter().any(|s| s.id == *id) {
            log::warn!("Requested source '{}' is not configured", id);
        }
    }
    sources
        .iter()
        .filter(|s| wanted.contains(s.id.as_str()))
        .collect()
}

fn log_classification(record: &ChangeRecord) {
    match (&record.error, &record.summary) {
        (Some(error), _) => log::warn!("{}: {} ({})", record.source, record.classification, error),
        (None, Some(summary)) => {
            log::info!("{}: {} ({})", record.source, record.classification, summary)
        }
        (None, None) => log::info!("{}: {}", record.source, record.classification),
    }
}

async fn with_timeout<T, F>(secs: u64, context: String, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(Duration::from_secs(secs), future).await {
        Ok(result) => result,
        Err(_) => Err(AppError::timeout(context, secs)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChangeDetection, OutcomeStatus};
    use crate::services::{ContentHasher, HTTP_TEXT, LINK_SCAN, SourceAdapter};
    use crate::storage::DurableStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::{BTreeSet, HashMap};
    use std::sync::Mutex;
    use tempfile::TempDir;

    const URL1: &str = "https://acme.example/files/tariff-mobile.pdf";
    const URL2: &str = "https://acme.example/files/tariff-fixed.pdf";
    const URL3: &str = "https://acme.example/files/tariff-tv.pdf";

    #[derive(Default)]
    struct FakeAdapter {
        listings: Mutex<HashMap<String, std::result::Result<Vec<DocumentReference>, String>>>,
        delay: Mutex<Option<Duration>>,
    }

    impl FakeAdapter {
        fn set(&self, source: &str, docs: Vec<DocumentReference>) {
            self.listings.lock().unwrap().insert(source.into(), Ok(docs));
        }

        fn fail(&self, source: &str, message: &str) {
            self.listings
                .lock()
                .unwrap()
                .insert(source.into(), Err(message.into()));
        }
    }

    #[async_trait]
    impl SourceAdapter for FakeAdapter {
        async fn fetch_manifest(&self, source: &SourceConfig) -> Result<SourceManifest> {
            let delay = *self.delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            let listing = self.listings.lock().unwrap().get(&source.id).cloned();
            match listing {
                Some(Ok(docs)) => Ok(SourceManifest::new(&source.id, docs)),
                Some(Err(message)) => Err(AppError::manifest(&source.id, message)),
                None => Err(AppError::manifest(&source.id, "not listed")),
            }
        }
    }

    #[derive(Default)]
    struct FakeExtractor {
        calls: Mutex<Vec<String>>,
        failing: Mutex<HashSet<String>>,
        empty: Mutex<HashSet<String>>,
        slow: Mutex<HashSet<String>>,
    }

    impl FakeExtractor {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn mark(set: &Mutex<HashSet<String>>, url: &str) {
            set.lock().unwrap().insert(url.into());
        }
    }

    #[async_trait]
    impl ContentExtractor for FakeExtractor {
        async fn extract(
            &self,
            _source: &SourceConfig,
            document: &DocumentReference,
        ) -> Result<Extraction> {
            self.calls.lock().unwrap().push(document.url.clone());
            let slow = self.slow.lock().unwrap().contains(&document.url);
            if slow {
                tokio::time::sleep(Duration::from_secs(3)).await;
            }
            let failing = self.failing.lock().unwrap().contains(&document.url);
            if failing {
                return Err(AppError::extraction(&document.url, "HTTP 500"));
            }
            let empty = self.empty.lock().unwrap().contains(&document.url);
            if empty {
                return Ok(Extraction::new(json!({ "text": "" }), 0));
            }
            let text = format!("prices from {}", document.url);
            let chars = text.chars().count();
            Ok(Extraction::new(json!({ "text": text }), chars))
        }
    }

    #[derive(Default)]
    struct FakeHasher {
        hashes: Mutex<HashMap<String, String>>,
    }

    #[async_trait]
    impl ContentHasher for FakeHasher {
        async fn hash(&self, url: &str) -> Result<String> {
            let hash = self.hashes.lock().unwrap().get(url).cloned();
            hash.ok_or_else(|| AppError::extraction(url, "HTTP 404"))
        }
    }

    struct Harness {
        tmp: TempDir,
        adapter: Arc<FakeAdapter>,
        extractor: Arc<FakeExtractor>,
        hasher: Arc<FakeHasher>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                tmp: TempDir::new().unwrap(),
                adapter: Arc::new(FakeAdapter::default()),
                extractor: Arc::new(FakeExtractor::default()),
                hasher: Arc::new(FakeHasher::default()),
            }
        }

        fn orchestrator(&self, sources: Vec<SourceConfig>) -> CrawlOrchestrator {
            self.orchestrator_with(sources, |_| {})
        }

        fn orchestrator_with(
            &self,
            sources: Vec<SourceConfig>,
            tweak: impl FnOnce(&mut Config),
        ) -> CrawlOrchestrator {
            let mut config = Config::default();
            config.crawler.request_delay_ms = 0;
            config.sources = sources;
            tweak(&mut config);

            let strategies = Strategies::new(self.hasher.clone())
                .register_adapter(LINK_SCAN, self.adapter.clone())
                .register_extractor(HTTP_TEXT, self.extractor.clone());
            CrawlOrchestrator::new(Arc::new(config), strategies, self.tmp.path())
        }

        fn registry_json(&self) -> serde_json::Value {
            let path = self.tmp.path().join("registry").join("latest-urls.json");
            serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
        }

        fn dataset_path(&self, source: &str) -> std::path::PathBuf {
            self.tmp
                .path()
                .join("datasets")
                .join(source)
                .join(format!("{source}.json"))
        }
    }

    fn doc(url: &str, doc_type: &str) -> DocumentReference {
        DocumentReference::new(url, doc_type).with_doc_type(doc_type)
    }

    fn acme() -> SourceConfig {
        SourceConfig::new("acme", "https://acme.example/docs/")
    }

    #[tokio::test]
    async fn test_new_source_is_fully_processed() {
        let h = Harness::new();
        h.adapter.set("acme", vec![doc(URL1, "mobile")]);
        let orch = h.orchestrator(vec![acme()]);

        let result = orch.run(&CycleOptions::default()).await.unwrap();

        assert!(!result.no_op);
        assert_eq!(result.changes[0].classification, Classification::New);
        assert_eq!(result.succeeded.len(), 1);
        let outcome = &result.succeeded[0];
        assert_eq!(outcome.status, OutcomeStatus::Updated);
        assert_eq!(outcome.mode, Some(MergeMode::Full));

        let dataset = orch.datasets().load("acme").await.unwrap().unwrap();
        assert_eq!(dataset.total_units, 1);
        assert_eq!(dataset.successful_units, 1);
        assert_eq!(h.registry_json()["acme"], URL1);
    }

    #[tokio::test]
    async fn test_unchanged_source_is_a_no_op() {
        let h = Harness::new();
        h.adapter.set("acme", vec![doc(URL1, "mobile")]);
        let orch = h.orchestrator(vec![acme()]);
        orch.run(&CycleOptions::default()).await.unwrap();
        let before = std::fs::read(h.dataset_path("acme")).unwrap();

        let result = orch.run(&CycleOptions::default()).await.unwrap();

        assert!(result.no_op);
        assert_eq!(result.changes[0].classification, Classification::Unchanged);
        assert_eq!(result.succeeded[0].status, OutcomeStatus::Unchanged);
        assert_eq!(h.extractor.calls().len(), 1);
        assert_eq!(std::fs::read(h.dataset_path("acme")).unwrap(), before);
        assert_eq!(result.report().skipped_unchanged, 1);
    }

    #[tokio::test]
    async fn test_partial_change_is_selective() {
        let h = Harness::new();
        h.adapter
            .set("acme", vec![doc(URL1, "mobile"), doc(URL2, "fixed")]);
        let orch = h.orchestrator(vec![acme()]);
        orch.run(&CycleOptions::default()).await.unwrap();

        h.adapter.set("acme", vec![doc(URL1, "mobile"), doc(URL3, "tv")]);
        let result = orch.run(&CycleOptions::default()).await.unwrap();

        let record = &result.changes[0];
        assert_eq!(record.classification, Classification::Updated);
        assert_eq!(record.changed_refs, BTreeSet::from([URL3.to_string()]));
        assert_eq!(result.succeeded[0].mode, Some(MergeMode::Selective));
        assert_eq!(&h.extractor.calls()[2..], &[URL3.to_string()]);

        let dataset = orch.datasets().load("acme").await.unwrap().unwrap();
        let keys: Vec<_> = dataset.units.iter().map(|u| u.identity_key.as_str()).collect();
        assert_eq!(keys, vec!["tv", "mobile", "fixed"]);
        assert_eq!(dataset.last_update.updated_count, 1);
        assert_eq!(h.registry_json()["acme"], json!([URL1, URL3]));
    }

    #[tokio::test]
    async fn test_manifest_failure_is_isolated() {
        let h = Harness::new();
        h.adapter.set("acme", vec![doc(URL1, "mobile")]);
        h.adapter.fail("globex", "HTTP 503");
        let orch = h.orchestrator(vec![
            acme(),
            SourceConfig::new("globex", "https://globex.example/"),
        ]);

        let result = orch.run(&CycleOptions::default()).await.unwrap();

        assert_eq!(result.succeeded.len(), 1);
        assert_eq!(result.failed.len(), 1);
        let failed = &result.failed[0];
        assert_eq!(failed.source, "globex");
        assert_eq!(failed.stage, Some(FailureStage::Manifest));
        assert!(failed.error.as_ref().unwrap().contains("HTTP 503"));
        assert!(h.registry_json().get("globex").is_none());
    }

    #[tokio::test]
    async fn test_all_failed_gate_still_reports() {
        let h = Harness::new();
        h.adapter.fail("acme", "DNS failure");
        h.adapter.set("globex", vec![]);
        let orch = h.orchestrator(vec![
            acme(),
            SourceConfig::new("globex", "https://globex.example/"),
        ]);

        let result = orch.run(&CycleOptions::default()).await.unwrap();

        assert!(result.no_op);
        assert_eq!(result.failed.len(), 2);
        let globex = result.failed.iter().find(|o| o.source == "globex").unwrap();
        assert_eq!(globex.stage, Some(FailureStage::Detection));
        assert_eq!(globex.error.as_deref(), Some("no documents found"));
    }

    #[tokio::test]
    async fn test_zero_successful_units_fails_without_writes() {
        let h = Harness::new();
        h.adapter.set("acme", vec![doc(URL1, "mobile")]);
        FakeExtractor::mark(&h.extractor.failing, URL1);
        let orch = h.orchestrator(vec![acme()]);

        let result = orch.run(&CycleOptions::default()).await.unwrap();

        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].stage, Some(FailureStage::Extraction));
        assert!(!h.dataset_path("acme").exists());
        assert!(!h.tmp.path().join("registry").join("latest-urls.json").exists());
    }

    #[tokio::test]
    async fn test_partial_extraction_failure_is_reported() {
        let h = Harness::new();
        h.adapter
            .set("acme", vec![doc(URL1, "mobile"), doc(URL2, "fixed")]);
        FakeExtractor::mark(&h.extractor.failing, URL2);
        let orch = h.orchestrator(vec![acme()]);

        let result = orch.run(&CycleOptions::default()).await.unwrap();

        let outcome = &result.succeeded[0];
        assert_eq!(outcome.successful_units, 1);
        assert_eq!(outcome.failed_units, 1);
        assert_eq!(
            outcome.extraction_shortfall().as_deref(),
            Some("1 units failed to extract")
        );
        let dataset = orch.datasets().load("acme").await.unwrap().unwrap();
        assert_eq!(dataset.failed_units, 1);
        assert!(dataset.find("fixed").unwrap().error.is_some());
    }

    #[tokio::test]
    async fn test_extraction_timeout_is_per_document() {
        let h = Harness::new();
        h.adapter
            .set("acme", vec![doc(URL1, "mobile"), doc(URL2, "fixed")]);
        FakeExtractor::mark(&h.extractor.slow, URL2);
        let orch = h.orchestrator_with(vec![acme()], |c| c.crawler.extract_timeout_secs = 1);

        let result = orch.run(&CycleOptions::default()).await.unwrap();

        let dataset = orch.datasets().load("acme").await.unwrap().unwrap();
        assert_eq!(result.succeeded[0].failed_units, 1);
        assert!(dataset.find("fixed").unwrap().error.as_ref().unwrap().contains("Timed out"));
    }

    #[tokio::test]
    async fn test_manifest_timeout_fails_source() {
        let h = Harness::new();
        h.adapter.set("acme", vec![doc(URL1, "mobile")]);
        *h.adapter.delay.lock().unwrap() = Some(Duration::from_secs(3));
        let orch = h.orchestrator_with(vec![acme()], |c| c.crawler.manifest_timeout_secs = 1);

        let result = orch.run(&CycleOptions::default()).await.unwrap();

        assert!(result.no_op);
        assert_eq!(result.failed[0].stage, Some(FailureStage::Manifest));
    }

    #[tokio::test]
    async fn test_force_full_reprocesses_unchanged() {
        let h = Harness::new();
        h.adapter
            .set("acme", vec![doc(URL1, "mobile"), doc(URL2, "fixed")]);
        let orch = h.orchestrator(vec![acme()]);
        orch.run(&CycleOptions::default()).await.unwrap();

        let options = CycleOptions {
            force_full: true,
            ..CycleOptions::default()
        };
        let result = orch.run(&options).await.unwrap();

        assert!(!result.no_op);
        assert_eq!(result.changes[0].classification, Classification::Unchanged);
        assert_eq!(result.succeeded[0].mode, Some(MergeMode::Full));
        assert_eq!(h.extractor.calls().len(), 4);
    }

    #[tokio::test]
    async fn test_drop_unit_keeps_previous_version() {
        let h = Harness::new();
        h.adapter.set("acme", vec![doc(URL1, "mobile")]);
        let orch = h.orchestrator(vec![acme()]);
        orch.run(&CycleOptions::default()).await.unwrap();

        // "mobile" moves to URL2, whose content is empty.
        h.adapter.set("acme", vec![doc(URL2, "mobile"), doc(URL3, "tv")]);
        FakeExtractor::mark(&h.extractor.empty, URL2);
        let result = orch.run(&CycleOptions::default()).await.unwrap();

        let outcome = &result.succeeded[0];
        assert_eq!(outcome.mode, Some(MergeMode::Selective));
        assert_eq!(outcome.rejected_units, 1);
        let dataset = orch.datasets().load("acme").await.unwrap().unwrap();
        assert_eq!(dataset.find("mobile").unwrap().source_url, URL1);
        assert_eq!(dataset.find("tv").unwrap().source_url, URL3);
        assert_eq!(h.registry_json()["acme"], json!([URL2, URL3]));
    }

    #[tokio::test]
    async fn test_drop_unit_counts_rejections() {
        let h = Harness::new();
        h.adapter
            .set("acme", vec![doc(URL1, "mobile"), doc(URL2, "fixed")]);
        FakeExtractor::mark(&h.extractor.empty, URL2);
        let orch = h.orchestrator(vec![acme()]);

        let result = orch.run(&CycleOptions::default()).await.unwrap();

        let outcome = &result.succeeded[0];
        assert_eq!(outcome.rejected_units, 1);
        assert_eq!(outcome.total_units, 1);
        let dataset = orch.datasets().load("acme").await.unwrap().unwrap();
        assert!(dataset.find("fixed").is_none());
    }

    #[tokio::test]
    async fn test_reject_batch_policy() {
        let h = Harness::new();
        h.adapter
            .set("acme", vec![doc(URL1, "mobile"), doc(URL2, "fixed")]);
        FakeExtractor::mark(&h.extractor.empty, URL2);
        let orch = h.orchestrator_with(vec![acme()], |c| {
            c.validation.policy = ValidationPolicy::RejectBatch
        });

        let result = orch.run(&CycleOptions::default()).await.unwrap();

        assert_eq!(result.failed[0].stage, Some(FailureStage::Validation));
        assert!(!h.dataset_path("acme").exists());
    }

    #[tokio::test]
    async fn test_content_hash_change_is_detected() {
        let h = Harness::new();
        h.adapter.set("acme", vec![doc(URL1, "mobile")]);
        h.hasher
            .hashes
            .lock()
            .unwrap()
            .insert(URL1.into(), "aaa".into());
        let mut source = acme();
        source.change_detection = ChangeDetection::ContentHash;
        let orch = h.orchestrator(vec![source]);
        orch.run(&CycleOptions::default()).await.unwrap();

        let result = orch.run(&CycleOptions::default()).await.unwrap();
        assert!(result.no_op);

        h.hasher
            .hashes
            .lock()
            .unwrap()
            .insert(URL1.into(), "bbb".into());
        let result = orch.run(&CycleOptions::default()).await.unwrap();

        assert_eq!(result.changes[0].classification, Classification::Updated);
        assert_eq!(result.succeeded[0].mode, Some(MergeMode::Selective));
        let snapshot = orch.registry().load().await.unwrap();
        assert_eq!(snapshot.stored_hashes("acme").unwrap()[URL1], "bbb");
    }

    #[tokio::test]
    async fn test_hash_change_survives_url_set_change() {
        let h = Harness::new();
        let set_hash = |url: &str, hash: &str| {
            h.hasher.hashes.lock().unwrap().insert(url.into(), hash.into());
        };
        set_hash(URL1, "a1");
        set_hash(URL2, "b1");
        h.adapter
            .set("acme", vec![doc(URL1, "mobile"), doc(URL2, "fixed")]);
        let mut source = acme();
        source.change_detection = ChangeDetection::ContentHash;
        let orch = h.orchestrator(vec![source]);
        orch.run(&CycleOptions::default()).await.unwrap();

        // URL2 changes content while URL3 joins the listing.
        set_hash(URL2, "b2");
        set_hash(URL3, "c1");
        h.adapter.set(
            "acme",
            vec![doc(URL1, "mobile"), doc(URL2, "fixed"), doc(URL3, "tv")],
        );
        let result = orch.run(&CycleOptions::default()).await.unwrap();

        assert_eq!(
            result.changes[0].changed_refs,
            BTreeSet::from([URL2.to_string(), URL3.to_string()])
        );
        assert_eq!(result.succeeded[0].mode, Some(MergeMode::Selective));
        let mut reextracted = h.extractor.calls()[2..].to_vec();
        reextracted.sort();
        assert_eq!(reextracted, vec![URL2.to_string(), URL3.to_string()]);

        let result = orch.run(&CycleOptions::default()).await.unwrap();
        assert!(result.no_op);
        let snapshot = orch.registry().load().await.unwrap();
        assert_eq!(snapshot.stored_hashes("acme").unwrap()[URL2], "b2");
    }

    #[tokio::test]
    async fn test_phase_b_failure_is_isolated() {
        let h = Harness::new();
        let globex_url = "https://globex.example/files/prices.pdf";
        h.adapter.set("acme", vec![doc(URL1, "mobile")]);
        h.adapter.set("globex", vec![doc(globex_url, "prices")]);
        FakeExtractor::mark(&h.extractor.failing, globex_url);
        let orch = h.orchestrator(vec![
            acme(),
            SourceConfig::new("globex", "https://globex.example/"),
        ]);

        let result = orch.run(&CycleOptions::default()).await.unwrap();

        assert_eq!(result.succeeded.len(), 1);
        assert_eq!(result.succeeded[0].source, "acme");
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].source, "globex");
        assert_eq!(result.failed[0].stage, Some(FailureStage::Extraction));

        assert!(h.dataset_path("acme").exists());
        assert!(!h.dataset_path("globex").exists());
        let registry = h.registry_json();
        assert_eq!(registry["acme"], URL1);
        assert!(registry.get("globex").is_none());
    }

    #[tokio::test]
    async fn test_dataset_write_failure_fails_at_store() {
        let h = Harness::new();
        h.adapter.set("acme", vec![doc(URL1, "mobile")]);
        let path = h.dataset_path("acme");
        std::fs::create_dir_all(DurableStore::temp_path(&path)).unwrap();
        let orch = h.orchestrator(vec![acme()]);

        let result = orch.run(&CycleOptions::default()).await.unwrap();

        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].stage, Some(FailureStage::Store));
        assert!(!path.exists());
        assert!(!h.tmp.path().join("registry").join("latest-urls.json").exists());
    }

    #[tokio::test]
    async fn test_malformed_dataset_fails_at_merge() {
        let h = Harness::new();
        h.adapter.set("acme", vec![doc(URL1, "mobile")]);
        let path = h.dataset_path("acme");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"{\"units\": 5}").unwrap();
        let orch = h.orchestrator(vec![acme()]);

        let result = orch.run(&CycleOptions::default()).await.unwrap();

        assert_eq!(result.failed[0].stage, Some(FailureStage::Merge));
        assert_eq!(std::fs::read(&path).unwrap(), b"{\"units\": 5}");
    }

    #[tokio::test]
    async fn test_only_restricts_sources() {
        let h = Harness::new();
        h.adapter.set("acme", vec![doc(URL1, "mobile")]);
        h.adapter.fail("globex", "HTTP 503");
        let orch = h.orchestrator(vec![
            acme(),
            SourceConfig::new("globex", "https://globex.example/"),
        ]);

        let options = CycleOptions {
            only: vec!["acme".into()],
            ..CycleOptions::default()
        };
        let result = orch.run(&options).await.unwrap();

        assert_eq!(result.changes.len(), 1);
        assert!(result.failed.is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_registry_aborts_cycle() {
        let h = Harness::new();
        h.adapter.set("acme", vec![doc(URL1, "mobile")]);
        let dir = h.tmp.path().join("registry");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("latest-urls.json"), b"not json").unwrap();
        let orch = h.orchestrator(vec![acme()]);

        assert!(orch.run(&CycleOptions::default()).await.is_err());
        assert!(h.extractor.calls().is_empty());
    }
}
