// src/services/adapter.rs

//! `link-scan` adapter.
//!
//! Fetches a source's landing page and picks document links per target
//! definition: keyword match on link text or href, optional extension
//! filter, and for single-valued targets the most recently dated link.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::NaiveDate;
use regex::Regex;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{
    DocumentReference, SourceConfig, SourceManifest, TargetDocument, identity_key,
};
use crate::services::SourceAdapter;
use crate::utils::http::fetch_page_async;
use crate::utils::{normalize_whitespace, resolve_url, url_path};

pub const LINK_SCAN: &str = "link-scan";

const DEFAULT_SELECTOR: &str = "a[href]";

/// Link scanner over a single HTML page.
pub struct LinkScanAdapter {
    client: Client,
}

#[derive(Debug, Clone)]
struct Candidate {
    url: String,
    text: String,
    date: Option<NaiveDate>,
}

impl LinkScanAdapter {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Collect document references from a parsed page.
    pub fn scan(source: &SourceConfig, html: &Html) -> Result<Vec<DocumentReference>> {
        let base = Url::parse(&source.url)?;
        let patterns = date_patterns();
        let mut seen = HashSet::new();
        let mut documents = Vec::new();

        let implicit;
        let targets: &[TargetDocument] = if source.targets.is_empty() {
            implicit = [TargetDocument {
                name: source.id.clone(),
                keywords: Vec::new(),
                selector: None,
                extensions: Vec::new(),
                category: None,
                multiple: true,
            }];
            &implicit
        } else {
            &source.targets
        };

        for target in targets {
            let candidates = Self::candidates(target, html, &base, &patterns)?;
            if candidates.is_empty() {
                log::warn!("{}: target '{}' matched no links", source.id, target.name);
                continue;
            }

            let picked: Vec<DocumentReference> = if target.multiple {
                candidates
                    .into_iter()
                    .map(|c| Self::reference(target, c, false))
                    .collect()
            } else {
                pick_latest(candidates)
                    .map(|c| Self::reference(target, c, true))
                    .into_iter()
                    .collect()
            };

            for doc in picked {
                if seen.insert(doc.url.clone()) {
                    documents.push((target.name.as_str(), doc));
                }
            }
        }

        let documents = disambiguate(documents);
        log::debug!("{}: {} documents in manifest", source.id, documents.len());
        Ok(documents)
    }

    fn candidates(
        target: &TargetDocument,
        html: &Html,
        base: &Url,
        patterns: &[Regex],
    ) -> Result<Vec<Candidate>> {
        let raw = target.selector.as_deref().unwrap_or(DEFAULT_SELECTOR);
        let selector =
            Selector::parse(raw).map_err(|e| AppError::selector(raw, format!("{e:?}")))?;

        let keywords: Vec<String> = target.keywords.iter().map(|k| k.to_lowercase()).collect();
        let extensions: Vec<String> = target
            .extensions
            .iter()
            .map(|e| format!(".{}", e.trim_start_matches('.').to_lowercase()))
            .collect();

        let mut out = Vec::new();
        for element in html.select(&selector) {
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            let href = href.trim();
            if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
                continue;
            }

            let url = resolve_url(base, href);
            let text = link_text(&element);
            let haystack = format!("{} {}", text.to_lowercase(), url.to_lowercase());

            if !keywords.is_empty() && !keywords.iter().any(|k| haystack.contains(k.as_str())) {
                continue;
            }
            if !extensions.is_empty() {
                let path = url_path(&url);
                if !extensions.iter().any(|e| path.ends_with(e.as_str())) {
                    continue;
                }
            }

            let date = latest_date(&format!("{} {}", url, text), patterns);
            out.push(Candidate { url, text, date });
        }
        Ok(out)
    }

    fn reference(target: &TargetDocument, candidate: Candidate, single: bool) -> DocumentReference {
        let display = if candidate.text.is_empty() {
            target.name.clone()
        } else {
            candidate.text
        };
        let mut doc = DocumentReference::new(candidate.url, display);
        if let Some(category) = &target.category {
            doc = doc.with_category(category.clone());
        }
        if single {
            doc = doc.with_doc_type(target.name.clone());
        }
        doc
    }
}

#[async_trait]
impl SourceAdapter for LinkScanAdapter {
    async fn fetch_manifest(&self, source: &SourceConfig) -> Result<SourceManifest> {
        let html = fetch_page_async(&self.client, &source.url)
            .await
            .map_err(|e| AppError::manifest(&source.id, e))?;
        let documents = Self::scan(source, &html)?;
        Ok(SourceManifest::new(&source.id, documents))
    }
}

/// Unlabelled references whose identity key collides with another reference
/// get a label built from the target name and their URL, so each document in
/// the manifest keeps a distinct key.
fn disambiguate(documents: Vec<(&str, DocumentReference)>) -> Vec<DocumentReference> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for (_, doc) in &documents {
        *counts.entry(identity_key(doc)).or_default() += 1;
    }

    documents
        .into_iter()
        .map(|(target, doc)| {
            if doc.doc_type.is_none() && counts.get(&identity_key(&doc)).copied().unwrap_or(0) > 1 {
                let label = format!("{} {}", target, doc.url);
                doc.with_doc_type(label)
            } else {
                doc
            }
        })
        .collect()
}

fn link_text(element: &ElementRef<'_>) -> String {
    let text = normalize_whitespace(&element.text().collect::<String>());
    if !text.is_empty() {
        return text;
    }
    element
        .value()
        .attr("title")
        .map(normalize_whitespace)
        .unwrap_or_default()
}

/// Most recent date wins; the earlier link wins a tie. Undated links rank last.
fn pick_latest(candidates: Vec<Candidate>) -> Option<Candidate> {
    let mut best: Option<Candidate> = None;
    for candidate in candidates {
        match &best {
            Some(current) if candidate.date <= current.date => {}
            _ => best = Some(candidate),
        }
    }
    best
}

fn date_patterns() -> Vec<Regex> {
    [
        r"(?:^|\D)(\d{4})[-_](\d{2})[-_](\d{2})(?:\D|$)",
        r"(?:^|\D)(\d{4})(\d{2})(\d{2})(?:\D|$)",
        r"(?:^|\D)(\d{4})-(\d{2})(?:\D|$)",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
}

/// Latest valid calendar date mentioned in `text`.
fn latest_date(text: &str, patterns: &[Regex]) -> Option<NaiveDate> {
    let mut latest: Option<NaiveDate> = None;
    for pattern in patterns {
        for caps in pattern.captures_iter(text) {
            let year = caps.get(1).and_then(|m| m.as_str().parse::<i32>().ok());
            let month = caps.get(2).and_then(|m| m.as_str().parse::<u32>().ok());
            let day = match caps.get(3) {
                Some(m) => m.as_str().parse::<u32>().ok(),
                None => Some(1),
            };
            let (Some(y), Some(m), Some(d)) = (year, month, day) else {
                continue;
            };
            if !(1990..=2100).contains(&y) {
                continue;
            }
            if let Some(date) = NaiveDate::from_ymd_opt(y, m, d) {
                latest = latest.max(Some(date));
            }
        }
    }
    latest
}
