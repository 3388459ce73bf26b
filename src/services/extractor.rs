// src/services/extractor.rs

//! `http-text` extractor: download a document and keep its text.

use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::error::{AppError, Result};
use crate::models::{DocumentReference, Extraction, SourceConfig};
use crate::services::ContentExtractor;
use crate::utils::http::{Download, download};
use crate::utils::normalize_whitespace;

pub const HTTP_TEXT: &str = "http-text";

pub struct HttpTextExtractor {
    client: Client,
}

impl HttpTextExtractor {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Turn a downloaded body into an extraction.
    ///
    /// HTML is reduced to its body text, other UTF-8 is kept as is, and
    /// binary bodies yield an empty text with zero characters.
    pub fn extract_download(body: &Download) -> Extraction {
        let content_type = body
            .content_type
            .clone()
            .unwrap_or_else(|| "application/octet-stream".to_string());

        let text = match std::str::from_utf8(&body.bytes) {
            Ok(s) if is_html(&content_type, s) => html_text(s),
            Ok(s) if !looks_binary(s) => normalize_whitespace(s),
            _ => String::new(),
        };

        let char_count = text.chars().count();
        let payload = json!({
            "text": text,
            "contentType": content_type,
            "sha256": hex::encode(Sha256::digest(&body.bytes)),
            "bytes": body.bytes.len(),
        });
        Extraction::new(payload, char_count)
    }
}

#[async_trait]
impl ContentExtractor for HttpTextExtractor {
    async fn extract(
        &self,
        _source: &SourceConfig,
        document: &DocumentReference,
    ) -> Result<Extraction> {
        let body = download(&self.client, &document.url)
            .await
            .map_err(|e| AppError::extraction(&document.url, e))?;
        Ok(Self::extract_download(&body))
    }
}

fn is_html(content_type: &str, body: &str) -> bool {
    let ct = content_type.to_lowercase();
    if ct.contains("html") {
        return true;
    }
    let head: String = body.trim_start().chars().take(64).collect::<String>().to_lowercase();
    head.starts_with("<!doctype html") || head.starts_with("<html")
}

fn looks_binary(text: &str) -> bool {
    text.chars()
        .take(1024)
        .any(|c| c.is_control() && !c.is_whitespace())
}

fn html_text(source: &str) -> String {
    let document = Html::parse_document(source);
    let text = match Selector::parse("body") {
        Ok(body) => document
            .select(&body)
            .next()
            .map(|b| b.text().collect::<Vec<_>>().join(" ")),
        Err(_) => None,
    };
    normalize_whitespace(&text.unwrap_or_else(|| document.root_element().text().collect()))
}
