// src/pipeline/validate.rs

//! Sanity checks: extracted payloads before they are persisted, and the
//! configuration for the `validate` command.

use std::path::Path;

use serde_json::Value;

use crate::config::load_config;
use crate::error::{AppError, Result};
use crate::models::{Config, Extraction};
use crate::utils::log;

/// Reject payloads that are empty or shorter than `min_chars`.
pub fn validate_extraction(extraction: &Extraction, min_chars: usize) -> Result<()> {
    let empty = match &extraction.payload {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    };
    if empty {
        return Err(AppError::validation("empty payload"));
    }

    let chars = extraction.summary.char_count;
    if chars < min_chars {
        return Err(AppError::validation(format!(
            "{} characters extracted, at least {} required",
            chars, min_chars
        )));
    }
    Ok(())
}

/// Load the configuration and print its highlights.
pub fn run_validate(config_path: &Path) -> Result<Config> {
    log::header("Validating configuration");

    match load_config(config_path) {
        Ok(config) => {
            log::success(&format!("Configuration OK: {}", config_path.display()));
            log::sub_item(&format!("user agent: {}", config.crawler.user_agent));
            log::sub_item(&format!(
                "timeouts: http {}s, manifest {}s, extract {}s",
                config.crawler.timeout_secs,
                config.crawler.manifest_timeout_secs,
                config.crawler.extract_timeout_secs
            ));
            log::sub_item(&format!(
                "concurrency: {} sources, {} documents per source",
                config.crawler.max_concurrent, config.crawler.max_concurrent_documents
            ));
            log::sub_item(&format!(
                "validation: {:?}, min {} chars",
                config.validation.policy, config.validation.min_chars
            ));
            log::sub_item(&format!("sources: {}", config.sources.len()));
            for source in &config.sources {
                log::sub_item(&format!(
                    "  {} [{} / {} / {:?}] {} targets",
                    source.id,
                    source.adapter,
                    source.extractor,
                    source.change_detection,
                    source.targets.len()
                ));
            }
            Ok(config)
        }
        Err(e) => {
            log::error(&format!("Configuration invalid: {}", e));
            Err(e)
        }
    }
}
