// src/lib.rs

//! pricewatch: incremental crawler for provider pricing documents.

pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
