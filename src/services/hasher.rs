//! SHA-256 content hasher for `content-hash` sources.

use async_trait::async_trait;
use reqwest::Client;
use sha2::{Digest, Sha256};

use crate::error::{AppError, Result};
use crate::services::ContentHasher;
use crate::utils::http::download;

pub struct HttpContentHasher {
    client: Client,
}

impl HttpContentHasher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Lowercase hex SHA-256 of `bytes`.
    pub fn digest(bytes: &[u8]) -> String {
        hex::encode(Sha256::digest(bytes))
    }
}

#[async_trait]
impl ContentHasher for HttpContentHasher {
    async fn hash(&self, url: &str) -> Result<String> {
        let body = download(&self.client, url)
            .await
            .map_err(|e| AppError::extraction(url, e))?;
        Ok(Self::digest(&body.bytes))
    }
}
