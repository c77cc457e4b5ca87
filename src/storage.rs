// ABOUTME: Object storage client used to download text attachments for inlining into prompts
// ABOUTME: Best-effort fetch with UTF-8, then GBK, then lossy decoding
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Object storage
//!
//! Attachments are uploaded out of band and referenced by URL. The chat turn
//! only needs to read text files back, so the contract is a single
//! best-effort [`ObjectStore::fetch_text`] that reports every failure as
//! `None`.

use std::time::Duration;

use async_trait::async_trait;
use encoding_rs::GBK;
use reqwest::Client;
use tracing::{debug, warn};

use crate::constants::service_names;
use crate::errors::{AppError, AppResult};

/// Read access to uploaded objects
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Download the object at `url` and decode it as text
    ///
    /// Returns `None` on any failure: network, non-success status or empty body.
    async fn fetch_text(&self, url: &str) -> Option<String>;
}

/// [`ObjectStore`] that downloads (pre-signed) URLs over HTTP
#[derive(Clone)]
pub struct HttpObjectStore {
    client: Client,
}

impl HttpObjectStore {
    /// Create a store whose downloads time out after `fetch_timeout`
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built
    pub fn new(fetch_timeout: Duration) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(fetch_timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| {
                AppError::internal(format!(
                    "Failed to build {} HTTP client: {e}",
                    service_names::OBJECT_STORE
                ))
            })?;
        Ok(Self { client })
    }

    async fn fetch_bytes(&self, url: &str) -> AppResult<bytes::Bytes> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::storage(format!("Download failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::storage(format!("Download returned HTTP {status}")));
        }

        response
            .bytes()
            .await
            .map_err(|e| AppError::storage(format!("Failed to read download body: {e}")))
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn fetch_text(&self, url: &str) -> Option<String> {
        match self.fetch_bytes(url).await {
            Ok(bytes) if bytes.is_empty() => {
                debug!("Attachment download was empty");
                None
            }
            Ok(bytes) => Some(decode_text(&bytes)),
            Err(e) => {
                warn!(error = %e, "Attachment download failed");
                None
            }
        }
    }
}

/// Decode attachment bytes: strict UTF-8, then strict GBK, then UTF-8 dropping invalid sequences
#[must_use]
pub fn decode_text(bytes: &[u8]) -> String {
    if let Ok(text) = std::str::from_utf8(bytes) {
        return text.to_owned();
    }

    if let Some(text) = GBK.decode_without_bom_handling_and_without_replacement(bytes) {
        return text.into_owned();
    }

    bytes
        .utf8_chunks()
        .map(|chunk| chunk.valid())
        .collect::<String>()
}
