//! Input resolution: validate the document URL and download the image.
//!
//! The URL is checked before anything else runs so a malformed request never
//! reaches the network. The download itself sits behind the
//! [`DocumentFetcher`] trait so the orchestrator can be driven by an
//! in-memory fetcher in tests.

use crate::error::ExtractError;
use async_trait::async_trait;
use reqwest::Url;
use std::time::Duration;
use tracing::{debug, info};

/// Parse and validate a user-supplied document URL.
///
/// Accepts only absolute `http`/`https` URLs with a host.
pub fn parse_document_url(input: &str) -> Result<Url, ExtractError> {
    let invalid = |reason: &str| ExtractError::InvalidDocument {
        input: input.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(invalid("document must not be empty"));
    }

    let url = Url::parse(trimmed).map_err(|e| invalid(&e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("scheme must be http or https"));
    }
    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(url),
        _ => Err(invalid("URL has no host")),
    }
}

/// Source of document bytes.
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    /// Fetch the raw bytes behind `url`.
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, ExtractError>;
}

/// [`DocumentFetcher`] over HTTP(S) with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout_secs: u64,
    max_bytes: usize,
}

impl HttpFetcher {
    pub fn new(timeout_secs: u64, max_bytes: usize) -> Result<Self, ExtractError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ExtractError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self::with_client(client, timeout_secs, max_bytes))
    }

    /// Wrap a pre-built client. `timeout_secs` is only reported in
    /// [`ExtractError::DownloadTimeout`]; the client enforces its own.
    pub fn with_client(client: reqwest::Client, timeout_secs: u64, max_bytes: usize) -> Self {
        Self {
            client,
            timeout_secs,
            max_bytes,
        }
    }
}

#[async_trait]
impl DocumentFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, ExtractError> {
        info!("Downloading document from: {}", url);

        let failed = |reason: String| ExtractError::DownloadFailed {
            url: url.to_string(),
            reason,
        };
        let classify = |e: reqwest::Error| {
            if e.is_timeout() {
                ExtractError::DownloadTimeout {
                    url: url.to_string(),
                    secs: self.timeout_secs,
                }
            } else {
                failed(e.to_string())
            }
        };

        let mut response = self.client.get(url.clone()).send().await.map_err(&classify)?;

        if !response.status().is_success() {
            return Err(failed(format!("HTTP {}", response.status())));
        }

        if let Some(len) = response.content_length() {
            if len > self.max_bytes as u64 {
                return Err(failed(format!(
                    "document is {len} bytes, limit is {}",
                    self.max_bytes
                )));
            }
        }

        // Chunked bodies carry no length up front; stop reading at the limit.
        let capacity = response.content_length().unwrap_or(0) as usize;
        let mut bytes = Vec::with_capacity(capacity.min(self.max_bytes));
        while let Some(chunk) = response.chunk().await.map_err(&classify)? {
            if bytes.len() + chunk.len() > self.max_bytes {
                return Err(failed(format!(
                    "document exceeds limit of {} bytes (stopped after {} bytes)",
                    self.max_bytes,
                    bytes.len() + chunk.len()
                )));
            }
            bytes.extend_from_slice(&chunk);
        }

        debug!("Downloaded {} bytes", bytes.len());
        Ok(bytes)
    }
}
