//! Extraction orchestrator.
//!
//! [`BillExtractor`] sequences one request through the pipeline:
//!
//! ```text
//! validate URL → download → encode → OCR call → extraction call → validate
//! ```
//!
//! The two model calls are strictly sequential because the second consumes
//! the first's output. Token usage is accumulated as each call returns, so a
//! failure after the OCR call still reports what that call cost.
//!
//! The extractor holds only immutable state and is shared across requests
//! behind an `Arc`.

use crate::config::{resolve_provider, ExtractionConfig, ItemDefaults};
use crate::error::ExtractError;
use crate::pipeline::input::{self, DocumentFetcher, HttpFetcher};
use crate::pipeline::llm::{LlmModelClient, ModelClient};
use crate::pipeline::{encode, validate};
use crate::prompts::extraction_prompt;
use crate::types::{ExtractionData, TokenUsage};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Result of a successful extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionOutcome {
    pub data: ExtractionData,
    /// Sum over both model calls.
    pub token_usage: TokenUsage,
}

/// A failed extraction and the tokens spent before it failed.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct ExtractionFailure {
    #[source]
    pub error: ExtractError,
    pub token_usage: TokenUsage,
}

impl ExtractionFailure {
    fn new(error: ExtractError, token_usage: TokenUsage) -> Self {
        Self { error, token_usage }
    }
}

impl From<ExtractError> for ExtractionFailure {
    fn from(error: ExtractError) -> Self {
        Self::new(error, TokenUsage::default())
    }
}

/// Runs the OCR → extraction → validation pipeline for one document.
pub struct BillExtractor {
    fetcher: Arc<dyn DocumentFetcher>,
    model: Arc<dyn ModelClient>,
    item_defaults: ItemDefaults,
}

impl fmt::Debug for BillExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BillExtractor")
            .field("fetcher", &"<dyn DocumentFetcher>")
            .field("model", &"<dyn ModelClient>")
            .field("item_defaults", &self.item_defaults)
            .finish()
    }
}

impl BillExtractor {
    /// Assemble an extractor from explicit collaborators.
    pub fn new(
        fetcher: Arc<dyn DocumentFetcher>,
        model: Arc<dyn ModelClient>,
        item_defaults: ItemDefaults,
    ) -> Self {
        Self {
            fetcher,
            model,
            item_defaults,
        }
    }

    /// Build the production extractor: HTTP download plus the configured
    /// LLM provider.
    ///
    /// # Errors
    /// [`ExtractError::ProviderNotConfigured`] when the provider's API key is
    /// missing. Callers treat this as fatal at startup.
    pub fn from_config(config: &ExtractionConfig) -> Result<Self, ExtractError> {
        let provider = resolve_provider(config)?;
        let fetcher = HttpFetcher::new(config.download_timeout_secs, config.max_image_bytes)?;
        Ok(Self::new(
            Arc::new(fetcher),
            Arc::new(LlmModelClient::new(provider, config)),
            config.item_defaults,
        ))
    }

    /// Extract line items from the bill image at `document`.
    ///
    /// # Errors
    /// Returns an [`ExtractionFailure`] carrying the error and the token
    /// usage accrued up to the failing step. URL validation errors always
    /// carry zero usage because nothing has been sent yet.
    pub async fn extract(&self, document: &str) -> Result<ExtractionOutcome, ExtractionFailure> {
        let total_start = Instant::now();

        // ── Step 0: Validate URL ─────────────────────────────────────────────
        let url = input::parse_document_url(document)?;
        info!("Starting extraction: {}", url);

        // ── Step 1: Download and encode ──────────────────────────────────────
        let bytes = self.fetcher.fetch(&url).await?;
        let image = encode::encode_image(&bytes).map_err(|detail| ExtractError::NotAnImage {
            url: url.to_string(),
            detail,
        })?;

        let mut usage = TokenUsage::default();

        // ── Step 2: OCR ──────────────────────────────────────────────────────
        let ocr_start = Instant::now();
        let ocr = self.model.transcribe(image).await?;
        usage += ocr.usage;
        debug!(
            "OCR returned {} chars in {}ms",
            ocr.text.len(),
            ocr_start.elapsed().as_millis()
        );
        if ocr.text.trim().is_empty() {
            return Err(ExtractionFailure::new(ExtractError::EmptyTranscription, usage));
        }

        // ── Step 3: Structure ────────────────────────────────────────────────
        let prompt = extraction_prompt(&ocr.text);
        let structured = self
            .model
            .structure(&prompt)
            .await
            .map_err(|e| ExtractionFailure::new(e, usage))?;

        // ── Step 4: Sum usage ────────────────────────────────────────────────
        usage += structured.usage;

        // ── Step 5: Validate ─────────────────────────────────────────────────
        let data = validate::validate_reply(&structured.text, self.item_defaults).map_err(|e| {
            warn!("Extraction reply rejected: {}", e);
            ExtractionFailure::new(e, usage)
        })?;

        // ── Step 6: Assemble ─────────────────────────────────────────────────
        info!(
            "Extraction complete: {} items on {} pages, {} tokens, {}ms",
            data.total_item_count,
            data.pagewise_line_items.len(),
            usage.total_tokens,
            total_start.elapsed().as_millis()
        );

        Ok(ExtractionOutcome {
            data,
            token_usage: usage,
        })
    }
}

/// Extract line items from a bill image URL with a one-off extractor.
///
/// Builds a [`BillExtractor`] from `config` for a single call. Servers
/// should build the extractor once with [`BillExtractor::from_config`]
/// and share it instead.
pub async fn extract(
    document: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutcome, ExtractionFailure> {
    let extractor = BillExtractor::from_config(config)?;
    extractor.extract(document.as_ref()).await
}
