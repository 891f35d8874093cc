//! Error types for the medbill-extract library.
//!
//! Every failure is scoped to a single request, so there is one error enum,
//! [`ExtractError`], and a coarse [`ErrorKind`] used by the HTTP layer to
//! pick a status code and by clients to branch on the `error.kind` field of
//! the response envelope.
//!
//! Configuration errors ([`ErrorKind::Config`]) are the exception: they are
//! raised while building the extractor at startup and abort the process
//! before any request is served.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Which of the two model calls an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelStage {
    /// Vision call transcribing the bill image.
    Ocr,
    /// Text call converting the transcription into JSON.
    Extraction,
}

impl fmt::Display for ModelStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelStage::Ocr => f.write_str("OCR"),
            ModelStage::Extraction => f.write_str("extraction"),
        }
    }
}

/// All errors returned by the medbill-extract library.
#[derive(Debug, Error)]
pub enum ExtractError {
    // ── Request validation ────────────────────────────────────────────────
    /// The `document` field is empty or not an absolute http(s) URL.
    #[error("Invalid document URL '{input}': {reason}")]
    InvalidDocument { input: String, reason: String },

    /// The request body could not be decoded.
    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    // ── Document download ─────────────────────────────────────────────────
    /// The URL was well formed but fetching it failed.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    /// The downloaded bytes are not an image format vision models accept.
    #[error("Document at '{url}' is not a supported image: {detail}")]
    NotAnImage { url: String, detail: String },

    // ── Model calls ───────────────────────────────────────────────────────
    /// The provider returned an error (network, auth, rate limit, 5xx).
    #[error("{stage} model call failed: {message}")]
    ModelCallFailed { stage: ModelStage, message: String },

    /// The provider did not answer within `api_timeout_secs`.
    #[error("{stage} model call timed out after {secs}s")]
    ModelTimeout { stage: ModelStage, secs: u64 },

    /// The OCR model answered with no text at all.
    #[error("OCR model returned an empty transcription")]
    EmptyTranscription,

    // ── Model output ──────────────────────────────────────────────────────
    /// The extraction reply is not decodable as JSON.
    #[error("Extraction model reply is not valid JSON: {0}")]
    MalformedJson(String),

    /// The reply decoded but does not fit the output schema.
    #[error("Schema validation failed at '{field}': {reason}")]
    SchemaValidation { field: String, reason: String },

    // ── Configuration ─────────────────────────────────────────────────────
    /// The configured provider cannot be initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of an [`ExtractError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed request; nothing was sent downstream.
    Validation,
    /// Document download or model call failed.
    Downstream,
    /// Model output does not conform and cannot be coerced.
    SchemaValidation,
    /// Startup configuration problem.
    Config,
    /// Bug or unexpected state.
    Internal,
}

impl ExtractError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExtractError::InvalidDocument { .. } | ExtractError::InvalidBody(_) => {
                ErrorKind::Validation
            }
            ExtractError::DownloadFailed { .. }
            | ExtractError::DownloadTimeout { .. }
            | ExtractError::NotAnImage { .. }
            | ExtractError::ModelCallFailed { .. }
            | ExtractError::ModelTimeout { .. }
            | ExtractError::EmptyTranscription => ErrorKind::Downstream,
            ExtractError::MalformedJson(_) | ExtractError::SchemaValidation { .. } => {
                ErrorKind::SchemaValidation
            }
            ExtractError::ProviderNotConfigured { .. } | ExtractError::InvalidConfig(_) => {
                ErrorKind::Config
            }
            ExtractError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// `true` when the failure was a timeout rather than an error response.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            ExtractError::DownloadTimeout { .. } | ExtractError::ModelTimeout { .. }
        )
    }

    pub(crate) fn schema(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ExtractError::SchemaValidation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
