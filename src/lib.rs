//! # medbill-extract
//!
//! Extract itemised line items from medical bill images using Vision
//! Language Models (VLMs).
//!
//! ## Pipeline Overview
//!
//! ```text
//! image URL
//!  │
//!  ├─ 1. Input     validate the URL, download the image
//!  ├─ 2. Encode    sniff the format, base64-wrap the bytes
//!  ├─ 3. OCR       vision model transcribes every line of the bill
//!  ├─ 4. Extract   text model turns the transcription into JSON
//!  ├─ 5. Validate  coerce the JSON into the strict schema, recount items
//!  └─ 6. Output    line items per page + summed token usage
//! ```
//!
//! The same pipeline is exposed three ways: the [`BillExtractor`] library
//! type, the `POST /extract-bill-data` endpoint in [`server`], and the
//! `medbill` binary (`medbill serve`, `medbill extract <url>`).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use medbill_extract::{BillExtractor, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Reads GEMINI_API_KEY; fails here, not per request, when it is missing.
//!     let extractor = BillExtractor::from_config(&ExtractionConfig::default())?;
//!     let outcome = extractor
//!         .extract("https://example.com/bill.png")
//!         .await?;
//!     println!("{} items", outcome.data.total_item_count);
//!     eprintln!("tokens: {} in / {} out",
//!         outcome.token_usage.input_tokens,
//!         outcome.token_usage.output_tokens);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `medbill` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod extract;
pub mod pipeline;
pub mod prompts;
pub mod server;
pub mod types;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder, ItemDefaults};
pub use error::{ErrorKind, ExtractError, ModelStage};
pub use extract::{extract, BillExtractor, ExtractionFailure, ExtractionOutcome};
pub use pipeline::input::{DocumentFetcher, HttpFetcher};
pub use pipeline::llm::{LlmModelClient, ModelClient, ModelReply};
pub use server::{build_router, serve, AppState};
pub use types::{
    BillItem, ErrorInfo, ExtractionData, ExtractionRequest, ExtractionResponse, PageLineItems,
    PageType, TokenUsage,
};
