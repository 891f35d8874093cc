//! Pipeline stages for bill extraction.
//!
//! Each submodule implements exactly one transformation step, so each is
//! testable on its own and the orchestrator in [`crate::extract`] only
//! sequences them.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ encode ──▶ llm (OCR) ──▶ llm (extract) ──▶ postprocess ──▶ validate
//! (URL)     (base64)   (raw text)    (JSON text)       (unwrap)        (schema)
//! ```
//!
//! 1. [`input`]  : validate the document URL and download the image
//! 2. [`encode`] : sniff the image format and base64-wrap the bytes
//! 3. [`llm`]    : the two model calls; the only stage besides `input` with
//!    network I/O
//! 4. [`postprocess`] : strip fences and prose around the JSON reply
//! 5. [`validate`] : coerce the reply into the strict output schema

pub mod encode;
pub mod input;
pub mod llm;
pub mod postprocess;
pub mod validate;
