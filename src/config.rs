//! Configuration types for bill extraction.
//!
//! All extraction behaviour is controlled through [`ExtractionConfig`], built
//! via its [`ExtractionConfigBuilder`]. The config is resolved once at
//! startup into a [`crate::extract::BillExtractor`]; nothing in the request
//! path reads the environment.

use crate::error::ExtractError;
use edgequake_llm::{LLMProvider, ProviderFactory};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Provider used when none is named.
pub const DEFAULT_PROVIDER: &str = "gemini";

/// Model used when none is named.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Configuration for a bill extractor.
///
/// Built via [`ExtractionConfig::builder()`] or using
/// [`ExtractionConfig::default()`].
///
/// # Example
/// ```rust
/// use medbill_extract::{ExtractionConfig, ItemDefaults};
///
/// let config = ExtractionConfig::builder()
///     .provider_name("openai")
///     .model("gpt-4.1-mini")
///     .item_defaults(ItemDefaults::DefaultToOne)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// LLM provider name (e.g. "gemini", "openai", "anthropic", "ollama").
    /// Default: [`DEFAULT_PROVIDER`].
    pub provider_name: String,

    /// Model identifier used for both calls. Default: [`DEFAULT_MODEL`].
    pub model: String,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`
    /// and skips the credential check.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for both calls. Default: 0.1.
    ///
    /// Transcription and field extraction should be faithful, not creative.
    pub temperature: f32,

    /// Maximum tokens each call may generate. Default: 8192.
    ///
    /// Long pharmacy bills run to several hundred lines; the JSON reply for
    /// those is far larger than the transcription.
    pub max_tokens: usize,

    /// Per-model-call timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Download timeout for the document URL in seconds. Default: 30.
    pub download_timeout_secs: u64,

    /// Largest accepted image in bytes. Default: 20 MiB.
    pub max_image_bytes: usize,

    /// What to do when an item lacks `item_rate` or `item_quantity`.
    /// Default: [`ItemDefaults::Reject`].
    pub item_defaults: ItemDefaults,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            provider_name: DEFAULT_PROVIDER.to_string(),
            model: DEFAULT_MODEL.to_string(),
            provider: None,
            temperature: 0.1,
            max_tokens: 8192,
            api_timeout_secs: 60,
            download_timeout_secs: 30,
            max_image_bytes: 20 * 1024 * 1024,
            item_defaults: ItemDefaults::default(),
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("provider_name", &self.provider_name)
            .field("model", &self.model)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("max_image_bytes", &self.max_image_bytes)
            .field("item_defaults", &self.item_defaults)
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = name.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn max_image_bytes(mut self, n: usize) -> Self {
        self.config.max_image_bytes = n;
        self
    }

    pub fn item_defaults(mut self, policy: ItemDefaults) -> Self {
        self.config.item_defaults = policy;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, ExtractError> {
        let c = &self.config;
        if c.provider.is_none() && c.provider_name.trim().is_empty() {
            return Err(ExtractError::InvalidConfig(
                "provider name must not be empty".into(),
            ));
        }
        if c.model.trim().is_empty() {
            return Err(ExtractError::InvalidConfig("model must not be empty".into()));
        }
        if c.api_timeout_secs == 0 || c.download_timeout_secs == 0 {
            return Err(ExtractError::InvalidConfig(
                "timeouts must be at least 1 second".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(ExtractError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        if c.max_image_bytes == 0 {
            return Err(ExtractError::InvalidConfig(
                "max_image_bytes must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Policy for bill items whose `item_rate` or `item_quantity` is missing.
///
/// Models regularly omit the quantity for single-unit services such as a
/// consultation. `Reject` drops such an item from the page with a warning;
/// `DefaultToOne` fills the missing field with `1.0`. `item_name` and
/// `item_amount` are always required.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ItemDefaults {
    /// An item missing rate or quantity is dropped. (default)
    #[default]
    Reject,
    /// Missing rate or quantity becomes `1.0`.
    DefaultToOne,
}

// ── Provider resolution ──────────────────────────────────────────────────

/// Environment variable holding the API key for a provider, if it needs one.
pub fn api_key_var(provider_name: &str) -> Option<&'static str> {
    match provider_name.to_ascii_lowercase().as_str() {
        "gemini" | "google" => Some("GEMINI_API_KEY"),
        "openai" => Some("OPENAI_API_KEY"),
        "anthropic" => Some("ANTHROPIC_API_KEY"),
        "azure" => Some("AZURE_OPENAI_API_KEY"),
        "mistral" => Some("MISTRAL_API_KEY"),
        "openrouter" => Some("OPENROUTER_API_KEY"),
        "xai" => Some("XAI_API_KEY"),
        _ => None,
    }
}

/// Check that the credential for `provider_name` is present.
///
/// `lookup` abstracts the environment so the check is testable.
pub fn check_credential(
    provider_name: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), ExtractError> {
    let Some(var) = api_key_var(provider_name) else {
        return Ok(());
    };
    match lookup(var) {
        Some(value) if !value.trim().is_empty() => Ok(()),
        _ => Err(ExtractError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("Set {var} in the environment (or a .env-style launcher) before starting."),
        }),
    }
}

/// Resolve the LLM provider once at startup.
///
/// 1. **Pre-built provider** (`config.provider`): used as-is.
/// 2. **Named provider + model**: the provider's API key variable must be
///    set, then [`ProviderFactory::create_llm_provider`] builds it.
pub fn resolve_provider(config: &ExtractionConfig) -> Result<Arc<dyn LLMProvider>, ExtractError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    let name = config.provider_name.as_str();
    check_credential(name, |var| std::env::var(var).ok())?;

    let provider = ProviderFactory::create_llm_provider(name, &config.model).map_err(|e| {
        ExtractError::ProviderNotConfigured {
            provider: name.to_string(),
            hint: format!("{e}"),
        }
    })?;
    info!("Using provider '{}' with model '{}'", name, config.model);
    Ok(provider)
}
