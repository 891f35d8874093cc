//! Model interaction: the OCR call and the JSON-extraction call.
//!
//! The orchestrator talks to the models through the [`ModelClient`] trait.
//! [`LlmModelClient`] is the production implementation over an
//! `edgequake_llm` provider; it is intentionally thin, since all prompt text
//! lives in [`crate::prompts`].
//!
//! There is no retry loop: a failed or timed-out call ends the request. Each
//! call is bounded by `api_timeout_secs` via `tokio::time::timeout`.

use crate::config::ExtractionConfig;
use crate::error::{ExtractError, ModelStage};
use crate::prompts::OCR_PROMPT;
use crate::types::TokenUsage;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};

/// Text returned by one model call together with what it cost.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelReply {
    pub text: String,
    pub usage: TokenUsage,
}

/// The two outbound model calls.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Transcribe every visible line of the bill image.
    async fn transcribe(&self, image: ImageData) -> Result<ModelReply, ExtractError>;

    /// Run the extraction prompt and return the model's JSON text.
    async fn structure(&self, prompt: &str) -> Result<ModelReply, ExtractError>;
}

/// [`ModelClient`] backed by an `edgequake_llm` provider.
pub struct LlmModelClient {
    provider: Arc<dyn LLMProvider>,
    temperature: f32,
    max_tokens: usize,
    timeout_secs: u64,
}

impl LlmModelClient {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ExtractionConfig) -> Self {
        Self {
            provider,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout_secs: config.api_timeout_secs,
        }
    }

    async fn chat(
        &self,
        stage: ModelStage,
        messages: Vec<ChatMessage>,
    ) -> Result<ModelReply, ExtractError> {
        let start = Instant::now();
        let options = build_options(self.temperature, self.max_tokens);

        let call = self.provider.chat(&messages, Some(&options));
        let response = match timeout(Duration::from_secs(self.timeout_secs), call).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!("{} call failed: {}", stage, e);
                return Err(ExtractError::ModelCallFailed {
                    stage,
                    message: e.to_string(),
                });
            }
            Err(_) => {
                warn!("{} call timed out after {}s", stage, self.timeout_secs);
                return Err(ExtractError::ModelTimeout {
                    stage,
                    secs: self.timeout_secs,
                });
            }
        };

        let usage = TokenUsage::new(
            response.prompt_tokens as u64,
            response.completion_tokens as u64,
        );
        debug!(
            "{} call: {} input tokens, {} output tokens, {:?}",
            stage,
            usage.input_tokens,
            usage.output_tokens,
            start.elapsed()
        );

        Ok(ModelReply {
            text: response.content,
            usage,
        })
    }
}

#[async_trait]
impl ModelClient for LlmModelClient {
    async fn transcribe(&self, image: ImageData) -> Result<ModelReply, ExtractError> {
        // The image carries all the content; the user turn needs no text.
        let messages = vec![
            ChatMessage::system(OCR_PROMPT),
            ChatMessage::user_with_images("", vec![image]),
        ];
        self.chat(ModelStage::Ocr, messages).await
    }

    async fn structure(&self, prompt: &str) -> Result<ModelReply, ExtractError> {
        let messages = vec![ChatMessage::user(prompt)];
        self.chat(ModelStage::Extraction, messages).await
    }
}

/// Build `CompletionOptions` shared by both calls.
fn build_options(temperature: f32, max_tokens: usize) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(temperature),
        max_tokens: Some(max_tokens),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgequake_llm::{ChatRole, LLMResponse, LlmError};
    use std::sync::Mutex;

    /// Provider that answers every chat with a fixed outcome after `delay`.
    struct FakeProvider {
        outcome: Result<LLMResponse, String>,
        delay: Duration,
        seen: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl FakeProvider {
        fn replying(content: &str, prompt_tokens: usize, completion_tokens: usize) -> Arc<Self> {
            Self::build(Ok(
                LLMResponse::new(content, "fake-vision").with_usage(prompt_tokens, completion_tokens)
            ))
        }

        fn failing(message: &str) -> Arc<Self> {
            Self::build(Err(message.to_string()))
        }

        fn build(outcome: Result<LLMResponse, String>) -> Arc<Self> {
            Arc::new(Self {
                outcome,
                delay: Duration::ZERO,
                seen: Mutex::new(Vec::new()),
            })
        }

        fn slow(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                outcome: Ok(LLMResponse::new("late", "fake-vision")),
                delay,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LLMProvider for FakeProvider {
        fn name(&self) -> &str {
            "fake"
        }

        fn model(&self) -> &str {
            "fake-vision"
        }

        fn max_context_length(&self) -> usize {
            128_000
        }

        async fn complete(&self, prompt: &str) -> edgequake_llm::Result<LLMResponse> {
            self.chat(&[ChatMessage::user(prompt)], None).await
        }

        async fn complete_with_options(
            &self,
            prompt: &str,
            options: &CompletionOptions,
        ) -> edgequake_llm::Result<LLMResponse> {
            self.chat(&[ChatMessage::user(prompt)], Some(options)).await
        }

        async fn chat(
            &self,
            messages: &[ChatMessage],
            _options: Option<&CompletionOptions>,
        ) -> edgequake_llm::Result<LLMResponse> {
            self.seen.lock().unwrap().push(messages.to_vec());
            tokio::time::sleep(self.delay).await;
            self.outcome.clone().map_err(LlmError::ProviderError)
        }
    }

    fn client(provider: Arc<FakeProvider>, api_timeout_secs: u64) -> LlmModelClient {
        let config = ExtractionConfig::builder()
            .api_timeout_secs(api_timeout_secs)
            .build()
            .unwrap();
        LlmModelClient::new(provider, &config)
    }

    fn png() -> ImageData {
        ImageData::new("iVBORw0KGgo=", "image/png").with_detail("high")
    }

    #[test]
    fn build_options_defaults() {
        let config = ExtractionConfig::default();
        let opts = build_options(config.temperature, config.max_tokens);
        assert_eq!(opts.temperature, Some(0.1));
        assert_eq!(opts.max_tokens, Some(8192));
    }

    #[tokio::test]
    async fn transcribe_sends_system_prompt_and_image_turn() {
        let provider = FakeProvider::replying("Consultation Fee 500.00", 1200, 80);
        let reply = client(provider.clone(), 5).transcribe(png()).await.unwrap();
        assert_eq!(reply.text, "Consultation Fee 500.00");

        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        let messages = &seen[0];
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, ChatRole::System);
        assert_eq!(messages[0].content, OCR_PROMPT);
        assert_eq!(messages[1].role, ChatRole::User);
        let images = messages[1].images.as_ref().expect("user turn carries the image");
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].mime_type, "image/png");
    }

    #[tokio::test]
    async fn structure_sends_single_user_turn() {
        let provider = FakeProvider::replying("{}", 700, 40);
        client(provider.clone(), 5)
            .structure("extract these items")
            .await
            .unwrap();

        let seen = provider.seen.lock().unwrap();
        let messages = &seen[0];
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, ChatRole::User);
        assert_eq!(messages[0].content, "extract these items");
        assert!(!messages[0].has_images());
    }

    #[tokio::test]
    async fn usage_comes_from_provider_token_counts() {
        let provider = FakeProvider::replying("text", 1234, 56);
        let reply = client(provider, 5).transcribe(png()).await.unwrap();
        assert_eq!(reply.usage, TokenUsage::new(1234, 56));
        assert_eq!(reply.usage.total_tokens, 1290);
    }

    #[tokio::test]
    async fn provider_error_becomes_model_call_failed() {
        let provider = FakeProvider::failing("quota exhausted");
        let err = client(provider, 5).structure("x").await.unwrap_err();
        match err {
            ExtractError::ModelCallFailed { stage, message } => {
                assert_eq!(stage, ModelStage::Extraction);
                assert!(message.contains("quota exhausted"), "{message}");
            }
            other => panic!("expected ModelCallFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_provider_times_out() {
        let provider = FakeProvider::slow(Duration::from_secs(5));
        let err = client(provider, 1).transcribe(png()).await.unwrap_err();
        assert!(err.is_timeout());
        assert!(matches!(
            err,
            ExtractError::ModelTimeout {
                stage: ModelStage::Ocr,
                secs: 1
            }
        ));
    }
}
