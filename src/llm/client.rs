//! Chat completion with retry, think-tag stripping, and model-availability
//! probing. Ground truth: `original_source/agents/model_config.py` for the
//! constants and the catch-everything `validate_model` contract; the
//! retry/typed-error idiom is generalized from the teacher's
//! `data/eodhd.rs` backoff-on-transport-error wrapper, since no
//! chat-completion caller survived distillation into the original sources.

use std::sync::Arc;
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{info, warn};

use crate::config::LlmConfig;
use crate::error::DomainError;
use crate::ports::{ChatMessage, LlmTransport};

pub const DEFAULT_HOST: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "llama3.1:8b";
pub const DEFAULT_NUM_CTX: u32 = 8192;
const CHAT_MAX_RETRIES: u32 = 3;
const CHAT_RETRY_DELAY: Duration = Duration::from_millis(500);

static THINK_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<think>.*?</think>").expect("static think-tag pattern is valid"));

/// Post-processed chat completion: think-tag blocks stripped from content.
#[derive(Debug, Clone)]
pub struct ChatCompletion {
    pub content: String,
    pub model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub duration_ms: u64,
}

/// Strips every `<think>...</think>` block (including repeated or nested
/// occurrences) from the raw model output.
pub fn strip_think_tags(content: &str) -> String {
    let mut previous = content.to_string();
    loop {
        let stripped = THINK_TAG.replace_all(&previous, "").into_owned();
        if stripped == previous {
            return stripped.trim().to_string();
        }
        previous = stripped;
    }
}

pub struct LlmClient {
    transport: Arc<dyn LlmTransport>,
    config: LlmConfig,
}

impl LlmClient {
    pub fn new(transport: Arc<dyn LlmTransport>, config: LlmConfig) -> Self {
        Self { transport, config }
    }

    /// The actually-configured model name (`LlmConfig::model`, overridable
    /// via `LLM_MODEL`) — what every `chat` call on this client requests.
    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Posts `messages` to the configured model, retrying up to
    /// [`CHAT_MAX_RETRIES`] times on transport-level failures
    /// (`DomainError::DataSourceUnavailable`). A model-not-found response
    /// (`DomainError::TickerNotFound`) or any other error propagates
    /// immediately without retry.
    pub async fn chat(&self, messages: &[ChatMessage]) -> Result<ChatCompletion, DomainError> {
        let start = Instant::now();
        let mut attempt = 0u32;

        loop {
            match self
                .transport
                .chat(messages, &self.config.model, self.config.num_ctx)
                .await
            {
                Ok(raw) => {
                    return Ok(ChatCompletion {
                        content: strip_think_tags(&raw.content),
                        model: raw.model,
                        input_tokens: raw.input_tokens,
                        output_tokens: raw.output_tokens,
                        duration_ms: start.elapsed().as_millis() as u64,
                    });
                }
                Err(DomainError::DataSourceUnavailable { .. }) if attempt < CHAT_MAX_RETRIES => {
                    attempt += 1;
                    warn!(attempt, model = %self.config.model, "LLM transport error, retrying");
                    tokio::time::sleep(CHAT_RETRY_DELAY).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Returns `true` if `GET /api/tags`-equivalent lists the configured
    /// model; `false` on any failure (not-found, timeout, connect error).
    /// Never propagates an error — mirrors the original's
    /// catch-everything-return-false contract.
    pub async fn validate_model(&self) -> bool {
        match self.transport.list_models().await {
            Ok(models) => {
                let found = models.iter().any(|m| m == &self.config.model);
                if found {
                    info!(model = %self.config.model, "model is available");
                } else {
                    warn!(model = %self.config.model, available = ?models, "model not found");
                }
                found
            }
            Err(err) => {
                warn!(model = %self.config.model, error = %err, "error validating model availability");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::RawChatCompletion;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyTransport {
        fail_times: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl LlmTransport for FlakyTransport {
        async fn chat(
            &self,
            _messages: &[ChatMessage],
            model: &str,
            _num_ctx: u32,
        ) -> Result<RawChatCompletion, DomainError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_times {
                return Err(DomainError::DataSourceUnavailable {
                    ticker: "*".to_string(),
                    source_name: "ollama".to_string(),
                    detail: "connection refused".to_string(),
                    cause: None,
                });
            }
            Ok(RawChatCompletion {
                content: "<think>reasoning</think>final answer".to_string(),
                model: model.to_string(),
                input_tokens: 10,
                output_tokens: 20,
            })
        }

        async fn list_models(&self) -> Result<Vec<String>, DomainError> {
            Ok(vec![DEFAULT_MODEL.to_string()])
        }
    }

    struct ModelNotFoundTransport;

    #[async_trait]
    impl LlmTransport for ModelNotFoundTransport {
        async fn chat(
            &self,
            _messages: &[ChatMessage],
            _model: &str,
            _num_ctx: u32,
        ) -> Result<RawChatCompletion, DomainError> {
            Err(DomainError::TickerNotFound {
                ticker: "*".to_string(),
                source_name: "ollama".to_string(),
            })
        }

        async fn list_models(&self) -> Result<Vec<String>, DomainError> {
            Ok(vec![])
        }
    }

    fn config() -> LlmConfig {
        LlmConfig {
            host: DEFAULT_HOST.to_string(),
            model: DEFAULT_MODEL.to_string(),
            num_ctx: DEFAULT_NUM_CTX,
            chat_timeout_seconds: 120,
        }
    }

    #[test]
    fn strips_single_think_block() {
        let content = "<think>internal</think>visible answer";
        assert_eq!(strip_think_tags(content), "visible answer");
    }

    #[test]
    fn strips_repeated_think_blocks() {
        let content = "<think>a</think>middle<think>b</think>end";
        assert_eq!(strip_think_tags(content), "middleend");
    }

    #[tokio::test]
    async fn retries_on_transport_error_then_succeeds() {
        let transport = Arc::new(FlakyTransport {
            fail_times: 2,
            calls: AtomicU32::new(0),
        });
        let client = LlmClient::new(transport, config());
        let result = client.chat(&[]).await.unwrap();
        assert_eq!(result.content, "final answer");
    }

    #[tokio::test]
    async fn model_not_found_propagates_without_retry() {
        let transport = Arc::new(ModelNotFoundTransport);
        let client = LlmClient::new(transport, config());
        assert!(client.chat(&[]).await.is_err());
    }

    #[tokio::test]
    async fn validate_model_false_on_error() {
        let transport = Arc::new(ModelNotFoundTransport);
        let client = LlmClient::new(transport, config());
        assert!(!client.validate_model().await);
    }

    #[tokio::test]
    async fn validate_model_true_when_listed() {
        let transport = Arc::new(FlakyTransport {
            fail_times: 0,
            calls: AtomicU32::new(0),
        });
        let client = LlmClient::new(transport, config());
        assert!(client.validate_model().await);
    }
}
