//! LLM interaction: one seam trait, one provider adapter, one retrying client.
//!
//! * [`ChatModel`] is the only thing the stages depend on. Tests plug in a
//!   scripted model; production plugs in [`ProviderModel`], a thin adapter over
//!   `edgequake_llm::LLMProvider`.
//! * [`LlmClient`] adds everything a stage should not care about: retries,
//!   the per-call timeout and token accounting.
//!
//! All prompt wording lives in [`crate::prompts`] so it can change without
//! touching retry or error-handling logic here.
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 503 errors are transient and frequent under concurrent load.
//! Exponential backoff (`retry_backoff_ms * 2^attempt`) keeps concurrent
//! fan-out tasks from retrying in lockstep: with a 500 ms base and 2 retries
//! the waits are 500 ms then 1 s. A call that still fails is fatal for the
//! run; stages never retry on their own.

use crate::config::PodcastConfig;
use crate::error::PodcastError;
use crate::pipeline::Stage;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// One prompt sent to a [`ChatModel`].
#[derive(Debug, Clone)]
pub struct LlmRequest {
    /// Optional system message.
    pub system: Option<String>,
    /// The user text.
    pub prompt: String,
    /// Page images attached to the user message, in page order.
    pub images: Vec<ImageData>,
    pub temperature: f32,
    pub max_tokens: Option<usize>,
}

/// The text a model produced plus its token counts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Completion {
    pub content: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl Completion {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }
}

/// A chat-completion backend.
///
/// Errors are plain strings: the client only needs to log and retry them.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Short label for logs, e.g. "gemini/gemini-1.5-flash".
    fn name(&self) -> &str;

    async fn complete(&self, request: &LlmRequest) -> Result<Completion, String>;
}

// ── edgequake-llm adapter ────────────────────────────────────────────────

/// [`ChatModel`] backed by an `edgequake_llm` provider.
pub struct ProviderModel {
    provider: Arc<dyn LLMProvider>,
    label: String,
}

impl ProviderModel {
    pub fn new(provider: Arc<dyn LLMProvider>, label: impl Into<String>) -> Self {
        Self {
            provider,
            label: label.into(),
        }
    }
}

#[async_trait]
impl ChatModel for ProviderModel {
    fn name(&self) -> &str {
        &self.label
    }

    /// ## Message Layout
    ///
    /// 1. **System message**: only when the request carries one
    /// 2. **User message**: the prompt text, with the page images attached
    ///    when there are any
    async fn complete(&self, request: &LlmRequest) -> Result<Completion, String> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system {
            messages.push(ChatMessage::system(system.as_str()));
        }
        if request.images.is_empty() {
            messages.push(ChatMessage::user(request.prompt.as_str()));
        } else {
            messages.push(ChatMessage::user_with_images(
                request.prompt.as_str(),
                request.images.clone(),
            ));
        }

        let options = CompletionOptions {
            temperature: Some(request.temperature),
            max_tokens: request.max_tokens,
            ..Default::default()
        };

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| e.to_string())?;

        Ok(Completion {
            content: response.content,
            input_tokens: response.prompt_tokens as u64,
            output_tokens: response.completion_tokens as u64,
        })
    }
}

// ── Retrying client ──────────────────────────────────────────────────────

/// Token and call counters shared by every clone of an [`LlmClient`].
#[derive(Debug, Default)]
struct UsageCounters {
    calls: AtomicU64,
    input_tokens: AtomicU64,
    output_tokens: AtomicU64,
}

/// Snapshot of LLM usage for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmUsage {
    /// Successful calls.
    pub calls: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Retrying, timing-out front end to a [`ChatModel`].
///
/// Cheap to clone; clones share the usage counters.
#[derive(Clone)]
pub struct LlmClient {
    model: Arc<dyn ChatModel>,
    temperature: f32,
    max_tokens: Option<usize>,
    max_retries: u32,
    retry_backoff_ms: u64,
    timeout_secs: u64,
    usage: Arc<UsageCounters>,
}

impl LlmClient {
    pub fn new(model: Arc<dyn ChatModel>, config: &PodcastConfig) -> Self {
        Self {
            model,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
            timeout_secs: config.api_timeout_secs,
            usage: Arc::default(),
        }
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    pub fn usage(&self) -> LlmUsage {
        LlmUsage {
            calls: self.usage.calls.load(Ordering::Relaxed),
            input_tokens: self.usage.input_tokens.load(Ordering::Relaxed),
            output_tokens: self.usage.output_tokens.load(Ordering::Relaxed),
        }
    }

    /// Send one prompt and return the response text.
    ///
    /// Tries `max_retries + 1` times. When every attempt fails the error is
    /// [`PodcastError::ApiTimeout`] if the last attempt timed out, otherwise
    /// [`PodcastError::LlmCallFailed`] carrying the last provider message.
    pub async fn invoke(
        &self,
        stage: Stage,
        system: Option<String>,
        prompt: String,
        images: Vec<ImageData>,
    ) -> Result<String, PodcastError> {
        let request = LlmRequest {
            system,
            prompt,
            images,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        let per_call = Duration::from_secs(self.timeout_secs);
        let start = Instant::now();
        let mut last: Option<Failure> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = self.retry_backoff_ms * 2u64.pow(attempt - 1);
                warn!(
                    "{}: retry {}/{} after {}ms",
                    stage, attempt, self.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match timeout(per_call, self.model.complete(&request)).await {
                Ok(Ok(completion)) => {
                    debug!(
                        "{}: {} input tokens, {} output tokens, {:?}",
                        stage,
                        completion.input_tokens,
                        completion.output_tokens,
                        start.elapsed()
                    );
                    self.usage.calls.fetch_add(1, Ordering::Relaxed);
                    self.usage
                        .input_tokens
                        .fetch_add(completion.input_tokens, Ordering::Relaxed);
                    self.usage
                        .output_tokens
                        .fetch_add(completion.output_tokens, Ordering::Relaxed);
                    return Ok(completion.content);
                }
                Ok(Err(detail)) => {
                    warn!("{}: attempt {} failed: {}", stage, attempt + 1, detail);
                    last = Some(Failure::Provider(detail));
                }
                Err(_) => {
                    warn!(
                        "{}: attempt {} timed out after {}s",
                        stage,
                        attempt + 1,
                        self.timeout_secs
                    );
                    last = Some(Failure::Timeout);
                }
            }
        }

        Err(match last {
            Some(Failure::Timeout) => PodcastError::ApiTimeout {
                stage,
                secs: self.timeout_secs,
            },
            Some(Failure::Provider(detail)) => PodcastError::LlmCallFailed {
                stage,
                attempts: self.max_retries + 1,
                detail,
            },
            None => PodcastError::Internal(format!("{stage}: LLM call never attempted")),
        })
    }
}

enum Failure {
    Provider(String),
    Timeout,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    /// Fails `failures` times, then answers "ok".
    struct Flaky {
        failures: usize,
        calls: AtomicUsize,
        seen: Mutex<Vec<LlmRequest>>,
    }

    impl Flaky {
        fn new(failures: usize) -> Self {
            Self {
                failures,
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ChatModel for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn complete(&self, request: &LlmRequest) -> Result<Completion, String> {
            self.seen.lock().unwrap().push(request.clone());
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(format!("HTTP 503 (call {n})"))
            } else {
                Ok(Completion {
                    content: "ok".into(),
                    input_tokens: 10,
                    output_tokens: 3,
                })
            }
        }
    }

    struct Stuck;

    #[async_trait]
    impl ChatModel for Stuck {
        fn name(&self) -> &str {
            "stuck"
        }

        async fn complete(&self, _request: &LlmRequest) -> Result<Completion, String> {
            sleep(Duration::from_secs(3600)).await;
            Ok(Completion::default())
        }
    }

    fn fast_config(max_retries: u32) -> PodcastConfig {
        PodcastConfig::builder()
            .max_retries(max_retries)
            .retry_backoff_ms(0)
            .temperature(0.3)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn retries_until_success_and_counts_usage() {
        let model = Arc::new(Flaky::new(2));
        let client = LlmClient::new(model.clone(), &fast_config(2));

        let out = client
            .invoke(Stage::Extract, None, "outline".into(), Vec::new())
            .await
            .unwrap();

        assert_eq!(out, "ok");
        assert_eq!(model.calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            client.usage(),
            LlmUsage {
                calls: 1,
                input_tokens: 10,
                output_tokens: 3
            }
        );
        let seen = model.seen.lock().unwrap();
        assert_eq!(seen[0].temperature, 0.3);
        assert_eq!(seen[0].prompt, "outline");
    }

    #[tokio::test]
    async fn exhausted_retries_are_fatal() {
        let model = Arc::new(Flaky::new(10));
        let client = LlmClient::new(model.clone(), &fast_config(1));

        let err = client
            .invoke(Stage::Structure, None, "json".into(), Vec::new())
            .await
            .unwrap_err();

        assert_eq!(model.calls.load(Ordering::SeqCst), 2);
        match err {
            PodcastError::LlmCallFailed {
                stage,
                attempts,
                detail,
            } => {
                assert_eq!(stage, Stage::Structure);
                assert_eq!(attempts, 2);
                assert!(detail.contains("call 1"));
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(client.usage().calls, 0);
    }

    #[tokio::test]
    async fn slow_model_times_out() {
        let config = PodcastConfig::builder()
            .max_retries(0)
            .api_timeout_secs(1)
            .build()
            .unwrap();
        let client = LlmClient::new(Arc::new(Stuck), &config);

        let err = client
            .invoke(Stage::Dialog, Some("sys".into()), "x".into(), Vec::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PodcastError::ApiTimeout {
                stage: Stage::Dialog,
                secs: 1
            }
        ));
    }
}
