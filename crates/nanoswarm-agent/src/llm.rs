use crate::backends::claude::ClaudeBackend;
use crate::backends::openai::OpenAiBackend;
use crate::backends::LlmBackend;
use crate::config::{LlmProvider, ModelConfig};
use crate::failover::FailoverBackend;
use nanoswarm_core::{Message, SwarmResult, TokenUsage, ToolCall};
use nanoswarm_tools::ToolDescriptor;
use std::sync::Arc;

/// One request to a backend, independent of provider dialect.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// System prompt, sent the way the provider expects.
    pub system: Option<String>,
    /// Conversation so far.
    pub messages: Vec<Message>,
    /// Completion budget.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
    /// Tools the model may call. Empty means no tool markup is sent.
    pub tools: Vec<ToolDescriptor>,
}

/// Why the model stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// Natural end of the turn.
    EndTurn,
    /// The model wants tool results.
    ToolUse,
    /// The completion budget ran out.
    MaxTokens,
    /// Anything else the provider reported.
    Other(String),
}

impl StopReason {
    /// Maps both Anthropic and OpenAI spellings.
    pub fn from_provider(reason: &str) -> Self {
        match reason {
            "end_turn" | "stop" | "stop_sequence" => StopReason::EndTurn,
            "tool_use" | "tool_calls" | "function_call" => StopReason::ToolUse,
            "max_tokens" | "length" => StopReason::MaxTokens,
            other => StopReason::Other(other.to_string()),
        }
    }
}

/// A finished model turn.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    /// Text content (may be empty when only tools were called).
    pub text: String,
    /// Requested tool invocations, in the order the model emitted them.
    pub tool_calls: Vec<ToolCall>,
    /// Stop reason.
    pub stop_reason: StopReason,
    /// Token accounting for this call.
    pub usage: TokenUsage,
}

impl Completion {
    /// A plain text turn.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tool_calls: Vec::new(),
            stop_reason: StopReason::EndTurn,
            usage: TokenUsage::default(),
        }
    }

    /// Whether the model asked for any tool call.
    pub fn wants_tools(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// LLM client that dispatches to the correct provider backend.
///
/// The provider backend is always wrapped in a [`FailoverBackend`] so retry
/// and fallback behaviour is the same regardless of dialect.
#[derive(Clone)]
pub struct LlmClient {
    backend: Arc<dyn LlmBackend>,
}

impl LlmClient {
    /// Builds the backend chain for `config` and its fallback models.
    pub fn new(config: &ModelConfig) -> SwarmResult<Self> {
        let mut failover = FailoverBackend::new(provider_backend(config)?, config.retry_policy.clone());
        for fallback in &config.fallback_models {
            failover = failover.with_fallback(provider_backend(fallback)?);
        }
        Ok(Self {
            backend: Arc::new(failover),
        })
    }

    /// Create from a pre-built backend (for custom providers and tests).
    pub fn from_backend(backend: Arc<dyn LlmBackend>) -> Self {
        Self { backend }
    }

    /// The backend chain, shareable across workers.
    pub fn backend(&self) -> Arc<dyn LlmBackend> {
        Arc::clone(&self.backend)
    }

    /// One completion through the chain.
    pub async fn complete(&self, request: &CompletionRequest) -> SwarmResult<Completion> {
        self.backend.complete(request).await
    }
}

fn provider_backend(config: &ModelConfig) -> SwarmResult<Arc<dyn LlmBackend>> {
    let backend: Arc<dyn LlmBackend> = match config.provider {
        LlmProvider::Claude => Arc::new(ClaudeBackend::new(config.clone())?),
        LlmProvider::OpenAi
        | LlmProvider::OpenRouter
        | LlmProvider::Groq
        | LlmProvider::Vllm
        | LlmProvider::Ollama => Arc::new(OpenAiBackend::new(config.clone())?),
    };
    Ok(backend)
}
