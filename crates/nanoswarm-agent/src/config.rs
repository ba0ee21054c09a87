use crate::failover::RetryPolicy;
use serde::{Deserialize, Serialize};

/// Which API dialect and default endpoint a model speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// Anthropic Messages API with native tool blocks.
    Claude,
    /// OpenAI chat completions.
    OpenAi,
    /// OpenRouter (OpenAI-compatible).
    OpenRouter,
    /// Groq cloud inference (OpenAI-compatible).
    Groq,
    /// A local vLLM server (OpenAI-compatible).
    Vllm,
    /// A local Ollama server (OpenAI-compatible).
    Ollama,
}

impl LlmProvider {
    /// Environment variable consulted when no API key is configured.
    pub fn api_key_env(self) -> Option<&'static str> {
        match self {
            LlmProvider::Claude => Some("ANTHROPIC_API_KEY"),
            LlmProvider::OpenAi => Some("OPENAI_API_KEY"),
            LlmProvider::OpenRouter => Some("OPENROUTER_API_KEY"),
            LlmProvider::Groq => Some("GROQ_API_KEY"),
            LlmProvider::Vllm | LlmProvider::Ollama => None,
        }
    }
}

/// Connection and sampling settings for one model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// API dialect.
    pub provider: LlmProvider,
    /// Model name sent to the backend.
    pub model_id: String,
    /// API key; empty means "read the provider's env var".
    #[serde(default)]
    pub api_key: String,
    /// Overrides the provider's default endpoint.
    #[serde(default)]
    pub api_base_url: Option<String>,
    /// Default sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Default completion budget.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Request a streamed response and reassemble it (OpenAI-compatible only).
    #[serde(default)]
    pub stream: bool,
    /// HTTP timeout for one backend request.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Retry settings for transient failures.
    #[serde(default)]
    pub retry_policy: RetryPolicy,
    /// Models tried in order once this one exhausts its retries.
    #[serde(default)]
    pub fallback_models: Vec<ModelConfig>,
}

fn default_temperature() -> f32 {
    0.1
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_request_timeout() -> u64 {
    120
}

impl ModelConfig {
    /// A config with defaults for everything but provider and model.
    pub fn new(provider: LlmProvider, model_id: impl Into<String>) -> Self {
        Self {
            provider,
            model_id: model_id.into(),
            api_key: String::new(),
            api_base_url: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            stream: false,
            request_timeout_secs: default_request_timeout(),
            retry_policy: RetryPolicy::default(),
            fallback_models: Vec::new(),
        }
    }

    /// The endpoint root, without the API path.
    pub fn base_url(&self) -> &str {
        if let Some(url) = &self.api_base_url {
            url.trim_end_matches('/')
        } else {
            match self.provider {
                LlmProvider::Claude => "https://api.anthropic.com",
                LlmProvider::OpenAi => "https://api.openai.com",
                LlmProvider::OpenRouter => "https://openrouter.ai/api",
                LlmProvider::Groq => "https://api.groq.com/openai",
                LlmProvider::Vllm => "http://localhost:8000",
                LlmProvider::Ollama => "http://localhost:11434",
            }
        }
    }

    /// The configured key, or the provider's env var when none is set.
    pub fn resolved_api_key(&self) -> String {
        if !self.api_key.is_empty() {
            return self.api_key.clone();
        }
        self.provider
            .api_key_env()
            .and_then(|var| std::env::var(var).ok())
            .unwrap_or_default()
    }
}
