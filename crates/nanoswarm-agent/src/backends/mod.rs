/// Anthropic Messages API.
pub mod claude;
/// OpenAI-compatible chat completions (OpenAI, OpenRouter, Groq, vLLM, Ollama).
pub mod openai;

use crate::llm::{Completion, CompletionRequest};
use async_trait::async_trait;
use nanoswarm_core::{SwarmError, SwarmResult};
use std::time::Duration;

/// Trait for LLM provider backends.
///
/// Each provider dialect implements this trait to handle API communication.
/// Streaming, where a backend uses it, stays inside `complete`: callers
/// always get the reassembled turn.
///
/// To add a new provider:
/// 1. Create a new module in `backends/`
/// 2. Implement `LlmBackend` for your struct
/// 3. Add the variant to `LlmProvider` in `config.rs`
/// 4. Wire it up in `LlmClient::new()` in `llm.rs`
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// One completion.
    async fn complete(&self, request: &CompletionRequest) -> SwarmResult<Completion>;

    /// Short name used in logs.
    fn name(&self) -> &str {
        "llm"
    }
}

/// Maps a transport failure onto the retry classification.
///
/// A connection that resets or closes while the request is written or the
/// body is read counts as [`SwarmError::Connection`], like a refused
/// connect. Callers read bodies as bytes first, so a decode error here is a
/// broken transfer and never malformed JSON.
pub(crate) fn transport_error(e: reqwest::Error) -> SwarmError {
    if e.is_timeout() {
        SwarmError::Timeout(e.to_string())
    } else if e.is_connect() || e.is_request() || e.is_body() || e.is_decode() {
        SwarmError::Connection(transport_detail(&e))
    } else {
        SwarmError::Http(e.to_string())
    }
}

/// The error text plus its innermost cause, which names the reset or EOF.
fn transport_detail(e: &reqwest::Error) -> String {
    let mut cause: Option<&dyn std::error::Error> = std::error::Error::source(e);
    let mut innermost = None;
    while let Some(err) = cause {
        innermost = Some(err.to_string());
        cause = err.source();
    }
    match innermost {
        Some(root) => format!("{e}: {root}"),
        None => e.to_string(),
    }
}

/// Reads a whole JSON body. Transfer failures go through
/// [`transport_error`]; a complete body that is not JSON is
/// [`SwarmError::Http`].
pub(crate) async fn read_json(resp: reqwest::Response) -> SwarmResult<serde_json::Value> {
    let bytes = resp.bytes().await.map_err(transport_error)?;
    serde_json::from_slice(&bytes)
        .map_err(|e| SwarmError::Http(format!("Malformed response body: {e}")))
}

/// Turns a non-success response into [`SwarmError::Api`], keeping the
/// server's `retry-after` hint.
pub(crate) async fn status_error(resp: reqwest::Response) -> SwarmError {
    let status = resp.status().as_u16();
    let retry_after = resp
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after);
    let message = resp.text().await.unwrap_or_default();
    SwarmError::Api {
        status,
        message,
        retry_after,
    }
}

/// `retry-after` in (possibly fractional) seconds. HTTP-date values are
/// ignored.
pub(crate) fn parse_retry_after(raw: &str) -> Option<Duration> {
    let secs: f64 = raw.trim().parse().ok()?;
    if secs.is_finite() && secs >= 0.0 {
        Some(Duration::from_secs_f64(secs))
    } else {
        None
    }
}

pub(crate) fn http_client(timeout_secs: u64) -> SwarmResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| SwarmError::Config(format!("Failed to build HTTP client: {e}")))
}
