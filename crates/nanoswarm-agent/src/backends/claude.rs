use super::{http_client, read_json, status_error, transport_error, LlmBackend};
use crate::config::ModelConfig;
use crate::llm::{Completion, CompletionRequest, StopReason};
use async_trait::async_trait;
use nanoswarm_core::{Message, Role, SwarmError, SwarmResult, TokenUsage, ToolCall};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Claude (Anthropic) API backend.
///
/// Tool calls travel as native `tool_use` / `tool_result` content blocks,
/// so no stream reassembly is needed here.
pub struct ClaudeBackend {
    config: ModelConfig,
    api_key: String,
    http: reqwest::Client,
}

#[derive(Serialize)]
struct ClaudeTool<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a Value,
}

impl ClaudeBackend {
    /// A backend for `config`.
    pub fn new(config: ModelConfig) -> SwarmResult<Self> {
        let http = http_client(config.request_timeout_secs)?;
        let api_key = config.resolved_api_key();
        Ok(Self {
            config,
            api_key,
            http,
        })
    }
}

#[async_trait]
impl LlmBackend for ClaudeBackend {
    async fn complete(&self, request: &CompletionRequest) -> SwarmResult<Completion> {
        let url = format!("{}/v1/messages", self.config.base_url());
        let (system, api_messages) = build_messages(request.system.as_deref(), &request.messages);

        let mut body = json!({
            "model": self.config.model_id,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "messages": api_messages,
        });

        if let Some(sys) = system {
            body["system"] = json!(sys);
        }

        if !request.tools.is_empty() {
            let tools: Vec<ClaudeTool<'_>> = request
                .tools
                .iter()
                .map(|t| ClaudeTool {
                    name: &t.name,
                    description: &t.description,
                    input_schema: &t.parameters_schema,
                })
                .collect();
            body["tools"] = serde_json::to_value(&tools)?;
        }

        debug!(
            model = %self.config.model_id,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Claude request"
        );

        let resp = self
            .http
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        if !resp.status().is_success() {
            return Err(status_error(resp).await);
        }

        let resp_body = read_json(resp).await?;
        parse_claude_response(&resp_body)
    }

    fn name(&self) -> &str {
        "claude"
    }
}

/// Splits out the system prompt and converts the rest into Messages API
/// turns. System messages inside the conversation are appended to the
/// system prompt; consecutive tool results share one user turn.
pub(crate) fn build_messages(
    system_prompt: Option<&str>,
    messages: &[Message],
) -> (Option<String>, Vec<Value>) {
    let mut system: Vec<&str> = system_prompt.into_iter().collect();
    let mut out: Vec<Value> = Vec::new();
    let mut pending_results: Vec<Value> = Vec::new();

    for m in messages {
        if m.role == Role::Tool {
            pending_results.push(json!({
                "type": "tool_result",
                "tool_use_id": m.tool_call_id.as_deref().unwrap_or_default(),
                "content": m.content,
                "is_error": m.is_error,
            }));
            continue;
        }
        if !pending_results.is_empty() {
            out.push(json!({ "role": "user", "content": std::mem::take(&mut pending_results) }));
        }
        match m.role {
            Role::System => system.push(&m.content),
            Role::User => out.push(json!({ "role": "user", "content": m.content })),
            Role::Assistant if m.has_tool_calls() => {
                let mut blocks = Vec::new();
                if !m.content.is_empty() {
                    blocks.push(json!({ "type": "text", "text": m.content }));
                }
                for call in &m.tool_calls {
                    blocks.push(json!({
                        "type": "tool_use",
                        "id": call.id,
                        "name": call.name,
                        "input": call.arguments,
                    }));
                }
                out.push(json!({ "role": "assistant", "content": blocks }));
            }
            Role::Assistant => out.push(json!({ "role": "assistant", "content": m.content })),
            Role::Tool => {}
        }
    }
    if !pending_results.is_empty() {
        out.push(json!({ "role": "user", "content": pending_results }));
    }

    let system = if system.is_empty() {
        None
    } else {
        Some(system.join("\n\n"))
    };
    (system, out)
}

/// Parses a Messages API body.
pub fn parse_claude_response(body: &Value) -> SwarmResult<Completion> {
    let blocks = body["content"]
        .as_array()
        .ok_or_else(|| SwarmError::Http(format!("Response has no content blocks: {body}")))?;

    let mut text_parts: Vec<&str> = Vec::new();
    let mut tool_calls = Vec::new();
    for block in blocks {
        match block["type"].as_str() {
            Some("text") => {
                if let Some(t) = block["text"].as_str() {
                    text_parts.push(t);
                }
            }
            Some("tool_use") => tool_calls.push(ToolCall::new(
                block["id"].as_str().unwrap_or_default(),
                block["name"].as_str().unwrap_or_default(),
                block["input"].clone(),
            )),
            _ => {}
        }
    }

    let stop_reason = match body["stop_reason"].as_str() {
        Some(reason) => StopReason::from_provider(reason),
        None if !tool_calls.is_empty() => StopReason::ToolUse,
        None => StopReason::EndTurn,
    };

    Ok(Completion {
        text: text_parts.join(""),
        tool_calls,
        stop_reason,
        usage: TokenUsage {
            input_tokens: body["usage"]["input_tokens"].as_u64().unwrap_or(0),
            output_tokens: body["usage"]["output_tokens"].as_u64().unwrap_or(0),
        },
    })
}
