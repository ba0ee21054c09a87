use super::{http_client, read_json, status_error, transport_error, LlmBackend};
use crate::config::{LlmProvider, ModelConfig};
use crate::llm::{Completion, CompletionRequest, StopReason};
use crate::stream::{SseDecoder, StreamAccumulator, StreamEvent};
use async_trait::async_trait;
use futures_util::StreamExt;
use nanoswarm_core::{parse_arguments, Message, Role, SwarmError, SwarmResult, TokenUsage, ToolCall};
use nanoswarm_tools::ToolDescriptor;
use serde_json::{json, Value};
use tracing::{debug, warn};

/// OpenAI-compatible API backend.
///
/// Works with OpenAI, OpenRouter, Groq, vLLM, Ollama, and any other provider
/// that implements the OpenAI chat completions API. With `stream` enabled
/// the response is read as server-sent events and reassembled.
pub struct OpenAiBackend {
    config: ModelConfig,
    api_key: String,
    http: reqwest::Client,
}

impl OpenAiBackend {
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

    fn build_body(&self, request: &CompletionRequest) -> Value {
        let mut body = json!({
            "model": self.config.model_id,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "messages": build_messages(request.system.as_deref(), &request.messages),
        });
        if !request.tools.is_empty() {
            body["tools"] = json!(build_tools(&request.tools));
        }
        if self.config.stream {
            body["stream"] = json!(true);
            body["stream_options"] = json!({ "include_usage": true });
        }
        body
    }

    fn add_provider_headers(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request.header("Content-Type", "application/json");
        let request = if self.api_key.is_empty() {
            request
        } else {
            request.header("Authorization", format!("Bearer {}", self.api_key))
        };

        // OpenRouter requires extra headers
        if matches!(self.config.provider, LlmProvider::OpenRouter) {
            request
                .header("HTTP-Referer", "https://github.com/nanoswarm/nanoswarm")
                .header("X-Title", "nanoswarm")
        } else {
            request
        }
    }

    async fn post(&self, url: &str, body: &Value) -> SwarmResult<reqwest::Response> {
        let resp = self
            .add_provider_headers(self.http.post(url))
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;
        if resp.status().is_success() {
            Ok(resp)
        } else {
            Err(status_error(resp).await)
        }
    }

    async fn read_stream(&self, resp: reqwest::Response) -> SwarmResult<Completion> {
        let mut decoder = SseDecoder::new();
        let mut acc = StreamAccumulator::new();
        let mut bytes = resp.bytes_stream();

        'outer: while let Some(chunk) = bytes.next().await {
            let chunk = chunk.map_err(transport_error)?;
            for data in decoder.push(&chunk) {
                if data == "[DONE]" {
                    break 'outer;
                }
                for event in chunk_events(&parse_chunk(&data)?) {
                    acc.push(event);
                }
            }
        }
        if let Some(data) = decoder.flush() {
            if data != "[DONE]" {
                for event in chunk_events(&parse_chunk(&data)?) {
                    acc.push(event);
                }
            }
        }
        Ok(acc.finish())
    }
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    async fn complete(&self, request: &CompletionRequest) -> SwarmResult<Completion> {
        let url = format!("{}/v1/chat/completions", self.config.base_url());
        let mut body = self.build_body(request);
        debug!(
            model = %self.config.model_id,
            messages = request.messages.len(),
            tools = request.tools.len(),
            stream = self.config.stream,
            "OpenAI-compatible request"
        );

        let first = self.post(&url, &body).await;
        let resp = match first {
            // Older vLLM and LM Studio builds reject the usage option.
            Err(SwarmError::Api {
                status: 400,
                ref message,
                ..
            }) if self.config.stream && message.contains("stream_options") => {
                warn!(
                    model = %self.config.model_id,
                    "Server rejected stream_options, resending without it"
                );
                if let Some(fields) = body.as_object_mut() {
                    fields.remove("stream_options");
                }
                self.post(&url, &body).await?
            }
            other => other?,
        };

        if self.config.stream {
            return self.read_stream(resp).await;
        }

        let resp_body = read_json(resp).await?;
        parse_openai_response(&resp_body)
    }

    fn name(&self) -> &str {
        "openai"
    }
}

/// Converts the conversation into chat-completions messages.
pub(crate) fn build_messages(system_prompt: Option<&str>, messages: &[Message]) -> Vec<Value> {
    let mut api_messages: Vec<Value> = Vec::new();

    if let Some(sys) = system_prompt {
        api_messages.push(json!({ "role": "system", "content": sys }));
    }

    for m in messages {
        let entry = match m.role {
            Role::System => json!({ "role": "system", "content": m.content }),
            Role::User => json!({ "role": "user", "content": m.content }),
            Role::Assistant if m.has_tool_calls() => {
                let calls: Vec<Value> = m
                    .tool_calls
                    .iter()
                    .map(|c| {
                        json!({
                            "id": c.id,
                            "type": "function",
                            "function": {
                                "name": c.name,
                                "arguments": c.arguments.to_string(),
                            }
                        })
                    })
                    .collect();
                let content = if m.content.is_empty() {
                    Value::Null
                } else {
                    Value::String(m.content.clone())
                };
                json!({ "role": "assistant", "content": content, "tool_calls": calls })
            }
            Role::Assistant => json!({ "role": "assistant", "content": m.content }),
            Role::Tool => json!({
                "role": "tool",
                "tool_call_id": m.tool_call_id.as_deref().unwrap_or_default(),
                "content": m.content,
            }),
        };
        api_messages.push(entry);
    }

    api_messages
}

fn build_tools(tools: &[ToolDescriptor]) -> Vec<Value> {
    tools
        .iter()
        .map(|t| {
            json!({
                "type": "function",
                "function": {
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.parameters_schema,
                }
            })
        })
        .collect()
}

fn parse_chunk(data: &str) -> SwarmResult<Value> {
    serde_json::from_str(data)
        .map_err(|e| SwarmError::Http(format!("Malformed stream chunk: {e}")))
}

fn arguments_value(raw: &Value) -> Value {
    match raw {
        Value::String(s) => parse_arguments(s),
        Value::Null => json!({}),
        other => other.clone(),
    }
}

fn usage_of(v: &Value) -> TokenUsage {
    TokenUsage {
        input_tokens: v["prompt_tokens"].as_u64().unwrap_or(0),
        output_tokens: v["completion_tokens"].as_u64().unwrap_or(0),
    }
}

/// Decodes one streamed chunk into events.
pub fn chunk_events(chunk: &Value) -> Vec<StreamEvent> {
    let mut events = Vec::new();

    if let Some(choice) = chunk["choices"].get(0) {
        let delta = &choice["delta"];
        if let Some(text) = delta["content"].as_str() {
            if !text.is_empty() {
                events.push(StreamEvent::TextDelta {
                    text: text.to_string(),
                });
            }
        }
        if let Some(calls) = delta["tool_calls"].as_array() {
            for (pos, tc) in calls.iter().enumerate() {
                let function = &tc["function"];
                events.push(StreamEvent::ToolCallDelta {
                    index: tc["index"].as_u64().unwrap_or(pos as u64) as u32,
                    id: tc["id"].as_str().map(String::from),
                    name: function["name"].as_str().map(String::from),
                    arguments: function["arguments"].as_str().map(String::from),
                });
            }
        }
        if let Some(reason) = choice["finish_reason"].as_str() {
            events.push(StreamEvent::Finish {
                reason: reason.to_string(),
            });
        }
    }

    if chunk["usage"].is_object() {
        let usage = usage_of(&chunk["usage"]);
        events.push(StreamEvent::Usage {
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
        });
    }

    events
}

/// Parses a non-streamed chat-completions body.
pub fn parse_openai_response(body: &Value) -> SwarmResult<Completion> {
    let choice = body["choices"]
        .get(0)
        .ok_or_else(|| SwarmError::Http(format!("Response has no choices: {body}")))?;
    let message = &choice["message"];

    let text = message["content"].as_str().unwrap_or_default().to_string();
    let tool_calls: Vec<ToolCall> = message["tool_calls"]
        .as_array()
        .map(|calls| {
            calls
                .iter()
                .enumerate()
                .map(|(i, tc)| {
                    ToolCall::new(
                        tc["id"]
                            .as_str()
                            .map(String::from)
                            .unwrap_or_else(|| format!("call_{i}")),
                        tc["function"]["name"].as_str().unwrap_or_default(),
                        arguments_value(&tc["function"]["arguments"]),
                    )
                })
                .collect()
        })
        .unwrap_or_default();

    let stop_reason = match choice["finish_reason"].as_str() {
        Some(reason) => StopReason::from_provider(reason),
        None if !tool_calls.is_empty() => StopReason::ToolUse,
        None => StopReason::EndTurn,
    };

    Ok(Completion {
        text,
        tool_calls,
        stop_reason,
        usage: usage_of(&body["usage"]),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::stream::reassemble;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend(server: &MockServer, stream: bool) -> OpenAiBackend {
        let mut cfg = ModelConfig::new(LlmProvider::OpenAi, "gpt-test");
        cfg.api_key = "sk-test".into();
        cfg.api_base_url = Some(server.uri());
        cfg.stream = stream;
        OpenAiBackend::new(cfg).unwrap()
    }

    fn request(tools: Vec<ToolDescriptor>) -> CompletionRequest {
        CompletionRequest {
            system: Some("be brief".into()),
            messages: vec![Message::user("hi")],
            max_tokens: 64,
            temperature: 0.1,
            tools,
        }
    }

    fn tool_response() -> Value {
        json!({
            "choices": [{
                "message": {
                    "content": "Let me look.",
                    "tool_calls": [
                        {"id": "c1", "type": "function",
                         "function": {"name": "file_io", "arguments": "{\"operation\":\"list\"}"}},
                        {"id": "c2", "type": "function",
                         "function": {"name": "http_fetch", "arguments": "{\"url\":\"https://x.test\"}"}}
                    ]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 7}
        })
    }

    fn tool_stream_chunks() -> Vec<Value> {
        vec![
            json!({"choices": [{"delta": {"content": "Let me "}}]}),
            json!({"choices": [{"delta": {"content": "look."}}]}),
            json!({"choices": [{"delta": {"tool_calls": [
                {"index": 0, "id": "c1", "function": {"name": "file_io", "arguments": "{\"opera"}}
            ]}}]}),
            json!({"choices": [{"delta": {"tool_calls": [
                {"index": 1, "id": "c2", "function": {"name": "http_fetch", "arguments": ""}}
            ]}}]}),
            json!({"choices": [{"delta": {"tool_calls": [
                {"index": 0, "function": {"arguments": "tion\":\"list\"}"}}
            ]}}]}),
            json!({"choices": [{"delta": {"tool_calls": [
                {"index": 1, "function": {"arguments": "{\"url\":\"https://x.test\"}"}}
            ]}}]}),
            json!({"choices": [{"delta": {}, "finish_reason": "tool_calls"}]}),
            json!({"choices": [], "usage": {"prompt_tokens": 12, "completion_tokens": 7}}),
        ]
    }

    #[test]
    fn test_build_messages_tool_round() {
        let msgs = vec![
            Message::user("list files"),
            Message::assistant_with_tools(
                "",
                vec![ToolCall::new("c1", "file_io", json!({"operation": "list"}))],
            ),
            Message::tool_result("c1", "[FILE] a.txt", false),
        ];
        let api = build_messages(Some("sys"), &msgs);
        assert_eq!(api.len(), 4);
        assert_eq!(api[0]["role"], "system");
        assert!(api[2]["content"].is_null());
        assert_eq!(api[2]["tool_calls"][0]["function"]["name"], "file_io");
        assert_eq!(
            api[2]["tool_calls"][0]["function"]["arguments"],
            "{\"operation\":\"list\"}"
        );
        assert_eq!(api[3]["role"], "tool");
        assert_eq!(api[3]["tool_call_id"], "c1");
    }

    #[test]
    fn test_parse_text_response() {
        let body = json!({
            "choices": [{"message": {"content": "Hello!"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 3, "completion_tokens": 2}
        });
        let c = parse_openai_response(&body).unwrap();
        assert_eq!(c.text, "Hello!");
        assert_eq!(c.stop_reason, StopReason::EndTurn);
        assert_eq!(c.usage.total(), 5);
    }

    #[test]
    fn test_parse_missing_choices_is_error() {
        assert!(parse_openai_response(&json!({"error": "x"})).is_err());
    }

    #[test]
    fn test_stream_reassembly_matches_non_streamed() {
        let direct = parse_openai_response(&tool_response()).unwrap();
        let streamed = reassemble(tool_stream_chunks().iter().flat_map(chunk_events));
        assert_eq!(streamed, direct);
        assert_eq!(direct.tool_calls.len(), 2);
        assert_eq!(direct.tool_calls[0].arguments, json!({"operation": "list"}));
    }

    #[tokio::test]
    async fn test_complete_over_http() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("Authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({"model": "gpt-test", "max_tokens": 64})))
            .respond_with(ResponseTemplate::new(200).set_body_json(tool_response()))
            .mount(&server)
            .await;

        let c = backend(&server, false)
            .complete(&request(vec![]))
            .await
            .unwrap();
        assert_eq!(c.text, "Let me look.");
        assert_eq!(c.tool_calls[1].name, "http_fetch");
    }

    #[tokio::test]
    async fn test_complete_streamed_over_http() {
        let server = MockServer::start().await;
        let mut sse = String::new();
        for chunk in tool_stream_chunks() {
            sse.push_str(&format!("data: {chunk}\n\n"));
        }
        sse.push_str("data: [DONE]\n\n");
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(json!({"stream": true})))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse),
            )
            .mount(&server)
            .await;

        let c = backend(&server, true)
            .complete(&request(vec![]))
            .await
            .unwrap();
        assert_eq!(c, parse_openai_response(&tool_response()).unwrap());
    }

    #[tokio::test]
    async fn test_rejected_stream_options_resent_without_them() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"stream_options": {"include_usage": true}})))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_string("{\"error\":\"Unrecognized request argument: stream_options\"}"),
            )
            .mount(&server)
            .await;
        let chunk = json!({"choices": [{"delta": {"content": "plain"}, "finish_reason": "stop"}]});
        let sse = format!("data: {chunk}\n\ndata: [DONE]\n\n");
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"stream": true})))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse),
            )
            .mount(&server)
            .await;

        let c = backend(&server, true)
            .complete(&request(vec![]))
            .await
            .unwrap();
        assert_eq!(c.text, "plain");
        assert_eq!(c.usage.total(), 0);

        let received = server.received_requests().await.unwrap();
        assert_eq!(received.len(), 2);
        let resent: Value = serde_json::from_slice(&received[1].body).unwrap();
        assert!(resent.get("stream_options").is_none());
        assert_eq!(resent["stream"], true);
    }

    #[tokio::test]
    async fn test_other_bad_requests_are_not_resent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("context length exceeded"))
            .mount(&server)
            .await;

        let err = backend(&server, true)
            .complete(&request(vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, SwarmError::Api { status: 400, .. }));
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_status_maps_to_api_error_with_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("retry-after", "2")
                    .set_body_string("rate limited"),
            )
            .mount(&server)
            .await;

        let err = backend(&server, false)
            .complete(&request(vec![]))
            .await
            .unwrap_err();
        match err {
            SwarmError::Api {
                status,
                message,
                retry_after,
            } => {
                assert_eq!(status, 429);
                assert_eq!(message, "rate limited");
                assert_eq!(retry_after, Some(std::time::Duration::from_secs(2)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_tools_sent_in_function_format() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "tools": [{"type": "function", "function": {"name": "echo"}}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "ok"}, "finish_reason": "stop"}]
            })))
            .mount(&server)
            .await;

        let tool = ToolDescriptor {
            name: "echo".into(),
            description: "Echo input".into(),
            parameters_schema: json!({"type": "object"}),
        };
        let c = backend(&server, false)
            .complete(&request(vec![tool]))
            .await
            .unwrap();
        assert_eq!(c.text, "ok");
    }
}
