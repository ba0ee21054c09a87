use crate::backends::LlmBackend;
use crate::llm::CompletionRequest;
use nanoswarm_core::{Message, SwarmError, SwarmResult, TokenUsage};
use nanoswarm_tools::{ToolDescriptor, ToolRegistry};
use std::sync::Arc;
use tracing::{info, warn};

/// Default bound on model turns in one loop.
pub const MAX_TOOL_ITERATIONS: u32 = 10;

/// Final text when the loop runs out of turns without any assistant text.
pub const MAX_ITERATIONS_REACHED: &str = "Max tool iterations reached without final response.";

/// Per-call sampling settings for [`AgentRunner::run_with_tools`].
#[derive(Debug, Clone)]
pub struct LoopOptions {
    /// System prompt.
    pub system: Option<String>,
    /// Completion budget per model call.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
}

/// What one agentic loop produced.
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    /// The answer handed back to the caller.
    pub final_text: String,
    /// The full conversation including tool rounds.
    pub messages: Vec<Message>,
    /// Accumulated token usage over every model call.
    pub usage: TokenUsage,
    /// Names of the tools invoked, in call order.
    pub tool_calls: Vec<String>,
    /// Model calls made.
    pub iterations: u32,
}

/// The agentic loop: prompt → LLM → tool calls → results → repeat.
///
/// The loop ends when the model answers without requesting tools or when
/// the iteration bound is hit. Tool failures never abort the loop; they go
/// back to the model as error results.
pub struct AgentRunner {
    llm: Arc<dyn LlmBackend>,
    tools: Arc<ToolRegistry>,
    max_iterations: u32,
}

impl AgentRunner {
    /// A runner over `llm` offering every tool in `tools`.
    pub fn new(llm: Arc<dyn LlmBackend>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            llm,
            tools,
            max_iterations: MAX_TOOL_ITERATIONS,
        }
    }

    /// Overrides the iteration bound (at least one call is always made).
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    /// Runs the loop starting from `messages`.
    ///
    /// Backend errors propagate after the backend's own retries. The one
    /// exception: when the backend rejects a request carrying tools with a
    /// non-retryable 4xx, the same request is retried once without tools.
    pub async fn run_with_tools(
        &self,
        mut messages: Vec<Message>,
        opts: &LoopOptions,
    ) -> SwarmResult<LoopOutcome> {
        let descriptors: Vec<ToolDescriptor> = self
            .tools
            .list_descriptors()
            .into_iter()
            .cloned()
            .collect();
        let mut tools_enabled = !descriptors.is_empty();
        let mut usage = TokenUsage::default();
        let mut tool_names = Vec::new();
        let mut last_text = String::new();

        for iteration in 1..=self.max_iterations {
            let mut request = CompletionRequest {
                system: opts.system.clone(),
                messages: messages.clone(),
                max_tokens: opts.max_tokens,
                temperature: opts.temperature,
                tools: if tools_enabled {
                    descriptors.clone()
                } else {
                    Vec::new()
                },
            };

            let completion = match self.llm.complete(&request).await {
                Ok(c) => c,
                Err(e) if tools_enabled && is_tool_rejection(&e) => {
                    warn!(error = %e, "Backend rejected tool request, retrying without tools");
                    tools_enabled = false;
                    request.tools.clear();
                    self.llm.complete(&request).await?
                }
                Err(e) => return Err(e),
            };
            usage.add(completion.usage);

            if !completion.text.is_empty() {
                last_text.clone_from(&completion.text);
            }

            if !completion.wants_tools() {
                messages.push(Message::assistant(completion.text.clone()));
                info!(iterations = iteration, tokens = usage.total(), "Agentic loop completed");
                return Ok(LoopOutcome {
                    final_text: completion.text,
                    messages,
                    usage,
                    tool_calls: tool_names,
                    iterations: iteration,
                });
            }

            let calls = completion.tool_calls;
            messages.push(Message::assistant_with_tools(
                completion.text,
                calls.clone(),
            ));
            for call in &calls {
                info!(tool = %call.name, call_id = %call.id, iteration, "Executing tool call");
                let report = self.tools.dispatch(call).await;
                if !report.success() {
                    warn!(
                        tool = %call.name,
                        error = report.outcome.error().unwrap_or_default(),
                        "Tool reported failure"
                    );
                }
                tool_names.push(call.name.clone());
                messages.push(Message::tool_result(
                    call.id.clone(),
                    report.outcome.output(),
                    !report.success(),
                ));
            }
        }

        warn!(
            max_iterations = self.max_iterations,
            "Agentic loop reached max iterations"
        );
        let final_text = if last_text.is_empty() {
            MAX_ITERATIONS_REACHED.to_string()
        } else {
            last_text
        };
        Ok(LoopOutcome {
            final_text,
            messages,
            usage,
            tool_calls: tool_names,
            iterations: self.max_iterations,
        })
    }
}

fn is_tool_rejection(err: &SwarmError) -> bool {
    matches!(err, SwarmError::Api { status, .. } if (400..500).contains(status) && *status != 429)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::llm::Completion;
    use async_trait::async_trait;
    use nanoswarm_core::ToolCall;
    use nanoswarm_tools::{Tool, ToolOutcome};
    use serde_json::{json, Value};

    /// Replays scripted completions and records every request.
    struct Scripted {
        replies: parking_lot::Mutex<Vec<SwarmResult<Completion>>>,
        seen: parking_lot::Mutex<Vec<CompletionRequest>>,
    }

    impl Scripted {
        fn new(replies: Vec<SwarmResult<Completion>>) -> Arc<Self> {
            Arc::new(Self {
                replies: parking_lot::Mutex::new(replies),
                seen: parking_lot::Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LlmBackend for Scripted {
        async fn complete(&self, request: &CompletionRequest) -> SwarmResult<Completion> {
            self.seen.lock().push(request.clone());
            let mut replies = self.replies.lock();
            if replies.is_empty() {
                return Ok(Completion::text("fallthrough"));
            }
            replies.remove(0)
        }
    }

    struct Upper {
        descriptor: ToolDescriptor,
    }

    #[async_trait]
    impl Tool for Upper {
        fn descriptor(&self) -> &ToolDescriptor {
            &self.descriptor
        }

        async fn run(&self, args: &Value) -> ToolOutcome {
            match args["text"].as_str() {
                Some(t) => ToolOutcome::ok(t.to_uppercase()),
                None => ToolOutcome::failed("missing text", "invalid_arguments"),
            }
        }
    }

    fn registry() -> Arc<ToolRegistry> {
        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(Upper {
            descriptor: ToolDescriptor {
                name: "upper".into(),
                description: "Uppercase text".into(),
                parameters_schema: json!({"type": "object"}),
            },
        }));
        Arc::new(reg)
    }

    fn opts() -> LoopOptions {
        LoopOptions {
            system: Some("sys".into()),
            max_tokens: 128,
            temperature: 0.1,
        }
    }

    fn tool_turn(id: &str, args: Value) -> Completion {
        let mut c = Completion::text("");
        c.tool_calls = vec![ToolCall::new(id, "upper", args)];
        c.usage = TokenUsage {
            input_tokens: 5,
            output_tokens: 1,
        };
        c
    }

    #[tokio::test]
    async fn test_plain_answer_single_call() {
        let llm = Scripted::new(vec![Ok(Completion::text("42"))]);
        let runner = AgentRunner::new(llm.clone(), registry());
        let out = runner
            .run_with_tools(vec![Message::user("q")], &opts())
            .await
            .unwrap();
        assert_eq!(out.final_text, "42");
        assert_eq!(out.iterations, 1);
        assert_eq!(out.messages.len(), 2);
        assert_eq!(llm.seen.lock()[0].tools.len(), 1);
    }

    #[tokio::test]
    async fn test_tool_round_then_answer() {
        let llm = Scripted::new(vec![
            Ok(tool_turn("c1", json!({"text": "abc"}))),
            Ok(Completion::text("The answer is ABC")),
        ]);
        let runner = AgentRunner::new(llm.clone(), registry());
        let out = runner
            .run_with_tools(vec![Message::user("shout abc")], &opts())
            .await
            .unwrap();
        assert_eq!(out.final_text, "The answer is ABC");
        assert_eq!(out.tool_calls, vec!["upper".to_string()]);
        assert_eq!(out.usage.total(), 6);

        let second = &llm.seen.lock()[1];
        let tool_msg = second.messages.last().unwrap();
        assert_eq!(tool_msg.tool_call_id.as_deref(), Some("c1"));
        assert_eq!(tool_msg.content, "ABC");
        assert!(!tool_msg.is_error);
    }

    #[tokio::test]
    async fn test_tool_failure_fed_back_not_fatal() {
        let llm = Scripted::new(vec![
            Ok(tool_turn("c1", json!({}))),
            Ok(Completion::text("recovered")),
        ]);
        let runner = AgentRunner::new(llm.clone(), registry());
        let out = runner
            .run_with_tools(vec![Message::user("q")], &opts())
            .await
            .unwrap();
        assert_eq!(out.final_text, "recovered");
        let seen = llm.seen.lock();
        assert!(seen[1].messages.last().unwrap().is_error);
    }

    #[tokio::test]
    async fn test_iteration_bound_without_text() {
        let replies = (0..5)
            .map(|i| Ok(tool_turn(&format!("c{i}"), json!({"text": "x"}))))
            .collect();
        let llm = Scripted::new(replies);
        let runner = AgentRunner::new(llm.clone(), registry()).with_max_iterations(3);
        let out = runner
            .run_with_tools(vec![Message::user("loop")], &opts())
            .await
            .unwrap();
        assert_eq!(out.final_text, MAX_ITERATIONS_REACHED);
        assert_eq!(out.iterations, 3);
        assert_eq!(llm.seen.lock().len(), 3);
    }

    #[tokio::test]
    async fn test_iteration_bound_keeps_last_text() {
        let mut chatty = tool_turn("c1", json!({"text": "x"}));
        chatty.text = "partial findings".into();
        let llm = Scripted::new(vec![Ok(chatty)]);
        let runner = AgentRunner::new(llm, registry()).with_max_iterations(1);
        let out = runner
            .run_with_tools(vec![Message::user("q")], &opts())
            .await
            .unwrap();
        assert_eq!(out.final_text, "partial findings");
    }

    #[tokio::test]
    async fn test_tool_rejection_retries_without_tools() {
        let llm = Scripted::new(vec![
            Err(SwarmError::Api {
                status: 400,
                message: "tools not supported".into(),
                retry_after: None,
            }),
            Ok(Completion::text("plain")),
        ]);
        let runner = AgentRunner::new(llm.clone(), registry());
        let out = runner
            .run_with_tools(vec![Message::user("q")], &opts())
            .await
            .unwrap();
        assert_eq!(out.final_text, "plain");
        let seen = llm.seen.lock();
        assert_eq!(seen.len(), 2);
        assert!(!seen[0].tools.is_empty());
        assert!(seen[1].tools.is_empty());
    }

    #[tokio::test]
    async fn test_other_errors_propagate() {
        let llm = Scripted::new(vec![Err(SwarmError::Timeout("slow".into()))]);
        let runner = AgentRunner::new(llm.clone(), registry());
        let err = runner
            .run_with_tools(vec![Message::user("q")], &opts())
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(llm.seen.lock().len(), 1);
    }
}
