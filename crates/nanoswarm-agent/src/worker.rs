use crate::backends::LlmBackend;
use crate::runner::{AgentRunner, LoopOptions, MAX_TOOL_ITERATIONS};
use nanoswarm_core::{
    AgentRole, AgentStatus, Message, SwarmError, Task, TaskResult, CONTEXT_HISTORY,
};
use nanoswarm_state::{AgentRecord, StateLayer, TaskCompletion, TaskStart};
use nanoswarm_tools::ToolRegistry;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Turns kept in a worker's own conversation buffer.
pub const MAX_HISTORY_MESSAGES: usize = 50;

/// Static configuration of one worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Role, fixed for the worker's lifetime.
    pub role: AgentRole,
    /// Display name.
    pub name: String,
    /// System prompt for every call.
    pub system_prompt: String,
    /// Completion budget.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
    /// Wall-clock bound on one task, retries included. `None` leaves
    /// deadlines to the backend, e.g. a gate that times each call once it
    /// holds a permit.
    pub timeout: Option<Duration>,
    /// Bound on model turns per task.
    pub max_iterations: u32,
}

impl WorkerConfig {
    /// A config with the default budget (2048 tokens, temperature 0.1,
    /// 300 s timeout).
    pub fn new(role: AgentRole, system_prompt: impl Into<String>) -> Self {
        Self {
            name: role.as_str().to_string(),
            role,
            system_prompt: system_prompt.into(),
            max_tokens: 2048,
            temperature: 0.1,
            timeout: Some(Duration::from_secs(300)),
            max_iterations: MAX_TOOL_ITERATIONS,
        }
    }

    /// Sets the completion budget.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Sets the temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Sets the per-task timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Drops the per-task timeout.
    pub fn without_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    /// Sets the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// One LLM-backed agent: a role, a system prompt and a private
/// conversation buffer.
///
/// A worker runs one task at a time and never raises: every failure
/// (backend error, timeout) becomes a failed [`TaskResult`]. Registry and
/// journal writes are best-effort.
pub struct Worker {
    id: String,
    config: WorkerConfig,
    session_id: String,
    runner: AgentRunner,
    state: Arc<StateLayer>,
    status: Mutex<AgentStatus>,
    history: Mutex<Vec<Message>>,
}

impl Worker {
    /// A worker for `session_id` calling `llm` with access to `tools`.
    pub fn new(
        config: WorkerConfig,
        session_id: impl Into<String>,
        llm: Arc<dyn LlmBackend>,
        tools: Arc<ToolRegistry>,
        state: Arc<StateLayer>,
    ) -> Self {
        let short = Uuid::new_v4().simple().to_string();
        let id = format!("{}-{}", config.role.as_str(), &short[..8]);
        let runner = AgentRunner::new(llm, tools).with_max_iterations(config.max_iterations);
        Self {
            id,
            config,
            session_id: session_id.into(),
            runner,
            state,
            status: Mutex::new(AgentStatus::Idle),
            history: Mutex::new(Vec::new()),
        }
    }

    /// Worker id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Worker role.
    pub fn role(&self) -> AgentRole {
        self.config.role
    }

    /// Current status.
    pub fn status(&self) -> AgentStatus {
        *self.status.lock()
    }

    /// Messages in the private conversation buffer.
    pub fn history_len(&self) -> usize {
        self.history.lock().len()
    }

    /// Registers the worker in the agent registry.
    pub async fn initialize(&self) {
        let record = AgentRecord::new(
            self.id.clone(),
            self.config.role,
            self.config.name.clone(),
            Some(self.session_id.clone()),
        );
        if let Err(e) = self.state.agents.register(&record).await {
            warn!(agent_id = %self.id, error = %e, "Agent registration failed");
        }
    }

    /// Marks the worker as blocked on a slot or dependency.
    pub async fn mark_waiting(&self) {
        self.transition(AgentStatus::Waiting, 0).await;
    }

    /// Deregisters the worker.
    pub async fn shutdown(&self) {
        self.transition(AgentStatus::Idle, 0).await;
        if let Err(e) = self.state.agents.deregister(&self.id).await {
            warn!(agent_id = %self.id, error = %e, "Agent deregistration failed");
        }
    }

    /// Clears the conversation buffer and returns to `Idle`.
    pub async fn reset(&self) {
        self.history.lock().clear();
        self.transition(AgentStatus::Idle, 0).await;
    }

    /// Runs one task through the agentic loop.
    pub async fn execute(&self, task: &Task) -> TaskResult {
        let start = Instant::now();
        if self.status().is_terminal() {
            self.transition(AgentStatus::Idle, 0).await;
        }
        self.transition(AgentStatus::Thinking, 0).await;

        let journal = self.state.journal(&self.session_id);
        if let Err(e) = journal
            .record_start(TaskStart {
                task_id: &task.id,
                agent_id: &self.id,
                role: self.config.role,
                content: &task.content,
                parent_task_id: task.parent_task_id.as_deref(),
            })
            .await
        {
            warn!(task_id = %task.id, error = %e, "Journal start failed");
        }

        let messages = self.build_messages(task);
        let opts = LoopOptions {
            system: Some(self.config.system_prompt.clone()),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        self.transition(AgentStatus::Executing, 0).await;
        debug!(agent_id = %self.id, task_id = %task.id, "Worker executing");

        let run = self.runner.run_with_tools(messages, &opts);
        let outcome = match self.config.timeout {
            Some(limit) => tokio::time::timeout(limit, run).await.unwrap_or_else(|_| {
                Err(SwarmError::Timeout(format!(
                    "worker exceeded {}s",
                    limit.as_secs_f64()
                )))
            }),
            None => run.await,
        };

        let elapsed = start.elapsed();
        let (result, completion) = match outcome {
            Ok(out) => {
                let tokens = out.usage.total();
                self.remember(&task.content, &out.final_text);
                info!(
                    agent_id = %self.id,
                    task_id = %task.id,
                    tokens,
                    iterations = out.iterations,
                    "Task completed"
                );
                let completion = TaskCompletion {
                    output: out.final_text.clone(),
                    success: true,
                    error: None,
                    tokens_used: tokens,
                    duration: elapsed,
                    tool_calls: out.tool_calls,
                };
                (
                    TaskResult::success(
                        &task.id,
                        &self.id,
                        self.config.role,
                        out.final_text,
                        elapsed,
                        tokens,
                    ),
                    completion,
                )
            }
            Err(e) => {
                let error = e.to_string();
                warn!(agent_id = %self.id, task_id = %task.id, error = %error, "Task failed");
                let completion = TaskCompletion {
                    success: false,
                    error: Some(error.clone()),
                    duration: elapsed,
                    ..TaskCompletion::default()
                };
                (
                    TaskResult::failure(&task.id, &self.id, self.config.role, error, elapsed, 0),
                    completion,
                )
            }
        };

        if let Err(e) = journal.record_complete(&task.id, completion).await {
            warn!(task_id = %task.id, error = %e, "Journal completion failed");
        }
        let terminal = if result.success {
            AgentStatus::Done
        } else {
            AgentStatus::Failed
        };
        self.transition(terminal, result.tokens_used).await;
        result
    }

    fn build_messages(&self, task: &Task) -> Vec<Message> {
        let mut messages: Vec<Message> = self.history.lock().clone();

        if let Some(history) = task.context.get(CONTEXT_HISTORY) {
            match serde_json::from_value::<Vec<Message>>(history.clone()) {
                Ok(prior) => messages.extend(prior),
                Err(e) => warn!(task_id = %task.id, error = %e, "Ignoring malformed history"),
            }
        }

        let deps = task.dependency_outputs();
        if !deps.is_empty() {
            let mut block = String::from("Context from completed dependencies:\n");
            for (dep_id, output) in &deps {
                block.push_str(&format!("\n[Dependency {dep_id}]:\n{output}\n"));
            }
            messages.push(Message::user(block));
            messages.push(Message::assistant(
                "Understood. I'll use this context in my response.",
            ));
        }

        messages.push(Message::user(task.content.clone()));
        messages
    }

    fn remember(&self, prompt: &str, answer: &str) {
        let mut history = self.history.lock();
        history.push(Message::user(prompt));
        history.push(Message::assistant(answer));
        if history.len() > MAX_HISTORY_MESSAGES {
            let excess = history.len() - MAX_HISTORY_MESSAGES;
            history.drain(..excess);
        }
    }

    async fn transition(&self, next: AgentStatus, tokens_delta: u64) {
        {
            let mut status = self.status.lock();
            if !status.can_transition_to(next) {
                debug!(agent_id = %self.id, from = %*status, to = %next, "Ignoring invalid transition");
                return;
            }
            *status = next;
        }
        if let Err(e) = self
            .state
            .agents
            .update_status(&self.id, next, tokens_delta)
            .await
        {
            warn!(agent_id = %self.id, error = %e, "Agent status update failed");
        }
    }
}
