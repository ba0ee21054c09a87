use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use uuid::Uuid;

use crate::role::AgentRole;

/// Context key holding the outputs of a task's dependencies.
pub const CONTEXT_DEP_RESULTS: &str = "dep_results";
/// Context key holding prior conversation turns to replay.
pub const CONTEXT_HISTORY: &str = "conversation_history";

/// Default task priority (1 = most urgent, 10 = least).
pub const DEFAULT_PRIORITY: u8 = 5;

/// A unit of work handed to exactly one worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Task id; plan ids (`"t1"`) or generated UUIDs.
    pub id: String,
    /// The instruction text.
    pub content: String,
    /// Free-form context (dependency outputs, conversation history, ...).
    #[serde(default)]
    pub context: HashMap<String, serde_json::Value>,
    /// The task this one was derived from, if any.
    #[serde(default)]
    pub parent_task_id: Option<String>,
    /// Scheduling hint carried from the plan.
    #[serde(default = "default_priority")]
    pub priority: u8,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

fn default_priority() -> u8 {
    DEFAULT_PRIORITY
}

impl Task {
    /// A task with a fresh UUID id.
    pub fn new(content: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), content)
    }

    /// A task with a caller-chosen id.
    pub fn with_id(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            context: HashMap::new(),
            parent_task_id: None,
            priority: DEFAULT_PRIORITY,
            created_at: Utc::now(),
        }
    }

    /// Sets the parent task id.
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent_task_id = Some(parent.into());
        self
    }

    /// Sets the priority, clamped to `1..=10`.
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority.clamp(1, 10);
        self
    }

    /// Inserts an arbitrary context value.
    pub fn with_context(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    /// Attaches dependency outputs keyed by dependency task id.
    pub fn with_dependency_outputs(self, outputs: BTreeMap<String, String>) -> Self {
        let map: serde_json::Map<String, serde_json::Value> = outputs
            .into_iter()
            .map(|(k, v)| (k, serde_json::Value::String(v)))
            .collect();
        self.with_context(CONTEXT_DEP_RESULTS, serde_json::Value::Object(map))
    }

    /// Dependency outputs attached with [`Task::with_dependency_outputs`], sorted by id.
    pub fn dependency_outputs(&self) -> Vec<(String, String)> {
        let Some(serde_json::Value::Object(map)) = self.context.get(CONTEXT_DEP_RESULTS) else {
            return Vec::new();
        };
        let mut out: Vec<(String, String)> = map
            .iter()
            .map(|(k, v)| {
                let text = match v {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), text)
            })
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}

/// Token counts reported by a backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Prompt tokens.
    pub input_tokens: u64,
    /// Completion tokens.
    pub output_tokens: u64,
}

impl TokenUsage {
    /// Prompt plus completion tokens.
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    /// Adds another usage record to this one.
    pub fn add(&mut self, other: TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// The outcome of one task, produced by exactly one worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    /// Id of the task this result answers.
    pub task_id: String,
    /// Id of the worker that produced it.
    pub agent_id: String,
    /// Role of that worker.
    pub role: AgentRole,
    /// Final text output (empty on failure).
    pub output: String,
    /// Whether the task succeeded.
    pub success: bool,
    /// Failure description when `success` is false.
    #[serde(default)]
    pub error: Option<String>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// Total tokens consumed.
    pub tokens_used: u64,
    /// When the result was produced.
    pub timestamp: DateTime<Utc>,
}

impl TaskResult {
    /// A successful result.
    pub fn success(
        task_id: impl Into<String>,
        agent_id: impl Into<String>,
        role: AgentRole,
        output: impl Into<String>,
        duration: Duration,
        tokens_used: u64,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            agent_id: agent_id.into(),
            role,
            output: output.into(),
            success: true,
            error: None,
            duration_ms: duration.as_millis() as u64,
            tokens_used,
            timestamp: Utc::now(),
        }
    }

    /// A failed result carrying `error`.
    pub fn failure(
        task_id: impl Into<String>,
        agent_id: impl Into<String>,
        role: AgentRole,
        error: impl Into<String>,
        duration: Duration,
        tokens_used: u64,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            agent_id: agent_id.into(),
            role,
            output: String::new(),
            success: false,
            error: Some(error.into()),
            duration_ms: duration.as_millis() as u64,
            tokens_used,
            timestamp: Utc::now(),
        }
    }

    /// Text handed to dependents: the output, or `FAILED: <error>`.
    pub fn context_text(&self) -> String {
        if self.success {
            self.output.clone()
        } else {
            format!("FAILED: {}", self.error.as_deref().unwrap_or("unknown error"))
        }
    }

    /// Duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.duration_ms as f64 / 1000.0
    }
}

/// Lifecycle status of a worker.
///
/// `Idle → Thinking → Executing → {Done | Failed}`, with `Waiting` for a
/// worker blocked on a concurrency slot or a dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    /// Ready for new work.
    Idle,
    /// Preparing the request.
    Thinking,
    /// Running the agentic loop.
    Executing,
    /// Blocked, not yet started.
    Waiting,
    /// Finished successfully.
    Done,
    /// Finished with an error.
    Failed,
}

impl AgentStatus {
    /// Whether moving from `self` to `next` is a legal transition.
    ///
    /// Any status may reset to `Idle`.
    pub fn can_transition_to(self, next: AgentStatus) -> bool {
        use AgentStatus::*;
        matches!(
            (self, next),
            (_, Idle)
                | (Idle, Thinking)
                | (Idle, Waiting)
                | (Waiting, Thinking)
                | (Waiting, Failed)
                | (Thinking, Executing)
                | (Thinking, Failed)
                | (Executing, Done)
                | (Executing, Failed)
        )
    }

    /// `Done` or `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, AgentStatus::Done | AgentStatus::Failed)
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentStatus::Idle => write!(f, "idle"),
            AgentStatus::Thinking => write!(f, "thinking"),
            AgentStatus::Executing => write!(f, "executing"),
            AgentStatus::Waiting => write!(f, "waiting"),
            AgentStatus::Done => write!(f, "done"),
            AgentStatus::Failed => write!(f, "failed"),
        }
    }
}
