use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Metadata describing a tool's interface, sent to the model as its schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Name the model uses to call the tool.
    pub name: String,
    /// One-paragraph description shown to the model.
    pub description: String,
    /// JSON Schema of the accepted arguments.
    pub parameters_schema: serde_json::Value,
}

/// What a tool run produced. Tools never raise; failures are values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    /// The tool did its job.
    Success {
        /// Text handed back to the model.
        output: String,
    },
    /// The tool could not do its job.
    Failure {
        /// Human-readable explanation handed back to the model.
        output: String,
        /// Short machine-readable error code.
        error: String,
    },
}

impl ToolOutcome {
    /// A successful outcome.
    pub fn ok(output: impl Into<String>) -> Self {
        ToolOutcome::Success {
            output: output.into(),
        }
    }

    /// A failed outcome with an error code.
    pub fn failed(output: impl Into<String>, error: impl Into<String>) -> Self {
        ToolOutcome::Failure {
            output: output.into(),
            error: error.into(),
        }
    }

    /// Whether this is [`ToolOutcome::Success`].
    pub fn is_success(&self) -> bool {
        matches!(self, ToolOutcome::Success { .. })
    }

    /// The text shown to the model either way.
    pub fn output(&self) -> &str {
        match self {
            ToolOutcome::Success { output } | ToolOutcome::Failure { output, .. } => output,
        }
    }

    /// The error code of a failure.
    pub fn error(&self) -> Option<&str> {
        match self {
            ToolOutcome::Success { .. } => None,
            ToolOutcome::Failure { error, .. } => Some(error),
        }
    }
}

/// One dispatched tool call, as recorded by the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolReport {
    /// Name of the tool that was asked for.
    pub tool_name: String,
    /// The backend's id for the call.
    pub call_id: String,
    /// What happened.
    pub outcome: ToolOutcome,
    /// How long the tool ran.
    pub duration_ms: u64,
}

impl ToolReport {
    /// Shorthand for `outcome.is_success()`.
    pub fn success(&self) -> bool {
        self.outcome.is_success()
    }
}

/// Trait every tool implements.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name, description and argument schema.
    fn descriptor(&self) -> &ToolDescriptor;

    /// Runs the tool. `args` is always a JSON object.
    async fn run(&self, args: &serde_json::Value) -> ToolOutcome;
}
