use nanoswarm_agent::{LlmBackend, Worker, WorkerConfig};
use nanoswarm_core::AgentRole;
use nanoswarm_state::StateLayer;
use nanoswarm_tools::ToolRegistry;
use std::sync::Arc;
use std::time::Duration;

/// Everything a worker of one session needs, shared by every tier of a
/// run.
#[derive(Clone)]
pub(crate) struct RunScope {
    /// Backend every worker of the run calls; gated by the global limit.
    pub llm: Arc<dyn LlmBackend>,
    pub tools: Arc<ToolRegistry>,
    pub state: Arc<StateLayer>,
    pub session_id: String,
    /// Default completion budget of workers.
    pub max_tokens: u32,
    /// Per-task timeout of workers. `None` when the gated backend already
    /// times each call.
    pub timeout: Option<Duration>,
}

impl RunScope {
    /// A worker bound to this scope's session, backend and tools, with
    /// the scope's timeout.
    pub fn worker(&self, config: WorkerConfig) -> Worker {
        let config = match self.timeout {
            Some(limit) => config.with_timeout(limit),
            None => config.without_timeout(),
        };
        Worker::new(
            config,
            self.session_id.clone(),
            Arc::clone(&self.llm),
            Arc::clone(&self.tools),
            Arc::clone(&self.state),
        )
    }

    /// A worker config with the scope's completion budget.
    pub fn config(&self, role: AgentRole, prompt: impl Into<String>) -> WorkerConfig {
        WorkerConfig::new(role, prompt).with_max_tokens(self.max_tokens)
    }
}
