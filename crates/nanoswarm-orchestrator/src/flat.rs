use crate::config::SwarmConfig;
use crate::context::ContextProvider;
use crate::driver::{PlannerKind, RunDriver, TierExecutor};
use crate::hierarchy::knowledge_for;
use crate::limits::acquire;
use crate::pipeline::StageReport;
use crate::prompts::flat_worker_prompt;
use crate::scope::RunScope;
use crate::types::{PlannedTask, RunOutcome};
use async_trait::async_trait;
use nanoswarm_agent::LlmBackend;
use nanoswarm_core::{AgentRole, SwarmResult, Task, TaskResult};
use nanoswarm_state::StateLayer;
use nanoswarm_tools::ToolRegistry;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::info;

/// Single-tier orchestrator: the same plan and level scheduling as
/// [`HierarchicalSwarm`](crate::HierarchicalSwarm), but each task is one
/// worker call with its dependency outputs attached as task context.
pub struct FlatOrchestrator {
    llm: Arc<dyn LlmBackend>,
    tools: Arc<ToolRegistry>,
    state: Arc<StateLayer>,
    config: SwarmConfig,
    slots: Arc<Semaphore>,
    context: Option<Arc<dyn ContextProvider>>,
}

impl FlatOrchestrator {
    /// At most `config.flat_limit` workers run at once.
    ///
    /// Unlike [`HierarchicalSwarm::new`](crate::HierarchicalSwarm::new), `llm`
    /// is not wrapped in a global gate: only `flat_limit` bounds its calls,
    /// and `worker_timeout_secs` bounds each worker's whole task.
    pub fn new(
        llm: Arc<dyn LlmBackend>,
        tools: Arc<ToolRegistry>,
        state: Arc<StateLayer>,
        config: SwarmConfig,
    ) -> Self {
        Self {
            llm,
            tools,
            state,
            slots: Arc::new(Semaphore::new(config.flat_limit.max(1))),
            config,
            context: None,
        }
    }

    /// Adds a knowledge source consulted before planning.
    pub fn with_context_provider(mut self, provider: Arc<dyn ContextProvider>) -> Self {
        self.context = Some(provider);
        self
    }

    /// Runs `goal` in a new session.
    pub async fn run(
        &self,
        goal: &str,
        metadata: HashMap<String, Value>,
    ) -> SwarmResult<RunOutcome> {
        let session = self.state.sessions.create(goal, metadata).await?;
        info!(session_id = %session.session_id, "Flat run starting");
        let scope = RunScope {
            llm: Arc::clone(&self.llm),
            tools: Arc::clone(&self.tools),
            state: Arc::clone(&self.state),
            session_id: session.session_id,
            max_tokens: self.config.max_tokens,
            timeout: Some(self.config.worker_timeout()),
        };
        let knowledge = knowledge_for(self.context.as_deref(), goal).await;
        let executor = WorkerExecutor {
            scope: scope.clone(),
            slots: Arc::clone(&self.slots),
        };
        Ok(RunDriver {
            scope: &scope,
            config: &self.config,
            planner: PlannerKind::Flat,
        }
        .run(goal, knowledge.as_deref(), "", &executor)
        .await)
    }
}

struct WorkerExecutor {
    scope: RunScope,
    slots: Arc<Semaphore>,
}

#[async_trait]
impl TierExecutor for WorkerExecutor {
    async fn execute(
        &self,
        task: &PlannedTask,
        deps: BTreeMap<String, String>,
    ) -> (TaskResult, Vec<StageReport>) {
        let role = AgentRole::Lead(task.role);
        let worker = self
            .scope
            .worker(self.scope.config(role, flat_worker_prompt(task.role)));
        worker.initialize().await;
        worker.mark_waiting().await;

        let work = Task::with_id(&task.id, &task.instruction)
            .with_priority(task.priority)
            .with_dependency_outputs(deps);
        let result = match acquire(&self.slots, "flat").await {
            Ok(_slot) => worker.execute(&work).await,
            Err(e) => TaskResult::failure(
                &task.id,
                worker.id(),
                role,
                e.to_string(),
                Duration::ZERO,
                0,
            ),
        };
        worker.shutdown().await;
        (result, Vec::new())
    }
}
