use crate::config::SwarmConfig;
use crate::context::ContextProvider;
use crate::driver::{PlannerKind, RunDriver, TierExecutor};
use crate::lead::DomainLead;
use crate::limits::{acquire, GatedBackend, TierLimits};
use crate::pipeline::StageReport;
use crate::scheduler::with_dependency_context;
use crate::scope::RunScope;
use crate::types::{PlannedTask, RunOutcome};
use async_trait::async_trait;
use nanoswarm_agent::LlmBackend;
use nanoswarm_core::{AgentRole, SwarmError, SwarmResult, Task, TaskResult};
use nanoswarm_state::StateLayer;
use nanoswarm_tools::ToolRegistry;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Metadata key linking a follow-up session to its parent.
pub const PREVIOUS_SESSION_KEY: &str = "previous_session_id";

/// The three-tier orchestrator: a Queen plans and synthesizes, one domain
/// lead per planned task runs a specialist pipeline.
///
/// Construct once and share; the global and mid-tier limits apply across
/// every run of the same instance.
pub struct HierarchicalSwarm {
    llm: Arc<dyn LlmBackend>,
    tools: Arc<ToolRegistry>,
    state: Arc<StateLayer>,
    config: SwarmConfig,
    limits: TierLimits,
    context: Option<Arc<dyn ContextProvider>>,
}

impl HierarchicalSwarm {
    /// A swarm calling `llm`, with the global limit applied to every call.
    ///
    /// `worker_timeout_secs` bounds each call from the moment it holds a
    /// global permit, so time queued behind other calls is not charged.
    pub fn new(
        llm: Arc<dyn LlmBackend>,
        tools: Arc<ToolRegistry>,
        state: Arc<StateLayer>,
        config: SwarmConfig,
    ) -> Self {
        let gated: Arc<dyn LlmBackend> = Arc::new(
            GatedBackend::new(llm, config.global_limit).with_call_timeout(config.worker_timeout()),
        );
        Self {
            llm: gated,
            tools,
            state,
            limits: TierLimits::new(config.mid_limit, config.stage_limit),
            config,
            context: None,
        }
    }

    /// Adds a knowledge source consulted before planning.
    pub fn with_context_provider(mut self, provider: Arc<dyn ContextProvider>) -> Self {
        self.context = Some(provider);
        self
    }

    /// The active configuration.
    pub fn config(&self) -> &SwarmConfig {
        &self.config
    }

    /// Runs `goal` in a new session.
    ///
    /// Errors only when the session cannot be created; every later failure
    /// is reported inside the [`RunOutcome`].
    pub async fn run(
        &self,
        goal: &str,
        metadata: HashMap<String, Value>,
    ) -> SwarmResult<RunOutcome> {
        let session = self.state.sessions.create(goal, metadata).await?;
        info!(session_id = %session.session_id, "Hierarchical run starting");
        Ok(self.run_in_session(&session.session_id, goal, "").await)
    }

    /// Runs `goal` as a follow-up of an existing session, giving the
    /// planner that session's task history.
    ///
    /// Fails with [`SwarmError::NotFound`] when the parent session does not
    /// exist and with [`SwarmError::Orchestrator`] when another follow-up
    /// on the same parent is in progress.
    pub async fn run_followup(
        &self,
        parent_session_id: &str,
        goal: &str,
        mut metadata: HashMap<String, Value>,
    ) -> SwarmResult<RunOutcome> {
        let parent = self.state.sessions.require(parent_session_id).await?;
        let resource = format!("followup:{parent_session_id}");
        let token = self
            .state
            .locks
            .acquire(&resource, self.config.followup_lock_ttl())
            .await?
            .ok_or_else(|| {
                SwarmError::Orchestrator(format!(
                    "a follow-up of session {parent_session_id} is already running"
                ))
            })?;

        info!(parent = %parent.session_id, parent_goal = %parent.goal, "Follow-up run starting");
        let outcome: SwarmResult<RunOutcome> = async {
            let history = match self
                .state
                .journal(parent_session_id)
                .planner_context(self.config.history_limit)
                .await
            {
                Ok(h) => h,
                Err(e) => {
                    warn!(parent = parent_session_id, error = %e, "Parent history unavailable");
                    String::new()
                }
            };
            metadata.insert(
                PREVIOUS_SESSION_KEY.to_string(),
                Value::String(parent_session_id.to_string()),
            );
            let session = self.state.sessions.create(goal, metadata).await?;
            Ok(self.run_in_session(&session.session_id, goal, &history).await)
        }
        .await;

        match self.state.locks.release(&token).await {
            Ok(true) => {}
            Ok(false) => warn!(resource = %resource, "Follow-up lock expired before release"),
            Err(e) => warn!(resource = %resource, error = %e, "Follow-up lock release failed"),
        }
        outcome
    }

    async fn run_in_session(&self, session_id: &str, goal: &str, history: &str) -> RunOutcome {
        let scope = RunScope {
            llm: Arc::clone(&self.llm),
            tools: Arc::clone(&self.tools),
            state: Arc::clone(&self.state),
            session_id: session_id.to_string(),
            max_tokens: self.config.max_tokens,
            timeout: None,
        };
        let knowledge = knowledge_for(self.context.as_deref(), goal).await;
        let executor = LeadExecutor {
            scope: scope.clone(),
            limits: self.limits.clone(),
        };
        RunDriver {
            scope: &scope,
            config: &self.config,
            planner: PlannerKind::Hierarchical,
        }
        .run(goal, knowledge.as_deref(), history, &executor)
        .await
    }
}

/// Best-effort knowledge lookup: errors are logged and dropped.
pub(crate) async fn knowledge_for(
    provider: Option<&dyn ContextProvider>,
    goal: &str,
) -> Option<String> {
    let provider = provider?;
    match provider.context_for(goal).await {
        Ok(ctx) => ctx,
        Err(e) => {
            warn!(error = %e, "Context provider failed; planning without knowledge context");
            None
        }
    }
}

struct LeadExecutor {
    scope: RunScope,
    limits: TierLimits,
}

#[async_trait]
impl TierExecutor for LeadExecutor {
    async fn execute(
        &self,
        task: &PlannedTask,
        deps: BTreeMap<String, String>,
    ) -> (TaskResult, Vec<StageReport>) {
        let content = with_dependency_context(&task.instruction, &deps);
        let tier_task = Task::with_id(&task.id, content).with_priority(task.priority);

        let _mid = match acquire(&self.limits.mid, "mid-tier").await {
            Ok(permit) => permit,
            Err(e) => {
                let result = TaskResult::failure(
                    &task.id,
                    "",
                    AgentRole::Lead(task.role),
                    e.to_string(),
                    Duration::ZERO,
                    0,
                );
                return (result, Vec::new());
            }
        };
        let lead = DomainLead::new(task.role, self.scope.clone(), self.limits.stage);
        let outcome = lead.execute(&tier_task).await;
        (outcome.result, outcome.pipeline.stages)
    }
}
