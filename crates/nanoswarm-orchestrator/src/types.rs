use crate::pipeline::StageReport;
use nanoswarm_core::{DomainRole, SwarmError, SwarmResult, TaskResult, DEFAULT_PRIORITY};
use nanoswarm_state::SessionSummary;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

/// One mid-tier task in a dependency plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedTask {
    /// Plan-local id, unique within the plan.
    pub id: String,
    /// Domain lead that runs the task.
    pub role: DomainRole,
    /// What the lead is asked to do.
    pub instruction: String,
    /// Ids of tasks whose output this task needs.
    pub depends_on: Vec<String>,
    /// Planner-assigned priority, informational only.
    pub priority: u8,
}

impl PlannedTask {
    /// A task with no dependencies and default priority.
    pub fn new(id: impl Into<String>, role: DomainRole, instruction: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role,
            instruction: instruction.into(),
            depends_on: Vec::new(),
            priority: DEFAULT_PRIORITY,
        }
    }

    /// Replaces the dependency list.
    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }
}

/// Wire form of a planned task. Roles arrive as free strings and are
/// resolved against [`DomainRole`] after deserialization.
#[derive(Debug, Deserialize)]
pub(crate) struct RawPlannedTask {
    #[serde(default)]
    id: String,
    #[serde(alias = "l1_role")]
    role: String,
    #[serde(default, alias = "task", alias = "description")]
    instruction: String,
    #[serde(default)]
    depends_on: Vec<String>,
    #[serde(default)]
    priority: Value,
}

/// Planners emit priorities as integers, floats, numeric strings or words.
/// Numbers are rounded into 1..=10; anything else gets the default.
fn coerce_priority(raw: &Value) -> u8 {
    let number = match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match number {
        Some(n) if n.is_finite() => n.round().clamp(1.0, 10.0) as u8,
        _ => DEFAULT_PRIORITY,
    }
}

impl TryFrom<RawPlannedTask> for PlannedTask {
    type Error = SwarmError;

    fn try_from(raw: RawPlannedTask) -> SwarmResult<Self> {
        Ok(Self {
            role: DomainRole::from_str(&raw.role)?,
            id: raw.id,
            instruction: raw.instruction,
            depends_on: raw.depends_on,
            priority: coerce_priority(&raw.priority),
        })
    }
}

/// The planner's decomposition of a goal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyPlan {
    /// One-line description of the approach.
    pub plan_summary: Option<String>,
    /// The tasks, in planner order.
    pub tasks: Vec<PlannedTask>,
    /// Extra guidance for the final synthesis call.
    pub synthesis_instruction: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawPlan {
    #[serde(default)]
    pub plan_summary: Option<String>,
    #[serde(default, alias = "l1_tasks", alias = "subtasks")]
    pub tasks: Vec<RawPlannedTask>,
    #[serde(default)]
    pub synthesis_instruction: Option<String>,
}

impl TryFrom<RawPlan> for DependencyPlan {
    type Error = SwarmError;

    fn try_from(raw: RawPlan) -> SwarmResult<Self> {
        let tasks = raw
            .tasks
            .into_iter()
            .map(PlannedTask::try_from)
            .collect::<SwarmResult<Vec<_>>>()?;
        Ok(Self {
            plan_summary: raw.plan_summary,
            tasks,
            synthesis_instruction: raw.synthesis_instruction,
        })
    }
}

/// Outcome of one planned task, as reported to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierResult {
    /// Planned task id.
    pub task_id: String,
    /// Domain that ran it.
    pub role: DomainRole,
    /// The planned instruction.
    pub instruction: String,
    /// The task's output, or `FAILED: <error>` when it failed.
    pub output: String,
    /// Whether the task succeeded.
    pub success: bool,
    /// Failure reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Tokens spent in the task's whole subtree.
    pub tokens_used: u64,
    /// Wall-clock time.
    pub duration_ms: u64,
    /// Dependency level the task ran at.
    pub level: usize,
    /// Specialist stages run under the task, empty in flat mode.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stages: Vec<StageReport>,
}

impl TierResult {
    pub(crate) fn from_result(
        task: &PlannedTask,
        level: usize,
        result: &TaskResult,
        stages: Vec<StageReport>,
    ) -> Self {
        Self {
            task_id: task.id.clone(),
            role: task.role,
            instruction: task.instruction.clone(),
            output: result.context_text(),
            success: result.success,
            error: result.error.clone(),
            tokens_used: result.tokens_used,
            duration_ms: result.duration_ms,
            level,
            stages,
        }
    }
}

/// Where a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    /// Stopped before execution: bad plan or planner failure.
    Planning,
    /// Running dependency levels.
    Executing,
    /// Combining tier outputs.
    Synthesizing,
    /// Finished with at least one successful tier.
    Complete,
    /// Finished with every tier failed.
    Failed,
}

/// What a run hands back to its caller, on success and on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    /// Whether the run produced a usable answer.
    pub success: bool,
    /// Session the run was recorded under.
    pub session_id: String,
    /// The goal as given.
    pub goal: String,
    /// Planner's summary, when planning succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_summary: Option<String>,
    /// One entry per executed task, in level order.
    pub tier_results: Vec<TierResult>,
    /// The synthesized answer.
    pub final_answer: String,
    /// Journal statistics at the end of the run.
    pub session_summary: SessionSummary,
    /// Why the run failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Phase the run ended in.
    pub phase: RunPhase,
}

impl RunOutcome {
    /// A run that never reached execution.
    pub(crate) fn aborted(
        session_id: impl Into<String>,
        goal: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        let session_id = session_id.into();
        Self {
            success: false,
            session_summary: SessionSummary::empty(session_id.clone()),
            session_id,
            goal: goal.into(),
            plan_summary: None,
            tier_results: Vec::new(),
            final_answer: String::new(),
            error: Some(error.into()),
            phase: RunPhase::Planning,
        }
    }

    /// Number of tier results that succeeded.
    pub fn successful_tiers(&self) -> usize {
        self.tier_results.iter().filter(|r| r.success).count()
    }
}
