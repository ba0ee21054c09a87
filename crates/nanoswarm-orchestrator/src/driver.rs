//! The run state machine shared by the hierarchical and flat orchestrators:
//! plan, execute levels, synthesize, finalize.

use crate::config::SwarmConfig;
use crate::pipeline::StageReport;
use crate::plan::parse_plan;
use crate::prompts::{
    flat_planner_prompt, flat_planning_prompt, planning_prompt, queen_prompt,
    queen_synthesizer_prompt, raw_concatenation, synthesis_prompt,
};
use crate::scheduler::{dependency_outputs, LevelSchedule};
use crate::scope::RunScope;
use crate::types::{DependencyPlan, PlannedTask, RunOutcome, RunPhase, TierResult};
use async_trait::async_trait;
use futures_util::future::join_all;
use nanoswarm_core::{AgentRole, SwarmError, SwarmResult, Task, TaskResult};
use nanoswarm_state::{SessionPatch, SessionSummary};
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;
use tracing::{error, info, warn};

/// Planner temperature.
pub const PLANNER_TEMPERATURE: f32 = 0.0;
/// Synthesizer temperature.
pub const SYNTHESIZER_TEMPERATURE: f32 = 0.1;

/// Runs one planned task. Implementations never fail; errors become a
/// failed [`TaskResult`].
#[async_trait]
pub(crate) trait TierExecutor: Send + Sync {
    /// `deps` holds the outputs of the task's declared dependencies.
    async fn execute(
        &self,
        task: &PlannedTask,
        deps: BTreeMap<String, String>,
    ) -> (TaskResult, Vec<StageReport>);
}

/// Which planner prompt to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PlannerKind {
    Hierarchical,
    Flat,
}

pub(crate) struct RunDriver<'a> {
    pub scope: &'a RunScope,
    pub config: &'a SwarmConfig,
    pub planner: PlannerKind,
}

impl RunDriver<'_> {
    /// Drives one session from planning to finalization. Always returns an
    /// outcome; the session is finalized exactly once on every path.
    pub async fn run(
        &self,
        goal: &str,
        knowledge: Option<&str>,
        history: &str,
        executor: &dyn TierExecutor,
    ) -> RunOutcome {
        let session_id = self.scope.session_id.as_str();
        let start = Instant::now();
        info!(session_id, planner = ?self.planner, "Planning");

        let planned = match self.plan(goal, knowledge, history).await {
            Ok(p) => p,
            Err(e) => {
                error!(session_id, error = %e, "Planning failed; aborting run");
                self.finalize("", false).await;
                let mut out = RunOutcome::aborted(session_id, goal, e.to_string());
                out.session_summary = self.summary().await;
                return out;
            }
        };
        let (plan, schedule) = planned;

        if let Err(e) = self
            .scope
            .state
            .sessions
            .update(
                session_id,
                SessionPatch {
                    task_count: Some(schedule.task_count()),
                    ..SessionPatch::default()
                },
            )
            .await
        {
            warn!(session_id, error = %e, "Session task count update failed");
        }
        info!(
            session_id,
            tasks = schedule.task_count(),
            levels = schedule.depth(),
            summary = plan.plan_summary.as_deref().unwrap_or(""),
            "Plan ready"
        );

        let tier_results = self.execute_levels(&schedule, executor).await;
        let succeeded = tier_results.iter().filter(|r| r.success).count();

        let (final_answer, error, phase) = if succeeded == 0 {
            warn!(session_id, "Every tier task failed");
            (
                raw_concatenation(&tier_results),
                Some(format!("all {} tier tasks failed", tier_results.len())),
                RunPhase::Failed,
            )
        } else {
            (
                self.synthesize(goal, &plan, &tier_results).await,
                None,
                RunPhase::Complete,
            )
        };
        let success = succeeded > 0;

        self.finalize(&final_answer, success).await;
        let session_summary = self.summary().await;
        info!(
            session_id,
            success,
            succeeded,
            total = tier_results.len(),
            tokens = session_summary.total_tokens,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Run finished"
        );

        RunOutcome {
            success,
            session_id: session_id.to_string(),
            goal: goal.to_string(),
            plan_summary: plan.plan_summary,
            tier_results,
            final_answer,
            session_summary,
            error,
            phase,
        }
    }

    async fn plan(
        &self,
        goal: &str,
        knowledge: Option<&str>,
        history: &str,
    ) -> SwarmResult<(DependencyPlan, LevelSchedule)> {
        let (system, prompt) = match self.planner {
            PlannerKind::Hierarchical => (queen_prompt(), planning_prompt(goal, knowledge, history)),
            PlannerKind::Flat => (
                flat_planner_prompt(),
                flat_planning_prompt(goal, knowledge, history),
            ),
        };
        let worker = self.scope.worker(
            self.scope
                .config(AgentRole::Queen, system)
                .with_temperature(PLANNER_TEMPERATURE),
        );
        worker.initialize().await;
        let result = worker.execute(&Task::new(prompt)).await;
        worker.shutdown().await;

        if !result.success {
            return Err(SwarmError::Planning(format!(
                "planner call failed: {}",
                result.error.as_deref().unwrap_or("unknown error")
            )));
        }
        let plan = parse_plan(&result.output)?;
        let schedule = LevelSchedule::build(&plan.tasks)?;
        Ok((plan, schedule))
    }

    async fn execute_levels(
        &self,
        schedule: &LevelSchedule,
        executor: &dyn TierExecutor,
    ) -> Vec<TierResult> {
        let session_id = self.scope.session_id.as_str();
        let mut completed: HashMap<String, TaskResult> = HashMap::new();
        let mut tier_results = Vec::with_capacity(schedule.task_count());

        for (level, tasks) in schedule.levels().iter().enumerate() {
            info!(session_id, level, tasks = tasks.len(), "Executing level");
            let runs = tasks.iter().map(|task| {
                let deps =
                    dependency_outputs(task, &completed, self.config.dependency_context_chars);
                executor.execute(task, deps)
            });
            let results = join_all(runs).await;

            for (task, (result, stages)) in tasks.iter().zip(results) {
                tier_results.push(TierResult::from_result(task, level, &result, stages));
                completed.insert(task.id.clone(), result);
            }

            if let Err(e) = self
                .scope
                .state
                .sessions
                .update(
                    session_id,
                    SessionPatch {
                        completed_tasks: Some(completed.len()),
                        ..SessionPatch::default()
                    },
                )
                .await
            {
                warn!(session_id, error = %e, "Session progress update failed");
            }
        }
        tier_results
    }

    /// The synthesized answer, or the raw tier outputs when synthesis fails.
    async fn synthesize(&self, goal: &str, plan: &DependencyPlan, results: &[TierResult]) -> String {
        let worker = self.scope.worker(
            self.scope
                .config(AgentRole::QueenSynthesizer, queen_synthesizer_prompt())
                .with_max_tokens(self.config.synthesis_max_tokens)
                .with_temperature(SYNTHESIZER_TEMPERATURE),
        );
        worker.initialize().await;
        let prompt = synthesis_prompt(
            goal,
            results,
            plan.synthesis_instruction.as_deref(),
            self.config.synthesis_chars,
        );
        let result = worker.execute(&Task::new(prompt)).await;
        worker.shutdown().await;

        if result.success && !result.output.trim().is_empty() {
            result.output
        } else {
            warn!(
                session_id = %self.scope.session_id,
                error = ?result.error,
                "Synthesis failed; returning raw tier outputs"
            );
            raw_concatenation(results)
        }
    }

    async fn finalize(&self, final_answer: &str, success: bool) {
        if let Err(e) = self
            .scope
            .state
            .sessions
            .complete(&self.scope.session_id, final_answer, success)
            .await
        {
            warn!(session_id = %self.scope.session_id, error = %e, "Session finalization failed");
        }
    }

    async fn summary(&self) -> SessionSummary {
        let session_id = &self.scope.session_id;
        match self.scope.state.journal(session_id).summary().await {
            Ok(s) => s,
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Journal summary unavailable");
                SessionSummary::empty(session_id.clone())
            }
        }
    }
}
