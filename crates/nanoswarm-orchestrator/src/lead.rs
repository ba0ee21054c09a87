//! Mid-tier domain lead: contextualize, delegate to the specialist
//! pipeline, review.

use crate::pipeline::{PipelineOutcome, SubPipeline};
use crate::prompts::{contextualize_prompt, enriched_task, lead_prompt, review_prompt};
use crate::scope::RunScope;
use nanoswarm_core::{AgentRole, DomainRole, Task, TaskResult};
use nanoswarm_state::{TaskCompletion, TaskStart};
use std::time::Instant;
use tracing::{info, warn};

/// Lead temperature.
pub const LEAD_TEMPERATURE: f32 = 0.05;

/// What a lead run produced, beyond its [`TaskResult`].
#[derive(Debug, Clone)]
pub struct LeadOutcome {
    /// The tier-level result.
    pub result: TaskResult,
    /// The specialist pipeline run.
    pub pipeline: PipelineOutcome,
}

/// One domain lead. It owns a worker for its own two calls and a
/// specialist pipeline for the work in between.
pub(crate) struct DomainLead {
    role: DomainRole,
    scope: RunScope,
    stage_limit: usize,
}

impl DomainLead {
    pub fn new(role: DomainRole, scope: RunScope, stage_limit: usize) -> Self {
        Self {
            role,
            scope,
            stage_limit,
        }
    }

    /// Runs the full cycle for `task`.
    ///
    /// The lead's output is its review, or the raw pipeline output when the
    /// review call failed. It fails only when every LLM call in its subtree
    /// failed. The tier task itself is journaled under `task.id`.
    pub async fn execute(&self, task: &Task) -> LeadOutcome {
        let start = Instant::now();
        let role = AgentRole::Lead(self.role);
        let worker = self.scope.worker(
            self.scope
                .config(role, lead_prompt(self.role))
                .with_temperature(LEAD_TEMPERATURE),
        );
        worker.initialize().await;

        let journal = self.scope.state.journal(&self.scope.session_id);
        if let Err(e) = journal
            .record_start(TaskStart {
                task_id: &task.id,
                agent_id: worker.id(),
                role,
                content: &task.content,
                parent_task_id: task.parent_task_id.as_deref(),
            })
            .await
        {
            warn!(task_id = %task.id, error = %e, "Journal start failed");
        }

        info!(domain = %self.role, task_id = %task.id, "Lead contextualizing");
        let ctx = worker
            .execute(&Task::new(contextualize_prompt(&task.content)).with_parent(&task.id))
            .await;
        let lead_context = if ctx.success {
            ctx.output.as_str()
        } else {
            warn!(domain = %self.role, error = ?ctx.error, "Contextualize failed; delegating raw task");
            ""
        };

        let pipeline = SubPipeline::new(self.role, self.scope.clone(), self.stage_limit)
            .execute(&enriched_task(&task.content, lead_context), Some(&task.id))
            .await;

        info!(domain = %self.role, task_id = %task.id, "Lead reviewing");
        let review = worker
            .execute(
                &Task::new(review_prompt(&task.content, &pipeline.final_output))
                    .with_parent(&task.id),
            )
            .await;

        let calls = pipeline.llm_calls + 2;
        let failures =
            pipeline.llm_failures + usize::from(!ctx.success) + usize::from(!review.success);
        let tokens = ctx.tokens_used + pipeline.total_tokens + review.tokens_used;
        let elapsed = start.elapsed();

        let result = if failures < calls {
            let output = if review.success {
                review.output.clone()
            } else {
                warn!(domain = %self.role, error = ?review.error, "Review failed; using pipeline output");
                pipeline.final_output.clone()
            };
            TaskResult::success(&task.id, worker.id(), role, output, elapsed, tokens)
        } else {
            let last = review.error.as_deref().unwrap_or("unknown error");
            TaskResult::failure(
                &task.id,
                worker.id(),
                role,
                format!("all {calls} LLM calls of the {} lead failed; last error: {last}", self.role),
                elapsed,
                tokens,
            )
        };

        let completion = TaskCompletion {
            output: result.output.clone(),
            success: result.success,
            error: result.error.clone(),
            tokens_used: tokens,
            duration: elapsed,
            tool_calls: Vec::new(),
        };
        if let Err(e) = journal.record_complete(&task.id, completion).await {
            warn!(task_id = %task.id, error = %e, "Journal completion failed");
        }
        worker.shutdown().await;

        info!(
            domain = %self.role,
            task_id = %task.id,
            success = result.success,
            tokens,
            failures,
            "Lead finished"
        );
        LeadOutcome { result, pipeline }
    }
}
