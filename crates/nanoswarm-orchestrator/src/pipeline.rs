//! The specialist pipeline behind each domain lead.
//!
//! A domain has a fixed list of stages; each stage is a set of specialists
//! run concurrently. Every specialist sees the task plus the outputs of all
//! earlier stages, with one designated predecessor's output injected under
//! a label. After the last stage the outputs are combined by a fixed
//! per-domain rule. A domain without stages passes its input through.

use crate::limits::acquire;
use crate::prompts::specialist_prompt;
use crate::scope::RunScope;
use futures_util::future::join_all;
use nanoswarm_core::{
    preview, truncate_with_marker, AgentRole, DomainRole, SpecialistRole, Task, TaskResult,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use SpecialistRole::*;

/// One pipeline stage: specialists that run together.
pub type Stage = &'static [SpecialistRole];

const CODER_STAGES: &[Stage] = &[&[CodePlanner], &[CodeWriter], &[CodeTester, CodeReviewer]];
const RESEARCHER_STAGES: &[Stage] = &[&[WebSearcher], &[Synthesizer, FactVerifier]];
const ANALYST_STAGES: &[Stage] = &[&[Reasoner], &[Critiquer], &[Summarizer]];
const VALIDATOR_STAGES: &[Stage] = &[&[CorrectnessChecker, CompletenessChecker], &[Scorer]];
const EXECUTOR_STAGES: &[Stage] = &[&[ActionPlanner], &[ActionRunner]];

const TASK_BUDGET: usize = 2000;
const PRIOR_OUTPUT_BUDGET: usize = 4000;
const INJECTION_BUDGET: usize = 5000;
const SUMMARY_INPUT_BUDGET: usize = 3000;
const OUTPUT_PREVIEW_CHARS: usize = 200;

/// Specialist temperature.
pub const SPECIALIST_TEMPERATURE: f32 = 0.05;

/// The stage table of `domain`.
pub fn stages(domain: DomainRole) -> &'static [Stage] {
    match domain {
        DomainRole::Coder => CODER_STAGES,
        DomainRole::Researcher => RESEARCHER_STAGES,
        DomainRole::Analyst => ANALYST_STAGES,
        DomainRole::Validator => VALIDATOR_STAGES,
        DomainRole::Executor => EXECUTOR_STAGES,
        DomainRole::Architect => &[],
    }
}

/// The predecessor whose output `role` receives verbatim, with its label.
pub fn injection(role: SpecialistRole) -> Option<(SpecialistRole, &'static str)> {
    match role {
        CodeWriter => Some((CodePlanner, "IMPLEMENTATION PLAN TO FOLLOW")),
        CodeTester => Some((CodeWriter, "CODE TO TEST")),
        Synthesizer => Some((WebSearcher, "RAW SEARCH RESULTS TO SYNTHESIZE")),
        FactVerifier => Some((Synthesizer, "SYNTHESIZED CLAIMS TO VERIFY")),
        Critiquer => Some((Reasoner, "REASONING TO CRITIQUE")),
        ActionRunner => Some((ActionPlanner, "ACTION PLAN TO EXECUTE")),
        CodePlanner | CodeReviewer | WebSearcher | Reasoner | Summarizer | CorrectnessChecker
        | CompletenessChecker | Scorer | ActionPlanner => None,
    }
}

fn output_of(outputs: &[(SpecialistRole, String)], role: SpecialistRole) -> Option<&str> {
    outputs
        .iter()
        .rev()
        .find(|(r, _)| *r == role)
        .map(|(_, o)| o.as_str())
}

/// The user message for `role` given the outputs of earlier stages.
pub fn build_stage_input(
    role: SpecialistRole,
    task: &str,
    prior: &[(SpecialistRole, String)],
) -> String {
    let mut parts = vec![format!(
        "TASK:\n{}",
        truncate_with_marker(task, TASK_BUDGET)
    )];

    let relevant: Vec<String> = prior
        .iter()
        .filter(|(r, _)| *r != role)
        .map(|(r, o)| {
            format!(
                "### Output from {r}:\n{}",
                truncate_with_marker(o, PRIOR_OUTPUT_BUDGET)
            )
        })
        .collect();
    if !relevant.is_empty() {
        parts.push(format!("PRIOR STAGE OUTPUTS:\n{}", relevant.join("\n\n")));
    }

    if let Some((source, label)) = injection(role) {
        if let Some(out) = output_of(prior, source) {
            parts.push(format!(
                "{label}:\n{}",
                truncate_with_marker(out, INJECTION_BUDGET)
            ));
        }
    } else if role == Summarizer && !prior.is_empty() {
        let all: Vec<String> = prior
            .iter()
            .map(|(_, o)| truncate_with_marker(o, SUMMARY_INPUT_BUDGET))
            .collect();
        parts.push(format!("CONTENT TO SUMMARIZE:\n{}", all.join("\n\n")));
    }

    parts.join("\n\n")
}

fn join_outputs(outputs: &[(SpecialistRole, String)]) -> String {
    outputs
        .iter()
        .map(|(_, o)| o.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Combines the specialist outputs into the domain's result.
pub fn synthesize(domain: DomainRole, outputs: &[(SpecialistRole, String)]) -> String {
    let non_empty = |role| output_of(outputs, role).filter(|o| !o.is_empty());
    match domain {
        DomainRole::Coder => {
            let mut parts = vec![format!(
                "## Implementation\n{}",
                output_of(outputs, CodeWriter).unwrap_or_default()
            )];
            if let Some(tests) = non_empty(CodeTester) {
                parts.push(format!("## Test Results\n{tests}"));
            }
            if let Some(review) = non_empty(CodeReviewer) {
                parts.push(format!("## Code Review\n{review}"));
            }
            parts.join("\n\n")
        }
        DomainRole::Researcher => {
            let mut parts = vec![output_of(outputs, Synthesizer)
                .unwrap_or_default()
                .to_string()];
            if let Some(verification) = non_empty(FactVerifier) {
                parts.push(format!("## Fact Verification\n{verification}"));
            }
            parts.join("\n\n")
        }
        DomainRole::Analyst => output_of(outputs, Summarizer)
            .map_or_else(|| join_outputs(outputs), str::to_string),
        DomainRole::Validator => format!(
            "## Validation Report\n\n### Correctness\n{}\n\n### Completeness\n{}\n\n### Quality Score\n{}",
            output_of(outputs, CorrectnessChecker).unwrap_or_default(),
            output_of(outputs, CompletenessChecker).unwrap_or_default(),
            output_of(outputs, Scorer).unwrap_or_default(),
        ),
        DomainRole::Executor => output_of(outputs, ActionRunner)
            .map_or_else(|| join_outputs(outputs), str::to_string),
        DomainRole::Architect => outputs
            .iter()
            .map(|(r, o)| format!("### {r}\n{o}"))
            .collect::<Vec<_>>()
            .join("\n\n---\n\n"),
    }
}

/// One specialist run inside a stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecialistReport {
    /// Specialist role.
    pub role: SpecialistRole,
    /// Whether the specialist succeeded.
    pub success: bool,
    /// Wall-clock time.
    pub duration_ms: u64,
    /// Tokens spent.
    pub tokens_used: u64,
    /// Start of the output, or of the failure text.
    pub output_preview: String,
}

/// One stage of a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageReport {
    /// 1-based stage number.
    pub stage: usize,
    /// Per-specialist results, in table order.
    pub results: Vec<SpecialistReport>,
}

/// Everything a pipeline run produced.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    /// Domain the pipeline belongs to.
    pub domain: DomainRole,
    /// Per-stage log.
    pub stages: Vec<StageReport>,
    /// Every specialist output (failures as `FAILED: ...`), in run order.
    pub outputs: Vec<(SpecialistRole, String)>,
    /// The domain's combined result.
    pub final_output: String,
    /// Tokens spent across all specialists.
    pub total_tokens: u64,
    /// Specialists run.
    pub llm_calls: usize,
    /// Specialists that failed.
    pub llm_failures: usize,
}

impl PipelineOutcome {
    fn pass_through(domain: DomainRole, task: &str) -> Self {
        Self {
            domain,
            stages: Vec::new(),
            outputs: Vec::new(),
            final_output: task.to_string(),
            total_tokens: 0,
            llm_calls: 0,
            llm_failures: 0,
        }
    }
}

/// Runs one domain's specialist pipeline.
pub(crate) struct SubPipeline {
    domain: DomainRole,
    scope: RunScope,
    stage_slots: Arc<Semaphore>,
}

impl SubPipeline {
    /// At most `stage_limit` specialists of one stage run at once.
    pub fn new(domain: DomainRole, scope: RunScope, stage_limit: usize) -> Self {
        Self {
            domain,
            scope,
            stage_slots: Arc::new(Semaphore::new(stage_limit.max(1))),
        }
    }

    /// Runs every stage in order. Specialist failures are carried forward
    /// as `FAILED: ...` outputs; the pipeline itself never fails.
    pub async fn execute(&self, task: &str, parent_task_id: Option<&str>) -> PipelineOutcome {
        let table = stages(self.domain);
        if table.is_empty() {
            info!(domain = %self.domain, "No pipeline for domain, passing task through");
            return PipelineOutcome::pass_through(self.domain, task);
        }

        info!(
            domain = %self.domain,
            stages = table.len(),
            task = preview(task, 80),
            "Pipeline starting"
        );

        let mut outputs: Vec<(SpecialistRole, String)> = Vec::new();
        let mut reports = Vec::with_capacity(table.len());
        let mut total_tokens = 0;
        let mut calls = 0;
        let mut failures = 0;

        for (idx, stage) in table.iter().enumerate() {
            info!(domain = %self.domain, stage = idx + 1, roles = ?stage, "Pipeline stage");
            let runs = stage
                .iter()
                .map(|role| self.run_specialist(*role, task, &outputs, parent_task_id));
            let results = join_all(runs).await;

            let mut stage_report = StageReport {
                stage: idx + 1,
                results: Vec::with_capacity(stage.len()),
            };
            for (role, result) in stage.iter().zip(results) {
                let text = result.context_text();
                calls += 1;
                if !result.success {
                    failures += 1;
                }
                total_tokens += result.tokens_used;
                stage_report.results.push(SpecialistReport {
                    role: *role,
                    success: result.success,
                    duration_ms: result.duration_ms,
                    tokens_used: result.tokens_used,
                    output_preview: preview(&text, OUTPUT_PREVIEW_CHARS).to_string(),
                });
                outputs.push((*role, text));
            }
            reports.push(stage_report);
        }

        let final_output = synthesize(self.domain, &outputs);
        info!(
            domain = %self.domain,
            total_tokens,
            failures,
            "Pipeline complete"
        );
        PipelineOutcome {
            domain: self.domain,
            stages: reports,
            outputs,
            final_output,
            total_tokens,
            llm_calls: calls,
            llm_failures: failures,
        }
    }

    async fn run_specialist(
        &self,
        role: SpecialistRole,
        task: &str,
        prior: &[(SpecialistRole, String)],
        parent_task_id: Option<&str>,
    ) -> TaskResult {
        let config = self
            .scope
            .config(AgentRole::Specialist(role), specialist_prompt(role))
            .with_temperature(SPECIALIST_TEMPERATURE);
        let worker = self.scope.worker(config);
        worker.initialize().await;
        worker.mark_waiting().await;

        let mut sub_task = Task::new(build_stage_input(role, task, prior));
        if let Some(parent) = parent_task_id {
            sub_task = sub_task.with_parent(parent);
        }

        let result = match acquire(&self.stage_slots, "stage").await {
            Ok(_slot) => worker.execute(&sub_task).await,
            Err(e) => {
                warn!(role = %role, error = %e, "Specialist never started");
                TaskResult::failure(
                    &sub_task.id,
                    worker.id(),
                    AgentRole::Specialist(role),
                    e.to_string(),
                    Duration::ZERO,
                    0,
                )
            }
        };
        worker.shutdown().await;
        result
    }
}
