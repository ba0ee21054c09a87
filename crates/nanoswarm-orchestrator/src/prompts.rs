//! System prompts per tier and the builders for every orchestration prompt.
//!
//! Role lookups are exhaustive matches so a new role cannot ship without
//! a prompt.

use crate::types::TierResult;
use nanoswarm_core::{preview, DomainRole, SpecialistRole};

/// Synthesis instruction used when the plan gives none.
pub const DEFAULT_SYNTHESIS_INSTRUCTION: &str = "Combine all results into a comprehensive answer.";

const QUEEN_HEADER: &str = "\
You are the Queen planner of nanoswarm, a hierarchical agent swarm. \
You never do the work yourself: you decompose the goal into tasks for \
domain leads, each of which runs its own pipeline of specialists.

Rules:
1. Use as few tasks as the goal needs; independent tasks run in parallel.
2. Declare a dependency only when a task needs another task's output.
3. Dependencies must not form a cycle and must name ids from this plan.
4. Give every task a short unique id such as \"t1\".
5. Respond with ONLY a JSON object, no prose, in this shape:

{
  \"plan_summary\": \"one sentence\",
  \"l1_tasks\": [
    {\"id\": \"t1\", \"l1_role\": \"<domain>\", \"instruction\": \"...\", \"depends_on\": [], \"priority\": 5}
  ],
  \"synthesis_instruction\": \"how to combine the results\"
}

Available domains:
";

const QUEEN_SYNTHESIZER_PROMPT: &str = "\
You are the Queen synthesizer of nanoswarm. You receive the goal and the \
results of every domain lead and write the final answer for the user.

Rules:
1. Answer the original goal directly and completely.
2. Merge overlapping results; resolve contradictions explicitly.
3. Results marked FAILED are missing work: say what could not be done.
4. Write plain text or markdown, never JSON.
";

const FLAT_PLANNER_PROMPT: &str = "\
You are the flat planner of nanoswarm. Split the goal into subtasks, each \
handled by a single worker.

Respond with ONLY a JSON object in this shape:

{
  \"plan_summary\": \"one sentence\",
  \"subtasks\": [
    {\"id\": \"t1\", \"role\": \"<domain>\", \"instruction\": \"...\", \"depends_on\": [], \"priority\": 5}
  ],
  \"synthesis_instruction\": \"how to combine the results\"
}

Available roles:
";

const CODER_LEAD_PROMPT: &str = "\
You are the Coder lead in nanoswarm. You own software tasks: you scope the \
work, hand it to your planner, writer, tester and reviewer specialists, \
and review what they return.

Focus on correctness, clear interfaces and working code over commentary.
";

const RESEARCHER_LEAD_PROMPT: &str = "\
You are the Researcher lead in nanoswarm. You own information gathering: \
you scope the question, hand it to your search, synthesis and \
fact-checking specialists, and review their findings.

Prefer verified facts, flag uncertainty, and keep sources distinguishable.
";

const ANALYST_LEAD_PROMPT: &str = "\
You are the Analyst lead in nanoswarm. You own reasoning tasks: \
comparisons, trade-offs, estimates and recommendations. Your specialists \
reason, critique and summarize.

State assumptions explicitly and show the reasoning behind conclusions.
";

const VALIDATOR_LEAD_PROMPT: &str = "\
You are the Validator lead in nanoswarm. You own quality checks on work \
produced elsewhere in the swarm. Your specialists check correctness and \
completeness and give a score.

Be concrete: name each defect and where it is.
";

const EXECUTOR_LEAD_PROMPT: &str = "\
You are the Executor lead in nanoswarm. You own concrete actions: files to \
write, commands to prepare, steps to carry out. Your specialists plan the \
actions and then run them with the available tools.

Report exactly what was done and what was not.
";

const ARCHITECT_LEAD_PROMPT: &str = "\
You are the Architect lead in nanoswarm. You design systems: components, \
boundaries, data flow and the trade-offs between alternatives. You work \
without specialists.

Produce a design another engineer could implement.
";

const CODE_PLANNER_PROMPT: &str = "\
You are the code_planner specialist in nanoswarm. Turn the task into an \
implementation plan: files, types, functions and the order to build them. \
Do not write the full code.
";

const CODE_WRITER_PROMPT: &str = "\
You are the code_writer specialist in nanoswarm. Write complete, working \
code that follows the implementation plan you are given. Use markdown \
code blocks with the file path above each block.
";

const CODE_TESTER_PROMPT: &str = "\
You are the code_tester specialist in nanoswarm. Write tests for the code \
you are given, covering normal cases, edge cases and error paths, and \
state which behaviors they verify.
";

const CODE_REVIEWER_PROMPT: &str = "\
You are the code_reviewer specialist in nanoswarm. Review the code for \
bugs, security problems and unclear structure. List each finding with \
its severity and a suggested fix.
";

const WEB_SEARCHER_PROMPT: &str = "\
You are the web_searcher specialist in nanoswarm. Gather the raw \
information the task needs. Use the http_fetch tool when it is available; \
otherwise report what you know and mark it as unverified.
";

const SYNTHESIZER_PROMPT: &str = "\
You are the synthesizer specialist in nanoswarm. Condense raw findings \
into a structured set of claims, grouping related facts and dropping \
noise.
";

const FACT_VERIFIER_PROMPT: &str = "\
You are the fact_verifier specialist in nanoswarm. Check each claim you \
are given. Mark it confirmed, doubtful or wrong, with a one-line reason.
";

const REASONER_PROMPT: &str = "\
You are the reasoner specialist in nanoswarm. Work through the problem \
step by step, stating assumptions and intermediate results.
";

const CRITIQUER_PROMPT: &str = "\
You are the critiquer specialist in nanoswarm. Find the weak points in \
the reasoning you are given: unsupported steps, missed cases, wrong \
numbers. Suggest corrections.
";

const SUMMARIZER_PROMPT: &str = "\
You are the summarizer specialist in nanoswarm. Produce one coherent \
answer from all the prior outputs, keeping the corrections the critique \
made.
";

const CORRECTNESS_CHECKER_PROMPT: &str = "\
You are the correctness_checker specialist in nanoswarm. Check whether \
the work is factually and technically correct. List every error found.
";

const COMPLETENESS_CHECKER_PROMPT: &str = "\
You are the completeness_checker specialist in nanoswarm. Check whether \
the work fully answers the task. List what is missing.
";

const SCORER_PROMPT: &str = "\
You are the scorer specialist in nanoswarm. Give the work a quality score \
from 0 to 10 with a short justification, based on the checks before you.
";

const ACTION_PLANNER_PROMPT: &str = "\
You are the action_planner specialist in nanoswarm. Turn the task into a \
numbered list of concrete actions with the inputs each one needs.
";

const ACTION_RUNNER_PROMPT: &str = "\
You are the action_runner specialist in nanoswarm. Carry out the action \
plan you are given using the available tools, then report the result of \
each step.
";

/// One-line description of a domain, shown to planners.
pub fn domain_description(role: DomainRole) -> &'static str {
    match role {
        DomainRole::Coder => "writes, tests and reviews code",
        DomainRole::Researcher => "gathers and verifies information",
        DomainRole::Analyst => "reasons about trade-offs, estimates and recommendations",
        DomainRole::Validator => "checks other work for correctness and completeness",
        DomainRole::Executor => "plans and carries out concrete actions with tools",
        DomainRole::Architect => "designs systems and their components",
    }
}

fn domain_catalog() -> String {
    DomainRole::ALL
        .iter()
        .map(|r| format!("- {}: {}", r.as_str(), domain_description(*r)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// System prompt of the hierarchical planner.
pub fn queen_prompt() -> String {
    format!("{QUEEN_HEADER}{}\n", domain_catalog())
}

/// System prompt of the final-answer synthesizer.
pub fn queen_synthesizer_prompt() -> &'static str {
    QUEEN_SYNTHESIZER_PROMPT
}

/// System prompt of the flat planner.
pub fn flat_planner_prompt() -> String {
    format!("{FLAT_PLANNER_PROMPT}{}\n", domain_catalog())
}

/// System prompt of a domain lead.
pub fn lead_prompt(role: DomainRole) -> &'static str {
    match role {
        DomainRole::Coder => CODER_LEAD_PROMPT,
        DomainRole::Researcher => RESEARCHER_LEAD_PROMPT,
        DomainRole::Analyst => ANALYST_LEAD_PROMPT,
        DomainRole::Validator => VALIDATOR_LEAD_PROMPT,
        DomainRole::Executor => EXECUTOR_LEAD_PROMPT,
        DomainRole::Architect => ARCHITECT_LEAD_PROMPT,
    }
}

/// System prompt of a flat-mode worker: the lead prompt, told to do the
/// work itself.
pub fn flat_worker_prompt(role: DomainRole) -> String {
    format!(
        "{}\nIn this run you have no specialists: do the task yourself and answer directly.\n",
        lead_prompt(role)
    )
}

/// System prompt of a specialist.
pub fn specialist_prompt(role: SpecialistRole) -> &'static str {
    match role {
        SpecialistRole::CodePlanner => CODE_PLANNER_PROMPT,
        SpecialistRole::CodeWriter => CODE_WRITER_PROMPT,
        SpecialistRole::CodeTester => CODE_TESTER_PROMPT,
        SpecialistRole::CodeReviewer => CODE_REVIEWER_PROMPT,
        SpecialistRole::WebSearcher => WEB_SEARCHER_PROMPT,
        SpecialistRole::Synthesizer => SYNTHESIZER_PROMPT,
        SpecialistRole::FactVerifier => FACT_VERIFIER_PROMPT,
        SpecialistRole::Reasoner => REASONER_PROMPT,
        SpecialistRole::Critiquer => CRITIQUER_PROMPT,
        SpecialistRole::Summarizer => SUMMARIZER_PROMPT,
        SpecialistRole::CorrectnessChecker => CORRECTNESS_CHECKER_PROMPT,
        SpecialistRole::CompletenessChecker => COMPLETENESS_CHECKER_PROMPT,
        SpecialistRole::Scorer => SCORER_PROMPT,
        SpecialistRole::ActionPlanner => ACTION_PLANNER_PROMPT,
        SpecialistRole::ActionRunner => ACTION_RUNNER_PROMPT,
    }
}

/// The planner's user message: knowledge context, then session history,
/// then the goal.
pub fn planning_prompt(goal: &str, knowledge: Option<&str>, history: &str) -> String {
    let mut parts = Vec::new();
    if let Some(k) = knowledge.filter(|k| !k.trim().is_empty()) {
        parts.push(format!("## Relevant knowledge:\n{k}"));
    }
    if !history.trim().is_empty() {
        parts.push(history.to_string());
    }
    parts.push(format!("Goal: {goal}"));
    parts.join("\n\n")
}

/// The flat planner's user message.
pub fn flat_planning_prompt(goal: &str, knowledge: Option<&str>, history: &str) -> String {
    format!(
        "Decompose this goal into a swarm execution plan:\n\n{}",
        planning_prompt(goal, knowledge, history)
    )
}

/// The synthesizer's user message. Each tier output is cut to `budget`
/// characters; failed tiers are labelled.
pub fn synthesis_prompt(
    goal: &str,
    results: &[TierResult],
    instruction: Option<&str>,
    budget: usize,
) -> String {
    let blocks: Vec<String> = results
        .iter()
        .map(|r| {
            let label = if r.success { "" } else { " [FAILED]" };
            format!(
                "### {} ({}){label}:\n{}",
                r.role.as_str().to_uppercase(),
                r.task_id,
                preview(&r.output, budget)
            )
        })
        .collect();
    let instruction = instruction
        .filter(|i| !i.trim().is_empty())
        .unwrap_or(DEFAULT_SYNTHESIS_INSTRUCTION);
    format!(
        "Original Goal: {goal}\n\n\
         Results from the domain leads:\n{}\n\n\
         Synthesis Instruction: {instruction}\n\n\
         Produce the final comprehensive answer in plain text (NOT JSON):",
        blocks.join("\n\n")
    )
}

/// Tier outputs joined under headings, used when synthesis fails.
pub fn raw_concatenation(results: &[TierResult]) -> String {
    results
        .iter()
        .map(|r| format!("### {} ({})\n{}", r.role.as_str().to_uppercase(), r.task_id, r.output))
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

/// The lead's first call: scope the task before delegating.
pub fn contextualize_prompt(task: &str) -> String {
    format!(
        "Before delegating to your sub-swarm, analyze this task and provide:\n\
         1. Key clarifications or scope definitions\n\
         2. Specific constraints or requirements to emphasize\n\
         3. Quality criteria for the final output\n\n\
         TASK:\n{task}"
    )
}

/// The task handed to the pipeline, with the lead's scoping appended.
pub fn enriched_task(task: &str, lead_context: &str) -> String {
    if lead_context.trim().is_empty() {
        return task.to_string();
    }
    format!("{task}\n\n## LEAD CONTEXT:\n{lead_context}")
}

/// The lead's last call: polish the pipeline output into one answer.
pub fn review_prompt(task: &str, pipeline_output: &str) -> String {
    format!(
        "Review and finalize the work of your sub-swarm.\n\n\
         ORIGINAL TASK:\n{task}\n\n\
         SUB-SWARM OUTPUT:\n{pipeline_output}\n\n\
         Fix errors, fill gaps and remove repetition. \
         Output ONLY the final answer, with no commentary about the review."
    )
}
