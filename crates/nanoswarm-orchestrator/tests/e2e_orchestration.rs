#![allow(clippy::unwrap_used, clippy::expect_used)]
//! End-to-end orchestration tests.
//!
//! A scripted backend answers every tier by looking at the system prompt,
//! so whole runs (plan, leads, pipelines, synthesis) execute without a
//! network. The last section drives a flat run through a real client
//! against a mock HTTP server.

use async_trait::async_trait;
use nanoswarm_agent::{
    Completion, CompletionRequest, LlmBackend, LlmClient, LlmProvider, ModelConfig, RetryPolicy,
};
use nanoswarm_core::{AgentRole, DomainRole, SwarmError, SwarmResult};
use nanoswarm_orchestrator::prompts::{lead_prompt, specialist_prompt};
use nanoswarm_orchestrator::*;
use nanoswarm_state::{SessionStatus, StateLayer};
use nanoswarm_tools::ToolRegistry;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ---------------------------------------------------------------------------
// Scripted backend
// ---------------------------------------------------------------------------

const SYNTHESIZED: &str = "FINAL: synthesized answer";

#[derive(Debug, Clone)]
struct Call {
    system: String,
    /// Last message of the request.
    user: String,
    /// Every message of the request, newline-joined.
    transcript: String,
}

#[derive(Default)]
struct ScriptedLlm {
    plan: String,
    /// Calls whose system prompt contains any of these fail with a timeout.
    failing: Vec<&'static str>,
    fail_synthesis: bool,
    delay: Option<Duration>,
    calls: Mutex<Vec<Call>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedLlm {
    fn with_plan(plan: Value) -> Self {
        Self {
            plan: plan.to_string(),
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    fn answer(&self, call: &Call) -> SwarmResult<Completion> {
        let system = call.system.as_str();
        if self.failing.iter().any(|m| system.contains(m)) {
            return Err(SwarmError::Timeout("scripted backend timed out".into()));
        }
        if system.starts_with("You are the Queen planner")
            || system.starts_with("You are the flat planner")
        {
            return Ok(Completion::text(self.plan.clone()));
        }
        if system.starts_with("You are the Queen synthesizer") {
            if self.fail_synthesis {
                return Err(SwarmError::Api {
                    status: 400,
                    message: "bad request".into(),
                    retry_after: None,
                });
            }
            return Ok(Completion::text(SYNTHESIZED));
        }
        let name = system
            .strip_prefix("You are the ")
            .and_then(|rest| rest.split_whitespace().next())
            .unwrap_or("unknown");
        let text = if system.contains("no specialists") {
            format!("{name} worked directly")
        } else if system.contains(" lead in nanoswarm") {
            if call.user.starts_with("Before delegating") {
                format!("{name} scope notes")
            } else {
                format!("{name} lead reviewed answer")
            }
        } else {
            format!("{name} output")
        };
        Ok(Completion::text(text))
    }
}

#[async_trait]
impl LlmBackend for ScriptedLlm {
    async fn complete(&self, request: &CompletionRequest) -> SwarmResult<Completion> {
        let call = Call {
            system: request.system.clone().unwrap_or_default(),
            user: request
                .messages
                .last()
                .map(|m| m.content.clone())
                .unwrap_or_default(),
            transcript: request
                .messages
                .iter()
                .map(|m| m.content.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
        };
        self.calls.lock().push(call.clone());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.answer(&call)
    }
}

fn coder_failures() -> Vec<&'static str> {
    vec![
        "Coder lead",
        "code_planner specialist",
        "code_writer specialist",
        "code_tester specialist",
        "code_reviewer specialist",
    ]
}

/// The domain whose lead or specialist owns `system`, if any.
fn domain_of(system: &str) -> Option<DomainRole> {
    DomainRole::ALL.into_iter().find(|&d| {
        system == lead_prompt(d)
            || stages(d)
                .iter()
                .flat_map(|s| s.iter())
                .any(|&r| system == specialist_prompt(r))
    })
}

fn swarm(llm: &Arc<ScriptedLlm>, state: &Arc<StateLayer>, config: SwarmConfig) -> HierarchicalSwarm {
    HierarchicalSwarm::new(
        llm.clone(),
        Arc::new(ToolRegistry::new()),
        Arc::clone(state),
        config,
    )
}

fn two_step_plan() -> Value {
    json!({
        "plan_summary": "research then code",
        "l1_tasks": [
            {"id": "t1", "l1_role": "researcher", "instruction": "Find the facts"},
            {"id": "t2", "l1_role": "coder", "instruction": "Write the code", "depends_on": ["t1"]}
        ],
        "synthesis_instruction": "Merge both parts"
    })
}

fn independent_plan(roles: &[&str]) -> Value {
    let tasks: Vec<Value> = roles
        .iter()
        .enumerate()
        .map(|(i, r)| json!({"id": format!("t{}", i + 1), "l1_role": r, "instruction": format!("work {i}")}))
        .collect();
    json!({"plan_summary": "parallel", "l1_tasks": tasks})
}

// ---------------------------------------------------------------------------
// 1. Dependency flow through the hierarchy
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_dependent_task_sees_prior_output() {
    let llm = Arc::new(ScriptedLlm::with_plan(two_step_plan()));
    let state = Arc::new(StateLayer::in_memory());
    let outcome = swarm(&llm, &state, SwarmConfig::default())
        .run("build a thing", HashMap::new())
        .await
        .unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.phase, RunPhase::Complete);
    assert_eq!(outcome.final_answer, SYNTHESIZED);
    assert_eq!(outcome.plan_summary.as_deref(), Some("research then code"));
    assert_eq!(outcome.tier_results.len(), 2);

    let t1 = &outcome.tier_results[0];
    let t2 = &outcome.tier_results[1];
    assert_eq!((t1.task_id.as_str(), t1.level), ("t1", 0));
    assert_eq!((t2.task_id.as_str(), t2.level), ("t2", 1));
    assert_eq!(t1.output, "Researcher lead reviewed answer");
    assert_eq!(t1.stages.len(), 2);
    assert_eq!(t2.stages.len(), 3);

    let calls = llm.calls();
    // planner + researcher (2 + 3) + coder (2 + 4) + synthesizer
    assert_eq!(calls.len(), 13);

    let coder_scope = calls
        .iter()
        .find(|c| c.system == lead_prompt(DomainRole::Coder) && c.user.starts_with("Before delegating"))
        .unwrap();
    assert!(coder_scope.user.contains("## Context from prior tasks:"));
    assert!(coder_scope.user.contains("[t1]: Researcher lead reviewed answer"));

    let last_researcher = calls
        .iter()
        .rposition(|c| domain_of(&c.system) == Some(DomainRole::Researcher))
        .unwrap();
    let first_coder = calls
        .iter()
        .position(|c| domain_of(&c.system) == Some(DomainRole::Coder))
        .unwrap();
    assert!(last_researcher < first_coder);

    let synth = calls.last().unwrap();
    assert!(synth.user.contains("### RESEARCHER (t1):"));
    assert!(synth.user.contains("Synthesis Instruction: Merge both parts"));
}

#[tokio::test]
async fn test_session_and_journal_reflect_the_run() {
    let llm = Arc::new(ScriptedLlm::with_plan(two_step_plan()));
    let state = Arc::new(StateLayer::in_memory());
    let outcome = swarm(&llm, &state, SwarmConfig::default())
        .run("build a thing", HashMap::new())
        .await
        .unwrap();

    let session = state.sessions.require(&outcome.session_id).await.unwrap();
    assert_eq!(session.status, SessionStatus::Complete);
    assert_eq!(session.task_count, 2);
    assert_eq!(session.completed_tasks, 2);
    assert_eq!(session.final_answer.as_deref(), Some(SYNTHESIZED));

    let journal = state.journal(&outcome.session_id);
    let tier = journal.get("t2").await.unwrap().unwrap();
    assert_eq!(tier.agent_role, AgentRole::Lead(DomainRole::Coder));
    assert_eq!(tier.success, Some(true));
    assert!(outcome.session_summary.total_tasks >= 13);
    assert!(outcome.session_summary.roles_used.contains(&"queen".to_string()));

    // A second terminal call does not overwrite the first.
    let again = state
        .sessions
        .complete(&outcome.session_id, "late answer", false)
        .await
        .unwrap();
    assert!(!again);
    let session = state.sessions.require(&outcome.session_id).await.unwrap();
    assert_eq!(session.final_answer.as_deref(), Some(SYNTHESIZED));
}

// ---------------------------------------------------------------------------
// 2. Failure isolation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_failed_domain_does_not_sink_siblings() {
    let llm = Arc::new(ScriptedLlm {
        failing: coder_failures(),
        ..ScriptedLlm::with_plan(independent_plan(&["researcher", "coder"]))
    });
    let state = Arc::new(StateLayer::in_memory());
    let outcome = swarm(&llm, &state, SwarmConfig::default())
        .run("mixed", HashMap::new())
        .await
        .unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.successful_tiers(), 1);
    let coder = &outcome.tier_results[1];
    assert!(!coder.success);
    let err = coder.error.as_deref().unwrap();
    assert!(err.contains("all 6 LLM calls of the coder lead failed"));
    assert!(err.contains("Timeout"));

    let synth = llm.calls().last().cloned().unwrap();
    assert!(synth.system.starts_with("You are the Queen synthesizer"));
    assert!(synth.user.contains("### CODER (t2) [FAILED]:"));
}

#[tokio::test]
async fn test_failed_dependency_degrades_to_failure_text() {
    let llm = Arc::new(ScriptedLlm {
        failing: coder_failures(),
        ..ScriptedLlm::with_plan(json!({
            "l1_tasks": [
                {"id": "c", "l1_role": "coder", "instruction": "code"},
                {"id": "v", "l1_role": "validator", "instruction": "check", "depends_on": ["c"]}
            ]
        }))
    });
    let state = Arc::new(StateLayer::in_memory());
    let outcome = swarm(&llm, &state, SwarmConfig::default())
        .run("degrade", HashMap::new())
        .await
        .unwrap();

    assert!(outcome.success);
    assert!(outcome.tier_results[1].success);
    let validator_scope = llm
        .calls()
        .into_iter()
        .find(|c| c.system == lead_prompt(DomainRole::Validator) && c.user.starts_with("Before delegating"))
        .unwrap();
    assert!(validator_scope.user.contains("[c]: FAILED: all 6 LLM calls"));
}

#[tokio::test]
async fn test_all_tiers_failed_skips_synthesis() {
    let llm = Arc::new(ScriptedLlm {
        failing: coder_failures(),
        ..ScriptedLlm::with_plan(independent_plan(&["coder"]))
    });
    let state = Arc::new(StateLayer::in_memory());
    let outcome = swarm(&llm, &state, SwarmConfig::default())
        .run("doomed", HashMap::new())
        .await
        .unwrap();

    assert!(!outcome.success);
    assert_eq!(outcome.phase, RunPhase::Failed);
    assert_eq!(outcome.error.as_deref(), Some("all 1 tier tasks failed"));
    assert!(outcome.final_answer.starts_with("### CODER (t1)"));
    assert!(!llm
        .calls()
        .iter()
        .any(|c| c.system.starts_with("You are the Queen synthesizer")));

    let session = state.sessions.require(&outcome.session_id).await.unwrap();
    assert_eq!(session.status, SessionStatus::Failed);
}

#[tokio::test]
async fn test_synthesis_failure_falls_back_to_raw_outputs() {
    let llm = Arc::new(ScriptedLlm {
        fail_synthesis: true,
        ..ScriptedLlm::with_plan(two_step_plan())
    });
    let state = Arc::new(StateLayer::in_memory());
    let outcome = swarm(&llm, &state, SwarmConfig::default())
        .run("fallback", HashMap::new())
        .await
        .unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.phase, RunPhase::Complete);
    assert!(outcome
        .final_answer
        .starts_with("### RESEARCHER (t1)\nResearcher lead reviewed answer"));
    assert!(outcome.final_answer.contains("\n\n---\n\n### CODER (t2)\n"));
}

// ---------------------------------------------------------------------------
// 3. Planning failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_malformed_plan_aborts_before_any_lead() {
    let llm = Arc::new(ScriptedLlm {
        plan: "I cannot plan this, sorry.".into(),
        ..ScriptedLlm::default()
    });
    let state = Arc::new(StateLayer::in_memory());
    let outcome = swarm(&llm, &state, SwarmConfig::default())
        .run("vague", HashMap::new())
        .await
        .unwrap();

    assert!(!outcome.success);
    assert_eq!(outcome.phase, RunPhase::Planning);
    assert!(outcome.error.as_deref().unwrap().contains("Planning error"));
    assert!(outcome.tier_results.is_empty());
    assert_eq!(llm.calls().len(), 1);

    let session = state.sessions.require(&outcome.session_id).await.unwrap();
    assert_eq!(session.status, SessionStatus::Failed);
}

#[tokio::test]
async fn test_cyclic_plan_is_rejected() {
    let llm = Arc::new(ScriptedLlm::with_plan(json!({
        "l1_tasks": [
            {"id": "a", "l1_role": "analyst", "instruction": "x", "depends_on": ["b"]},
            {"id": "b", "l1_role": "analyst", "instruction": "y", "depends_on": ["a"]}
        ]
    })));
    let state = Arc::new(StateLayer::in_memory());
    let outcome = swarm(&llm, &state, SwarmConfig::default())
        .run("loop", HashMap::new())
        .await
        .unwrap();

    assert!(!outcome.success);
    assert!(outcome.error.as_deref().unwrap().contains("cycle"));
    assert!(outcome.tier_results.is_empty());
    assert_eq!(llm.calls().len(), 1);
}

#[tokio::test]
async fn test_planner_call_failure_is_a_planning_error() {
    let llm = Arc::new(ScriptedLlm {
        failing: vec!["Queen planner"],
        ..ScriptedLlm::with_plan(two_step_plan())
    });
    let state = Arc::new(StateLayer::in_memory());
    let outcome = swarm(&llm, &state, SwarmConfig::default())
        .run("offline", HashMap::new())
        .await
        .unwrap();

    assert_eq!(outcome.phase, RunPhase::Planning);
    let err = outcome.error.as_deref().unwrap();
    assert!(err.contains("planner call failed"));
    assert!(err.contains("Timeout"));
}

// ---------------------------------------------------------------------------
// 4. Concurrency limits
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_global_limit_caps_in_flight_calls() {
    let llm = Arc::new(ScriptedLlm {
        delay: Some(Duration::from_millis(5)),
        ..ScriptedLlm::with_plan(independent_plan(&["researcher", "analyst", "validator"]))
    });
    let state = Arc::new(StateLayer::in_memory());
    let config = SwarmConfig {
        global_limit: 2,
        ..SwarmConfig::default()
    };
    let outcome = swarm(&llm, &state, config)
        .run("busy", HashMap::new())
        .await
        .unwrap();

    assert!(outcome.success);
    assert!(llm.peak.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn test_mid_limit_of_one_serializes_leads() {
    let llm = Arc::new(ScriptedLlm {
        delay: Some(Duration::from_millis(2)),
        ..ScriptedLlm::with_plan(independent_plan(&["analyst", "validator"]))
    });
    let state = Arc::new(StateLayer::in_memory());
    let config = SwarmConfig {
        mid_limit: 1,
        ..SwarmConfig::default()
    };
    swarm(&llm, &state, config)
        .run("one at a time", HashMap::new())
        .await
        .unwrap();

    let domains: Vec<DomainRole> = llm
        .calls()
        .iter()
        .filter_map(|c| domain_of(&c.system))
        .collect();
    assert_eq!(domains.len(), 10);
    let switches = domains.windows(2).filter(|w| w[0] != w[1]).count();
    assert_eq!(switches, 1);
}

// ---------------------------------------------------------------------------
// 5. Follow-ups
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_followup_gets_parent_history() {
    let llm = Arc::new(ScriptedLlm::with_plan(independent_plan(&["analyst"])));
    let state = Arc::new(StateLayer::in_memory());
    let swarm = swarm(&llm, &state, SwarmConfig::default());
    let first = swarm.run("first goal", HashMap::new()).await.unwrap();

    let second = swarm
        .run_followup(&first.session_id, "second goal", HashMap::new())
        .await
        .unwrap();
    assert!(second.success);
    assert_ne!(second.session_id, first.session_id);

    let planner = llm
        .calls()
        .into_iter()
        .rev()
        .find(|c| c.system.starts_with("You are the Queen planner"))
        .unwrap();
    assert!(planner.user.contains("=== SESSION TASK HISTORY ==="));
    assert!(planner.user.ends_with("Goal: second goal"));

    let session = state.sessions.require(&second.session_id).await.unwrap();
    assert_eq!(
        session.metadata.get(PREVIOUS_SESSION_KEY),
        Some(&Value::String(first.session_id.clone()))
    );
    let resource = format!("followup:{}", first.session_id);
    assert!(!state.locks.is_locked(&resource).await.unwrap());
}

#[tokio::test]
async fn test_concurrent_followup_is_refused() {
    let llm = Arc::new(ScriptedLlm::with_plan(independent_plan(&["analyst"])));
    let state = Arc::new(StateLayer::in_memory());
    let parent = state.sessions.create("parent", HashMap::new()).await.unwrap();
    let resource = format!("followup:{}", parent.session_id);
    let held = state
        .locks
        .acquire(&resource, Duration::from_secs(60))
        .await
        .unwrap()
        .unwrap();

    let err = swarm(&llm, &state, SwarmConfig::default())
        .run_followup(&parent.session_id, "again", HashMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SwarmError::Orchestrator(_)));
    assert!(llm.calls().is_empty());
    assert!(state.locks.release(&held).await.unwrap());
}

#[tokio::test]
async fn test_followup_of_unknown_session_is_not_found() {
    let llm = Arc::new(ScriptedLlm::with_plan(independent_plan(&["analyst"])));
    let state = Arc::new(StateLayer::in_memory());
    let err = swarm(&llm, &state, SwarmConfig::default())
        .run_followup("no-such-session", "again", HashMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SwarmError::NotFound(_)));
}

// ---------------------------------------------------------------------------
// 6. Knowledge context
// ---------------------------------------------------------------------------

struct BrokenContext;

#[async_trait]
impl ContextProvider for BrokenContext {
    async fn context_for(&self, _goal: &str) -> SwarmResult<Option<String>> {
        Err(SwarmError::State("index offline".into()))
    }
}

#[tokio::test]
async fn test_knowledge_context_reaches_planner() {
    let llm = Arc::new(ScriptedLlm::with_plan(independent_plan(&["analyst"])));
    let state = Arc::new(StateLayer::in_memory());
    swarm(&llm, &state, SwarmConfig::default())
        .with_context_provider(Arc::new(StaticContext::new("Prefer Rust 1.80 features")))
        .run("plan with knowledge", HashMap::new())
        .await
        .unwrap();

    let planner = llm.calls().into_iter().next().unwrap();
    assert!(planner
        .user
        .starts_with("## Relevant knowledge:\nPrefer Rust 1.80 features"));
}

#[tokio::test]
async fn test_failing_context_provider_is_ignored() {
    let llm = Arc::new(ScriptedLlm::with_plan(independent_plan(&["analyst"])));
    let state = Arc::new(StateLayer::in_memory());
    let outcome = swarm(&llm, &state, SwarmConfig::default())
        .with_context_provider(Arc::new(BrokenContext))
        .run("plan without knowledge", HashMap::new())
        .await
        .unwrap();

    assert!(outcome.success);
    let planner = llm.calls().into_iter().next().unwrap();
    assert_eq!(planner.user, "Goal: plan without knowledge");
}

// ---------------------------------------------------------------------------
// 7. Flat mode
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_flat_run_uses_single_workers() {
    let llm = Arc::new(ScriptedLlm::with_plan(json!({
        "subtasks": [
            {"id": "a", "role": "analyst", "task": "Estimate"},
            {"id": "b", "role": "validator", "task": "Check", "depends_on": ["a"]}
        ]
    })));
    let state = Arc::new(StateLayer::in_memory());
    let outcome = FlatOrchestrator::new(
        llm.clone(),
        Arc::new(ToolRegistry::new()),
        Arc::clone(&state),
        SwarmConfig::default(),
    )
    .run("flat goal", HashMap::new())
    .await
    .unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.final_answer, SYNTHESIZED);
    assert_eq!(outcome.tier_results[0].output, "Analyst worked directly");
    assert!(outcome.tier_results.iter().all(|t| t.stages.is_empty()));

    let calls = llm.calls();
    assert_eq!(calls.len(), 4);
    assert!(calls[0].system.starts_with("You are the flat planner"));
    assert!(calls[0].user.starts_with("Decompose this goal"));
    assert!(!calls.iter().any(|c| c.system.contains("specialist in nanoswarm")));

    let validator = calls
        .iter()
        .find(|c| c.system.starts_with("You are the Validator lead"))
        .unwrap();
    assert!(validator
        .transcript
        .contains("[Dependency a]:\nAnalyst worked directly"));
    assert_eq!(validator.user, "Check");
}

// ---------------------------------------------------------------------------
// 8. Flat run over HTTP
// ---------------------------------------------------------------------------

fn text_reply(text: &str) -> Value {
    json!({
        "choices": [{"message": {"content": text}, "finish_reason": "stop"}],
        "usage": {"prompt_tokens": 10, "completion_tokens": 5}
    })
}

#[tokio::test]
async fn test_flat_run_against_http_backend() {
    let server = MockServer::start().await;
    let plan = json!({"subtasks": [{"id": "a", "role": "analyst", "task": "Estimate the cost"}]});
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains("You are the flat planner"))
        .respond_with(ResponseTemplate::new(200).set_body_json(text_reply(&plan.to_string())))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains("no specialists"))
        .respond_with(ResponseTemplate::new(200).set_body_json(text_reply("direct worker answer")))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains("You are the Queen synthesizer"))
        .respond_with(ResponseTemplate::new(200).set_body_json(text_reply("merged answer")))
        .mount(&server)
        .await;

    let mut model = ModelConfig::new(LlmProvider::Vllm, "local-model");
    model.api_base_url = Some(server.uri());
    model.retry_policy = RetryPolicy::immediate(1);
    let client = LlmClient::new(&model).unwrap();

    let state = Arc::new(StateLayer::in_memory());
    let outcome = FlatOrchestrator::new(
        client.backend(),
        Arc::new(ToolRegistry::new()),
        Arc::clone(&state),
        SwarmConfig::default(),
    )
    .run("what will it cost", HashMap::new())
    .await
    .unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.final_answer, "merged answer");
    assert_eq!(outcome.tier_results[0].output, "direct worker answer");
    assert_eq!(outcome.session_summary.total_tasks, 3);
    assert_eq!(outcome.session_summary.total_tokens, 45);
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}
