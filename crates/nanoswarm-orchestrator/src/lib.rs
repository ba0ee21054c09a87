//! Task orchestration for nanoswarm.
//!
//! [`HierarchicalSwarm`] runs a goal through three tiers: a Queen planner
//! emits a dependency plan of domain tasks, one domain lead per task drives
//! a staged specialist pipeline, and a Queen synthesizer merges the tier
//! results. [`FlatOrchestrator`] keeps the plan and the level scheduling but
//! hands each task to a single worker.
//!
//! Both share one run state machine: plan, execute levels, synthesize,
//! finalize. A run never errors once its session exists; failures are
//! reported inside the [`RunOutcome`].
//!
//! # Main types
//!
//! - [`HierarchicalSwarm`] / [`FlatOrchestrator`] — the two entry points.
//! - [`SwarmConfig`] — concurrency limits and text budgets.
//! - [`DependencyPlan`] / [`LevelSchedule`] — the parsed plan and its levels.
//! - [`RunOutcome`] / [`TierResult`] — what a run returns.
//! - [`ContextProvider`] — optional knowledge source for the planner.

/// Orchestrator configuration.
pub mod config;
/// Knowledge sources for the planner.
pub mod context;
mod driver;
/// Single-tier orchestrator.
pub mod flat;
/// Three-tier orchestrator.
pub mod hierarchy;
/// Domain leads.
pub mod lead;
/// Concurrency limits.
pub mod limits;
/// Specialist pipelines.
pub mod pipeline;
/// Plan parsing.
pub mod plan;
/// System prompts and prompt builders.
pub mod prompts;
/// Dependency-level scheduling.
pub mod scheduler;
mod scope;
/// Plan and outcome types.
pub mod types;

pub use config::SwarmConfig;
pub use context::{ContextProvider, FileContext, StaticContext};
pub use driver::{PLANNER_TEMPERATURE, SYNTHESIZER_TEMPERATURE};
pub use flat::FlatOrchestrator;
pub use hierarchy::{HierarchicalSwarm, PREVIOUS_SESSION_KEY};
pub use lead::{LeadOutcome, LEAD_TEMPERATURE};
pub use limits::{GatedBackend, TierLimits};
pub use pipeline::{
    build_stage_input, injection, stages, synthesize, PipelineOutcome, SpecialistReport, Stage,
    StageReport, SPECIALIST_TEMPERATURE,
};
pub use plan::parse_plan;
pub use scheduler::{dependency_outputs, with_dependency_context, LevelSchedule};
pub use types::{DependencyPlan, PlannedTask, RunOutcome, RunPhase, TierResult};
