use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Limits and budgets of an orchestrator. Every field has a default, so a
/// partial `[swarm]` table is enough.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmConfig {
    /// Simultaneous LLM calls across all tiers.
    #[serde(default = "default_global_limit")]
    pub global_limit: usize,
    /// Simultaneously active domain leads.
    #[serde(default = "default_mid_limit")]
    pub mid_limit: usize,
    /// Simultaneous specialists within one pipeline stage.
    #[serde(default = "default_stage_limit")]
    pub stage_limit: usize,
    /// Simultaneous workers in flat mode.
    #[serde(default = "default_flat_limit")]
    pub flat_limit: usize,
    /// Characters of each dependency output handed to a dependent task.
    #[serde(default = "default_dependency_context_chars")]
    pub dependency_context_chars: usize,
    /// Characters of each tier output shown to the synthesizer.
    #[serde(default = "default_synthesis_chars")]
    pub synthesis_chars: usize,
    /// Wall-clock bound on one worker task, retries included.
    #[serde(default = "default_worker_timeout_secs")]
    pub worker_timeout_secs: u64,
    /// Completion budget of planners, leads and specialists.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Completion budget of the synthesizer.
    #[serde(default = "default_synthesis_max_tokens")]
    pub synthesis_max_tokens: u32,
    /// Journal entries of the parent session shown to a follow-up planner.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// Lifetime of the lock serializing follow-ups on one session.
    #[serde(default = "default_followup_lock_ttl_secs")]
    pub followup_lock_ttl_secs: u64,
}

fn default_global_limit() -> usize {
    12
}

fn default_mid_limit() -> usize {
    3
}

fn default_stage_limit() -> usize {
    4
}

fn default_flat_limit() -> usize {
    8
}

fn default_dependency_context_chars() -> usize {
    800
}

fn default_synthesis_chars() -> usize {
    1500
}

fn default_worker_timeout_secs() -> u64 {
    300
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_synthesis_max_tokens() -> u32 {
    4096
}

fn default_history_limit() -> usize {
    50
}

fn default_followup_lock_ttl_secs() -> u64 {
    1800
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            global_limit: default_global_limit(),
            mid_limit: default_mid_limit(),
            stage_limit: default_stage_limit(),
            flat_limit: default_flat_limit(),
            dependency_context_chars: default_dependency_context_chars(),
            synthesis_chars: default_synthesis_chars(),
            worker_timeout_secs: default_worker_timeout_secs(),
            max_tokens: default_max_tokens(),
            synthesis_max_tokens: default_synthesis_max_tokens(),
            history_limit: default_history_limit(),
            followup_lock_ttl_secs: default_followup_lock_ttl_secs(),
        }
    }
}

impl SwarmConfig {
    /// Worker timeout as a [`Duration`].
    pub fn worker_timeout(&self) -> Duration {
        Duration::from_secs(self.worker_timeout_secs)
    }

    /// Follow-up lock lifetime as a [`Duration`].
    pub fn followup_lock_ttl(&self) -> Duration {
        Duration::from_secs(self.followup_lock_ttl_secs)
    }
}
