//! Durable state for nanoswarm runs.
//!
//! Everything that several concurrent workers mutate lives behind the
//! [`StateStore`] seam: session records, the append-only task journal, the
//! live agent registry and named locks. [`StateLayer`] bundles them and is
//! constructed once by the process entry point, then shared by `Arc`.

/// Task journal.
pub mod journal;
/// Named locks.
pub mod lock;
/// In-memory store with snapshots.
pub mod memory;
/// Agent registry.
pub mod registry;
/// Session records.
pub mod session;
/// Store trait, key layout and JSON helpers.
pub mod store;

pub use journal::{
    failed_tasks, FailedTask, JournalEntry, JournalStatus, SessionSummary, TaskCompletion,
    TaskJournal, TaskStart,
};
pub use lock::{LockManager, LockToken};
pub use memory::InMemoryStore;
pub use registry::{AgentRecord, AgentRegistry};
pub use session::{SessionManager, SessionPatch, SessionRecord, SessionStatus};
pub use store::{keys, StateStore};

use chrono::{DateTime, Utc};
use nanoswarm_core::SwarmResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Expiry settings for every record type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    /// Session record lifetime.
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,
    /// Agent record lifetime without a status update.
    #[serde(default = "default_agent_ttl")]
    pub agent_ttl_secs: u64,
    /// Journal entry lifetime.
    #[serde(default = "default_journal_ttl")]
    pub journal_ttl_secs: u64,
    /// Default lock lifetime.
    #[serde(default = "default_lock_ttl")]
    pub lock_ttl_secs: u64,
}

fn default_session_ttl() -> u64 {
    86_400
}

fn default_agent_ttl() -> u64 {
    7_200
}

fn default_journal_ttl() -> u64 {
    14 * 86_400
}

fn default_lock_ttl() -> u64 {
    30
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            session_ttl_secs: default_session_ttl(),
            agent_ttl_secs: default_agent_ttl(),
            journal_ttl_secs: default_journal_ttl(),
            lock_ttl_secs: default_lock_ttl(),
        }
    }
}

/// Snapshot of the swarm's live state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmHealth {
    /// When the snapshot was taken.
    pub timestamp: DateTime<Utc>,
    /// Number of registered agents.
    pub active_agents: usize,
    /// Registered agents per role.
    pub agent_breakdown: BTreeMap<String, usize>,
    /// Number of sessions in the recent index.
    pub recent_sessions: usize,
    /// Entries in the global failed-task queue.
    pub failed_queue_depth: usize,
}

/// The state contracts bundled over one shared store.
#[derive(Clone)]
pub struct StateLayer {
    store: Arc<dyn StateStore>,
    config: StateConfig,
    /// Session records.
    pub sessions: SessionManager,
    /// Live agents.
    pub agents: AgentRegistry,
    /// Named locks.
    pub locks: LockManager,
}

impl StateLayer {
    /// Builds every contract over `store`.
    pub fn new(store: Arc<dyn StateStore>, config: StateConfig) -> Self {
        Self {
            sessions: SessionManager::new(
                Arc::clone(&store),
                Duration::from_secs(config.session_ttl_secs),
            ),
            agents: AgentRegistry::new(
                Arc::clone(&store),
                Duration::from_secs(config.agent_ttl_secs),
            ),
            locks: LockManager::new(
                Arc::clone(&store),
                Duration::from_secs(config.lock_ttl_secs),
            ),
            store,
            config,
        }
    }

    /// A state layer over a fresh [`InMemoryStore`] with default TTLs.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryStore::new()), StateConfig::default())
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    /// The journal of one session.
    pub fn journal(&self, session_id: &str) -> TaskJournal {
        TaskJournal::new(
            Arc::clone(&self.store),
            session_id,
            Duration::from_secs(self.config.journal_ttl_secs),
        )
    }

    /// Aggregated health view.
    pub async fn health(&self) -> SwarmResult<SwarmHealth> {
        let agents = self.agents.active_agents().await?;
        let mut breakdown = BTreeMap::new();
        for a in &agents {
            *breakdown.entry(a.role.as_str().to_string()).or_insert(0) += 1;
        }
        Ok(SwarmHealth {
            timestamp: Utc::now(),
            active_agents: agents.len(),
            agent_breakdown: breakdown,
            recent_sessions: self.store.llen(keys::SESSIONS_RECENT).await?,
            failed_queue_depth: self.store.llen(keys::FAILED_QUEUE).await?,
        })
    }
}
