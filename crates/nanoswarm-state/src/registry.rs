use crate::store::{self, keys, StateStore};
use chrono::{DateTime, Utc};
use nanoswarm_core::{AgentRole, AgentStatus, SwarmResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// A live agent as seen by the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    /// Agent id.
    pub agent_id: String,
    /// Agent role.
    pub role: AgentRole,
    /// Display name.
    pub name: String,
    /// Session the agent works for.
    #[serde(default)]
    pub session_id: Option<String>,
    /// Current status.
    pub status: AgentStatus,
    /// Registration time.
    pub registered_at: DateTime<Utc>,
    /// Last status change.
    pub last_heartbeat: DateTime<Utc>,
    /// Tasks finished successfully.
    #[serde(default)]
    pub tasks_completed: u64,
    /// Tokens consumed so far.
    #[serde(default)]
    pub tokens_used: u64,
}

impl AgentRecord {
    /// A fresh idle record.
    pub fn new(
        agent_id: impl Into<String>,
        role: AgentRole,
        name: impl Into<String>,
        session_id: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            agent_id: agent_id.into(),
            role,
            name: name.into(),
            session_id,
            status: AgentStatus::Idle,
            registered_at: now,
            last_heartbeat: now,
            tasks_completed: 0,
            tokens_used: 0,
        }
    }
}

/// Live registry of agents with a set of active ids.
#[derive(Clone)]
pub struct AgentRegistry {
    store: Arc<dyn StateStore>,
    ttl: Duration,
}

impl AgentRegistry {
    /// A registry whose records expire after `ttl` without a status update.
    pub fn new(store: Arc<dyn StateStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Registers (or re-registers) an agent.
    pub async fn register(&self, record: &AgentRecord) -> SwarmResult<()> {
        store::write_json(
            self.store.as_ref(),
            &keys::agent(&record.agent_id),
            record,
            Some(self.ttl),
        )
        .await?;
        self.store
            .sadd(keys::AGENTS_ACTIVE, &record.agent_id)
            .await?;
        info!(agent_id = %record.agent_id, role = %record.role, "Agent registered");
        Ok(())
    }

    /// Sets an agent's status and adds `tokens_delta` to its token count.
    /// A move to `Done` also counts a completed task. Returns `false` for
    /// unknown agents.
    pub async fn update_status(
        &self,
        agent_id: &str,
        status: AgentStatus,
        tokens_delta: u64,
    ) -> SwarmResult<bool> {
        let updated = store::update_json(
            self.store.as_ref(),
            &keys::agent(agent_id),
            Some(self.ttl),
            |r: &mut AgentRecord| {
                r.status = status;
                r.tokens_used += tokens_delta;
                if status == AgentStatus::Done {
                    r.tasks_completed += 1;
                }
                r.last_heartbeat = Utc::now();
                true
            },
        )
        .await?;
        debug!(agent_id, %status, found = updated.is_some(), "Agent status updated");
        Ok(updated.is_some())
    }

    /// Removes an agent. Returns whether it was registered.
    pub async fn deregister(&self, agent_id: &str) -> SwarmResult<bool> {
        let existed = self.store.delete(&keys::agent(agent_id)).await?;
        self.store.srem(keys::AGENTS_ACTIVE, agent_id).await?;
        debug!(agent_id, existed, "Agent deregistered");
        Ok(existed)
    }

    /// One agent's record.
    pub async fn get(&self, agent_id: &str) -> SwarmResult<Option<AgentRecord>> {
        store::read_json(self.store.as_ref(), &keys::agent(agent_id)).await
    }

    /// Records of every active agent. Ids whose record expired are pruned.
    pub async fn active_agents(&self) -> SwarmResult<Vec<AgentRecord>> {
        let mut out = Vec::new();
        for id in self.store.smembers(keys::AGENTS_ACTIVE).await? {
            match self.get(&id).await? {
                Some(record) => out.push(record),
                None => {
                    self.store.srem(keys::AGENTS_ACTIVE, &id).await?;
                }
            }
        }
        Ok(out)
    }
}
