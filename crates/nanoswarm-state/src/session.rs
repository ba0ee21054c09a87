use crate::store::{self, keys, StateStore};
use chrono::{DateTime, Utc};
use nanoswarm_core::{SwarmError, SwarmResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// How many session ids the recent-sessions index keeps.
pub const RECENT_SESSIONS_CAP: isize = 1000;

/// Lifecycle of a session. `Complete` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// The run is in progress.
    Active,
    /// The run produced a final answer.
    Complete,
    /// The run aborted.
    Failed,
}

impl SessionStatus {
    /// Whether no further transitions are allowed.
    pub fn is_terminal(self) -> bool {
        !matches!(self, SessionStatus::Active)
    }
}

/// One top-level invocation of the swarm.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Unique session id.
    pub session_id: String,
    /// The goal the caller asked for.
    pub goal: String,
    /// Caller-supplied metadata.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    /// Current status.
    pub status: SessionStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
    /// When a terminal status was reached.
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// Number of planned tier tasks.
    #[serde(default)]
    pub task_count: usize,
    /// Number of tier tasks that produced a result.
    #[serde(default)]
    pub completed_tasks: usize,
    /// The synthesized answer, once terminal.
    #[serde(default)]
    pub final_answer: Option<String>,
    /// Whether the run succeeded, once terminal.
    #[serde(default)]
    pub success: Option<bool>,
}

/// Partial update applied by [`SessionManager::update`].
#[derive(Debug, Clone, Default)]
pub struct SessionPatch {
    /// New planned task count.
    pub task_count: Option<usize>,
    /// New completed task count.
    pub completed_tasks: Option<usize>,
    /// Metadata keys to insert or overwrite.
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Creates, updates and finalizes session records.
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn StateStore>,
    ttl: Duration,
}

impl SessionManager {
    /// A manager whose records live for `ttl`.
    pub fn new(store: Arc<dyn StateStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Creates a new active session and indexes it as most recent.
    pub async fn create(
        &self,
        goal: &str,
        metadata: HashMap<String, serde_json::Value>,
    ) -> SwarmResult<SessionRecord> {
        let now = Utc::now();
        let record = SessionRecord {
            session_id: Uuid::new_v4().to_string(),
            goal: goal.to_string(),
            metadata,
            status: SessionStatus::Active,
            created_at: now,
            updated_at: now,
            completed_at: None,
            task_count: 0,
            completed_tasks: 0,
            final_answer: None,
            success: None,
        };
        let key = keys::session(&record.session_id);
        if !store::create_json(self.store.as_ref(), &key, &record, Some(self.ttl)).await? {
            return Err(SwarmError::State(format!(
                "session id collision: {}",
                record.session_id
            )));
        }
        self.store
            .lpush(keys::SESSIONS_RECENT, &record.session_id)
            .await?;
        self.store
            .ltrim(keys::SESSIONS_RECENT, 0, RECENT_SESSIONS_CAP - 1)
            .await?;
        info!(session_id = %record.session_id, "Session created");
        Ok(record)
    }

    /// Reads a session, `None` if it does not exist or expired.
    pub async fn get(&self, session_id: &str) -> SwarmResult<Option<SessionRecord>> {
        store::read_json(self.store.as_ref(), &keys::session(session_id)).await
    }

    /// Reads a session, failing with [`SwarmError::NotFound`] if absent.
    pub async fn require(&self, session_id: &str) -> SwarmResult<SessionRecord> {
        self.get(session_id)
            .await?
            .ok_or_else(|| SwarmError::NotFound(format!("session {session_id}")))
    }

    /// Applies a patch to an active session. Terminal sessions are left
    /// untouched and `false` is returned.
    pub async fn update(&self, session_id: &str, patch: SessionPatch) -> SwarmResult<bool> {
        let updated = store::update_json(
            self.store.as_ref(),
            &keys::session(session_id),
            Some(self.ttl),
            |s: &mut SessionRecord| {
                if s.status.is_terminal() {
                    return false;
                }
                if let Some(n) = patch.task_count {
                    s.task_count = n;
                }
                if let Some(n) = patch.completed_tasks {
                    s.completed_tasks = n;
                }
                for (k, v) in &patch.metadata {
                    s.metadata.insert(k.clone(), v.clone());
                }
                s.updated_at = Utc::now();
                true
            },
        )
        .await?;
        match updated {
            Some((_, written)) => Ok(written),
            None => Err(SwarmError::NotFound(format!("session {session_id}"))),
        }
    }

    /// Moves the session to `complete` or `failed`.
    ///
    /// The first terminal call wins: on an already-terminal session this is
    /// a no-op returning `false`, and the stored status and answer keep the
    /// values of the first call.
    pub async fn complete(
        &self,
        session_id: &str,
        final_answer: &str,
        success: bool,
    ) -> SwarmResult<bool> {
        let updated = store::update_json(
            self.store.as_ref(),
            &keys::session(session_id),
            Some(self.ttl),
            |s: &mut SessionRecord| {
                if s.status.is_terminal() {
                    return false;
                }
                let now = Utc::now();
                s.status = if success {
                    SessionStatus::Complete
                } else {
                    SessionStatus::Failed
                };
                s.final_answer = Some(final_answer.to_string());
                s.success = Some(success);
                s.completed_at = Some(now);
                s.updated_at = now;
                true
            },
        )
        .await?;
        match updated {
            Some((record, true)) => {
                info!(session_id, status = ?record.status, "Session finalized");
                Ok(true)
            }
            Some((record, false)) => {
                warn!(session_id, status = ?record.status, "Session already finalized; ignoring");
                Ok(false)
            }
            None => Err(SwarmError::NotFound(format!("session {session_id}"))),
        }
    }

    /// Ids of the most recently created sessions, newest first.
    pub async fn recent_ids(&self, limit: usize) -> SwarmResult<Vec<String>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        self.store
            .lrange(keys::SESSIONS_RECENT, 0, limit as isize - 1)
            .await
    }

    /// The most recent sessions that still exist, newest first.
    pub async fn list_recent(&self, limit: usize) -> SwarmResult<Vec<SessionRecord>> {
        let mut out = Vec::new();
        for id in self.recent_ids(limit).await? {
            if let Some(record) = self.get(&id).await? {
                out.push(record);
            }
        }
        Ok(out)
    }
}
