//! Append-only per-session task journal.
//!
//! An entry is created once when a task starts and completed once when it
//! finishes. Neither step overwrites earlier data: a second start is
//! refused, and a completion on an already-terminal entry is ignored.

use crate::store::{self, keys, StateStore};
use chrono::{DateTime, Utc};
use nanoswarm_core::{preview, AgentRole, SwarmError, SwarmResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Per-session index and global failed-queue cap.
pub const MAX_JOURNAL_TASKS: isize = 10_000;

const CONTENT_PREVIEW_CHARS: usize = 200;
const OUTPUT_PREVIEW_CHARS: usize = 500;
const HISTORY_PREVIEW_CHARS: usize = 80;

/// Lifecycle of a journaled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalStatus {
    /// Known but not started.
    Pending,
    /// Started.
    Running,
    /// Finished successfully.
    Complete,
    /// Finished with an error.
    Failed,
    /// Being retried.
    Retrying,
}

impl JournalStatus {
    /// `Complete` or `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, JournalStatus::Complete | JournalStatus::Failed)
    }
}

/// One journaled task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Task id.
    pub task_id: String,
    /// Owning session.
    pub session_id: String,
    /// Worker that ran it.
    pub agent_id: String,
    /// Role of that worker.
    pub agent_role: AgentRole,
    /// First characters of the instruction.
    pub content_preview: String,
    /// Parent task, if any.
    #[serde(default)]
    pub parent_task_id: Option<String>,
    /// Current status.
    pub status: JournalStatus,
    /// Start time.
    pub started_at: DateTime<Utc>,
    /// Completion time.
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// First characters of the output.
    #[serde(default)]
    pub output_preview: Option<String>,
    /// Full output.
    #[serde(default)]
    pub output: Option<String>,
    /// Failure description.
    #[serde(default)]
    pub error: Option<String>,
    /// Whether it succeeded.
    #[serde(default)]
    pub success: Option<bool>,
    /// Tokens consumed.
    #[serde(default)]
    pub tokens_used: u64,
    /// Wall-clock duration.
    #[serde(default)]
    pub duration_secs: f64,
    /// Names of the tools it invoked, in order.
    #[serde(default)]
    pub tool_calls: Vec<String>,
}

/// What is known when a task starts.
#[derive(Debug, Clone)]
pub struct TaskStart<'a> {
    /// Task id.
    pub task_id: &'a str,
    /// Worker id.
    pub agent_id: &'a str,
    /// Worker role.
    pub role: AgentRole,
    /// Instruction text.
    pub content: &'a str,
    /// Parent task id.
    pub parent_task_id: Option<&'a str>,
}

/// What is known when a task finishes.
#[derive(Debug, Clone, Default)]
pub struct TaskCompletion {
    /// Output text.
    pub output: String,
    /// Whether it succeeded.
    pub success: bool,
    /// Failure description.
    pub error: Option<String>,
    /// Tokens consumed.
    pub tokens_used: u64,
    /// Wall-clock duration.
    pub duration: Duration,
    /// Names of invoked tools.
    pub tool_calls: Vec<String>,
}

/// A failed task as recorded in the global failed queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedTask {
    /// Session of the task.
    pub session_id: String,
    /// Task id.
    pub task_id: String,
    /// Role that failed.
    pub agent_role: AgentRole,
    /// Failure description.
    pub error: String,
    /// When it failed.
    pub failed_at: DateTime<Utc>,
}

/// Aggregate view of a session's journal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSummary {
    /// Session id.
    pub session_id: String,
    /// Journaled tasks.
    pub total_tasks: usize,
    /// Tasks that completed successfully.
    pub successful: usize,
    /// Tasks that failed.
    pub failed: usize,
    /// `successful / total_tasks` in percent, one decimal.
    pub success_rate: f64,
    /// Sum of tokens across tasks.
    pub total_tokens: u64,
    /// Mean duration of finished tasks in seconds, two decimals.
    pub avg_duration_secs: f64,
    /// Distinct roles that ran tasks.
    pub roles_used: Vec<String>,
}

impl SessionSummary {
    /// A summary with no tasks.
    pub fn empty(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            total_tasks: 0,
            successful: 0,
            failed: 0,
            success_rate: 0.0,
            total_tokens: 0,
            avg_duration_secs: 0.0,
            roles_used: Vec::new(),
        }
    }

    /// Builds a summary from journal entries.
    pub fn from_entries(session_id: &str, entries: &[JournalEntry]) -> Self {
        let total_tasks = entries.len();
        let successful = entries.iter().filter(|e| e.success == Some(true)).count();
        let failed = entries
            .iter()
            .filter(|e| e.status == JournalStatus::Failed)
            .count();
        let total_tokens = entries.iter().map(|e| e.tokens_used).sum();
        let finished: Vec<f64> = entries
            .iter()
            .filter(|e| e.status.is_terminal())
            .map(|e| e.duration_secs)
            .collect();
        let avg = if finished.is_empty() {
            0.0
        } else {
            finished.iter().sum::<f64>() / finished.len() as f64
        };
        let rate = if total_tasks == 0 {
            0.0
        } else {
            successful as f64 / total_tasks as f64 * 100.0
        };
        let roles_used: BTreeSet<String> = entries
            .iter()
            .map(|e| e.agent_role.as_str().to_string())
            .collect();

        Self {
            session_id: session_id.to_string(),
            total_tasks,
            successful,
            failed,
            success_rate: round_to(rate, 1),
            total_tokens,
            avg_duration_secs: round_to(avg, 2),
            roles_used: roles_used.into_iter().collect(),
        }
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Journal for one session.
#[derive(Clone)]
pub struct TaskJournal {
    store: Arc<dyn StateStore>,
    session_id: String,
    ttl: Duration,
}

impl TaskJournal {
    /// A journal writing entries with the given TTL.
    pub fn new(store: Arc<dyn StateStore>, session_id: impl Into<String>, ttl: Duration) -> Self {
        Self {
            store,
            session_id: session_id.into(),
            ttl,
        }
    }

    /// The session this journal belongs to.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Records a task start. Returns `false` if the task was already journaled.
    pub async fn record_start(&self, start: TaskStart<'_>) -> SwarmResult<bool> {
        let entry = JournalEntry {
            task_id: start.task_id.to_string(),
            session_id: self.session_id.clone(),
            agent_id: start.agent_id.to_string(),
            agent_role: start.role,
            content_preview: preview(start.content, CONTENT_PREVIEW_CHARS).to_string(),
            parent_task_id: start.parent_task_id.map(str::to_string),
            status: JournalStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            output_preview: None,
            output: None,
            error: None,
            success: None,
            tokens_used: 0,
            duration_secs: 0.0,
            tool_calls: Vec::new(),
        };
        let key = keys::journal_entry(&self.session_id, start.task_id);
        if !store::create_json(self.store.as_ref(), &key, &entry, Some(self.ttl)).await? {
            warn!(session_id = %self.session_id, task_id = start.task_id, "Task already journaled");
            return Ok(false);
        }

        let index = keys::journal_index(&self.session_id);
        self.store.lpush(&index, start.task_id).await?;
        self.store.ltrim(&index, 0, MAX_JOURNAL_TASKS - 1).await?;
        self.store.expire(&index, self.ttl).await?;
        debug!(session_id = %self.session_id, task_id = start.task_id, role = %start.role, "Task started");
        Ok(true)
    }

    /// Appends completion data to a running entry.
    ///
    /// Returns `false` if the entry was already terminal; fails with
    /// [`SwarmError::NotFound`] if it was never started.
    pub async fn record_complete(&self, task_id: &str, done: TaskCompletion) -> SwarmResult<bool> {
        let key = keys::journal_entry(&self.session_id, task_id);
        let updated = store::update_json(
            self.store.as_ref(),
            &key,
            Some(self.ttl),
            |e: &mut JournalEntry| {
                if e.status.is_terminal() {
                    return false;
                }
                e.status = if done.success {
                    JournalStatus::Complete
                } else {
                    JournalStatus::Failed
                };
                e.completed_at = Some(Utc::now());
                e.output_preview = Some(preview(&done.output, OUTPUT_PREVIEW_CHARS).to_string());
                e.output = Some(done.output.clone());
                e.error = done.error.clone();
                e.success = Some(done.success);
                e.tokens_used = done.tokens_used;
                e.duration_secs = done.duration.as_secs_f64();
                e.tool_calls = done.tool_calls.clone();
                true
            },
        )
        .await?;

        let (entry, written) = updated
            .ok_or_else(|| SwarmError::NotFound(format!("journal entry {task_id}")))?;
        if !written {
            warn!(session_id = %self.session_id, task_id, "Journal entry already terminal; ignoring");
            return Ok(false);
        }

        if !done.success {
            let failed = FailedTask {
                session_id: self.session_id.clone(),
                task_id: task_id.to_string(),
                agent_role: entry.agent_role,
                error: done.error.unwrap_or_else(|| "unknown error".to_string()),
                failed_at: Utc::now(),
            };
            let raw = serde_json::to_string(&failed)?;
            self.store.lpush(keys::FAILED_QUEUE, &raw).await?;
            self.store
                .ltrim(keys::FAILED_QUEUE, 0, MAX_JOURNAL_TASKS - 1)
                .await?;
        }
        debug!(session_id = %self.session_id, task_id, success = done.success, "Task completed");
        Ok(true)
    }

    /// One entry.
    pub async fn get(&self, task_id: &str) -> SwarmResult<Option<JournalEntry>> {
        store::read_json(
            self.store.as_ref(),
            &keys::journal_entry(&self.session_id, task_id),
        )
        .await
    }

    /// Up to `limit` entries, most recently started first.
    pub async fn list(&self, limit: usize) -> SwarmResult<Vec<JournalEntry>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let ids = self
            .store
            .lrange(&keys::journal_index(&self.session_id), 0, limit as isize - 1)
            .await?;
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(entry) = self.get(&id).await? {
                out.push(entry);
            }
        }
        Ok(out)
    }

    /// Aggregate statistics over every entry of the session.
    pub async fn summary(&self) -> SwarmResult<SessionSummary> {
        let entries = self.list(MAX_JOURNAL_TASKS as usize).await?;
        Ok(SessionSummary::from_entries(&self.session_id, &entries))
    }

    /// A compact history block for the planner, oldest task first.
    /// Empty when the session has no journaled tasks.
    pub async fn planner_context(&self, limit: usize) -> SwarmResult<String> {
        let mut entries = self.list(limit).await?;
        if entries.is_empty() {
            return Ok(String::new());
        }
        entries.reverse();
        let mut lines = vec!["=== SESSION TASK HISTORY ===".to_string()];
        for e in &entries {
            let mark = if e.success == Some(true) { "OK" } else { "FAIL" };
            let output = e.output_preview.as_deref().unwrap_or("");
            lines.push(format!(
                "[{mark}] [{}] {} -> {}",
                e.agent_role,
                preview(&e.content_preview, HISTORY_PREVIEW_CHARS),
                preview(output, HISTORY_PREVIEW_CHARS)
            ));
        }
        Ok(lines.join("\n"))
    }
}

/// Most recent failures across all sessions, newest first.
pub async fn failed_tasks(store: &dyn StateStore, limit: usize) -> SwarmResult<Vec<FailedTask>> {
    if limit == 0 {
        return Ok(Vec::new());
    }
    let raw = store.lrange(keys::FAILED_QUEUE, 0, limit as isize - 1).await?;
    raw.iter()
        .map(|r| {
            serde_json::from_str(r)
                .map_err(|e| SwarmError::State(format!("corrupt failed-queue item: {e}")))
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;
    use nanoswarm_core::{DomainRole, SpecialistRole};

    fn journal() -> (Arc<InMemoryStore>, TaskJournal) {
        let store = Arc::new(InMemoryStore::new());
        let j = TaskJournal::new(store.clone(), "s1", Duration::from_secs(600));
        (store, j)
    }

    fn start<'a>(task_id: &'a str, role: AgentRole) -> TaskStart<'a> {
        TaskStart {
            task_id,
            agent_id: "agent-1",
            role,
            content: "do the thing",
            parent_task_id: None,
        }
    }

    fn done(success: bool, tokens: u64, secs: u64) -> TaskCompletion {
        TaskCompletion {
            output: if success { "result".into() } else { String::new() },
            success,
            error: (!success).then(|| "Timeout: 300s".to_string()),
            tokens_used: tokens,
            duration: Duration::from_secs(secs),
            tool_calls: vec!["file_io".into()],
        }
    }

    #[tokio::test]
    async fn test_start_then_complete() {
        let (_s, j) = journal();
        let role = AgentRole::Specialist(SpecialistRole::CodeWriter);
        assert!(j.record_start(start("t1", role)).await.unwrap());
        let running = j.get("t1").await.unwrap().unwrap();
        assert_eq!(running.status, JournalStatus::Running);

        assert!(j.record_complete("t1", done(true, 42, 2)).await.unwrap());
        let e = j.get("t1").await.unwrap().unwrap();
        assert_eq!(e.status, JournalStatus::Complete);
        assert_eq!(e.output.as_deref(), Some("result"));
        assert_eq!(e.tokens_used, 42);
        assert_eq!(e.tool_calls, vec!["file_io"]);
        assert_eq!(e.content_preview, "do the thing");
    }

    #[tokio::test]
    async fn test_entries_never_overwritten() {
        let (_s, j) = journal();
        let role = AgentRole::Lead(DomainRole::Coder);
        assert!(j.record_start(start("t1", role)).await.unwrap());
        assert!(!j.record_start(start("t1", role)).await.unwrap());

        assert!(j.record_complete("t1", done(true, 1, 1)).await.unwrap());
        assert!(!j.record_complete("t1", done(false, 9, 9)).await.unwrap());
        let e = j.get("t1").await.unwrap().unwrap();
        assert_eq!(e.success, Some(true));
        assert_eq!(e.tokens_used, 1);
    }

    #[tokio::test]
    async fn test_complete_unknown_task_is_not_found() {
        let (_s, j) = journal();
        let err = j.record_complete("ghost", done(true, 0, 0)).await.unwrap_err();
        assert!(matches!(err, SwarmError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_failures_go_to_failed_queue() {
        let (store, j) = journal();
        j.record_start(start("t1", AgentRole::Queen)).await.unwrap();
        j.record_complete("t1", done(false, 0, 1)).await.unwrap();

        let failed = failed_tasks(store.as_ref(), 10).await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].task_id, "t1");
        assert_eq!(failed[0].session_id, "s1");
        assert!(failed[0].error.contains("Timeout"));
    }

    #[tokio::test]
    async fn test_list_most_recent_first() {
        let (_s, j) = journal();
        for id in ["a", "b", "c"] {
            j.record_start(start(id, AgentRole::Queen)).await.unwrap();
        }
        let ids: Vec<_> = j.list(10).await.unwrap().into_iter().map(|e| e.task_id).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
    }

    #[tokio::test]
    async fn test_summary() {
        let (_s, j) = journal();
        let coder = AgentRole::Lead(DomainRole::Coder);
        let analyst = AgentRole::Lead(DomainRole::Analyst);
        j.record_start(start("t1", coder)).await.unwrap();
        j.record_start(start("t2", analyst)).await.unwrap();
        j.record_start(start("t3", coder)).await.unwrap();
        j.record_complete("t1", done(true, 100, 1)).await.unwrap();
        j.record_complete("t2", done(true, 50, 2)).await.unwrap();
        j.record_complete("t3", done(false, 0, 4)).await.unwrap();

        let s = j.summary().await.unwrap();
        assert_eq!(s.total_tasks, 3);
        assert_eq!(s.successful, 2);
        assert_eq!(s.failed, 1);
        assert!((s.success_rate - 66.7).abs() < 1e-9);
        assert_eq!(s.total_tokens, 150);
        assert!((s.avg_duration_secs - 2.33).abs() < 1e-9);
        assert_eq!(s.roles_used, vec!["analyst", "coder"]);
    }

    #[tokio::test]
    async fn test_empty_summary() {
        let (_s, j) = journal();
        assert_eq!(j.summary().await.unwrap(), SessionSummary::empty("s1"));
        assert!(j.planner_context(20).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_planner_context_format() {
        let (_s, j) = journal();
        let role = AgentRole::Lead(DomainRole::Researcher);
        j.record_start(start("t1", role)).await.unwrap();
        j.record_complete("t1", done(true, 1, 1)).await.unwrap();
        j.record_start(start("t2", role)).await.unwrap();
        j.record_complete("t2", done(false, 1, 1)).await.unwrap();

        let ctx = j.planner_context(20).await.unwrap();
        let lines: Vec<_> = ctx.lines().collect();
        assert_eq!(lines[0], "=== SESSION TASK HISTORY ===");
        assert_eq!(lines[1], "[OK] [researcher] do the thing -> result");
        assert_eq!(lines[2], "[FAIL] [researcher] do the thing -> ");
    }
}
