//! Optional knowledge context placed ahead of the goal in planning prompts.

use async_trait::async_trait;
use nanoswarm_core::SwarmResult;
use std::path::PathBuf;

/// Supplies background text relevant to a goal.
///
/// Callers treat every error as "no context": a failing provider never
/// aborts a run.
#[async_trait]
pub trait ContextProvider: Send + Sync {
    /// Context for `goal`, or `None` when there is nothing relevant.
    async fn context_for(&self, goal: &str) -> SwarmResult<Option<String>>;
}

/// The same text for every goal.
pub struct StaticContext {
    text: String,
}

impl StaticContext {
    /// Always returns `text`.
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

#[async_trait]
impl ContextProvider for StaticContext {
    async fn context_for(&self, _goal: &str) -> SwarmResult<Option<String>> {
        if self.text.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(self.text.clone()))
    }
}

/// Reads a file on every request, so edits apply to the next run.
pub struct FileContext {
    path: PathBuf,
}

impl FileContext {
    /// Reads `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ContextProvider for FileContext {
    async fn context_for(&self, _goal: &str) -> SwarmResult<Option<String>> {
        let text = tokio::fs::read_to_string(&self.path).await?;
        if text.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(text))
    }
}
