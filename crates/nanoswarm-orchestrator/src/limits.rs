//! Concurrency limits shared by one run.
//!
//! Three independent bounds apply:
//! - a global cap on simultaneous LLM calls, enforced per call by
//!   [`GatedBackend`];
//! - a mid-tier cap on simultaneously active domain leads;
//! - a per-stage cap on specialists running inside one pipeline stage.
//!
//! A lead holds its mid-tier permit for its whole subtree while each
//! individual call takes and returns a global permit. No code path holds a
//! global permit while waiting for another permit.

use async_trait::async_trait;
use nanoswarm_agent::{Completion, CompletionRequest, LlmBackend};
use nanoswarm_core::{SwarmError, SwarmResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::trace;

/// Waits for a permit, mapping a closed semaphore to an orchestrator error.
pub(crate) async fn acquire(
    semaphore: &Arc<Semaphore>,
    what: &str,
) -> SwarmResult<OwnedSemaphorePermit> {
    Arc::clone(semaphore)
        .acquire_owned()
        .await
        .map_err(|_| SwarmError::Orchestrator(format!("{what} limiter closed")))
}

/// An [`LlmBackend`] that holds a global permit for the duration of each
/// completion call.
///
/// The optional call timeout starts once the permit is held.
pub struct GatedBackend {
    inner: Arc<dyn LlmBackend>,
    permits: Arc<Semaphore>,
    call_timeout: Option<Duration>,
}

impl GatedBackend {
    /// Wraps `inner` so at most `limit` calls are in flight at once.
    pub fn new(inner: Arc<dyn LlmBackend>, limit: usize) -> Self {
        Self {
            inner,
            permits: Arc::new(Semaphore::new(limit.max(1))),
            call_timeout: None,
        }
    }

    /// Bounds each call, not counting the wait for a permit.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Permits currently free.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

#[async_trait]
impl LlmBackend for GatedBackend {
    async fn complete(&self, request: &CompletionRequest) -> SwarmResult<Completion> {
        let _permit = acquire(&self.permits, "global").await?;
        trace!(available = self.permits.available_permits(), "Global permit acquired");
        match self.call_timeout {
            Some(limit) => tokio::time::timeout(limit, self.inner.complete(request))
                .await
                .unwrap_or_else(|_| {
                    Err(SwarmError::Timeout(format!(
                        "LLM call exceeded {}s",
                        limit.as_secs_f64()
                    )))
                }),
            None => self.inner.complete(request).await,
        }
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

/// The mid-tier and stage semaphores of one run.
#[derive(Clone)]
pub struct TierLimits {
    pub(crate) mid: Arc<Semaphore>,
    pub(crate) stage: usize,
}

impl TierLimits {
    /// `mid` concurrent leads, `stage` concurrent specialists per stage.
    pub fn new(mid: usize, stage: usize) -> Self {
        Self {
            mid: Arc::new(Semaphore::new(mid.max(1))),
            stage: stage.max(1),
        }
    }
}
