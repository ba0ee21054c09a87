use crate::backends::LlmBackend;
use crate::llm::{Completion, CompletionRequest};
use async_trait::async_trait;
use nanoswarm_core::{SwarmError, SwarmResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Type alias for the injectable sleep function used in tests.
#[cfg(test)]
type SleepFn = Box<
    dyn Fn(u64) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> + Send + Sync,
>;

/// HTTP statuses treated as transient.
pub const RETRYABLE_STATUSES: [u16; 6] = [429, 500, 502, 503, 504, 529];

/// Configures retry behaviour for one backend before failing over.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Base delay in milliseconds for exponential backoff.
    pub backoff_base_ms: u64,
    /// Maximum delay in milliseconds (cap for exponential backoff).
    pub backoff_max_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_base_ms: 1_000,
            backoff_max_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// A policy that never sleeps.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff_base_ms: 0,
            backoff_max_ms: 0,
        }
    }
}

/// Whether an error is transient and worth retrying.
///
/// Timeouts, connection failures and the statuses in
/// [`RETRYABLE_STATUSES`] are transient. Everything else, including other
/// 4xx responses and malformed bodies, is not.
pub fn is_retryable(err: &SwarmError) -> bool {
    match err {
        SwarmError::Timeout(_) | SwarmError::Connection(_) => true,
        SwarmError::Api { status, .. } => RETRYABLE_STATUSES.contains(status),
        _ => false,
    }
}

/// Exponential backoff `base * 2^attempt`, capped at `backoff_max_ms`.
pub fn compute_backoff(policy: &RetryPolicy, attempt: u32) -> u64 {
    let delay = policy
        .backoff_base_ms
        .saturating_mul(2u64.saturating_pow(attempt));
    delay.min(policy.backoff_max_ms)
}

/// The delay before retrying after `err`. A server-provided retry-after
/// only ever lengthens the computed backoff.
pub fn backoff_for(policy: &RetryPolicy, attempt: u32, err: &SwarmError) -> u64 {
    let computed = compute_backoff(policy, attempt);
    match err {
        SwarmError::Api {
            retry_after: Some(after),
            ..
        } => computed.max(after.as_millis() as u64),
        _ => computed,
    }
}

/// An `LlmBackend` that retries transient failures with exponential
/// backoff and then fails over to the next configured backend.
///
/// Each backend gets `max_retries + 1` attempts. A non-retryable error is
/// returned at once: a malformed request fails the same way everywhere.
pub struct FailoverBackend {
    backends: Vec<Arc<dyn LlmBackend>>,
    policy: RetryPolicy,
    /// Injectable sleep function for testing (allows skipping real delays).
    #[cfg(test)]
    sleep_fn: Option<SleepFn>,
}

impl FailoverBackend {
    /// Wraps `primary` with `policy`.
    pub fn new(primary: Arc<dyn LlmBackend>, policy: RetryPolicy) -> Self {
        Self {
            backends: vec![primary],
            policy,
            #[cfg(test)]
            sleep_fn: None,
        }
    }

    /// Appends a backend tried after the previous ones are exhausted.
    pub fn with_fallback(mut self, backend: Arc<dyn LlmBackend>) -> Self {
        self.backends.push(backend);
        self
    }

    /// Number of backends in the chain.
    pub fn len(&self) -> usize {
        self.backends.len()
    }

    /// Always `false`: a chain has at least its primary.
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Perform a sleep for the given duration in milliseconds.
    async fn do_sleep(&self, ms: u64) {
        #[cfg(test)]
        if let Some(ref f) = self.sleep_fn {
            f(ms).await;
            return;
        }
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }
}

#[async_trait]
impl LlmBackend for FailoverBackend {
    async fn complete(&self, request: &CompletionRequest) -> SwarmResult<Completion> {
        let mut last_err: Option<SwarmError> = None;

        for (backend_idx, backend) in self.backends.iter().enumerate() {
            if backend_idx > 0 {
                warn!(
                    backend = backend_idx,
                    name = backend.name(),
                    "Failing over to next backend"
                );
            }
            for attempt in 0..=self.policy.max_retries {
                match backend.complete(request).await {
                    Ok(resp) => return Ok(resp),
                    Err(e) => {
                        if !is_retryable(&e) {
                            warn!(
                                backend = backend_idx,
                                attempt,
                                error = %e,
                                "Non-retryable error"
                            );
                            return Err(e);
                        }

                        if attempt < self.policy.max_retries {
                            let delay = backoff_for(&self.policy, attempt, &e);
                            info!(
                                backend = backend_idx,
                                attempt,
                                delay_ms = delay,
                                error = %e,
                                "Retryable error, backing off"
                            );
                            self.do_sleep(delay).await;
                        }
                        last_err = Some(e);
                    }
                }
            }
        }

        Err(last_err.unwrap_or_else(|| SwarmError::Agent("All backends exhausted".into())))
    }

    fn name(&self) -> &str {
        "failover"
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// A mock backend that returns a pre-configured sequence of results.
    struct MockBackend {
        results: tokio::sync::Mutex<Vec<SwarmResult<Completion>>>,
        call_count: AtomicU32,
    }

    impl MockBackend {
        fn new(results: Vec<SwarmResult<Completion>>) -> Self {
            Self {
                results: tokio::sync::Mutex::new(results),
                call_count: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.call_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LlmBackend for MockBackend {
        async fn complete(&self, _request: &CompletionRequest) -> SwarmResult<Completion> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            let mut results = self.results.lock().await;
            if results.is_empty() {
                return Err(SwarmError::Agent("MockBackend: no more results".into()));
            }
            results.remove(0)
        }
    }

    fn request() -> CompletionRequest {
        CompletionRequest {
            system: None,
            messages: vec![],
            max_tokens: 16,
            temperature: 0.0,
            tools: vec![],
        }
    }

    fn api(status: u16) -> SwarmError {
        SwarmError::Api {
            status,
            message: "boom".into(),
            retry_after: None,
        }
    }

    fn recording(backend: FailoverBackend) -> (FailoverBackend, Arc<parking_lot::Mutex<Vec<u64>>>) {
        let delays = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&delays);
        let mut backend = backend;
        backend.sleep_fn = Some(Box::new(move |ms| {
            sink.lock().push(ms);
            Box::pin(async {})
        }));
        (backend, delays)
    }

    // ── Test 1: success on first try ──

    #[tokio::test]
    async fn test_success_first_try() {
        let mock = Arc::new(MockBackend::new(vec![Ok(Completion::text("hi"))]));
        let fb = FailoverBackend::new(mock.clone(), RetryPolicy::default());
        let resp = fb.complete(&request()).await.unwrap();
        assert_eq!(resp.text, "hi");
        assert_eq!(mock.calls(), 1);
    }

    // ── Test 2: three attempts at most, with doubling backoff ──

    #[tokio::test]
    async fn test_retries_bounded_with_backoff() {
        let mock = Arc::new(MockBackend::new(vec![
            Err(SwarmError::Timeout("t1".into())),
            Err(SwarmError::Timeout("t2".into())),
            Err(SwarmError::Timeout("t3".into())),
            Ok(Completion::text("never reached")),
        ]));
        let (fb, delays) = recording(FailoverBackend::new(mock.clone(), RetryPolicy::default()));
        let err = fb.complete(&request()).await.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(mock.calls(), 3);
        assert_eq!(*delays.lock(), vec![1_000, 2_000]);
    }

    // ── Test 3: non-retryable errors propagate immediately ──

    #[tokio::test]
    async fn test_non_retryable_immediate() {
        let mock = Arc::new(MockBackend::new(vec![Err(api(401))]));
        let fallback = Arc::new(MockBackend::new(vec![Ok(Completion::text("fb"))]));
        let fb = FailoverBackend::new(mock.clone(), RetryPolicy::default())
            .with_fallback(fallback.clone());
        let err = fb.complete(&request()).await.unwrap_err();
        assert_eq!(err.status(), Some(401));
        assert_eq!(mock.calls(), 1);
        assert_eq!(fallback.calls(), 0);
    }

    // ── Test 4: recovery after a transient failure ──

    #[tokio::test]
    async fn test_recovers_after_rate_limit() {
        let mock = Arc::new(MockBackend::new(vec![
            Err(api(429)),
            Ok(Completion::text("ok")),
        ]));
        let (fb, _) = recording(FailoverBackend::new(mock.clone(), RetryPolicy::default()));
        assert_eq!(fb.complete(&request()).await.unwrap().text, "ok");
        assert_eq!(mock.calls(), 2);
    }

    // ── Test 5: retry-after only lengthens the delay ──

    #[tokio::test]
    async fn test_retry_after_overrides_upward() {
        let policy = RetryPolicy::default();
        let long = SwarmError::Api {
            status: 429,
            message: "slow down".into(),
            retry_after: Some(Duration::from_secs(7)),
        };
        let short = SwarmError::Api {
            status: 429,
            message: "slow down".into(),
            retry_after: Some(Duration::from_millis(10)),
        };
        assert_eq!(backoff_for(&policy, 0, &long), 7_000);
        assert_eq!(backoff_for(&policy, 1, &short), 2_000);
    }

    // ── Test 6: exhausted primary fails over ──

    #[tokio::test]
    async fn test_failover_after_exhaustion() {
        let primary = Arc::new(MockBackend::new(vec![
            Err(api(503)),
            Err(api(503)),
            Err(api(503)),
        ]));
        let fallback = Arc::new(MockBackend::new(vec![Ok(Completion::text("fallback"))]));
        let (fb, _) = recording(
            FailoverBackend::new(primary.clone(), RetryPolicy::default())
                .with_fallback(fallback.clone()),
        );
        assert_eq!(fb.len(), 2);
        assert_eq!(fb.complete(&request()).await.unwrap().text, "fallback");
        assert_eq!(primary.calls(), 3);
        assert_eq!(fallback.calls(), 1);
    }

    // ── Test 7: classification and backoff math ──

    #[test]
    fn test_is_retryable_classification() {
        assert!(is_retryable(&SwarmError::Timeout("x".into())));
        assert!(is_retryable(&SwarmError::Connection("x".into())));
        for status in RETRYABLE_STATUSES {
            assert!(is_retryable(&api(status)));
        }
        assert!(!is_retryable(&api(400)));
        assert!(!is_retryable(&api(404)));
        assert!(!is_retryable(&SwarmError::Http("bad body".into())));
    }

    #[test]
    fn test_compute_backoff_capped() {
        let policy = RetryPolicy {
            max_retries: 10,
            backoff_base_ms: 1_000,
            backoff_max_ms: 5_000,
        };
        assert_eq!(compute_backoff(&policy, 0), 1_000);
        assert_eq!(compute_backoff(&policy, 2), 4_000);
        assert_eq!(compute_backoff(&policy, 3), 5_000);
        assert_eq!(compute_backoff(&policy, 60), 5_000);
    }
}
