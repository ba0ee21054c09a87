//! LLM-facing side of nanoswarm.
//!
//! Provider backends sit behind [`LlmBackend`]; [`FailoverBackend`] adds
//! bounded retries and fallback models; [`AgentRunner`] drives the
//! tool-calling loop and [`Worker`] wraps it with a role, a lifecycle and
//! journal bookkeeping.

/// Provider backends.
pub mod backends;
/// Model configuration.
pub mod config;
/// Retry and failover.
pub mod failover;
/// Provider-neutral request and response types.
pub mod llm;
/// The agentic tool loop.
pub mod runner;
/// Streamed-response reassembly.
pub mod stream;
/// Role-bound workers.
pub mod worker;

pub use backends::LlmBackend;
pub use config::{LlmProvider, ModelConfig};
pub use failover::{is_retryable, FailoverBackend, RetryPolicy};
pub use llm::{Completion, CompletionRequest, LlmClient, StopReason};
pub use runner::{AgentRunner, LoopOptions, LoopOutcome, MAX_ITERATIONS_REACHED};
pub use stream::{reassemble, StreamAccumulator, StreamEvent};
pub use worker::{Worker, WorkerConfig};
