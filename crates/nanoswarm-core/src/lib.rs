//! Core types and error definitions for nanoswarm.
//!
//! This crate provides the foundational types shared across all nanoswarm
//! crates: error handling, conversation messages, tool calls, the closed
//! role sets of the three hierarchy tiers, and the task/result records that
//! flow between them.
//!
//! # Main types
//!
//! - [`SwarmError`] — Unified error enum for all nanoswarm subsystems.
//! - [`SwarmResult`] — Convenience alias for `Result<T, SwarmError>`.
//! - [`Message`] — A single message within a worker conversation.
//! - [`ToolCall`] — A model-initiated tool invocation request.
//! - [`AgentRole`] — Queen, domain lead or specialist.
//! - [`Task`] / [`TaskResult`] — One unit of work and its outcome.
//! - [`AgentStatus`] — Worker lifecycle state machine.

/// Error enum and result alias.
pub mod error;
/// Conversation messages.
pub mod message;
/// Roles for each hierarchy tier.
pub mod role;
/// Tasks, results and worker status.
pub mod task;
/// Truncation helpers.
pub mod text;
/// Tool-call records.
pub mod tool;

pub use error::{SwarmError, SwarmResult};
pub use message::{Message, Role};
pub use role::{AgentRole, DomainRole, SpecialistRole, Tier};
pub use task::{
    AgentStatus, Task, TaskResult, TokenUsage, CONTEXT_DEP_RESULTS, CONTEXT_HISTORY,
    DEFAULT_PRIORITY,
};
pub use text::{preview, truncate_with_marker};
pub use tool::{parse_arguments, ToolCall};
