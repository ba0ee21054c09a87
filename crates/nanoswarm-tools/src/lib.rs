//! Tool system for nanoswarm workers.
//!
//! A [`Tool`] never raises: every run returns a [`ToolOutcome`], and the
//! [`ToolRegistry`] turns unknown names and malformed arguments into
//! failures as well, so the agentic loop always has something to feed back
//! to the model.

/// Builtin tools.
pub mod builtins;
/// Name-keyed tool registry.
pub mod registry;
/// Tool trait and outcome types.
pub mod tool;

pub use builtins::{register_builtins, BuiltinToolsConfig, CodeRunnerTool, WebSearchTool};
pub use registry::{ToolRegistry, INVALID_ARGUMENTS, TOOL_NOT_FOUND};
pub use tool::{Tool, ToolDescriptor, ToolOutcome, ToolReport};
