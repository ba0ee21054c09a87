//! Generic tools every worker can use.

mod code_runner;
mod file_io;
mod http_fetch;
mod web_search;

pub use code_runner::{CodeRunnerTool, MAX_OUTPUT_CHARS};
pub use file_io::FileIoTool;
pub use http_fetch::{HttpFetchTool, MAX_CONTENT_CHARS};
pub use web_search::{WebSearchTool, DEFAULT_SEARCH_ENDPOINT};

use crate::registry::ToolRegistry;
use nanoswarm_core::SwarmResult;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Which builtin tools to register, and how.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinToolsConfig {
    /// Sandbox directory for `file_io`; `None` disables the tool.
    #[serde(default = "default_workspace")]
    pub workspace_dir: Option<PathBuf>,
    /// Register `http_fetch`.
    #[serde(default = "default_true")]
    pub http_fetch: bool,
    /// Per-request timeout for `http_fetch`.
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
    /// Let `http_fetch` reach loopback/private hosts.
    #[serde(default)]
    pub allow_private_hosts: bool,
    /// Register `web_search`. Shares `http_timeout_secs`.
    #[serde(default = "default_true")]
    pub web_search: bool,
    /// Register `run_python`.
    #[serde(default = "default_true")]
    pub code_runner: bool,
    /// Wall-clock limit on one `run_python` script.
    #[serde(default = "default_code_timeout")]
    pub code_timeout_secs: u64,
}

fn default_workspace() -> Option<PathBuf> {
    Some(PathBuf::from("nanoswarm_workspace"))
}

fn default_true() -> bool {
    true
}

fn default_http_timeout() -> u64 {
    60
}

fn default_code_timeout() -> u64 {
    30
}

impl Default for BuiltinToolsConfig {
    fn default() -> Self {
        Self {
            workspace_dir: default_workspace(),
            http_fetch: true,
            http_timeout_secs: default_http_timeout(),
            allow_private_hosts: false,
            web_search: true,
            code_runner: true,
            code_timeout_secs: default_code_timeout(),
        }
    }
}

/// Registers the builtin tools selected by `config`.
pub fn register_builtins(registry: &mut ToolRegistry, config: &BuiltinToolsConfig) -> SwarmResult<()> {
    if let Some(dir) = &config.workspace_dir {
        registry.register(Arc::new(FileIoTool::new(dir)?));
    }
    if config.http_fetch {
        let tool = HttpFetchTool::new(Duration::from_secs(config.http_timeout_secs))?
            .allow_private_hosts(config.allow_private_hosts);
        registry.register(Arc::new(tool));
    }
    if config.web_search {
        let tool = WebSearchTool::new(Duration::from_secs(config.http_timeout_secs))?;
        registry.register(Arc::new(tool));
    }
    if config.code_runner {
        let tool = CodeRunnerTool::new(Duration::from_secs(config.code_timeout_secs));
        registry.register(Arc::new(tool));
    }
    Ok(())
}
