//! `nanoswarm.toml` loading.

use nanoswarm_agent::ModelConfig;
use nanoswarm_core::{SwarmError, SwarmResult};
use nanoswarm_orchestrator::SwarmConfig;
use nanoswarm_state::StateConfig;
use nanoswarm_tools::BuiltinToolsConfig;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The whole configuration file. Only `[model]` is required.
#[derive(Debug, Deserialize)]
pub struct NanoswarmConfig {
    /// Primary model, with optional fallbacks.
    pub model: ModelConfig,
    /// Orchestrator limits and budgets.
    #[serde(default)]
    pub swarm: SwarmConfig,
    /// State TTLs and persistence.
    #[serde(default)]
    pub state: StateSection,
    /// Builtin tool settings.
    #[serde(default)]
    pub tools: BuiltinToolsConfig,
}

/// The `[state]` table: record TTLs plus where the snapshot lives.
#[derive(Debug, Deserialize)]
pub struct StateSection {
    /// Record lifetimes.
    #[serde(flatten)]
    pub ttl: StateConfig,
    /// Snapshot file loaded at start and written at exit. `None` keeps
    /// state in memory only.
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: Option<PathBuf>,
}

fn default_snapshot_path() -> Option<PathBuf> {
    Some(PathBuf::from("nanoswarm_state/snapshot.json"))
}

impl Default for StateSection {
    fn default() -> Self {
        Self {
            ttl: StateConfig::default(),
            snapshot_path: default_snapshot_path(),
        }
    }
}

impl NanoswarmConfig {
    /// Parses a TOML document.
    pub fn parse(text: &str) -> SwarmResult<Self> {
        toml::from_str(text).map_err(|e| SwarmError::Config(e.to_string()))
    }

    /// Reads and parses `path`.
    pub async fn load(path: &Path) -> SwarmResult<Self> {
        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            SwarmError::Config(format!("failed to read config file '{}': {e}", path.display()))
        })?;
        Self::parse(&text)
    }
}

/// Turns `key=value` pairs into session metadata. Values that parse as
/// JSON keep their type; anything else is stored as a string.
pub fn parse_meta(pairs: &[String]) -> SwarmResult<HashMap<String, Value>> {
    pairs
        .iter()
        .map(|pair| {
            let (key, raw) = pair
                .split_once('=')
                .ok_or_else(|| SwarmError::Config(format!("metadata '{pair}' is not key=value")))?;
            let key = key.trim();
            if key.is_empty() {
                return Err(SwarmError::Config(format!("metadata '{pair}' has an empty key")));
            }
            let value =
                serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
            Ok((key.to_string(), value))
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use nanoswarm_agent::LlmProvider;

    #[test]
    fn test_model_table_alone_is_enough() {
        let cfg = NanoswarmConfig::parse(
            r#"
            [model]
            provider = "claude"
            model_id = "claude-sonnet-4-5"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.model.provider, LlmProvider::Claude);
        assert_eq!(cfg.swarm.global_limit, 12);
        assert_eq!(cfg.state.ttl.session_ttl_secs, 86_400);
        assert_eq!(
            cfg.state.snapshot_path.as_deref(),
            Some(Path::new("nanoswarm_state/snapshot.json"))
        );
        assert!(cfg.tools.http_fetch);
        assert!(cfg.tools.web_search);
        assert!(cfg.tools.code_runner);
        assert_eq!(cfg.tools.code_timeout_secs, 30);
    }

    #[test]
    fn test_sections_override_defaults() {
        let cfg = NanoswarmConfig::parse(
            r#"
            [model]
            provider = "vllm"
            model_id = "qwen"
            api_base_url = "http://gpu-box:8000"

            [swarm]
            mid_limit = 2
            flat_limit = 4

            [state]
            session_ttl_secs = 60
            snapshot_path = "/tmp/ns.json"

            [tools]
            http_fetch = false
            code_runner = false
            "#,
        )
        .unwrap();
        assert_eq!(cfg.model.base_url(), "http://gpu-box:8000");
        assert_eq!(cfg.swarm.mid_limit, 2);
        assert_eq!(cfg.swarm.flat_limit, 4);
        assert_eq!(cfg.swarm.stage_limit, 4);
        assert_eq!(cfg.state.ttl.session_ttl_secs, 60);
        assert_eq!(cfg.state.ttl.lock_ttl_secs, 30);
        assert_eq!(cfg.state.snapshot_path.as_deref(), Some(Path::new("/tmp/ns.json")));
        assert!(!cfg.tools.http_fetch);
        assert!(!cfg.tools.code_runner);
        assert!(cfg.tools.web_search);
    }

    #[test]
    fn test_missing_model_is_a_config_error() {
        let err = NanoswarmConfig::parse("[swarm]\nmid_limit = 2\n").unwrap_err();
        assert!(matches!(err, SwarmError::Config(_)));
    }

    #[tokio::test]
    async fn test_load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = NanoswarmConfig::load(&dir.path().join("absent.toml"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("absent.toml"));
    }

    #[test]
    fn test_parse_meta_keeps_json_types() {
        let meta = parse_meta(&[
            "user=alice".to_string(),
            "priority=3".to_string(),
            "tags=[\"a\",\"b\"]".to_string(),
            "note=a=b".to_string(),
        ])
        .unwrap();
        assert_eq!(meta["user"], Value::String("alice".into()));
        assert_eq!(meta["priority"], serde_json::json!(3));
        assert_eq!(meta["tags"], serde_json::json!(["a", "b"]));
        assert_eq!(meta["note"], Value::String("a=b".into()));
    }

    #[test]
    fn test_parse_meta_rejects_bare_words() {
        assert!(parse_meta(&["oops".to_string()]).is_err());
        assert!(parse_meta(&["=1".to_string()]).is_err());
    }
}
