use crate::tool::{Tool, ToolDescriptor, ToolOutcome, ToolReport};
use nanoswarm_core::ToolCall;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Error code for a call naming a tool that is not registered.
pub const TOOL_NOT_FOUND: &str = "tool_not_found";
/// Error code for arguments that are not a JSON object.
pub const INVALID_ARGUMENTS: &str = "invalid_arguments";

/// Central registry for all available tools.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Registers a tool, replacing any tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.descriptor().name.clone();
        info!(tool = %name, "Registered tool");
        self.tools.insert(name, tool);
    }

    /// Looks up a tool by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// All descriptors, sorted by name so schemas are stable across calls.
    pub fn list_descriptors(&self) -> Vec<&ToolDescriptor> {
        let mut out: Vec<_> = self.tools.values().map(|t| t.descriptor()).collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether no tools are registered.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Runs a model-requested call. Never fails: an unknown tool or bad
    /// arguments come back as a [`ToolOutcome::Failure`].
    pub async fn dispatch(&self, call: &ToolCall) -> ToolReport {
        let start = Instant::now();
        let outcome = match self.tools.get(&call.name) {
            None => {
                warn!(tool = %call.name, call_id = %call.id, "Unknown tool requested");
                ToolOutcome::failed(format!("Unknown tool: {}", call.name), TOOL_NOT_FOUND)
            }
            Some(tool) => match &call.arguments {
                serde_json::Value::Object(_) => tool.run(&call.arguments).await,
                serde_json::Value::Null => {
                    tool.run(&serde_json::Value::Object(serde_json::Map::new()))
                        .await
                }
                serde_json::Value::String(raw) => ToolOutcome::failed(
                    format!("Invalid tool arguments JSON: {raw}"),
                    INVALID_ARGUMENTS,
                ),
                other => ToolOutcome::failed(
                    format!("Tool arguments must be a JSON object, got: {other}"),
                    INVALID_ARGUMENTS,
                ),
            },
        };
        let duration_ms = start.elapsed().as_millis() as u64;
        debug!(
            tool = %call.name,
            call_id = %call.id,
            success = outcome.is_success(),
            duration_ms,
            "Tool dispatched"
        );
        ToolReport {
            tool_name: call.name.clone(),
            call_id: call.id.clone(),
            outcome,
            duration_ms,
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    struct Echo {
        descriptor: ToolDescriptor,
    }

    impl Echo {
        fn new() -> Self {
            Self {
                descriptor: ToolDescriptor {
                    name: "echo".into(),
                    description: "Echo the text argument".into(),
                    parameters_schema: json!({"type": "object"}),
                },
            }
        }
    }

    #[async_trait]
    impl Tool for Echo {
        fn descriptor(&self) -> &ToolDescriptor {
            &self.descriptor
        }

        async fn run(&self, args: &serde_json::Value) -> ToolOutcome {
            match args["text"].as_str() {
                Some(t) => ToolOutcome::ok(t),
                None => ToolOutcome::failed("missing 'text'", "invalid_arguments"),
            }
        }
    }

    fn registry() -> ToolRegistry {
        let mut r = ToolRegistry::new();
        r.register(Arc::new(Echo::new()));
        r
    }

    #[tokio::test]
    async fn test_dispatch_known_tool() {
        let report = registry()
            .dispatch(&ToolCall::new("c1", "echo", json!({"text": "hi"})))
            .await;
        assert!(report.success());
        assert_eq!(report.outcome.output(), "hi");
        assert_eq!(report.call_id, "c1");
    }

    #[tokio::test]
    async fn test_unknown_tool_is_structured_failure() {
        let report = registry()
            .dispatch(&ToolCall::new("c2", "teleport", json!({})))
            .await;
        assert!(!report.success());
        assert_eq!(report.outcome.output(), "Unknown tool: teleport");
        assert_eq!(report.outcome.error(), Some(TOOL_NOT_FOUND));
    }

    #[tokio::test]
    async fn test_unparseable_arguments() {
        let report = registry()
            .dispatch(&ToolCall::new("c3", "echo", json!("{\"text\":")))
            .await;
        assert_eq!(report.outcome.error(), Some(INVALID_ARGUMENTS));
        assert!(report.outcome.output().starts_with("Invalid tool arguments JSON"));
    }

    #[tokio::test]
    async fn test_null_arguments_become_empty_object() {
        let report = registry()
            .dispatch(&ToolCall::new("c4", "echo", serde_json::Value::Null))
            .await;
        assert_eq!(report.outcome.output(), "missing 'text'");
    }

    #[test]
    fn test_descriptors_sorted() {
        let r = registry();
        assert_eq!(r.len(), 1);
        assert!(!r.is_empty());
        assert_eq!(r.list_descriptors()[0].name, "echo");
        assert!(r.get("echo").is_some());
        assert!(r.get("nope").is_none());
    }
}
