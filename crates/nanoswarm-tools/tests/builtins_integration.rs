#![allow(clippy::unwrap_used, clippy::expect_used)]

use nanoswarm_core::ToolCall;
use nanoswarm_tools::{
    register_builtins, BuiltinToolsConfig, CodeRunnerTool, ToolRegistry, WebSearchTool,
    TOOL_NOT_FOUND,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn registry_in(dir: &TempDir) -> ToolRegistry {
    let config = BuiltinToolsConfig {
        workspace_dir: Some(dir.path().join("workspace")),
        http_fetch: true,
        http_timeout_secs: 5,
        allow_private_hosts: false,
        web_search: true,
        code_runner: true,
        code_timeout_secs: 5,
    };
    let mut registry = ToolRegistry::new();
    register_builtins(&mut registry, &config).unwrap();
    registry
}

// ---------------------------------------------------------------------------
// 1. Builtins register with stable, sorted schemas
// ---------------------------------------------------------------------------

#[test]
fn builtins_registered() {
    let dir = TempDir::new().unwrap();
    let registry = registry_in(&dir);
    let names: Vec<_> = registry
        .list_descriptors()
        .iter()
        .map(|d| d.name.clone())
        .collect();
    assert_eq!(names, vec!["file_io", "http_fetch", "run_python", "web_search"]);
    for d in registry.list_descriptors() {
        assert_eq!(d.parameters_schema["type"], "object");
    }
}

// ---------------------------------------------------------------------------
// 2. Two tasks share data through the workspace
// ---------------------------------------------------------------------------

#[tokio::test]
async fn file_io_shares_data_between_calls() {
    let dir = TempDir::new().unwrap();
    let registry = registry_in(&dir);

    let write = ToolCall::new(
        "w1",
        "file_io",
        json!({"operation": "write", "path": "out/result.md", "content": "# Findings"}),
    );
    assert!(registry.dispatch(&write).await.success());

    let read = ToolCall::new("r1", "file_io", json!({"operation": "read", "path": "out/result.md"}));
    let report = registry.dispatch(&read).await;
    assert!(report.success());
    assert!(report.outcome.output().contains("# Findings"));
}

// ---------------------------------------------------------------------------
// 3. Disabled builtins are absent and dispatch reports tool_not_found
// ---------------------------------------------------------------------------

#[tokio::test]
async fn disabled_builtins_are_unknown() {
    let config = BuiltinToolsConfig {
        workspace_dir: None,
        http_fetch: false,
        web_search: false,
        code_runner: false,
        ..BuiltinToolsConfig::default()
    };
    let mut registry = ToolRegistry::new();
    register_builtins(&mut registry, &config).unwrap();
    assert!(registry.is_empty());

    let report = registry
        .dispatch(&ToolCall::new("x", "file_io", json!({})))
        .await;
    assert_eq!(report.outcome.error(), Some(TOOL_NOT_FOUND));
}

// ---------------------------------------------------------------------------
// 4. Search and code execution through the registry
// ---------------------------------------------------------------------------

#[tokio::test]
async fn web_search_dispatches_to_instant_answers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("q", "rust borrow checker"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Abstract": "The borrow checker enforces ownership rules.",
            "AbstractURL": "https://doc.rust-lang.org/book/"
        })))
        .mount(&server)
        .await;

    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(
        WebSearchTool::new(Duration::from_secs(5))
            .unwrap()
            .with_endpoint(server.uri()),
    ));
    let report = registry
        .dispatch(&ToolCall::new(
            "s1",
            "web_search",
            json!({"query": "rust borrow checker", "max_results": 3}),
        ))
        .await;
    assert!(report.success());
    assert!(report
        .outcome
        .output()
        .contains("SUMMARY: The borrow checker enforces ownership rules."));
}

#[tokio::test]
async fn run_python_refuses_blocked_code_as_a_failure() {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(CodeRunnerTool::new(Duration::from_secs(5))));
    let report = registry
        .dispatch(&ToolCall::new(
            "c1",
            "run_python",
            json!({"code": "import os\nos.system('rm -rf /')"}),
        ))
        .await;
    assert!(!report.success());
    assert_eq!(report.outcome.error(), Some("blocked"));
}
