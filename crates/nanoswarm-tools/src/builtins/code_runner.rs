use crate::tool::{Tool, ToolDescriptor, ToolOutcome};
use async_trait::async_trait;
use nanoswarm_core::truncate_with_marker;
use serde_json::Value;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{info, warn};

/// Per-stream cap on captured output.
pub const MAX_OUTPUT_CHARS: usize = 8000;

/// Substrings that get a script refused before it runs. Matched
/// case-insensitively.
const BLOCKED_PATTERNS: &[&str] = &[
    "subprocess",
    "os.system",
    "shutil.rmtree",
    "socket",
    "__import__",
    "open('/etc",
    "open('/proc",
    "open('/sys",
];

/// Runs model-written Python in a child process.
///
/// Each run gets a fresh temporary directory as its working directory,
/// which is removed afterwards. The child is killed when the timeout fires.
pub struct CodeRunnerTool {
    descriptor: ToolDescriptor,
    interpreter: String,
    timeout: Duration,
}

impl CodeRunnerTool {
    /// Runs scripts with `python3`, killing them after `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self {
            descriptor: ToolDescriptor {
                name: "run_python".to_string(),
                description: format!(
                    "Execute Python code and return stdout/stderr output. Use for calculations, \
                     data processing, testing logic, or validating algorithms. Code runs in an \
                     isolated subprocess with a {}-second timeout.",
                    timeout.as_secs()
                ),
                parameters_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "code": {
                            "type": "string",
                            "description": "Python code to execute"
                        },
                        "description": {
                            "type": "string",
                            "description": "Brief description of what this code does"
                        }
                    },
                    "required": ["code"]
                }),
            },
            interpreter: "python3".to_string(),
            timeout,
        }
    }

    /// Uses another interpreter binary.
    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = interpreter.into();
        self
    }
}

#[async_trait]
impl Tool for CodeRunnerTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn run(&self, args: &Value) -> ToolOutcome {
        let code = args["code"].as_str().unwrap_or_default();
        if code.trim().is_empty() {
            return ToolOutcome::failed("Empty code", "invalid_arguments");
        }
        if let Some(pattern) = blocked_pattern(code) {
            warn!(pattern, "run_python refused a script");
            return ToolOutcome::failed(
                format!("BLOCKED: Blocked pattern detected: {pattern}"),
                "blocked",
            );
        }

        let workdir = match tempfile::Builder::new().prefix("nanoswarm_").tempdir() {
            Ok(d) => d,
            Err(e) => {
                return ToolOutcome::failed(format!("Execution error: {e}"), "io_error")
            }
        };
        let script = workdir.path().join("main.py");
        if let Err(e) = tokio::fs::write(&script, dedent(code)).await {
            return ToolOutcome::failed(format!("Execution error: {e}"), "io_error");
        }

        info!(interpreter = %self.interpreter, "run_python");
        let child = Command::new(&self.interpreter)
            .arg(&script)
            .current_dir(workdir.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();
        let child = match child {
            Ok(c) => c,
            Err(e) => {
                return ToolOutcome::failed(
                    format!("Execution error: cannot start '{}': {e}", self.interpreter),
                    "io_error",
                )
            }
        };

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(out)) => out,
            Ok(Err(e)) => return ToolOutcome::failed(format!("Execution error: {e}"), "io_error"),
            Err(_) => {
                return ToolOutcome::failed(
                    format!("TIMEOUT: Code exceeded {}s limit", self.timeout.as_secs_f64()),
                    "timeout",
                )
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let (stdout, stderr) = (stdout.trim(), stderr.trim());
        let exit = output
            .status
            .code()
            .map_or_else(|| "killed".to_string(), |c| c.to_string());

        let mut parts = Vec::new();
        if let Some(description) = args["description"].as_str().filter(|s| !s.is_empty()) {
            parts.push(format!("Code: {description}"));
        }
        if !stdout.is_empty() {
            parts.push(format!("STDOUT:\n{}", truncate_with_marker(stdout, MAX_OUTPUT_CHARS)));
        }
        if !stderr.is_empty() {
            parts.push(format!("STDERR:\n{}", truncate_with_marker(stderr, MAX_OUTPUT_CHARS)));
        }
        parts.push(format!("Exit code: {exit}"));
        let report = parts.join("\n\n");

        if output.status.success() {
            ToolOutcome::ok(report)
        } else {
            ToolOutcome::failed(report, format!("exit_{exit}"))
        }
    }
}

fn blocked_pattern(code: &str) -> Option<&'static str> {
    let lower = code.to_lowercase();
    BLOCKED_PATTERNS.iter().copied().find(|p| lower.contains(p))
}

/// Strips the indentation every non-blank line shares, so snippets indented
/// inside a JSON string still parse.
fn dedent(code: &str) -> String {
    let margin = code
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);
    code.lines()
        .map(|l| l.get(margin..).unwrap_or_else(|| l.trim_start()))
        .collect::<Vec<_>>()
        .join("\n")
}
