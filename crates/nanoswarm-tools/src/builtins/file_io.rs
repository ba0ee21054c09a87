use crate::tool::{Tool, ToolDescriptor, ToolOutcome};
use async_trait::async_trait;
use nanoswarm_core::{SwarmError, SwarmResult};
use std::path::{Component, Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::info;

const MAX_READ_BYTES: u64 = 2 * 1024 * 1024;

/// Reads, writes, appends and lists files inside one workspace directory.
///
/// Paths are relative to the workspace. Absolute paths and `..` components
/// are refused so agents cannot reach outside it.
pub struct FileIoTool {
    descriptor: ToolDescriptor,
    workspace: PathBuf,
}

impl FileIoTool {
    /// Creates the tool, creating `workspace` if it does not exist.
    pub fn new(workspace: impl Into<PathBuf>) -> SwarmResult<Self> {
        let workspace = workspace.into();
        std::fs::create_dir_all(&workspace)?;
        Ok(Self {
            descriptor: ToolDescriptor {
                name: "file_io".to_string(),
                description: "Read, write, append, or list files in the shared agent workspace. \
                              Use it to persist results or share data between tasks."
                    .to_string(),
                parameters_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "operation": {
                            "type": "string",
                            "enum": ["read", "write", "append", "list", "exists"],
                            "description": "Operation to perform"
                        },
                        "path": {
                            "type": "string",
                            "description": "Relative path within the workspace"
                        },
                        "content": {
                            "type": "string",
                            "description": "Content for write/append"
                        }
                    },
                    "required": ["operation", "path"]
                }),
            },
            workspace,
        })
    }

    /// The sandbox root.
    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    fn resolve(&self, relative: &str) -> SwarmResult<PathBuf> {
        let rel = Path::new(relative);
        for component in rel.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => {
                    return Err(SwarmError::Tool(format!(
                        "Path escape attempt blocked: {relative}"
                    )))
                }
            }
        }
        Ok(self.workspace.join(rel))
    }

    async fn read(&self, path: &Path, rel_path: &str) -> ToolOutcome {
        match tokio::fs::metadata(path).await {
            Ok(m) if !m.is_file() => {
                return ToolOutcome::failed(format!("'{rel_path}' is not a file"), "not_a_file")
            }
            Ok(m) if m.len() > MAX_READ_BYTES => {
                return ToolOutcome::failed(
                    format!("'{rel_path}' is too large ({} bytes)", m.len()),
                    "too_large",
                )
            }
            Ok(_) => {}
            Err(_) => return ToolOutcome::failed(format!("File not found: {rel_path}"), "not_found"),
        }
        match tokio::fs::read_to_string(path).await {
            Ok(text) => ToolOutcome::ok(format!("Content of {rel_path}:\n\n{text}")),
            Err(e) => ToolOutcome::failed(format!("Cannot read '{rel_path}': {e}"), "io_error"),
        }
    }

    async fn write(&self, path: &Path, rel_path: &str, content: &str, append: bool) -> ToolOutcome {
        if let Some(parent) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return ToolOutcome::failed(format!("Cannot create '{rel_path}': {e}"), "io_error");
            }
        }
        let result = if append {
            match tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await
            {
                Ok(mut f) => f.write_all(content.as_bytes()).await,
                Err(e) => Err(e),
            }
        } else {
            tokio::fs::write(path, content).await
        };
        let verb = if append { "Appended" } else { "Written" };
        match result {
            Ok(()) => ToolOutcome::ok(format!(
                "{verb} {} chars to {rel_path}",
                content.chars().count()
            )),
            Err(e) => ToolOutcome::failed(format!("Cannot write '{rel_path}': {e}"), "io_error"),
        }
    }

    async fn list(&self, path: &Path, rel_path: &str) -> ToolOutcome {
        let target = if path.is_dir() {
            path.to_path_buf()
        } else {
            path.parent().map_or_else(|| self.workspace.clone(), Path::to_path_buf)
        };
        let mut dir = match tokio::fs::read_dir(&target).await {
            Ok(d) => d,
            Err(e) => return ToolOutcome::failed(format!("Cannot list '{rel_path}': {e}"), "io_error"),
        };
        let mut entries = Vec::new();
        loop {
            match dir.next_entry().await {
                Ok(Some(entry)) => {
                    let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
                    let tag = if is_dir { "[DIR] " } else { "[FILE]" };
                    entries.push(format!("{tag} {}", entry.file_name().to_string_lossy()));
                }
                Ok(None) => break,
                Err(e) => {
                    return ToolOutcome::failed(format!("Cannot list '{rel_path}': {e}"), "io_error")
                }
            }
        }
        entries.sort();
        ToolOutcome::ok(format!("Contents of {rel_path}:\n{}", entries.join("\n")))
    }
}

#[async_trait]
impl Tool for FileIoTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn run(&self, args: &serde_json::Value) -> ToolOutcome {
        let operation = args["operation"].as_str().unwrap_or_default();
        let rel_path = args["path"].as_str().unwrap_or_default();
        if rel_path.is_empty() {
            return ToolOutcome::failed("Empty path", "invalid_arguments");
        }
        let path = match self.resolve(rel_path) {
            Ok(p) => p,
            Err(e) => return ToolOutcome::failed(e.to_string(), "permission_denied"),
        };
        info!(operation, path = %rel_path, "file_io");

        match operation {
            "read" => self.read(&path, rel_path).await,
            "write" | "append" => {
                let content = args["content"].as_str().unwrap_or_default();
                self.write(&path, rel_path, content, operation == "append")
                    .await
            }
            "list" => self.list(&path, rel_path).await,
            "exists" => {
                let exists = tokio::fs::try_exists(&path).await.unwrap_or(false);
                let word = if exists { "exists" } else { "does not exist" };
                ToolOutcome::ok(format!("{rel_path}: {word}"))
            }
            other => ToolOutcome::failed(
                format!("Unknown operation '{other}'. Use read, write, append, list or exists."),
                "invalid_arguments",
            ),
        }
    }
}
