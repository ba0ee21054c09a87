use crate::tool::{Tool, ToolDescriptor, ToolOutcome};
use async_trait::async_trait;
use nanoswarm_core::{SwarmError, SwarmResult};
use serde_json::Value;
use std::time::Duration;
use tracing::info;

/// DuckDuckGo Instant Answer API. Needs no key.
pub const DEFAULT_SEARCH_ENDPOINT: &str = "https://api.duckduckgo.com/";

const DEFAULT_MAX_RESULTS: u64 = 5;
const MAX_FACTS: usize = 5;

/// Web search through the DuckDuckGo Instant Answer API.
///
/// Returns the abstract, related topics and infobox facts as plain text.
pub struct WebSearchTool {
    descriptor: ToolDescriptor,
    client: reqwest::Client,
    endpoint: String,
}

impl WebSearchTool {
    /// Builds the tool with the given per-request timeout.
    pub fn new(timeout: Duration) -> SwarmResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("nanoswarm/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SwarmError::Tool(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            descriptor: ToolDescriptor {
                name: "web_search".to_string(),
                description: "Search the web for current information, facts, documentation, or news. \
                              Use when you need information beyond your training data."
                    .to_string(),
                parameters_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "The search query to look up"
                        },
                        "max_results": {
                            "type": "integer",
                            "description": "Maximum number of results to return (1-10)",
                            "default": DEFAULT_MAX_RESULTS
                        }
                    },
                    "required": ["query"]
                }),
            },
            client,
            endpoint: DEFAULT_SEARCH_ENDPOINT.to_string(),
        })
    }

    /// Queries `endpoint` instead of the public API.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn run(&self, args: &Value) -> ToolOutcome {
        let query = args["query"].as_str().unwrap_or_default().trim();
        if query.is_empty() {
            return ToolOutcome::failed("Empty query", "invalid_arguments");
        }
        let max_results = args["max_results"]
            .as_u64()
            .unwrap_or(DEFAULT_MAX_RESULTS)
            .clamp(1, 10) as usize;
        info!(query = %query, max_results, "web_search");

        let response = match self
            .client
            .get(&self.endpoint)
            .query(&[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                return ToolOutcome::failed(format!("Search failed: {e}"), "timeout")
            }
            Err(e) => return ToolOutcome::failed(format!("Search failed: {e}"), "http_error"),
        };

        let status = response.status();
        if !status.is_success() {
            return ToolOutcome::failed(
                format!("Search failed: HTTP {}", status.as_u16()),
                format!("http_{}", status.as_u16()),
            );
        }
        // The API answers with a javascript content type, so decode by hand.
        let data: Value = match response.bytes().await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(v) => v,
                Err(e) => {
                    return ToolOutcome::failed(
                        format!("Search failed: bad response: {e}"),
                        "http_error",
                    )
                }
            },
            Err(e) => return ToolOutcome::failed(format!("Search failed: {e}"), "http_error"),
        };

        let sections = answer_sections(&data, max_results);
        if sections.is_empty() {
            ToolOutcome::ok(format!("No results found for: '{query}'"))
        } else {
            ToolOutcome::ok(format!(
                "Search results for '{query}':\n\n{}",
                sections.join("\n\n")
            ))
        }
    }
}

/// Abstract first, then up to `max_results` entries in total, then infobox
/// facts.
fn answer_sections(data: &Value, max_results: usize) -> Vec<String> {
    let mut sections = Vec::new();

    if let Some(summary) = data["Abstract"].as_str().filter(|s| !s.is_empty()) {
        let source = data["AbstractURL"].as_str().unwrap_or_default();
        sections.push(format!("SUMMARY: {summary}\nSOURCE: {source}"));
    }

    if let Some(topics) = data["RelatedTopics"].as_array() {
        for topic in topics.iter().take(max_results) {
            if sections.len() >= max_results {
                break;
            }
            if let Some(text) = topic["Text"].as_str().filter(|s| !s.is_empty()) {
                sections.push(format!("- {text}"));
            }
        }
    }

    if let Some(items) = data["Infobox"]["content"].as_array() {
        let facts: Vec<String> = items
            .iter()
            .take(MAX_FACTS)
            .filter_map(|item| {
                let label = item["label"].as_str().filter(|s| !s.is_empty())?;
                let value = match &item["value"] {
                    Value::String(s) if !s.is_empty() => s.clone(),
                    Value::Number(n) => n.to_string(),
                    _ => return None,
                };
                Some(format!("{label}: {value}"))
            })
            .collect();
        if !facts.is_empty() {
            sections.push(format!("KEY FACTS:\n{}", facts.join("\n")));
        }
    }

    sections
}
