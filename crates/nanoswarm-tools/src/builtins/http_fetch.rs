use crate::tool::{Tool, ToolDescriptor, ToolOutcome};
use async_trait::async_trait;
use nanoswarm_core::{truncate_with_marker, SwarmError, SwarmResult};
use regex::Regex;
use std::net::IpAddr;
use std::time::Duration;
use tracing::info;

/// Bodies longer than this are cut before being handed to the model.
pub const MAX_CONTENT_CHARS: usize = 8000;

/// HTTP fetch tool. GET or POST a URL and return its (text) body.
pub struct HttpFetchTool {
    descriptor: ToolDescriptor,
    client: reqwest::Client,
    allow_private_hosts: bool,
    script_re: Regex,
    tag_re: Regex,
    space_re: Regex,
}

impl HttpFetchTool {
    /// Builds the tool with the given per-request timeout.
    pub fn new(timeout: Duration) -> SwarmResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(concat!("nanoswarm/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SwarmError::Tool(format!("Failed to create HTTP client: {e}")))?;
        let compile =
            |p: &str| Regex::new(p).map_err(|e| SwarmError::Tool(format!("bad pattern {p}: {e}")));

        Ok(Self {
            descriptor: ToolDescriptor {
                name: "http_fetch".to_string(),
                description: "Fetch content from a URL via HTTP GET or POST. HTML is reduced to text."
                    .to_string(),
                parameters_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "url": {
                            "type": "string",
                            "description": "The URL to fetch"
                        },
                        "method": {
                            "type": "string",
                            "enum": ["GET", "POST"],
                            "description": "HTTP method (default: GET)"
                        },
                        "headers": {
                            "type": "object",
                            "description": "Optional HTTP headers as key-value pairs"
                        },
                        "body": {
                            "type": "string",
                            "description": "Optional request body (for POST)"
                        }
                    },
                    "required": ["url"]
                }),
            },
            client,
            allow_private_hosts: false,
            script_re: compile(r"(?is)<(script|style)[^>]*>.*?</(script|style)>")?,
            tag_re: compile(r"(?s)<[^>]+>")?,
            space_re: compile(r"\s{2,}")?,
        })
    }

    /// Permits requests to loopback and private-network hosts.
    pub fn allow_private_hosts(mut self, allow: bool) -> Self {
        self.allow_private_hosts = allow;
        self
    }

    fn strip_html(&self, html: &str) -> String {
        let no_scripts = self.script_re.replace_all(html, " ");
        let no_tags = self.tag_re.replace_all(&no_scripts, " ");
        self.space_re.replace_all(&no_tags, " ").trim().to_string()
    }
}

#[async_trait]
impl Tool for HttpFetchTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn run(&self, args: &serde_json::Value) -> ToolOutcome {
        let url = args["url"].as_str().unwrap_or_default();
        if url.is_empty() {
            return ToolOutcome::failed("Empty URL", "invalid_arguments");
        }

        let parsed = match reqwest::Url::parse(url) {
            Ok(u) => u,
            Err(e) => return ToolOutcome::failed(format!("Invalid URL '{url}': {e}"), "invalid_url"),
        };

        match parsed.scheme() {
            "http" | "https" => {}
            scheme => {
                return ToolOutcome::failed(
                    format!("Unsupported scheme '{scheme}'. Only http/https allowed."),
                    "invalid_url",
                )
            }
        }

        if let Some(host) = parsed.host_str() {
            if !self.allow_private_hosts && is_private_host(host) {
                return ToolOutcome::failed(
                    format!("Access denied: '{host}' is a private/internal address"),
                    "blocked_host",
                );
            }
        }

        let method = args["method"].as_str().unwrap_or("GET").to_uppercase();
        info!(url = %url, method = %method, "HTTP fetch");

        let mut request = match method.as_str() {
            "GET" => self.client.get(parsed),
            "POST" => self.client.post(parsed),
            _ => {
                return ToolOutcome::failed(
                    format!("Unsupported method '{method}'. Use GET or POST."),
                    "invalid_arguments",
                )
            }
        };

        if let Some(headers) = args["headers"].as_object() {
            for (key, value) in headers {
                if let Some(v) = value.as_str() {
                    request = request.header(key.as_str(), v);
                }
            }
        }
        if method == "POST" {
            if let Some(body) = args["body"].as_str() {
                request = request.body(body.to_string());
            }
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                return ToolOutcome::failed(format!("HTTP request timed out: {e}"), "timeout")
            }
            Err(e) => return ToolOutcome::failed(format!("HTTP request failed: {e}"), "http_error"),
        };

        let status = response.status();
        let is_html = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("html"));

        let body = match response.text().await {
            Ok(b) => b,
            Err(e) => {
                return ToolOutcome::failed(format!("Failed to read response body: {e}"), "http_error")
            }
        };
        let text = if is_html { self.strip_html(&body) } else { body };
        let text = truncate_with_marker(&text, MAX_CONTENT_CHARS);

        if status.is_success() {
            ToolOutcome::ok(format!("HTTP {} from {url}:\n\n{text}", status.as_u16()))
        } else {
            ToolOutcome::failed(
                format!("HTTP {} from {url}:\n\n{text}", status.as_u16()),
                format!("http_{}", status.as_u16()),
            )
        }
    }
}

/// Whether `host` names a loopback, private, link-local or internal address.
fn is_private_host(host: &str) -> bool {
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = host.parse::<IpAddr>() {
        return match ip {
            IpAddr::V4(v4) => {
                v4.is_loopback()
                    || v4.is_private()
                    || v4.is_link_local()
                    || v4.is_unspecified()
                    || v4.is_broadcast()
            }
            IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified() || (v6.segments()[0] & 0xfe00) == 0xfc00,
        };
    }
    let lower = host.to_ascii_lowercase();
    lower == "localhost"
        || lower.ends_with(".localhost")
        || lower.ends_with(".local")
        || lower.ends_with(".internal")
}
