use std::time::Duration;
use thiserror::Error;

/// A convenience `Result` alias using [`SwarmError`].
pub type SwarmResult<T> = Result<T, SwarmError>;

/// Top-level error type shared by every nanoswarm crate.
///
/// Backend failures are split into distinct variants ([`SwarmError::Timeout`],
/// [`SwarmError::Connection`], [`SwarmError::Api`]) so retry decisions can
/// match on the variant instead of parsing message text.
#[derive(Error, Debug)]
pub enum SwarmError {
    /// An error originating from a worker or the agentic loop.
    #[error("Agent error: {0}")]
    Agent(String),

    /// A call did not finish within its deadline.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The remote end could not be reached or dropped the connection.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The LLM backend answered with a non-success HTTP status.
    #[error("API error {status}: {message}")]
    Api {
        /// HTTP status code returned by the backend.
        status: u16,
        /// Response body or provider error message.
        message: String,
        /// Server-provided `retry-after` hint, when present.
        retry_after: Option<Duration>,
    },

    /// Any other outbound HTTP failure (bad body, decode error, ...).
    #[error("HTTP error: {0}")]
    Http(String),

    /// A tool could not be set up or registered.
    #[error("Tool error: {0}")]
    Tool(String),

    /// The planner produced an unusable dependency plan.
    #[error("Planning error: {0}")]
    Planning(String),

    /// A state-store operation failed.
    #[error("State error: {0}")]
    State(String),

    /// A keyed record (session, task, agent) does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// An error from an orchestrator tier.
    #[error("Orchestrator error: {0}")]
    Orchestrator(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SwarmError {
    /// Returns `true` for errors caused by a deadline being exceeded.
    pub fn is_timeout(&self) -> bool {
        matches!(self, SwarmError::Timeout(_))
    }

    /// The HTTP status carried by an [`SwarmError::Api`] error.
    pub fn status(&self) -> Option<u16> {
        match self {
            SwarmError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}
