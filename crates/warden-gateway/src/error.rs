//! Gateway error taxonomy, mapped onto HTTP status codes in the server.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Malformed request (empty messages, bad session id): 400.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Startup configuration rejected (TCP without a bearer token,
    /// non-loopback bind).
    #[error("gateway startup refused: {0}")]
    Startup(String),

    /// Sandbox could not spawn or supervise the agent: 500.
    #[error("sandbox failure: {0}")]
    Sandbox(String),

    /// The agent ran and failed (nonzero exit or timeout): 500 with a
    /// diagnosis.
    #[error("agent failed: {detail}")]
    AgentFailed { detail: String, suggestion: String },

    /// Anything else inside the pipeline: 500.
    #[error("internal error: {0}")]
    Internal(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
