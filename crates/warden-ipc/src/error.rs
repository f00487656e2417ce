//! Error types for the IPC crate.

use thiserror::Error;

use crate::frame::FrameError;

#[derive(Debug, Error)]
pub enum IpcError {
    /// Wire framing failure; the connection must be dropped.
    #[error("framing error: {0}")]
    Frame(#[from] FrameError),

    /// Frame payload was not valid JSON.
    #[error("request is not valid JSON: {0}")]
    Parse(String),

    /// Envelope named no registered action.
    #[error("unknown action: {0}")]
    UnknownAction(String),

    /// Strict payload decode or value-constraint failure.
    #[error("invalid payload for '{action}': {detail}")]
    Validation { action: String, detail: String },

    /// Too many delegations in flight.
    #[error("delegation concurrency limit reached ({0} in flight)")]
    DelegationBusy(usize),

    /// Caller is already at the maximum delegation depth.
    #[error("Max delegation depth {max} reached (caller depth {depth})")]
    DelegationDepth { depth: u32, max: u32 },

    /// Socket failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error surface for capability handlers.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The capability is not wired in this deployment.
    #[error("capability unavailable: {0}")]
    Unavailable(&'static str),

    /// The request referenced something that does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request was refused by policy.
    #[error("denied: {0}")]
    Denied(String),

    /// The handler failed mid-flight.
    #[error("{0}")]
    Failed(String),
}

impl From<warden_core::CoreError> for HandlerError {
    fn from(err: warden_core::CoreError) -> Self {
        HandlerError::Failed(err.to_string())
    }
}

impl From<std::io::Error> for HandlerError {
    fn from(err: std::io::Error) -> Self {
        HandlerError::Failed(err.to_string())
    }
}

impl From<warden_audit::AuditError> for HandlerError {
    fn from(err: warden_audit::AuditError) -> Self {
        HandlerError::Failed(err.to_string())
    }
}

pub type HandlerResult<T> = std::result::Result<T, HandlerError>;
