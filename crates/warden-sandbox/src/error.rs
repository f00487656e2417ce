//! Error types for sandbox spawning.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SandboxError>;

#[derive(Debug, Error)]
pub enum SandboxError {
    /// The requested backend cannot run on this host.
    #[error("sandbox backend unavailable: {0}")]
    Unavailable(&'static str),

    /// The agent command list was empty or malformed.
    #[error("invalid sandbox command: {0}")]
    InvalidCommand(String),

    /// The child failed to spawn.
    #[error("spawn failed: {0}")]
    Spawn(std::io::Error),

    /// Stdio plumbing failed after spawn.
    #[error("sandbox io error: {0}")]
    Io(#[from] std::io::Error),
}
