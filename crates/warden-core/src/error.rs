//! Error taxonomy for the host core, plus centralized failure diagnosis.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

/// Core error type for host operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Session id is neither a canonical UUID nor a valid colon tuple.
    #[error("invalid session id: {0}")]
    InvalidSessionId(String),

    /// A computed path escaped its workspace tier root.
    #[error("path escapes workspace tier: {0}")]
    PathEscape(String),

    /// A path component failed segment validation.
    #[error("invalid path segment: {0}")]
    InvalidSegment(String),

    /// Message rejected by attachment bounds.
    #[error("attachment limit exceeded: {0}")]
    AttachmentLimit(String),

    /// The inbound queue is at capacity.
    #[error("message queue full")]
    QueueFull,

    /// Journal failure passthrough.
    #[error("audit error: {0}")]
    Audit(#[from] warden_audit::AuditError),

    /// Filesystem failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration invalid at startup.
    #[error("configuration error: {0}")]
    Config(String),
}

/// A short diagnosis of a known failure signature with an actionable
/// suggestion for user-facing surfaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnosis {
    pub summary: &'static str,
    pub suggestion: &'static str,
}

/// Map an error string to a diagnosis.
///
/// Centralizes the signature matching so every surface (gateway errors,
/// CLI output, audit args) reports the same diagnosis for the same
/// underlying failure.
pub fn diagnose(error_text: &str) -> Diagnosis {
    let lower = error_text.to_lowercase();
    if lower.contains("timed out") || lower.contains("timeout") {
        Diagnosis {
            summary: "operation timed out",
            suggestion: "retry; if it persists, raise the per-call timeout or check upstream latency",
        }
    } else if lower.contains("dns") || lower.contains("enotfound") || lower.contains("name resolution") {
        Diagnosis {
            summary: "DNS resolution failed",
            suggestion: "check the upstream base URL and network configuration of the host",
        }
    } else if lower.contains("401") || lower.contains("unauthorized") || lower.contains("invalid api key") {
        Diagnosis {
            summary: "authentication rejected",
            suggestion: "check WARDEN_UPSTREAM_API_KEY / WARDEN_UPSTREAM_OAUTH_TOKEN",
        }
    } else if lower.contains("429") || lower.contains("rate limit") {
        Diagnosis {
            summary: "rate limited by upstream",
            suggestion: "back off and retry later; reduce scheduled job frequency if recurring",
        }
    } else if lower.contains("tls") || lower.contains("certificate") {
        Diagnosis {
            summary: "TLS handshake failed",
            suggestion: "check system certificates and the upstream URL scheme",
        }
    } else if lower.contains("connection refused") || lower.contains("econnrefused") {
        Diagnosis {
            summary: "connection refused",
            suggestion: "the upstream or socket peer is not listening; check that the service is running",
        }
    } else {
        Diagnosis {
            summary: "unrecognized failure",
            suggestion: "inspect the audit journal for the full error text",
        }
    }
}
