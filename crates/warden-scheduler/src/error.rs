//! Error types for the scheduler.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SchedulerError>;

#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Cron expression failed to parse.
    #[error("invalid cron expression '{expr}': {reason}")]
    InvalidCron { expr: String, reason: String },

    /// Referenced job does not exist.
    #[error("unknown job: {0}")]
    UnknownJob(String),

    /// The delivery channel to the router is gone.
    #[error("delivery channel closed")]
    DeliveryClosed,

    /// Journal failure passthrough.
    #[error("audit error: {0}")]
    Audit(#[from] warden_audit::AuditError),

    /// Time zone name was not a valid IANA zone.
    #[error("unknown time zone: {0}")]
    UnknownTimeZone(String),
}
