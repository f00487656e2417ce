//! # Warden Audit
//!
//! Append-only storage for the Warden host: the audit journal (every
//! dispatched action, scan verdict, sandbox spawn, and scheduler decision)
//! and the per-session conversation journal. Both live in one sled
//! database under separate trees.
//!
//! The append-only discipline is the point: the journal is the evidence
//! trail for a host that runs untrusted agents, so the exposed interface
//! has no mutation beyond `append`.
//!
//! ```rust
//! use warden_audit::{AuditEntry, AuditFilter, AuditJournal, AuditOutcome};
//!
//! let journal = AuditJournal::temporary().unwrap();
//! journal
//!     .append(
//!         AuditEntry::new("ipc_taint_blocked", AuditOutcome::Blocked)
//!             .with_session("team:alice:dm"),
//!     )
//!     .unwrap();
//!
//! let blocked = journal
//!     .query(&AuditFilter {
//!         action: Some("ipc_taint_blocked".into()),
//!         ..Default::default()
//!     })
//!     .unwrap();
//! assert_eq!(blocked.len(), 1);
//! ```

pub mod conversations;
pub mod entry;
pub mod error;
pub mod journal;

pub use conversations::{ConversationJournal, ConversationTurn};
pub use entry::{redact_args, AuditEntry, AuditFilter, AuditOutcome, AuditRecord};
pub use error::{AuditError, Result};
pub use journal::AuditJournal;
