//! # Append-Only Audit Journal
//!
//! Sled-backed journal of every dispatched action, scan verdict, sandbox
//! spawn, and scheduler decision. Records are keyed by a monotonically
//! increasing id stored big-endian, so an ascending key scan is an
//! ascending id scan.
//!
//! ## Append-Only Discipline
//!
//! The public interface is `append` and `query`. There is deliberately no
//! update or delete: the journal is the system's evidence trail, and a
//! compromised handler must not be able to cover its tracks through this
//! interface. Retention is an operator concern (the tree can be snapshotted
//! and the database file rotated offline).
//!
//! ## Storage Structure
//!
//! | Tree | Key | Value |
//! |------|-----|-------|
//! | `audit` | u64 id, big-endian | serialized [`AuditEntry`] |
//!
//! # Thread Safety
//!
//! Sled trees are thread-safe; concurrent appends receive distinct ids and
//! concurrent readers see a consistent prefix.

use std::path::Path;

use tracing::trace;

use crate::entry::{AuditEntry, AuditFilter, AuditRecord};
use crate::error::{AuditError, Result};

/// Tree name for audit records.
const AUDIT_TREE: &str = "audit";

/// Handle to the audit journal.
///
/// # Example
///
/// ```rust
/// use warden_audit::{AuditEntry, AuditFilter, AuditJournal, AuditOutcome};
///
/// let journal = AuditJournal::temporary().unwrap();
/// journal
///     .append(AuditEntry::new("router_inbound", AuditOutcome::Success))
///     .unwrap();
///
/// let records = journal.query(&AuditFilter::default()).unwrap();
/// assert_eq!(records.len(), 1);
/// ```
#[derive(Clone)]
pub struct AuditJournal {
    db: sled::Db,
    tree: sled::Tree,
}

impl AuditJournal {
    /// Open or create the journal database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path)?;
        let tree = db.open_tree(AUDIT_TREE)?;
        Ok(Self { db, tree })
    }

    /// In-memory journal for tests; contents are dropped with the handle.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        let tree = db.open_tree(AUDIT_TREE)?;
        Ok(Self { db, tree })
    }

    /// Append an entry, returning its assigned id.
    ///
    /// Ids are monotonically increasing across the lifetime of the
    /// database, including across restarts.
    pub fn append(&self, entry: AuditEntry) -> Result<u64> {
        let id = self.db.generate_id()?;
        let bytes = serde_json::to_vec(&entry)?;
        self.tree.insert(id.to_be_bytes(), bytes)?;
        trace!(id, action = %entry.action, "audit entry appended");
        Ok(id)
    }

    /// Query the journal.
    ///
    /// Matching records are returned in ascending id order. When
    /// `filter.limit` is set, only the most recent N matches are kept,
    /// restored to ascending order.
    pub fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditRecord>> {
        let mut records = Vec::new();
        for item in self.tree.iter() {
            let (key, value) = item?;
            let id = decode_id(&key)?;
            let entry: AuditEntry = serde_json::from_slice(&value)?;
            if filter.matches(&entry) {
                records.push(AuditRecord { id, entry });
            }
        }
        if let Some(limit) = filter.limit {
            if records.len() > limit {
                records.drain(..records.len() - limit);
            }
        }
        Ok(records)
    }

    /// Count of matching records, without deserializing a limit window.
    pub fn count(&self, filter: &AuditFilter) -> Result<usize> {
        let unlimited = AuditFilter {
            limit: None,
            ..filter.clone()
        };
        Ok(self.query(&unlimited)?.len())
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> Result<()> {
        self.tree.flush()?;
        Ok(())
    }

    /// The underlying database, for attaching sibling journals (see
    /// [`crate::conversations::ConversationJournal::attach`]).
    pub fn db(&self) -> &sled::Db {
        &self.db
    }
}

fn decode_id(key: &[u8]) -> Result<u64> {
    let bytes: [u8; 8] = key
        .try_into()
        .map_err(|_| AuditError::Corrupt("audit key is not 8 bytes".into()))?;
    Ok(u64::from_be_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::AuditOutcome;

    fn entry(action: &str, session: &str) -> AuditEntry {
        AuditEntry::new(action, AuditOutcome::Success).with_session(session)
    }

    #[test]
    fn test_append_assigns_increasing_ids() {
        let journal = AuditJournal::temporary().unwrap();
        let a = journal.append(entry("a", "s")).unwrap();
        let b = journal.append(entry("b", "s")).unwrap();
        assert!(b > a);
    }

    #[test]
    fn test_query_ascending_order() {
        let journal = AuditJournal::temporary().unwrap();
        for i in 0..5 {
            journal.append(entry(&format!("action_{i}"), "s")).unwrap();
        }
        let records = journal.query(&AuditFilter::default()).unwrap();
        assert_eq!(records.len(), 5);
        for pair in records.windows(2) {
            assert!(pair[0].id < pair[1].id);
        }
    }

    #[test]
    fn test_limit_keeps_most_recent_ascending() {
        let journal = AuditJournal::temporary().unwrap();
        for i in 0..10 {
            journal.append(entry(&format!("action_{i}"), "s")).unwrap();
        }
        let records = journal
            .query(&AuditFilter {
                limit: Some(3),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].entry.action, "action_7");
        assert_eq!(records[2].entry.action, "action_9");
    }

    #[test]
    fn test_filter_by_action_and_session() {
        let journal = AuditJournal::temporary().unwrap();
        journal.append(entry("memory_write", "s1")).unwrap();
        journal.append(entry("memory_write", "s2")).unwrap();
        journal.append(entry("web_fetch", "s1")).unwrap();

        let records = journal
            .query(&AuditFilter {
                action: Some("memory_write".into()),
                session_id: Some("s1".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].entry.session_id.as_deref(), Some("s1"));
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.db");
        {
            let journal = AuditJournal::open(&path).unwrap();
            journal.append(entry("spawn", "s")).unwrap();
            journal.flush().unwrap();
        }
        let journal = AuditJournal::open(&path).unwrap();
        assert_eq!(journal.count(&AuditFilter::default()).unwrap(), 1);
    }
}
