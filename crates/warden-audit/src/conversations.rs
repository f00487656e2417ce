//! Per-session conversation journal.
//!
//! Stores ordered `{role, content, timestamp}` turns keyed by session so
//! the completions gateway can replay history into a fresh agent spawn.
//! Same storage discipline as the audit journal: append and read, never
//! rewrite.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AuditError, Result};

const CONVERSATION_TREE: &str = "conversations";

/// A single conversation turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Handle to the conversation journal.
///
/// Keys are `<session bytes> 0x00 <u64 seq, big-endian>`; the NUL
/// separator keeps session prefixes unambiguous (session ids never
/// contain NUL) and a prefix scan returns one session's turns in append
/// order.
#[derive(Clone)]
pub struct ConversationJournal {
    db: sled::Db,
    tree: sled::Tree,
}

impl ConversationJournal {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path)?;
        let tree = db.open_tree(CONVERSATION_TREE)?;
        Ok(Self { db, tree })
    }

    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        let tree = db.open_tree(CONVERSATION_TREE)?;
        Ok(Self { db, tree })
    }

    /// Share the database of an existing audit journal handle.
    ///
    /// Both journals live in one sled database under separate trees, so a
    /// host that opens the audit journal can attach conversations without
    /// a second file.
    pub fn attach(db: &sled::Db) -> Result<Self> {
        let tree = db.open_tree(CONVERSATION_TREE)?;
        Ok(Self {
            db: db.clone(),
            tree,
        })
    }

    /// Append a turn to a session's history.
    pub fn append_turn(&self, session_id: &str, turn: &ConversationTurn) -> Result<()> {
        validate_session_key(session_id)?;
        let seq = self.db.generate_id()?;
        let key = turn_key(session_id, seq);
        self.tree.insert(key, serde_json::to_vec(turn)?)?;
        Ok(())
    }

    /// Load a session's turns in append order.
    pub fn history(&self, session_id: &str) -> Result<Vec<ConversationTurn>> {
        validate_session_key(session_id)?;
        let mut prefix = session_id.as_bytes().to_vec();
        prefix.push(0);
        let mut turns = Vec::new();
        for item in self.tree.scan_prefix(&prefix) {
            let (_, value) = item?;
            turns.push(serde_json::from_slice(&value)?);
        }
        Ok(turns)
    }

    /// Most recent `n` turns for a session, oldest first.
    pub fn recent(&self, session_id: &str, n: usize) -> Result<Vec<ConversationTurn>> {
        let mut turns = self.history(session_id)?;
        if turns.len() > n {
            turns.drain(..turns.len() - n);
        }
        Ok(turns)
    }
}

fn turn_key(session_id: &str, seq: u64) -> Vec<u8> {
    let mut key = session_id.as_bytes().to_vec();
    key.push(0);
    key.extend_from_slice(&seq.to_be_bytes());
    key
}

/// Guard against session ids that would break prefix scanning, applied
/// on every append and read. The host validates session ids long before
/// they reach storage; this is the storage layer's own check.
pub fn validate_session_key(session_id: &str) -> Result<()> {
    if session_id.is_empty() || session_id.as_bytes().contains(&0) {
        return Err(AuditError::Corrupt(format!(
            "invalid session key: {:?}",
            session_id
        )));
    }
    Ok(())
}
