//! # Session Identifiers
//!
//! A session is the stable addressing key for a conversation or agent
//! lifetime: it selects the workspace directory, the canary slot, and the
//! taint counters. Two forms are accepted:
//!
//! - a canonical lowercase UUID (`8-4-4-4-12` hex), used by the
//!   completions gateway for ad-hoc API sessions, and
//! - a colon-separated tuple of at least three segments, each matching
//!   `[A-Za-z0-9_.\-]+`, used for channel-addressed sessions
//!   (`provider:scope:identifiers…`).
//!
//! Any other shape is rejected before it can reach storage or the
//! filesystem; `.` and `..` segments are rejected outright so the
//! directory mapping below can never traverse upwards. The mapping to a
//! workspace directory is deterministic: UUID sessions map to a flat
//! directory, colon sessions to nested directories (one level per
//! segment).

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

/// Minimum number of segments in the colon form.
const MIN_SEGMENTS: usize = 3;

fn segment_pattern() -> &'static Regex {
    use std::sync::OnceLock;
    static SEGMENT: OnceLock<Regex> = OnceLock::new();
    SEGMENT.get_or_init(|| Regex::new(r"^[A-Za-z0-9_.\-]+$").unwrap())
}

/// A validated session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    /// Mint a fresh UUID-form session id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Validate and wrap a raw id.
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        if is_canonical_uuid(raw) || is_colon_tuple(raw) {
            Ok(Self(raw.to_string()))
        } else {
            Err(CoreError::InvalidSessionId(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `true` for the UUID form, `false` for the colon form.
    pub fn is_uuid(&self) -> bool {
        is_canonical_uuid(&self.0)
    }

    /// Deterministic workspace-relative path for this session.
    ///
    /// UUID sessions map flat (`<uuid>`); colon sessions map nested
    /// (`provider/scope/...`), which keeps one provider's sessions
    /// grouped on disk.
    pub fn workspace_rel_path(&self) -> PathBuf {
        if self.is_uuid() {
            PathBuf::from(&self.0)
        } else {
            self.0.split(':').collect()
        }
    }
}

impl FromStr for SessionId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for SessionId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_canonical_uuid(raw: &str) -> bool {
    // Canonical form only: lowercase, hyphenated. `Uuid::parse_str` also
    // accepts braced/simple forms, so compare the round trip.
    match Uuid::parse_str(raw) {
        Ok(uuid) => uuid.to_string() == raw,
        Err(_) => false,
    }
}

fn is_colon_tuple(raw: &str) -> bool {
    let segments: Vec<&str> = raw.split(':').collect();
    // `.` and `..` match the segment character class but would turn the
    // workspace mapping into a traversal; they are never valid segments.
    segments.len() >= MIN_SEGMENTS
        && segments
            .iter()
            .all(|s| segment_pattern().is_match(s) && *s != "." && *s != "..")
}
