//! Audit entry types and filters.
//!
//! An entry records one dispatched action, scan verdict, sandbox spawn, or
//! scheduler decision. Entries are immutable once appended; the journal
//! exposes no update or delete operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of an audited operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Blocked,
    Error,
}

/// One audit journal entry.
///
/// Missing optional fields serialize as `null`; the timestamp defaults to
/// the time of construction. `args` must be redacted by the caller before
/// the entry is built (see [`redact_args`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub session_id: Option<String>,
    pub action: String,
    pub args: Option<serde_json::Value>,
    pub result: AuditOutcome,
    /// Trust label of the acting source, when known.
    pub taint: Option<String>,
    pub duration_ms: Option<u64>,
    pub token_usage: Option<u64>,
}

impl AuditEntry {
    /// New entry for `action` with the given outcome, stamped now.
    pub fn new(action: impl Into<String>, result: AuditOutcome) -> Self {
        Self {
            timestamp: Utc::now(),
            session_id: None,
            action: action.into(),
            args: None,
            result,
            taint: None,
            duration_ms: None,
            token_usage: None,
        }
    }

    #[must_use]
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    #[must_use]
    pub fn with_args(mut self, args: serde_json::Value) -> Self {
        self.args = Some(redact_args(args));
        self
    }

    #[must_use]
    pub fn with_taint(mut self, taint: impl Into<String>) -> Self {
        self.taint = Some(taint.into());
        self
    }

    #[must_use]
    pub fn with_duration_ms(mut self, ms: u64) -> Self {
        self.duration_ms = Some(ms);
        self
    }

    #[must_use]
    pub fn with_token_usage(mut self, tokens: u64) -> Self {
        self.token_usage = Some(tokens);
        self
    }
}

/// A stored entry with its assigned journal id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: u64,
    #[serde(flatten)]
    pub entry: AuditEntry,
}

/// Query filter over the journal.
///
/// All fields are conjunctive; `limit` keeps the most recent N matches,
/// returned in ascending id order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditFilter {
    pub action: Option<String>,
    pub session_id: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl AuditFilter {
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        if let Some(action) = &self.action {
            if &entry.action != action {
                return false;
            }
        }
        if let Some(session) = &self.session_id {
            if entry.session_id.as_deref() != Some(session.as_str()) {
                return false;
            }
        }
        if let Some(since) = self.since {
            if entry.timestamp < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if entry.timestamp > until {
                return false;
            }
        }
        true
    }
}

/// Keys whose values are masked wholesale in audited args.
const SENSITIVE_KEYS: &[&str] = &[
    "token",
    "api_key",
    "apikey",
    "secret",
    "password",
    "passphrase",
    "authorization",
    "credential",
];

/// Maximum length for audited string values; longer strings are truncated
/// with a marker so the journal stays bounded per entry.
const MAX_ARG_STRING: usize = 500;

/// Redact argument values for journaling.
///
/// Masks values under credential-shaped keys and truncates long strings.
/// Applied recursively to objects and arrays.
pub fn redact_args(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.into_iter()
                .map(|(k, v)| {
                    let lower = k.to_lowercase();
                    if SENSITIVE_KEYS.iter().any(|s| lower.contains(s)) {
                        (k, serde_json::Value::String("[redacted]".into()))
                    } else {
                        (k, redact_args(v))
                    }
                })
                .collect(),
        ),
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.into_iter().map(redact_args).collect())
        }
        serde_json::Value::String(s) if s.len() > MAX_ARG_STRING => {
            let mut cut = MAX_ARG_STRING;
            while !s.is_char_boundary(cut) {
                cut -= 1;
            }
            serde_json::Value::String(format!("{}… [truncated {} bytes]", &s[..cut], s.len()))
        }
        other => other,
    }
}
