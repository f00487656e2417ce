//! # Per-Session Taint Budget
//!
//! Tracks how much of a session's context came from outside the trust
//! boundary. Two monotonic byte counters per session (trusted, external)
//! yield an external ratio; when the ratio crosses the configured
//! threshold, the dangerous action classes are denied for that session
//! until it ends.
//!
//! The model is deliberately coarse. It does not try to trace which bytes
//! influenced which output (that is not tractable against a model); it
//! bounds how much leverage external text can accumulate before the
//! session loses access to state-changing capabilities. Host-originated
//! (`system`) requests bypass the gate.
//!
//! Counters only decay on session termination via [`TaintLedger::forget`];
//! the store is process-local.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::message::TrustLevel;

/// Action classes denied to heavily tainted sessions.
pub const GATED_ACTIONS: &[&str] = &[
    "memory_write",
    "web_fetch",
    "web_search",
    "identity_write",
    "user_write",
    "scheduler_add_cron",
    "agent_delegate",
];

/// Default external-ratio threshold.
pub const DEFAULT_TAINT_THRESHOLD: f64 = 0.5;

/// Is this action class gated by the taint budget?
pub fn is_gated(action: &str) -> bool {
    GATED_ACTIONS.contains(&action)
}

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    trusted: u64,
    external: u64,
}

impl Counters {
    fn ratio(&self) -> f64 {
        let total = self.trusted + self.external;
        if total == 0 {
            0.0
        } else {
            self.external as f64 / total as f64
        }
    }
}

/// Outcome of a taint check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaintDecision {
    pub allowed: bool,
    pub ratio: f64,
    pub threshold: f64,
    pub reason: Option<String>,
}

/// The per-session taint ledger.
///
/// All mutations happen inside short non-suspending critical sections, so
/// the ledger can be shared across connection tasks behind an `Arc`.
pub struct TaintLedger {
    threshold: f64,
    counters: Mutex<HashMap<String, Counters>>,
}

impl TaintLedger {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            counters: Mutex::new(HashMap::new()),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Record inbound bytes for a session under a trust label.
    ///
    /// `External` bytes raise the ratio; `User` and `System` bytes lower
    /// it.
    pub fn record(&self, session_id: &str, bytes: usize, trust: TrustLevel) {
        let mut counters = self.counters.lock().expect("taint lock poisoned");
        let entry = counters.entry(session_id.to_string()).or_default();
        match trust {
            TrustLevel::External => entry.external += bytes as u64,
            TrustLevel::User | TrustLevel::System => entry.trusted += bytes as u64,
        }
    }

    /// Current external ratio for a session (0.0 when unseen).
    pub fn ratio(&self, session_id: &str) -> f64 {
        self.counters
            .lock()
            .expect("taint lock poisoned")
            .get(session_id)
            .map(Counters::ratio)
            .unwrap_or(0.0)
    }

    /// Check whether `action` is admissible for this session and acting
    /// trust.
    ///
    /// Non-gated actions always pass. Gated actions pass when the acting
    /// source is `System` or the external ratio is within the threshold.
    pub fn check(&self, session_id: &str, action: &str, trust: TrustLevel) -> TaintDecision {
        let ratio = self.ratio(session_id);
        if !is_gated(action) || trust == TrustLevel::System || ratio <= self.threshold {
            return TaintDecision {
                allowed: true,
                ratio,
                threshold: self.threshold,
                reason: None,
            };
        }
        debug!(session_id, action, ratio, "taint budget exceeded");
        TaintDecision {
            allowed: false,
            ratio,
            threshold: self.threshold,
            reason: Some(format!(
                "external content ratio {:.2} exceeds threshold {:.2} for gated action '{}'",
                ratio, self.threshold, action
            )),
        }
    }

    /// Drop a session's counters on termination.
    pub fn forget(&self, session_id: &str) {
        self.counters
            .lock()
            .expect("taint lock poisoned")
            .remove(session_id);
    }
}

impl Default for TaintLedger {
    fn default() -> Self {
        Self::new(DEFAULT_TAINT_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_session_allowed() {
        let ledger = TaintLedger::default();
        let decision = ledger.check("s", "memory_write", TrustLevel::External);
        assert!(decision.allowed);
        assert_eq!(decision.ratio, 0.0);
    }

    #[test]
    fn test_gate_trips_over_threshold() {
        let ledger = TaintLedger::new(0.10);
        ledger.record("s", 4000, TrustLevel::External);
        ledger.record("s", 100, TrustLevel::User);

        let decision = ledger.check("s", "memory_write", TrustLevel::External);
        assert!(!decision.allowed);
        assert!(decision.ratio > 0.9);
        assert!(decision.reason.as_deref().unwrap_or("").contains("memory_write"));
    }

    #[test]
    fn test_ungated_action_ignores_budget() {
        let ledger = TaintLedger::new(0.10);
        ledger.record("s", 4000, TrustLevel::External);
        assert!(ledger.check("s", "memory_read", TrustLevel::External).allowed);
        assert!(ledger.check("s", "workspace_list", TrustLevel::External).allowed);
    }

    #[test]
    fn test_system_trust_bypasses_gate() {
        let ledger = TaintLedger::new(0.10);
        ledger.record("s", 4000, TrustLevel::External);
        assert!(ledger.check("s", "scheduler_add_cron", TrustLevel::System).allowed);
    }

    #[test]
    fn test_sessions_independent() {
        let ledger = TaintLedger::new(0.10);
        ledger.record("dirty", 4000, TrustLevel::External);
        assert!(!ledger.check("dirty", "web_fetch", TrustLevel::External).allowed);
        assert!(ledger.check("clean", "web_fetch", TrustLevel::External).allowed);
    }

    #[test]
    fn test_forget_resets() {
        let ledger = TaintLedger::new(0.10);
        ledger.record("s", 4000, TrustLevel::External);
        ledger.forget("s");
        assert_eq!(ledger.ratio("s"), 0.0);
        assert!(ledger.check("s", "web_fetch", TrustLevel::External).allowed);
    }

    #[test]
    fn test_exact_threshold_still_allowed() {
        let ledger = TaintLedger::new(0.5);
        ledger.record("s", 100, TrustLevel::External);
        ledger.record("s", 100, TrustLevel::User);
        // ratio == threshold: admitted (the gate is strict-greater).
        assert!(ledger.check("s", "memory_write", TrustLevel::External).allowed);
    }
}
