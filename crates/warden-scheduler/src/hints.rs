//! # Proactive-Hint Gate
//!
//! Subsystems (memory, heartbeat analysis) may suggest that the agent
//! reach out unprompted. Unfiltered, that is a spam channel and a prompt
//! injection amplifier, so every hint passes four filters before firing:
//!
//! 1. **Confidence**: below the threshold, drop.
//! 2. **Active hours**: outside the window, drop.
//! 3. **Cooldown**: a signature (hash of kind, scope, and prompt) must
//!    not have fired within its cooldown.
//! 4. **Token budget**: a session over its scheduled-token budget queues
//!    the hint for operator inspection instead of firing.
//!
//! Suppressions are not silent; the scheduler audits each with its
//! reason.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A suggestion to proactively contact the user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProactiveHint {
    /// Subsystem that produced the hint.
    pub source: String,
    /// Hint kind (e.g. "follow_up", "reminder").
    pub kind: String,
    /// Why the subsystem believes this is worth firing.
    pub reason: String,
    pub suggested_prompt: String,
    /// In `[0, 1]`.
    pub confidence: f64,
    /// Session scope the hint belongs to.
    pub scope: String,
    pub cooldown_minutes: Option<i64>,
}

impl ProactiveHint {
    /// Stable signature for cooldown tracking.
    pub fn signature(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.kind.as_bytes());
        hasher.update(b"|");
        hasher.update(self.scope.as_bytes());
        hasher.update(b"|");
        hasher.update(self.suggested_prompt.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// Why a hint did not fire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "decision")]
pub enum HintDecision {
    Fire,
    Suppressed { reason: String },
    /// Queued for operator inspection; the session is over budget.
    OverBudget,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HintGateConfig {
    /// Minimum confidence to fire.
    pub confidence_threshold: f64,
    /// Cooldown applied when the hint names none.
    pub default_cooldown_minutes: i64,
    /// Scheduled-token budget per session scope, when enforced.
    pub session_token_budget: Option<u64>,
}

impl Default for HintGateConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.6,
            default_cooldown_minutes: 60,
            session_token_budget: None,
        }
    }
}

/// The gate itself: cooldown table, per-scope token usage, and the
/// over-budget inspection queue.
pub struct HintGate {
    config: HintGateConfig,
    last_fired: Mutex<HashMap<String, DateTime<Utc>>>,
    token_usage: Mutex<HashMap<String, u64>>,
    over_budget: Mutex<Vec<ProactiveHint>>,
}

impl HintGate {
    pub fn new(config: HintGateConfig) -> Self {
        Self {
            config,
            last_fired: Mutex::new(HashMap::new()),
            token_usage: Mutex::new(HashMap::new()),
            over_budget: Mutex::new(Vec::new()),
        }
    }

    /// Record model tokens spent on behalf of a scope.
    pub fn record_token_usage(&self, scope: &str, tokens: u64) {
        *self
            .token_usage
            .lock()
            .expect("usage lock poisoned")
            .entry(scope.to_string())
            .or_insert(0) += tokens;
    }

    /// Evaluate one hint at `now`. `in_active_hours` is supplied by the
    /// scheduler, which owns the clock window.
    pub fn evaluate(&self, hint: &ProactiveHint, now: DateTime<Utc>, in_active_hours: bool) -> HintDecision {
        if hint.confidence < self.config.confidence_threshold {
            return HintDecision::Suppressed {
                reason: format!(
                    "confidence {:.2} below threshold {:.2}",
                    hint.confidence, self.config.confidence_threshold
                ),
            };
        }
        if !in_active_hours {
            return HintDecision::Suppressed {
                reason: "outside active hours".into(),
            };
        }

        let signature = hint.signature();
        let cooldown = Duration::minutes(
            hint.cooldown_minutes
                .unwrap_or(self.config.default_cooldown_minutes),
        );
        {
            let fired = self.last_fired.lock().expect("fired lock poisoned");
            if let Some(last) = fired.get(&signature) {
                if now - *last < cooldown {
                    return HintDecision::Suppressed {
                        reason: format!("cooldown active for signature {}", &signature[..12]),
                    };
                }
            }
        }

        if let Some(budget) = self.config.session_token_budget {
            let used = self
                .token_usage
                .lock()
                .expect("usage lock poisoned")
                .get(&hint.scope)
                .copied()
                .unwrap_or(0);
            if used >= budget {
                self.over_budget
                    .lock()
                    .expect("queue lock poisoned")
                    .push(hint.clone());
                return HintDecision::OverBudget;
            }
        }

        self.last_fired
            .lock()
            .expect("fired lock poisoned")
            .insert(signature, now);
        HintDecision::Fire
    }

    /// Drain the over-budget inspection queue.
    pub fn take_over_budget(&self) -> Vec<ProactiveHint> {
        std::mem::take(&mut *self.over_budget.lock().expect("queue lock poisoned"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hint(confidence: f64) -> ProactiveHint {
        ProactiveHint {
            source: "memory".into(),
            kind: "follow_up".into(),
            reason: "stale thread".into(),
            suggested_prompt: "Check in about the deploy".into(),
            confidence,
            scope: "cli:dm:user-1".into(),
            cooldown_minutes: Some(30),
        }
    }

    #[test]
    fn test_low_confidence_suppressed() {
        let gate = HintGate::new(HintGateConfig::default());
        let decision = gate.evaluate(&hint(0.3), Utc::now(), true);
        assert!(matches!(decision, HintDecision::Suppressed { reason } if reason.contains("confidence")));
    }

    #[test]
    fn test_outside_active_hours_suppressed() {
        let gate = HintGate::new(HintGateConfig::default());
        let decision = gate.evaluate(&hint(0.9), Utc::now(), false);
        assert!(matches!(decision, HintDecision::Suppressed { reason } if reason.contains("active hours")));
    }

    #[test]
    fn test_cooldown_blocks_refire() {
        let gate = HintGate::new(HintGateConfig::default());
        let now = Utc::now();
        assert_eq!(gate.evaluate(&hint(0.9), now, true), HintDecision::Fire);

        let soon = now + Duration::minutes(10);
        assert!(matches!(
            gate.evaluate(&hint(0.9), soon, true),
            HintDecision::Suppressed { reason } if reason.contains("cooldown")
        ));

        let later = now + Duration::minutes(31);
        assert_eq!(gate.evaluate(&hint(0.9), later, true), HintDecision::Fire);
    }

    #[test]
    fn test_different_prompts_have_independent_cooldowns() {
        let gate = HintGate::new(HintGateConfig::default());
        let now = Utc::now();
        assert_eq!(gate.evaluate(&hint(0.9), now, true), HintDecision::Fire);

        let mut other = hint(0.9);
        other.suggested_prompt = "Completely different nudge".into();
        assert_eq!(gate.evaluate(&other, now, true), HintDecision::Fire);
    }

    #[test]
    fn test_over_budget_queued() {
        let gate = HintGate::new(HintGateConfig {
            session_token_budget: Some(1000),
            ..Default::default()
        });
        gate.record_token_usage("cli:dm:user-1", 1500);

        let decision = gate.evaluate(&hint(0.9), Utc::now(), true);
        assert_eq!(decision, HintDecision::OverBudget);

        let queued = gate.take_over_budget();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].kind, "follow_up");
        assert!(gate.take_over_budget().is_empty());
    }
}
