//! # Core Types for the Content Scanner
//!
//! This module defines the data types shared by the inbound and outbound
//! scanning layers: pattern categories, severities, and the three-tier
//! scan result.
//!
//! ## Design Principles
//!
//! 1. **Actionable Results** - [`ScanResult`] maps directly to an
//!    allow / log / reject decision at the call site.
//! 2. **Explainable** - every non-pass result carries the matched pattern
//!    labels and a human-readable reason for the audit trail.
//! 3. **Serializable** - all types derive Serde traits so verdicts can be
//!    journaled and returned over the wire.

use serde::{Deserialize, Serialize};

/// Category of an inbound detection pattern.
///
/// The inbound catalog groups injection attacks by technique. Category
/// labels appear in audit entries as `injection:<category>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternCategory {
    /// Explicit instruction-override attempts ("ignore previous instructions").
    Direct,
    /// Persona and role hijacking ("you are now in X mode", DAN-style).
    Persona,
    /// System prompt or context extraction requests.
    Extraction,
    /// Embedded code intended for host-side evaluation.
    Code,
    /// Shell command smuggling.
    Shell,
}

impl PatternCategory {
    /// Audit label for this category.
    pub fn label(&self) -> &'static str {
        match self {
            PatternCategory::Direct => "injection:direct",
            PatternCategory::Persona => "injection:persona",
            PatternCategory::Extraction => "injection:extraction",
            PatternCategory::Code => "injection:code",
            PatternCategory::Shell => "injection:shell",
        }
    }
}

/// Severity assigned to a catalog pattern.
///
/// A single `Block` match forces the final verdict to block. `Flag`
/// matches are advisory: they are logged and surfaced but do not stop
/// the pipeline on their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Advisory: log and continue.
    Flag,
    /// Reject the content.
    Block,
}

/// Result of scanning a piece of inbound or outbound text.
///
/// The three-tier result system enables nuanced security decisions:
///
/// - **Pass**: no findings, proceed normally
/// - **Flag**: suspicious content, log and optionally alert but don't block
/// - **Block**: high-confidence threat or confirmed leak, reject
///
/// # Example
///
/// ```rust
/// use warden_scanner::ScanResult;
///
/// fn admit(result: &ScanResult) -> bool {
///     match result {
///         ScanResult::Pass => true,
///         ScanResult::Flag { patterns, .. } => {
///             eprintln!("flagged: {:?}", patterns);
///             true
///         }
///         ScanResult::Block { reason, .. } => {
///             eprintln!("blocked: {}", reason);
///             false
///         }
///     }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum ScanResult {
    /// No findings. The content can proceed through the pipeline.
    Pass,

    /// Suspicious content that does not meet the blocking bar.
    ///
    /// `patterns` holds the labels of every matched catalog entry plus any
    /// heuristic findings; `reason` is the first (highest-value) finding.
    Flag { patterns: Vec<String>, reason: String },

    /// Content rejected. Inbound: the message is never enqueued.
    /// Outbound: the content is replaced with a redaction notice.
    Block { patterns: Vec<String>, reason: String },
}

impl ScanResult {
    /// `true` if no findings were recorded.
    #[inline]
    pub fn is_pass(&self) -> bool {
        matches!(self, ScanResult::Pass)
    }

    /// `true` if the content was flagged but not blocked.
    #[inline]
    pub fn is_flagged(&self) -> bool {
        matches!(self, ScanResult::Flag { .. })
    }

    /// `true` if the content was blocked.
    #[inline]
    pub fn is_blocked(&self) -> bool {
        matches!(self, ScanResult::Block { .. })
    }

    /// Matched pattern labels, empty for `Pass`.
    pub fn patterns(&self) -> &[String] {
        match self {
            ScanResult::Pass => &[],
            ScanResult::Flag { patterns, .. } => patterns,
            ScanResult::Block { patterns, .. } => patterns,
        }
    }

    /// Human-readable reason, `None` for `Pass`.
    pub fn reason(&self) -> Option<&str> {
        match self {
            ScanResult::Pass => None,
            ScanResult::Flag { reason, .. } => Some(reason),
            ScanResult::Block { reason, .. } => Some(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_labels() {
        assert_eq!(PatternCategory::Direct.label(), "injection:direct");
        assert_eq!(PatternCategory::Shell.label(), "injection:shell");
    }

    #[test]
    fn test_result_accessors() {
        let pass = ScanResult::Pass;
        assert!(pass.is_pass());
        assert!(pass.patterns().is_empty());
        assert!(pass.reason().is_none());

        let flag = ScanResult::Flag {
            patterns: vec!["pii:ssn".into()],
            reason: "possible SSN".into(),
        };
        assert!(flag.is_flagged());
        assert_eq!(flag.patterns(), ["pii:ssn".to_string()]);

        let block = ScanResult::Block {
            patterns: vec!["injection:direct".into()],
            reason: "instruction override".into(),
        };
        assert!(block.is_blocked());
        assert_eq!(block.reason(), Some("instruction override"));
    }

    #[test]
    fn test_result_serializes_with_verdict_tag() {
        let json = serde_json::to_value(ScanResult::Pass).unwrap();
        assert_eq!(json["verdict"], "pass");

        let json = serde_json::to_value(ScanResult::Block {
            patterns: vec![],
            reason: "r".into(),
        })
        .unwrap();
        assert_eq!(json["verdict"], "block");
    }
}
