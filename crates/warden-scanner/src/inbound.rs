//! # Inbound Pattern Catalog
//!
//! A fixed catalog of regex patterns over inbound text, each tagged with
//! an attack category and a severity. The catalog covers the injection
//! techniques documented in the prompt-injection literature:
//!
//! - **Direct override** - "ignore previous instructions" and variants
//!   (Perez & Ribeiro, "Ignore This Title and HackAPrompt", 2022)
//! - **Persona hijacking** - mode switches and DAN-style jailbreaks
//!   (Shen et al., "Do Anything Now", 2023)
//! - **Extraction** - system prompt disclosure requests
//!   (Greshake et al., "Not What You've Signed Up For", 2023)
//! - **Code / shell smuggling** - payloads aimed at host-side execution
//!
//! A single `Block`-severity match forces the final verdict to block;
//! `Flag` matches are advisory and logged.

use regex::Regex;

use crate::models::{PatternCategory, Severity};

/// One entry in the inbound catalog.
pub struct InboundPattern {
    /// Compiled regex.
    pub pattern: Regex,
    /// Attack category, used for the audit label.
    pub category: PatternCategory,
    /// Whether a match blocks or merely flags.
    pub severity: Severity,
    /// Short description for logs and alerts.
    pub description: &'static str,
}

/// Build the inbound catalog.
///
/// Compiled once per scanner; patterns are static and the regexes are
/// known-valid, so construction cannot fail.
pub fn build_catalog() -> Vec<InboundPattern> {
    vec![
        // -- Direct instruction override ---------------------------------
        InboundPattern {
            pattern: Regex::new(
                r"(?i)ignore\s+(all\s+)?(previous|prior|above|earlier)\s+(instructions?|prompts?|rules?|messages?)",
            )
            .unwrap(),
            category: PatternCategory::Direct,
            severity: Severity::Block,
            description: "instruction override: ignore previous instructions",
        },
        InboundPattern {
            pattern: Regex::new(
                r"(?i)disregard\s+(all\s+)?(your\s+)?(previous|prior|above)\s+(instructions?|prompts?|rules?|guidelines?)",
            )
            .unwrap(),
            category: PatternCategory::Direct,
            severity: Severity::Block,
            description: "instruction override: disregard instructions",
        },
        InboundPattern {
            pattern: Regex::new(r"(?i)forget\s+(everything|all|what)\s+(you|i)?\s*(know|said|told|learned)")
                .unwrap(),
            category: PatternCategory::Direct,
            severity: Severity::Block,
            description: "instruction override: forget everything",
        },
        InboundPattern {
            pattern: Regex::new(r"(?i)^\s*new\s+instructions?\s*:").unwrap(),
            category: PatternCategory::Direct,
            severity: Severity::Flag,
            description: "instruction override: inline instruction header",
        },
        // -- Persona hijacking -------------------------------------------
        InboundPattern {
            pattern: Regex::new(r"(?i)you\s+are\s+now\s+(a|an|in)\s+\w+(\s+mode)?").unwrap(),
            category: PatternCategory::Persona,
            severity: Severity::Block,
            description: "persona hijack: mode switch",
        },
        InboundPattern {
            pattern: Regex::new(r"(?i)(DAN|do\s+anything\s+now|developer\s+mode|jailbreak)").unwrap(),
            category: PatternCategory::Persona,
            severity: Severity::Block,
            description: "persona hijack: DAN-style keywords",
        },
        InboundPattern {
            pattern: Regex::new(
                r"(?i)(pretend|act|imagine|roleplay)\s+(you('?re| are)|as if you('?re| are))\s+(not\s+)?(an?\s+)?ai",
            )
            .unwrap(),
            category: PatternCategory::Persona,
            severity: Severity::Flag,
            description: "persona hijack: pretend not an AI",
        },
        // -- Extraction ---------------------------------------------------
        InboundPattern {
            pattern: Regex::new(
                r"(?i)(show|reveal|display|print|output|repeat)\s+(me\s+)?(your|the)\s+(system\s+)?prompt",
            )
            .unwrap(),
            category: PatternCategory::Extraction,
            severity: Severity::Block,
            description: "extraction: system prompt disclosure request",
        },
        InboundPattern {
            pattern: Regex::new(r"(?i)repeat\s+(everything|all|the\s+text)\s+(above|before)").unwrap(),
            category: PatternCategory::Extraction,
            severity: Severity::Block,
            description: "extraction: verbatim context replay request",
        },
        InboundPattern {
            pattern: Regex::new(r"(?i)what\s+(are|is)\s+(your|the)\s+(system\s+)?(instructions?|prompt|rules?)")
                .unwrap(),
            category: PatternCategory::Extraction,
            severity: Severity::Flag,
            description: "extraction: system prompt query",
        },
        // -- Code smuggling ----------------------------------------------
        InboundPattern {
            pattern: Regex::new(r"(?i)\b(eval|exec)\s*\(").unwrap(),
            category: PatternCategory::Code,
            severity: Severity::Flag,
            description: "code: dynamic evaluation call",
        },
        InboundPattern {
            pattern: Regex::new(r"(?i)import\s+(os|subprocess|socket)\b").unwrap(),
            category: PatternCategory::Code,
            severity: Severity::Flag,
            description: "code: process/network module import",
        },
        InboundPattern {
            pattern: Regex::new(r"(?i)<script[\s>]").unwrap(),
            category: PatternCategory::Code,
            severity: Severity::Flag,
            description: "code: embedded script tag",
        },
        // -- Shell smuggling ---------------------------------------------
        InboundPattern {
            pattern: Regex::new(r"(?i)curl\s+[^\n|]*\|\s*(ba)?sh").unwrap(),
            category: PatternCategory::Shell,
            severity: Severity::Block,
            description: "shell: pipe-to-shell download",
        },
        InboundPattern {
            pattern: Regex::new(r"(?i)rm\s+-rf\s+[/~]").unwrap(),
            category: PatternCategory::Shell,
            severity: Severity::Block,
            description: "shell: recursive delete of root paths",
        },
        InboundPattern {
            pattern: Regex::new(r"(?i)\b(chmod\s+777|sudo\s+\w+|mkfifo)\b").unwrap(),
            category: PatternCategory::Shell,
            severity: Severity::Flag,
            description: "shell: privilege or fifo primitives",
        },
    ]
}
