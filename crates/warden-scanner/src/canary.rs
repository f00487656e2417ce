//! # Canary Tokens for Exfiltration Detection
//!
//! A canary token is a random, high-entropy marker embedded in externally
//! sourced content before it reaches the model. Legitimate output never
//! contains the token; its presence in an outbound message is proof that
//! the model echoed wrapped context verbatim.
//!
//! ## How It Works
//!
//! 1. **Issuance**: the router mints one token per session when it wraps an
//!    inbound message, and records it in the session canary table. The raw
//!    token exists nowhere else on the trusted side.
//! 2. **Detection**: before output leaves the host, the router checks for
//!    the session's token with a plain substring containment test. A hit
//!    replaces the whole response with a redaction notice.
//!
//! ## Design Principles
//!
//! - **Uniqueness**: each token carries 122 bits of UUID randomness, so
//!   collisions and guessing are not practical concerns.
//! - **Recognizable shape**: the fixed `CANARY-` prefix keeps tokens easy
//!   to locate in journals and test assertions.
//! - **Session-bound**: tokens live from inbound issuance to outbound
//!   completion of that message; a new inbound mints a fresh one.
//!
//! Inspired by the Rebuff framework's canary approach to prompt-leak
//! detection (<https://github.com/protectai/rebuff>).

use uuid::Uuid;

/// Fixed prefix for all canary tokens.
///
/// The prefix reveals that canaries are in use; this is a deliberate
/// trade-off. Knowing the prefix does not help an attacker unless they can
/// filter the full token out of model output before the host sees it.
const CANARY_PREFIX: &str = "CANARY";

/// Generate a fresh canary token.
///
/// # Returns
///
/// A token of the form `CANARY-<32 lowercase hex chars>`.
///
/// # Example
///
/// ```rust
/// use warden_scanner::canary::canary_token;
///
/// let token = canary_token();
/// assert!(token.starts_with("CANARY-"));
/// assert_eq!(token.len(), "CANARY-".len() + 32);
/// assert_ne!(token, canary_token());
/// ```
pub fn canary_token() -> String {
    format!("{}-{}", CANARY_PREFIX, Uuid::new_v4().simple())
}

/// Check whether a canary token appears in model output.
///
/// Substring containment: catches the token anywhere in the output,
/// including inside quoted or reformatted context. An empty token never
/// matches, so sessions without an active canary cannot produce false
/// leaks.
///
/// # Example
///
/// ```rust
/// use warden_scanner::canary::{canary_token, check_canary};
///
/// let token = canary_token();
/// assert!(!check_canary("a normal answer", &token));
/// assert!(check_canary(&format!("context said {token}"), &token));
/// assert!(!check_canary("anything at all", ""));
/// ```
pub fn check_canary(output: &str, token: &str) -> bool {
    !token.is_empty() && output.contains(token)
}

/// Check for canary-shaped fragments in output.
///
/// Catches partial leaks where the model reproduced the marker prefix but
/// not the full token. Callers treat a hit as a flag, not a block.
pub fn has_canary_fragment(output: &str) -> bool {
    output.contains(CANARY_PREFIX)
}
