//! # Warden Gateway
//!
//! The OpenAI-style chat-completions surface over the Warden security
//! pipeline. A request becomes: router inbound (scan, canary, wrap) ->
//! fresh scratch workspace -> sandboxed agent spawn with the
//! `{history, message}` payload on stdin -> stdout collection -> router
//! outbound (scan, canary check, redaction) -> journaled reply.
//!
//! Serving modes: unix socket (no auth; OS permissions) or loopback TCP
//! (mandatory bearer token, constant-time checked). Non-loopback binds
//! and tokenless TCP are startup failures, not warnings.

pub mod error;
pub mod models;
pub mod pipeline;
pub mod server;

pub use error::GatewayError;
pub use models::{ChatCompletionRequest, ChatMessage, ErrorBody};
pub use pipeline::{CompletionOutcome, Pipeline};
pub use server::{Gateway, GatewayConfig};
