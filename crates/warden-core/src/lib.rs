//! # Warden Core
//!
//! Shared model for the Warden execution host: session identity and the
//! workspace it maps to, the taint budget that gates dangerous actions,
//! and the router that wraps, scans, and canaries every message crossing
//! the trust boundary.
//!
//! ## Component Map
//!
//! - [`session`] - session ids (UUID or `provider:scope:…` tuples)
//! - [`workspace`] - tiered directory layout with strict path safety
//! - [`message`] - inbound messages, trust labels, the external-content
//!   wrapper
//! - [`taint`] - per-session trusted/external byte accounting
//! - [`queue`] - bounded, deduplicated inbound queue
//! - [`router`] - the inbound/outbound security pipeline
//! - [`config`] - host configuration from the environment
//! - [`error`] - error taxonomy and centralized failure diagnosis
//!
//! Components are wired as values through explicit `Deps` structs; there
//! are no ambient singletons, so tests can assemble a full pipeline from
//! temporary parts (see [`router::RouterDeps`]).

pub mod config;
pub mod error;
pub mod message;
pub mod queue;
pub mod router;
pub mod session;
pub mod taint;
pub mod workspace;

pub use config::{DelegationLimits, HostConfig, UpstreamConfig};
pub use error::{diagnose, CoreError, Diagnosis, Result};
pub use message::{
    wrap_external, Attachment, InboundMessage, Scope, SessionAddress, TaintTag, TrustLevel,
};
pub use queue::{MessageQueue, PushOutcome, QueuedMessage};
pub use router::{
    InboundOutcome, OutboundOutcome, Router, RouterDeps, CANARY_REDACTION, OUTBOUND_REDACTION,
};
pub use session::SessionId;
pub use taint::{is_gated, TaintDecision, TaintLedger, GATED_ACTIONS};
pub use workspace::{Tier, WorkspaceLayout};
