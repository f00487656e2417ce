//! # Warden Credential Proxy
//!
//! A local forward proxy for the upstream model API. Sandboxed agents and
//! in-host clients talk to a unix socket; the proxy strips any
//! agent-supplied credentials, injects the real ones from its startup
//! environment, and streams the upstream response back unchanged.
//!
//! The point is credential isolation: the API key exists in exactly one
//! process, read from the environment exactly once at construction.
//! Nothing downstream of the proxy ever sees it, and nothing an agent
//! sends can override it.
//!
//! ## Surface
//!
//! `POST /v1/messages` only; every other path is 404. Bodies over 4 MiB
//! are refused with 413. The upstream response streams through with its
//! status and headers, minus `transfer-encoding` (hyper re-frames the
//! stream itself).

pub mod proxy;

pub use proxy::{CredentialProxy, ProxyConfig, ProxyError};
