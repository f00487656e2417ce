//! # Warden IPC
//!
//! The request/response channel between sandboxed agents and the trusted
//! host. Agents have no network; everything dangerous (model calls,
//! memory, web, files beyond the workspace) arrives here as a
//! length-prefixed JSON frame over a unix socket mounted into the
//! sandbox.
//!
//! ## Layers
//!
//! - [`frame`] - 4-byte big-endian length-prefixed framing (10 MiB cap)
//! - [`actions`] - the action schema registry: strict typed payloads
//! - [`handlers`] - capability traits and the assembled
//!   [`handlers::HostCapabilities`]
//! - [`delegate`] - concurrency and depth guards for `agent_delegate`
//! - [`dispatch`] - the per-connection server loop
//!
//! ## Reply Shape
//!
//! Every request gets exactly one reply frame: `{ok: true, …fields}` on
//! success, `{ok: false, error: <text>}` on failure, with
//! `taintBlocked: true` added when the taint budget denied a gated
//! action. Framing violations (oversize or malformed length) close the
//! connection instead of replying.

pub mod actions;
pub mod delegate;
pub mod dispatch;
pub mod error;
pub mod frame;
pub mod handlers;

pub use actions::Action;
pub use delegate::{DelegationGuard, DelegationPermit};
pub use dispatch::{DelegateFn, DelegateFuture, Dispatcher, DispatcherDeps};
pub use error::{HandlerError, HandlerResult, IpcError};
pub use frame::{encode_frame, FrameCodec, FrameError, MAX_FRAME_LEN};
pub use handlers::{
    ActionContext, BrowserDriver, HostCapabilities, InMemoryKvLog, KvLog, LlmClient, LlmReply,
    MemoryEntry, NoScheduler, SchedulerHandle, SearchHit, SkillStore, UnavailableBrowser,
    UnavailableLlm, UnavailableWeb, WebClient, WorkspaceFiles,
};
