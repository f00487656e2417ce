//! # Warden Sandbox
//!
//! OS-level isolation for agent subprocesses. The agent runs with no
//! network; its only channel to the world is the dispatcher socket
//! mounted into the sandbox.
//!
//! ## Backends
//!
//! | Backend | Platform | Mechanism |
//! |---------|----------|-----------|
//! | [`namespace`] | Linux | bubblewrap: net/PID/IPC namespaces, bind mounts |
//! | [`seatbelt`] | macOS | `sandbox-exec` deny-default profile |
//! | [`container`] | any with docker | `--network=none --read-only --cap-drop=ALL` |
//! | [`subprocess`] | any | plain child process, dev/test only |
//!
//! Backends are small adapters over one shared spawn/supervise core
//! ([`process`]): piped stdio, environment allowlist (`PATH`, `HOME`,
//! plus the dispatcher socket variables), timeout with hard kill and a
//! grace window for container teardown.
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use warden_sandbox::{select_backend, SandboxConfig};
//!
//! # async fn run() -> Result<(), warden_sandbox::SandboxError> {
//! let backend = select_backend(None)?;
//! let config = SandboxConfig::new(vec!["agent".into()], "/srv/warden/scratch/s1")
//!     .with_env("WARDEN_SOCKET", "/run/warden/dispatch.sock")
//!     .with_timeout(Duration::from_secs(120));
//! let process = backend.spawn(&config).await?;
//! let output = process
//!     .collect_output(config.timeout, Duration::from_secs(5))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod container;
pub mod error;
pub mod namespace;
pub mod process;
pub mod seatbelt;
pub mod subprocess;

pub use backend::{select_backend, BackendKind, SandboxBackend};
pub use config::{SandboxConfig, TierMounts};
pub use container::ContainerBackend;
pub use error::{Result, SandboxError};
pub use namespace::NamespaceBackend;
pub use process::{SandboxOutput, SandboxProcess, TIMEOUT_EXIT_CODE};
pub use seatbelt::SeatbeltBackend;
pub use subprocess::SubprocessBackend;
