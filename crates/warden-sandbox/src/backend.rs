//! # Backend Trait and Selection
//!
//! A backend is a small adapter: probe availability, compose the wrapped
//! command line, spawn. Selection is a pure function of configuration and
//! probe results, tried in platform order; the plain subprocess backend
//! always matches last so dev machines and CI never hard-fail.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::SandboxConfig;
use crate::container::ContainerBackend;
use crate::error::{Result, SandboxError};
use crate::namespace::NamespaceBackend;
use crate::process::SandboxProcess;
use crate::seatbelt::SeatbeltBackend;
use crate::subprocess::SubprocessBackend;

/// One isolation mechanism.
#[async_trait]
pub trait SandboxBackend: Send + Sync {
    /// Short name for logs and audit entries.
    fn name(&self) -> &'static str;

    /// Can this backend run on this host right now?
    fn is_available(&self) -> bool;

    /// Spawn an agent process under this backend.
    async fn spawn(&self, config: &SandboxConfig) -> Result<SandboxProcess>;
}

/// Backend selector for configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Namespace,
    Seatbelt,
    Container,
    Subprocess,
}

fn build(kind: BackendKind) -> Arc<dyn SandboxBackend> {
    match kind {
        BackendKind::Namespace => Arc::new(NamespaceBackend::new()),
        BackendKind::Seatbelt => Arc::new(SeatbeltBackend::new()),
        BackendKind::Container => Arc::new(ContainerBackend::default()),
        BackendKind::Subprocess => Arc::new(SubprocessBackend),
    }
}

/// Platform preference order, strongest isolation first.
fn platform_order() -> &'static [BackendKind] {
    if cfg!(target_os = "linux") {
        &[BackendKind::Namespace, BackendKind::Container, BackendKind::Subprocess]
    } else if cfg!(target_os = "macos") {
        &[BackendKind::Seatbelt, BackendKind::Container, BackendKind::Subprocess]
    } else {
        &[BackendKind::Container, BackendKind::Subprocess]
    }
}

/// Pick a backend.
///
/// An explicit `preference` must be available or selection fails;
/// otherwise the first available backend in platform order wins.
pub fn select_backend(preference: Option<BackendKind>) -> Result<Arc<dyn SandboxBackend>> {
    if let Some(kind) = preference {
        let backend = build(kind);
        if !backend.is_available() {
            return Err(SandboxError::Unavailable(backend.name()));
        }
        info!(backend = backend.name(), "sandbox backend selected (explicit)");
        return Ok(backend);
    }
    for kind in platform_order() {
        let backend = build(*kind);
        if backend.is_available() {
            info!(backend = backend.name(), "sandbox backend selected (probed)");
            return Ok(backend);
        }
    }
    Err(SandboxError::Unavailable("no sandbox backend available"))
}

/// Locate a program on `PATH`.
pub(crate) fn find_in_path(program: &str) -> Option<std::path::PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        path.metadata()
            .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }
    #[cfg(not(unix))]
    {
        path.is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subprocess_always_selectable() {
        let backend = select_backend(Some(BackendKind::Subprocess)).unwrap();
        assert_eq!(backend.name(), "subprocess");
    }

    #[test]
    fn test_probe_order_terminates() {
        // Whatever the host offers, selection must resolve: subprocess is
        // the universal floor.
        assert!(select_backend(None).is_ok());
    }

    #[test]
    fn test_find_in_path_finds_sh() {
        assert!(find_in_path("sh").is_some());
        assert!(find_in_path("definitely-not-a-real-binary-xyz").is_none());
    }
}
