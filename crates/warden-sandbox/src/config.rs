//! Sandbox spawn configuration.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Paths for the three-tier mount layout, when the host wants the full
/// tier split instead of a single workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierMounts {
    /// Mounted read-only.
    pub agent_shared: PathBuf,
    /// Mounted read-write.
    pub user: PathBuf,
    /// Mounted read-write.
    pub scratch: PathBuf,
}

/// Everything a backend needs to spawn one agent process.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Program and arguments, run inside the sandbox.
    pub command: Vec<String>,

    /// Primary workspace, mounted read-write at `/workspace`.
    pub workspace: PathBuf,

    /// Skills directory, mounted read-only at `/skills`.
    pub skills: PathBuf,

    /// Directory holding the dispatcher socket, mounted read-write so the
    /// agent can connect out through it.
    pub socket_dir: PathBuf,

    /// Optional agent identity directory, mounted read-only.
    pub identity_dir: Option<PathBuf>,

    /// Optional three-tier mounts layered on top of the workspace.
    pub mounts: Option<TierMounts>,

    /// Extra environment passed into the sandbox, alongside `PATH` and
    /// `HOME`. The dispatcher socket variables travel here.
    pub env: HashMap<String, String>,

    /// Hard wall-clock limit.
    pub timeout: Duration,

    /// Memory cap in MiB, enforced where the backend can.
    pub memory_limit_mb: Option<u64>,

    /// Process-count cap, enforced where the backend can.
    pub pid_limit: Option<u32>,
}

impl SandboxConfig {
    /// Minimal config for one command in one workspace.
    pub fn new(command: Vec<String>, workspace: impl Into<PathBuf>) -> Self {
        let workspace = workspace.into();
        Self {
            command,
            skills: workspace.join("skills"),
            socket_dir: workspace.clone(),
            workspace,
            identity_dir: None,
            mounts: None,
            env: HashMap::new(),
            timeout: Duration::from_secs(300),
            memory_limit_mb: Some(512),
            pid_limit: Some(64),
        }
    }

    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_mounts(mut self, mounts: TierMounts) -> Self {
        self.mounts = Some(mounts);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = SandboxConfig::new(vec!["agent".into()], "/tmp/ws")
            .with_env("WARDEN_SOCKET", "/run/warden/dispatch.sock")
            .with_timeout(Duration::from_secs(30));
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(
            config.env.get("WARDEN_SOCKET").map(String::as_str),
            Some("/run/warden/dispatch.sock")
        );
        assert_eq!(config.workspace, PathBuf::from("/tmp/ws"));
    }
}
