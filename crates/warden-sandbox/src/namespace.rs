//! # Namespace Backend (Linux)
//!
//! Wraps the agent command with `bwrap` (bubblewrap): fresh network, PID,
//! and IPC namespaces, a cleared environment, and an explicit mount plan.
//! The network namespace has no interfaces at all, so the required
//! invariant - the sandbox cannot reach the public network - holds by
//! construction; the only way out is the dispatcher socket bind-mounted
//! into `/run/warden`.
//!
//! Mount plan:
//!
//! | Host path | Sandbox path | Mode |
//! |-----------|--------------|------|
//! | workspace | `/workspace` | rw |
//! | skills | `/skills` | ro |
//! | socket dir | `/run/warden` | rw |
//! | identity dir | `/identity` | ro (optional) |
//! | `/usr` `/bin` `/lib*` `/etc` | same | ro |
//! | tmpfs | `/tmp` | rw |

use async_trait::async_trait;

use crate::backend::{find_in_path, SandboxBackend};
use crate::config::SandboxConfig;
use crate::error::Result;
use crate::process::{spawn_composed, SandboxProcess};

/// Workspace mount point inside the sandbox.
pub const SANDBOX_WORKSPACE: &str = "/workspace";

/// Skills mount point inside the sandbox.
pub const SANDBOX_SKILLS: &str = "/skills";

/// Dispatcher socket directory inside the sandbox.
pub const SANDBOX_SOCKET_DIR: &str = "/run/warden";

pub struct NamespaceBackend {
    bwrap: Option<std::path::PathBuf>,
}

impl NamespaceBackend {
    pub fn new() -> Self {
        Self {
            bwrap: find_in_path("bwrap"),
        }
    }

    fn compose(&self, config: &SandboxConfig) -> Vec<String> {
        let bwrap = self
            .bwrap
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|| "bwrap".to_string());

        let mut args: Vec<String> = vec![
            bwrap,
            "--die-with-parent".into(),
            "--unshare-net".into(),
            "--unshare-pid".into(),
            "--unshare-ipc".into(),
            "--clearenv".into(),
            "--setenv".into(),
            "PATH".into(),
            "/usr/bin:/bin".into(),
            "--setenv".into(),
            "HOME".into(),
            SANDBOX_WORKSPACE.into(),
        ];
        for (key, value) in &config.env {
            args.push("--setenv".into());
            args.push(key.clone());
            args.push(value.clone());
        }

        // System directories, read-only, only where they exist on the
        // host (merged-usr distros lack a real /lib64 etc).
        for dir in ["/usr", "/bin", "/lib", "/lib64", "/etc"] {
            if std::path::Path::new(dir).exists() {
                args.push("--ro-bind".into());
                args.push(dir.into());
                args.push(dir.into());
            }
        }
        args.push("--tmpfs".into());
        args.push("/tmp".into());

        args.push("--bind".into());
        args.push(config.workspace.to_string_lossy().into_owned());
        args.push(SANDBOX_WORKSPACE.into());

        args.push("--ro-bind".into());
        args.push(config.skills.to_string_lossy().into_owned());
        args.push(SANDBOX_SKILLS.into());

        args.push("--bind".into());
        args.push(config.socket_dir.to_string_lossy().into_owned());
        args.push(SANDBOX_SOCKET_DIR.into());

        if let Some(identity) = &config.identity_dir {
            args.push("--ro-bind".into());
            args.push(identity.to_string_lossy().into_owned());
            args.push("/identity".into());
        }
        if let Some(mounts) = &config.mounts {
            args.push("--ro-bind".into());
            args.push(mounts.agent_shared.to_string_lossy().into_owned());
            args.push("/workspace/shared".into());
            args.push("--bind".into());
            args.push(mounts.user.to_string_lossy().into_owned());
            args.push("/workspace/user".into());
            args.push("--bind".into());
            args.push(mounts.scratch.to_string_lossy().into_owned());
            args.push("/workspace/scratch".into());
        }

        args.push("--chdir".into());
        args.push(SANDBOX_WORKSPACE.into());
        args.push("--".into());
        args.extend(config.command.iter().cloned());
        args
    }
}

impl Default for NamespaceBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SandboxBackend for NamespaceBackend {
    fn name(&self) -> &'static str {
        "namespace"
    }

    fn is_available(&self) -> bool {
        cfg!(target_os = "linux") && self.bwrap.is_some()
    }

    async fn spawn(&self, config: &SandboxConfig) -> Result<SandboxProcess> {
        spawn_composed("namespace", self.compose(config), config)
    }
}
