//! # Container Backend
//!
//! Wraps the agent command with `docker run` under a restrictive flag
//! set: no network, read-only root filesystem, all capabilities dropped,
//! no privilege escalation, memory/PID limits, tmpfs `/tmp`. An optional
//! alternative runtime flag (e.g. a VM-isolating runtime) hardens further
//! where the host offers one.

use async_trait::async_trait;

use crate::backend::{find_in_path, SandboxBackend};
use crate::config::SandboxConfig;
use crate::error::Result;
use crate::namespace::{SANDBOX_SKILLS, SANDBOX_SOCKET_DIR, SANDBOX_WORKSPACE};
use crate::process::{spawn_composed, SandboxProcess};

/// Default image for agent containers.
const DEFAULT_IMAGE: &str = "debian:stable-slim";

pub struct ContainerBackend {
    docker: Option<std::path::PathBuf>,
    image: String,
    /// Extra `--runtime` flag when stronger isolation is installed.
    runtime: Option<String>,
}

impl ContainerBackend {
    pub fn new(image: impl Into<String>, runtime: Option<String>) -> Self {
        Self {
            docker: find_in_path("docker"),
            image: image.into(),
            runtime,
        }
    }

    fn compose(&self, config: &SandboxConfig) -> Vec<String> {
        let docker = self
            .docker
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|| "docker".to_string());

        let mut args: Vec<String> = vec![
            docker,
            "run".into(),
            "--rm".into(),
            "-i".into(),
            "--network=none".into(),
            "--read-only".into(),
            "--cap-drop=ALL".into(),
            "--security-opt".into(),
            "no-new-privileges".into(),
            "--tmpfs".into(),
            "/tmp".into(),
        ];
        if let Some(runtime) = &self.runtime {
            args.push(format!("--runtime={runtime}"));
        }
        if let Some(mb) = config.memory_limit_mb {
            args.push(format!("--memory={mb}m"));
        }
        if let Some(pids) = config.pid_limit {
            args.push(format!("--pids-limit={pids}"));
        }

        args.push("-v".into());
        args.push(format!("{}:{}:rw", config.workspace.display(), SANDBOX_WORKSPACE));
        args.push("-v".into());
        args.push(format!("{}:{}:ro", config.skills.display(), SANDBOX_SKILLS));
        args.push("-v".into());
        args.push(format!("{}:{}:rw", config.socket_dir.display(), SANDBOX_SOCKET_DIR));
        if let Some(identity) = &config.identity_dir {
            args.push("-v".into());
            args.push(format!("{}:/identity:ro", identity.display()));
        }

        args.push("-w".into());
        args.push(SANDBOX_WORKSPACE.into());
        for (key, value) in &config.env {
            args.push("-e".into());
            args.push(format!("{key}={value}"));
        }
        args.push(self.image.clone());
        args.extend(config.command.iter().cloned());
        args
    }
}

impl Default for ContainerBackend {
    fn default() -> Self {
        Self::new(DEFAULT_IMAGE, None)
    }
}

#[async_trait]
impl SandboxBackend for ContainerBackend {
    fn name(&self) -> &'static str {
        "container"
    }

    fn is_available(&self) -> bool {
        self.docker.is_some()
    }

    async fn spawn(&self, config: &SandboxConfig) -> Result<SandboxProcess> {
        spawn_composed("container", self.compose(config), config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_hardening_flags() {
        let backend = ContainerBackend::default();
        let config = SandboxConfig::new(vec!["agent".into()], "/srv/ws");
        let args = backend.compose(&config);
        for flag in ["--network=none", "--read-only", "--cap-drop=ALL"] {
            assert!(args.contains(&flag.to_string()), "missing {flag}");
        }
        assert!(args.iter().any(|a| a.starts_with("--memory=")));
        assert!(args.iter().any(|a| a.starts_with("--pids-limit=")));
    }

    #[test]
    fn test_compose_runtime_flag_optional() {
        let plain = ContainerBackend::default();
        let config = SandboxConfig::new(vec!["agent".into()], "/srv/ws");
        assert!(!plain.compose(&config).iter().any(|a| a.starts_with("--runtime=")));

        let hardened = ContainerBackend::new(DEFAULT_IMAGE, Some("kata".into()));
        assert!(hardened
            .compose(&config)
            .contains(&"--runtime=kata".to_string()));
    }

    #[test]
    fn test_volume_modes() {
        let backend = ContainerBackend::default();
        let config = SandboxConfig::new(vec!["agent".into()], "/srv/ws");
        let joined = backend.compose(&config).join(" ");
        assert!(joined.contains("/srv/ws:/workspace:rw"));
        assert!(joined.contains("/srv/ws/skills:/skills:ro"));
    }
}
