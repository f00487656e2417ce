//! # Seatbelt Backend (macOS)
//!
//! Wraps the agent command with `sandbox-exec` and a deny-default
//! profile. The profile lives in `policy.sbpl` next to this file and is
//! parameterized through `-D` substitutions for the workspace, skills,
//! and socket paths, so the policy text itself never embeds host paths.
//!
//! Only `/usr/bin/sandbox-exec` is considered, never a `PATH` lookup: if
//! that binary has been replaced, the attacker already owns the host.

use async_trait::async_trait;

use crate::backend::SandboxBackend;
use crate::config::SandboxConfig;
use crate::error::Result;
use crate::process::{spawn_composed, SandboxProcess};

/// Fixed interpreter path, deliberately not resolved through `PATH`.
const SEATBELT_EXECUTABLE: &str = "/usr/bin/sandbox-exec";

/// The deny-default profile, parameterized by `-D` substitutions.
const SEATBELT_POLICY: &str = include_str!("policy.sbpl");

pub struct SeatbeltBackend;

impl SeatbeltBackend {
    pub fn new() -> Self {
        Self
    }

    fn compose(&self, config: &SandboxConfig) -> Vec<String> {
        let mut args: Vec<String> = vec![
            SEATBELT_EXECUTABLE.into(),
            "-p".into(),
            SEATBELT_POLICY.into(),
            format!("-DWORKSPACE={}", config.workspace.display()),
            format!("-DSKILLS={}", config.skills.display()),
            format!("-DSOCKET_DIR={}", config.socket_dir.display()),
            "--".into(),
        ];
        args.extend(config.command.iter().cloned());
        args
    }
}

impl Default for SeatbeltBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SandboxBackend for SeatbeltBackend {
    fn name(&self) -> &'static str {
        "seatbelt"
    }

    fn is_available(&self) -> bool {
        cfg!(target_os = "macos") && std::path::Path::new(SEATBELT_EXECUTABLE).exists()
    }

    async fn spawn(&self, config: &SandboxConfig) -> Result<SandboxProcess> {
        spawn_composed("seatbelt", self.compose(config), config)
    }
}
