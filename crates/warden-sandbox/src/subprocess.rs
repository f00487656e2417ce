//! # Subprocess Backend (dev/test only)
//!
//! A plain child process with the sandbox stdio/env policy but no
//! isolation at all. Available everywhere; selected only as the last
//! fallback or by explicit configuration. Never deploy this backend
//! against untrusted agents.

use async_trait::async_trait;

use crate::backend::SandboxBackend;
use crate::config::SandboxConfig;
use crate::error::Result;
use crate::process::{spawn_composed, SandboxProcess};

pub struct SubprocessBackend;

#[async_trait]
impl SandboxBackend for SubprocessBackend {
    fn name(&self) -> &'static str {
        "subprocess"
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn spawn(&self, config: &SandboxConfig) -> Result<SandboxProcess> {
        spawn_composed("subprocess", config.command.clone(), config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_spawn_and_collect() {
        let config = SandboxConfig::new(
            vec!["sh".into(), "-c".into(), "echo from-sandbox".into()],
            std::env::temp_dir(),
        );
        let process = SubprocessBackend.spawn(&config).await.unwrap();
        assert!(process.pid.is_some());
        let output = process
            .collect_output(Duration::from_secs(5), Duration::from_secs(1))
            .await
            .unwrap();
        assert!(output.success());
        assert_eq!(output.stdout.trim(), "from-sandbox");
    }

    #[tokio::test]
    async fn test_env_is_allowlist_plus_config() {
        let config = SandboxConfig::new(
            vec!["sh".into(), "-c".into(), "echo ${WARDEN_SOCKET:-unset} ${SECRET_TOKEN:-absent}".into()],
            std::env::temp_dir(),
        )
        .with_env("WARDEN_SOCKET", "/tmp/d.sock");
        std::env::set_var("SECRET_TOKEN", "should-not-leak");

        let process = SubprocessBackend.spawn(&config).await.unwrap();
        let output = process
            .collect_output(Duration::from_secs(5), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(output.stdout.trim(), "/tmp/d.sock absent");
    }
}
