//! Host configuration, read from the environment once at startup.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::taint::DEFAULT_TAINT_THRESHOLD;
use crate::workspace::WorkspaceLayout;

/// Environment variables the host consumes.
pub mod env_vars {
    /// Host root override.
    pub const HOME: &str = "WARDEN_HOME";
    /// Upstream model API key.
    pub const UPSTREAM_API_KEY: &str = "WARDEN_UPSTREAM_API_KEY";
    /// Upstream OAuth token (used when no API key is present).
    pub const UPSTREAM_OAUTH_TOKEN: &str = "WARDEN_UPSTREAM_OAUTH_TOKEN";
    /// Encrypted credential store path.
    pub const CRED_STORE: &str = "WARDEN_CRED_STORE";
    /// Credential store passphrase.
    pub const CRED_PASSPHRASE: &str = "WARDEN_CRED_PASSPHRASE";
    /// Scanner feature-score threshold.
    pub const SCANNER_THRESHOLD: &str = "WARDEN_SCANNER_THRESHOLD";
}

/// Delegation guard limits.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DelegationLimits {
    /// Maximum simultaneously in-flight delegations.
    pub max_concurrent: usize,
    /// Maximum delegation chain depth.
    pub max_depth: u32,
}

impl Default for DelegationLimits {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            max_depth: 2,
        }
    }
}

/// Upstream model API wiring for the credential proxy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub oauth_token: Option<String>,
}

/// Top-level host configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Host root directory.
    pub home: PathBuf,

    /// Scanner feature-score threshold.
    pub scanner_threshold: f64,

    /// Taint external-ratio threshold.
    pub taint_threshold: f64,

    /// Delegation limits for `agent_delegate`.
    pub delegation: DelegationLimits,

    /// Inbound queue capacity.
    pub queue_capacity: usize,

    /// Default per-call timeout for dispatched actions, seconds.
    pub call_timeout_secs: u64,

    /// Upstream API configuration.
    pub upstream: UpstreamConfig,

    /// Encrypted credential store, when configured.
    pub credential_store: Option<PathBuf>,
    #[serde(skip_serializing, default)]
    pub credential_passphrase: Option<String>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            home: PathBuf::from(".warden"),
            scanner_threshold: warden_scanner::DEFAULT_THRESHOLD,
            taint_threshold: DEFAULT_TAINT_THRESHOLD,
            delegation: DelegationLimits::default(),
            queue_capacity: crate::queue::DEFAULT_QUEUE_CAPACITY,
            call_timeout_secs: 30,
            upstream: UpstreamConfig {
                base_url: "https://api.anthropic.com".into(),
                api_key: None,
                oauth_token: None,
            },
            credential_store: None,
            credential_passphrase: None,
        }
    }
}

impl HostConfig {
    /// Build configuration from the process environment.
    ///
    /// Reads every variable exactly once; later env mutations are not
    /// observed.
    pub fn from_env() -> Result<Self> {
        let layout = WorkspaceLayout::from_env()?;
        let mut config = Self {
            home: layout.root().to_path_buf(),
            ..Self::default()
        };
        if let Some(threshold) = read_env(env_vars::SCANNER_THRESHOLD).and_then(|v| v.parse().ok())
        {
            config.scanner_threshold = threshold;
        }
        config.upstream.api_key = read_env(env_vars::UPSTREAM_API_KEY);
        config.upstream.oauth_token = read_env(env_vars::UPSTREAM_OAUTH_TOKEN);
        config.credential_store = read_env(env_vars::CRED_STORE).map(PathBuf::from);
        config.credential_passphrase = read_env(env_vars::CRED_PASSPHRASE);
        Ok(config)
    }

    /// Workspace layout rooted at this configuration's home.
    pub fn layout(&self) -> WorkspaceLayout {
        WorkspaceLayout::new(&self.home)
    }
}

fn read_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HostConfig::default();
        assert_eq!(config.delegation.max_concurrent, 3);
        assert_eq!(config.delegation.max_depth, 2);
        assert_eq!(config.call_timeout_secs, 30);
        assert!((config.taint_threshold - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_passphrase_not_serialized() {
        let config = HostConfig {
            credential_passphrase: Some("hunter2".into()),
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("hunter2"));
    }
}
