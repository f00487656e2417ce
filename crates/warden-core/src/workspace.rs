//! # Workspace Tiers and Path Safety
//!
//! Every agent sees three directory tiers, each rooted under the
//! host-controlled base:
//!
//! | Tier | Path | Agent access |
//! |------|------|--------------|
//! | agent-shared | `agents/<agent>/agent` | read-only |
//! | per-user | `agents/<agent>/users/<user>/workspace` | read-write |
//! | scratch | `scratch/<session path>` | read-write, deleted on session end |
//!
//! ## Path Safety
//!
//! Every path computed from request input goes through [`WorkspaceLayout::resolve`],
//! which validates each segment and guarantees the joined result stays
//! strictly inside the declared tier root. `..`, absolute inputs, NUL,
//! and oversized segments all fail with a path-escape or segment error
//! before any filesystem call happens. This check is lexical on purpose:
//! it must hold for paths that do not exist yet.

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::session::SessionId;

/// Default host root under `$HOME` when `WARDEN_HOME` is unset.
const DEFAULT_HOME_DIR: &str = ".warden";

/// Environment variable overriding the host root.
pub const HOME_ENV_VAR: &str = "WARDEN_HOME";

/// Longest accepted path segment.
const MAX_SEGMENT_LEN: usize = 255;

/// Workspace tier, in ascending order of agent privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Shared agent identity and skills; read-only inside the sandbox.
    AgentShared,
    /// Per-user persistent workspace; read-write.
    User,
    /// Per-session scratch; read-write, deleted on session end.
    Scratch,
}

impl Tier {
    pub fn is_writable(&self) -> bool {
        !matches!(self, Tier::AgentShared)
    }
}

/// Resolved directory layout for one host root.
#[derive(Debug, Clone)]
pub struct WorkspaceLayout {
    root: PathBuf,
}

impl WorkspaceLayout {
    /// Layout rooted at an explicit directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Layout from the environment: `WARDEN_HOME`, else `$HOME/.warden`.
    pub fn from_env() -> Result<Self> {
        if let Ok(home) = std::env::var(HOME_ENV_VAR) {
            return Ok(Self::new(home));
        }
        let home = std::env::var("HOME")
            .map_err(|_| CoreError::Config("neither WARDEN_HOME nor HOME is set".into()))?;
        Ok(Self::new(Path::new(&home).join(DEFAULT_HOME_DIR)))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/config.toml`
    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    /// `<root>/.env`
    pub fn env_file(&self) -> PathBuf {
        self.root.join(".env")
    }

    /// `<root>/data` - journals and other host-owned state.
    pub fn data_dir(&self) -> PathBuf {
        self.root.join("data")
    }

    /// Agent-shared tier root for one agent.
    pub fn agent_shared_dir(&self, agent_id: &str) -> Result<PathBuf> {
        validate_segment(agent_id)?;
        Ok(self.root.join("agents").join(agent_id).join("agent"))
    }

    /// Skills directory inside the agent-shared tier.
    pub fn skills_dir(&self, agent_id: &str) -> Result<PathBuf> {
        Ok(self.agent_shared_dir(agent_id)?.join("skills"))
    }

    /// Per-user tier root.
    pub fn user_dir(&self, agent_id: &str, user_id: &str) -> Result<PathBuf> {
        validate_segment(agent_id)?;
        validate_segment(user_id)?;
        Ok(self
            .root
            .join("agents")
            .join(agent_id)
            .join("users")
            .join(user_id)
            .join("workspace"))
    }

    /// Scratch tier root for a session.
    ///
    /// The direct join is safe because [`SessionId`] parsing rejects
    /// `.`/`..` segments, so `workspace_rel_path` cannot traverse out of
    /// the scratch subtree.
    pub fn scratch_dir(&self, session: &SessionId) -> PathBuf {
        self.root.join("scratch").join(session.workspace_rel_path())
    }

    /// Resolve a request-supplied relative path inside a tier root.
    ///
    /// # Errors
    ///
    /// - [`CoreError::PathEscape`] for absolute inputs, `..` components,
    ///   or any input whose join would leave `tier_root`
    /// - [`CoreError::InvalidSegment`] for empty, NUL-bearing, or
    ///   oversized segments
    pub fn resolve(&self, tier_root: &Path, relative: &str) -> Result<PathBuf> {
        if relative.is_empty() {
            return Err(CoreError::InvalidSegment("empty path".into()));
        }
        let candidate = Path::new(relative);
        if candidate.is_absolute() {
            return Err(CoreError::PathEscape(relative.to_string()));
        }

        let mut resolved = tier_root.to_path_buf();
        for component in candidate.components() {
            match component {
                Component::Normal(part) => {
                    let part = part
                        .to_str()
                        .ok_or_else(|| CoreError::InvalidSegment(relative.to_string()))?;
                    validate_segment(part)?;
                    resolved.push(part);
                }
                Component::CurDir => {}
                Component::ParentDir => {
                    return Err(CoreError::PathEscape(relative.to_string()));
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(CoreError::PathEscape(relative.to_string()));
                }
            }
        }

        // Belt and braces: the join above cannot leave the root without a
        // ParentDir, but keep the invariant explicit.
        if !resolved.starts_with(tier_root) || resolved == tier_root {
            return Err(CoreError::PathEscape(relative.to_string()));
        }
        Ok(resolved)
    }
}

fn validate_segment(segment: &str) -> Result<()> {
    if segment.is_empty()
        || segment.len() > MAX_SEGMENT_LEN
        || segment.contains('\0')
        || segment.contains('/')
        || segment == "."
        || segment == ".."
    {
        return Err(CoreError::InvalidSegment(segment.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> WorkspaceLayout {
        WorkspaceLayout::new("/srv/warden")
    }

    #[test]
    fn test_tier_roots() {
        let l = layout();
        assert_eq!(
            l.user_dir("helper", "alice").unwrap(),
            PathBuf::from("/srv/warden/agents/helper/users/alice/workspace")
        );
        assert_eq!(
            l.agent_shared_dir("helper").unwrap(),
            PathBuf::from("/srv/warden/agents/helper/agent")
        );
        let session = SessionId::parse("cli:dm:u1").unwrap();
        assert_eq!(
            l.scratch_dir(&session),
            PathBuf::from("/srv/warden/scratch/cli/dm/u1")
        );
    }

    #[test]
    fn test_resolve_inside_root() {
        let l = layout();
        let root = l.user_dir("a", "u").unwrap();
        let path = l.resolve(&root, "notes/today.md").unwrap();
        assert!(path.starts_with(&root));
        assert!(path.ends_with("notes/today.md"));
    }

    #[test]
    fn test_traversal_rejected() {
        let l = layout();
        let root = l.user_dir("a", "u").unwrap();
        for bad in ["../escape", "notes/../../escape", "a/../../../etc/passwd"] {
            assert!(
                matches!(l.resolve(&root, bad), Err(CoreError::PathEscape(_))),
                "should reject {}",
                bad
            );
        }
    }

    #[test]
    fn test_absolute_rejected() {
        let l = layout();
        let root = l.user_dir("a", "u").unwrap();
        assert!(matches!(
            l.resolve(&root, "/etc/passwd"),
            Err(CoreError::PathEscape(_))
        ));
    }

    #[test]
    fn test_empty_and_dot_rejected() {
        let l = layout();
        let root = l.user_dir("a", "u").unwrap();
        assert!(l.resolve(&root, "").is_err());
        assert!(l.resolve(&root, ".").is_err());
    }

    #[test]
    fn test_curdir_components_collapse() {
        let l = layout();
        let root = l.user_dir("a", "u").unwrap();
        let path = l.resolve(&root, "./notes/./x.md").unwrap();
        assert_eq!(path, root.join("notes").join("x.md"));
    }

    #[test]
    fn test_bad_agent_segment() {
        let l = layout();
        assert!(l.agent_shared_dir("..").is_err());
        assert!(l.user_dir("ok", "bad/part").is_err());
    }

    #[test]
    fn test_scratch_dir_stays_under_root() {
        let l = layout();
        let scratch_root = PathBuf::from("/srv/warden/scratch");
        for raw in ["cli:dm:u1", "a.b:c..d:e_f", "slack:channel:C1:T2"] {
            let session = SessionId::parse(raw).unwrap();
            let dir = l.scratch_dir(&session);
            assert!(dir.starts_with(&scratch_root), "{raw} escaped: {}", dir.display());
            assert!(
                dir.components()
                    .all(|c| !matches!(c, std::path::Component::ParentDir)),
                "{raw} produced a parent component"
            );
        }
    }
}
