//! # Capability Handlers
//!
//! The dispatcher validates and gates requests; this module is what the
//! requests reach afterwards. Capabilities with external drivers (memory
//! store, web, browser, model API, scheduler) are traits so deployments
//! wire their own implementations; filesystem-backed capabilities
//! (workspace tiers, skills, identity notes) are concrete because the
//! workspace layout is host-owned.
//!
//! Every trait ships a default implementation that either works
//! self-contained (in-memory KV log) or fails closed with a clear
//! "unavailable" error (web, browser, model). A host with nothing wired
//! still dispatches correctly; the agent just learns the capability is
//! absent.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use warden_audit::{AuditFilter, AuditJournal};
use warden_core::{SessionId, TaintTag, Tier, TrustLevel, WorkspaceLayout};

use crate::actions::{Action, TierArg};
use crate::error::{HandlerError, HandlerResult};

/// Upper bound on skills listed or read.
const MAX_SKILLS: usize = 128;

/// Largest skill file served to an agent.
const MAX_SKILL_BYTES: u64 = 256 * 1024;

// ---------------------------------------------------------------------------
// Request context
// ---------------------------------------------------------------------------

/// Identity of the caller for one dispatched request.
#[derive(Debug, Clone)]
pub struct ActionContext {
    pub session_id: SessionId,
    /// Agent identifier; may carry a `.depth=N` suffix when the agent is a
    /// delegate of another agent.
    pub agent_id: String,
    pub trust: TrustLevel,
}

impl ActionContext {
    pub fn new(session_id: SessionId, agent_id: impl Into<String>, trust: TrustLevel) -> Self {
        Self {
            session_id,
            agent_id: agent_id.into(),
            trust,
        }
    }

    /// Delegation depth encoded in the agent id (0 when absent).
    pub fn depth(&self) -> u32 {
        self.agent_id
            .rsplit_once(".depth=")
            .and_then(|(_, n)| n.parse().ok())
            .unwrap_or(0)
    }

    /// Context for a delegate one level deeper.
    ///
    /// `name` overrides the base agent name when given; the depth suffix
    /// is always rewritten to `current + 1`.
    pub fn child(&self, name: Option<&str>) -> Self {
        let base = match name {
            Some(name) => name,
            None => self
                .agent_id
                .rsplit_once(".depth=")
                .map(|(base, _)| base)
                .unwrap_or(&self.agent_id),
        };
        Self {
            session_id: self.session_id.clone(),
            agent_id: format!("{}.depth={}", base, self.depth() + 1),
            trust: self.trust,
        }
    }
}

// ---------------------------------------------------------------------------
// Memory: abstract key/value log
// ---------------------------------------------------------------------------

/// One stored memory entry with its taint provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub key: String,
    pub value: String,
    pub tags: Vec<String>,
    pub taint: TaintTag,
}

/// Abstract per-session key/value log.
#[async_trait]
pub trait KvLog: Send + Sync {
    async fn write(&self, session: &str, entry: MemoryEntry) -> HandlerResult<()>;
    async fn read(&self, session: &str, key: &str) -> HandlerResult<Option<MemoryEntry>>;
    async fn delete(&self, session: &str, key: &str) -> HandlerResult<bool>;
    async fn list(&self, session: &str, prefix: Option<&str>) -> HandlerResult<Vec<String>>;
    /// Substring match over keys and values, bounded by `limit`.
    async fn query(&self, session: &str, query: &str, limit: usize) -> HandlerResult<Vec<MemoryEntry>>;
}

/// Process-local KV log; the default driver and the test double.
#[derive(Default)]
pub struct InMemoryKvLog {
    entries: Mutex<BTreeMap<(String, String), MemoryEntry>>,
}

#[async_trait]
impl KvLog for InMemoryKvLog {
    async fn write(&self, session: &str, entry: MemoryEntry) -> HandlerResult<()> {
        self.entries
            .lock()
            .expect("kv lock poisoned")
            .insert((session.to_string(), entry.key.clone()), entry);
        Ok(())
    }

    async fn read(&self, session: &str, key: &str) -> HandlerResult<Option<MemoryEntry>> {
        Ok(self
            .entries
            .lock()
            .expect("kv lock poisoned")
            .get(&(session.to_string(), key.to_string()))
            .cloned())
    }

    async fn delete(&self, session: &str, key: &str) -> HandlerResult<bool> {
        Ok(self
            .entries
            .lock()
            .expect("kv lock poisoned")
            .remove(&(session.to_string(), key.to_string()))
            .is_some())
    }

    async fn list(&self, session: &str, prefix: Option<&str>) -> HandlerResult<Vec<String>> {
        Ok(self
            .entries
            .lock()
            .expect("kv lock poisoned")
            .iter()
            .filter(|((s, key), _)| s == session && prefix.map_or(true, |p| key.starts_with(p)))
            .map(|((_, key), _)| key.clone())
            .collect())
    }

    async fn query(&self, session: &str, query: &str, limit: usize) -> HandlerResult<Vec<MemoryEntry>> {
        Ok(self
            .entries
            .lock()
            .expect("kv lock poisoned")
            .iter()
            .filter(|((s, _), entry)| {
                s == session && (entry.key.contains(query) || entry.value.contains(query))
            })
            .take(limit)
            .map(|(_, entry)| entry.clone())
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Web, browser, model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Outbound web access, performed by the host on the agent's behalf.
#[async_trait]
pub trait WebClient: Send + Sync {
    async fn fetch(&self, url: &str) -> HandlerResult<String>;
    async fn search(&self, query: &str, max_results: usize) -> HandlerResult<Vec<SearchHit>>;
}

/// Fails closed; deployments without web access keep this default.
pub struct UnavailableWeb;

#[async_trait]
impl WebClient for UnavailableWeb {
    async fn fetch(&self, _url: &str) -> HandlerResult<String> {
        Err(HandlerError::Unavailable("web access is not configured"))
    }

    async fn search(&self, _query: &str, _max: usize) -> HandlerResult<Vec<SearchHit>> {
        Err(HandlerError::Unavailable("web search is not configured"))
    }
}

/// Browser automation contract.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn launch(&self) -> HandlerResult<()>;
    async fn navigate(&self, url: &str) -> HandlerResult<()>;
    async fn snapshot(&self) -> HandlerResult<String>;
    async fn click(&self, selector: &str) -> HandlerResult<()>;
    async fn type_text(&self, selector: &str, text: &str) -> HandlerResult<()>;
    async fn screenshot(&self) -> HandlerResult<Vec<u8>>;
    async fn close(&self) -> HandlerResult<()>;
}

/// Fails closed on every call.
pub struct UnavailableBrowser;

#[async_trait]
impl BrowserDriver for UnavailableBrowser {
    async fn launch(&self) -> HandlerResult<()> {
        Err(HandlerError::Unavailable("browser automation is not configured"))
    }
    async fn navigate(&self, _url: &str) -> HandlerResult<()> {
        Err(HandlerError::Unavailable("browser automation is not configured"))
    }
    async fn snapshot(&self) -> HandlerResult<String> {
        Err(HandlerError::Unavailable("browser automation is not configured"))
    }
    async fn click(&self, _selector: &str) -> HandlerResult<()> {
        Err(HandlerError::Unavailable("browser automation is not configured"))
    }
    async fn type_text(&self, _selector: &str, _text: &str) -> HandlerResult<()> {
        Err(HandlerError::Unavailable("browser automation is not configured"))
    }
    async fn screenshot(&self) -> HandlerResult<Vec<u8>> {
        Err(HandlerError::Unavailable("browser automation is not configured"))
    }
    async fn close(&self) -> HandlerResult<()> {
        Err(HandlerError::Unavailable("browser automation is not configured"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmReply {
    pub content: String,
    pub tokens_used: u64,
}

/// Model inference, routed through the credential proxy by real
/// deployments.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(
        &self,
        prompt: &str,
        system: Option<&str>,
        max_tokens: Option<u32>,
    ) -> HandlerResult<LlmReply>;
}

pub struct UnavailableLlm;

#[async_trait]
impl LlmClient for UnavailableLlm {
    async fn complete(
        &self,
        _prompt: &str,
        _system: Option<&str>,
        _max_tokens: Option<u32>,
    ) -> HandlerResult<LlmReply> {
        Err(HandlerError::Unavailable("model access is not configured"))
    }
}

// ---------------------------------------------------------------------------
// Scheduler handle
// ---------------------------------------------------------------------------

/// The dispatcher's view of the scheduler.
#[async_trait]
pub trait SchedulerHandle: Send + Sync {
    async fn add_cron(
        &self,
        session: &SessionId,
        expr: &str,
        prompt: &str,
        max_token_budget: Option<u64>,
        run_once: bool,
    ) -> HandlerResult<String>;
    async fn run_at(&self, session: &SessionId, at: DateTime<Utc>, prompt: &str) -> HandlerResult<String>;
    async fn remove(&self, job_id: &str) -> HandlerResult<bool>;
    async fn list(&self, session: &SessionId) -> HandlerResult<Value>;
}

pub struct NoScheduler;

#[async_trait]
impl SchedulerHandle for NoScheduler {
    async fn add_cron(
        &self,
        _session: &SessionId,
        _expr: &str,
        _prompt: &str,
        _budget: Option<u64>,
        _run_once: bool,
    ) -> HandlerResult<String> {
        Err(HandlerError::Unavailable("scheduler is not running"))
    }
    async fn run_at(&self, _s: &SessionId, _at: DateTime<Utc>, _p: &str) -> HandlerResult<String> {
        Err(HandlerError::Unavailable("scheduler is not running"))
    }
    async fn remove(&self, _job_id: &str) -> HandlerResult<bool> {
        Err(HandlerError::Unavailable("scheduler is not running"))
    }
    async fn list(&self, _s: &SessionId) -> HandlerResult<Value> {
        Err(HandlerError::Unavailable("scheduler is not running"))
    }
}

// ---------------------------------------------------------------------------
// Workspace files
// ---------------------------------------------------------------------------

/// Filesystem-backed workspace capability bound to one agent and user.
pub struct WorkspaceFiles {
    layout: WorkspaceLayout,
    agent_id: String,
    user_id: String,
}

impl WorkspaceFiles {
    pub fn new(layout: WorkspaceLayout, agent_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            layout,
            agent_id: agent_id.into(),
            user_id: user_id.into(),
        }
    }

    fn tier_root(&self, tier: Tier, session: &SessionId) -> HandlerResult<PathBuf> {
        Ok(match tier {
            Tier::AgentShared => self.layout.agent_shared_dir(&self.agent_id)?,
            Tier::User => self.layout.user_dir(&self.agent_id, &self.user_id)?,
            Tier::Scratch => self.layout.scratch_dir(session),
        })
    }

    pub async fn read(&self, tier: Tier, session: &SessionId, path: &str) -> HandlerResult<String> {
        let root = self.tier_root(tier, session)?;
        let resolved = self.layout.resolve(&root, path)?;
        tokio::fs::read_to_string(&resolved)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => HandlerError::NotFound(path.to_string()),
                _ => HandlerError::Failed(e.to_string()),
            })
    }

    pub async fn write(
        &self,
        tier: Tier,
        session: &SessionId,
        path: &str,
        content: &str,
    ) -> HandlerResult<()> {
        if !tier.is_writable() {
            return Err(HandlerError::Denied(
                "agent-shared tier is read-only".to_string(),
            ));
        }
        let root = self.tier_root(tier, session)?;
        let resolved = self.layout.resolve(&root, path)?;
        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&resolved, content).await?;
        Ok(())
    }

    pub async fn list(
        &self,
        tier: Tier,
        session: &SessionId,
        path: Option<&str>,
    ) -> HandlerResult<Vec<String>> {
        let root = self.tier_root(tier, session)?;
        let dir = match path {
            Some(path) => self.layout.resolve(&root, path)?,
            None => root,
        };
        let mut names = Vec::new();
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    /// Append a dated note to the agent's identity file.
    pub async fn write_identity(&self, content: &str) -> HandlerResult<()> {
        let dir = self.layout.agent_shared_dir(&self.agent_id)?;
        append_note(dir.join("IDENTITY.md"), content).await
    }

    /// Append a dated note to the user profile file.
    pub async fn write_user_profile(&self, content: &str) -> HandlerResult<()> {
        let dir = self.layout.user_dir(&self.agent_id, &self.user_id)?;
        append_note(dir.join("USER.md"), content).await
    }
}

async fn append_note(path: PathBuf, content: &str) -> HandlerResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let existing = tokio::fs::read_to_string(&path).await.unwrap_or_default();
    let stamped = format!("{}\n## {}\n{}\n", existing, Utc::now().to_rfc3339(), content);
    tokio::fs::write(&path, stamped).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Skills
// ---------------------------------------------------------------------------

/// Markdown skill files in a fixed directory, with a pending-proposal
/// queue beside it. Reading is bounded in count and size; discovery is a
/// suffix match, never reflection.
pub struct SkillStore {
    skills_dir: PathBuf,
    proposals_dir: PathBuf,
}

impl SkillStore {
    pub fn new(skills_dir: impl Into<PathBuf>) -> Self {
        let skills_dir = skills_dir.into();
        let proposals_dir = skills_dir.join("proposals");
        Self {
            skills_dir,
            proposals_dir,
        }
    }

    fn skill_path(&self, dir: &PathBuf, name: &str) -> HandlerResult<PathBuf> {
        if name.is_empty() || name.contains('/') || name.contains("..") || name.contains('\0') {
            return Err(HandlerError::Denied(format!("invalid skill name: {name}")));
        }
        Ok(dir.join(format!("{name}.md")))
    }

    pub async fn list(&self) -> HandlerResult<Vec<String>> {
        list_md(&self.skills_dir).await
    }

    pub async fn read(&self, name: &str) -> HandlerResult<String> {
        let path = self.skill_path(&self.skills_dir, name)?;
        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|_| HandlerError::NotFound(name.to_string()))?;
        if meta.len() > MAX_SKILL_BYTES {
            return Err(HandlerError::Denied(format!(
                "skill '{name}' exceeds {MAX_SKILL_BYTES} bytes"
            )));
        }
        Ok(tokio::fs::read_to_string(&path).await?)
    }

    pub async fn propose(&self, name: &str, content: &str) -> HandlerResult<()> {
        let path = self.skill_path(&self.proposals_dir, name)?;
        tokio::fs::create_dir_all(&self.proposals_dir).await?;
        tokio::fs::write(&path, content).await?;
        Ok(())
    }

    pub async fn list_proposals(&self) -> HandlerResult<Vec<String>> {
        list_md(&self.proposals_dir).await
    }

    /// Approve moves the proposal into the skills dir; reject deletes it.
    pub async fn review(&self, name: &str, approve: bool) -> HandlerResult<()> {
        let pending = self.skill_path(&self.proposals_dir, name)?;
        if tokio::fs::metadata(&pending).await.is_err() {
            return Err(HandlerError::NotFound(name.to_string()));
        }
        if approve {
            let target = self.skill_path(&self.skills_dir, name)?;
            tokio::fs::create_dir_all(&self.skills_dir).await?;
            tokio::fs::rename(&pending, &target).await?;
        } else {
            tokio::fs::remove_file(&pending).await?;
        }
        Ok(())
    }
}

async fn list_md(dir: &PathBuf) -> HandlerResult<Vec<String>> {
    let mut names = Vec::new();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
        Err(e) => return Err(e.into()),
    };
    while let Some(entry) = entries.next_entry().await? {
        if names.len() >= MAX_SKILLS {
            break;
        }
        let file_name = entry.file_name().to_string_lossy().into_owned();
        if let Some(stem) = file_name.strip_suffix(".md") {
            names.push(stem.to_string());
        }
    }
    names.sort();
    Ok(names)
}

// ---------------------------------------------------------------------------
// The assembled capability host
// ---------------------------------------------------------------------------

/// Everything the dispatcher can reach on a request's behalf.
pub struct HostCapabilities {
    pub memory: std::sync::Arc<dyn KvLog>,
    pub web: std::sync::Arc<dyn WebClient>,
    pub browser: std::sync::Arc<dyn BrowserDriver>,
    pub llm: std::sync::Arc<dyn LlmClient>,
    pub scheduler: std::sync::Arc<dyn SchedulerHandle>,
    pub workspace: WorkspaceFiles,
    pub skills: SkillStore,
    pub audit: AuditJournal,
}

impl HostCapabilities {
    /// Minimal wiring for tests and dev: in-memory KV, everything else
    /// unavailable, workspace rooted at `root`.
    pub fn minimal(root: impl Into<PathBuf>, audit: AuditJournal) -> Self {
        let layout = WorkspaceLayout::new(root);
        let skills = SkillStore::new(layout.root().join("skills"));
        Self {
            memory: std::sync::Arc::new(InMemoryKvLog::default()),
            web: std::sync::Arc::new(UnavailableWeb),
            browser: std::sync::Arc::new(UnavailableBrowser),
            llm: std::sync::Arc::new(UnavailableLlm),
            scheduler: std::sync::Arc::new(NoScheduler),
            workspace: WorkspaceFiles::new(layout, "agent", "user"),
            skills,
            audit,
        }
    }

    /// Execute one typed action. `agent_delegate` is not handled here;
    /// the dispatcher owns its guards.
    pub async fn handle(&self, action: &Action, ctx: &ActionContext) -> HandlerResult<Value> {
        let session = ctx.session_id.as_str();
        match action {
            Action::LlmCall(p) => {
                let reply = self
                    .llm
                    .complete(&p.prompt, p.system.as_deref(), p.max_tokens)
                    .await?;
                Ok(json!({ "content": reply.content, "tokens_used": reply.tokens_used }))
            }
            Action::MemoryWrite(p) => {
                self.memory
                    .write(
                        session,
                        MemoryEntry {
                            key: p.key.clone(),
                            value: p.value.clone(),
                            tags: p.tags.clone().unwrap_or_default(),
                            taint: TaintTag::new(ctx.agent_id.clone(), ctx.trust),
                        },
                    )
                    .await?;
                Ok(json!({ "key": p.key }))
            }
            Action::MemoryQuery(p) => {
                let entries = self
                    .memory
                    .query(session, &p.query, p.limit.unwrap_or(50))
                    .await?;
                Ok(json!({ "entries": entries }))
            }
            Action::MemoryRead(p) => match self.memory.read(session, &p.key).await? {
                Some(entry) => Ok(json!({ "entry": entry })),
                None => Err(HandlerError::NotFound(p.key.clone())),
            },
            Action::MemoryDelete(p) => {
                let deleted = self.memory.delete(session, &p.key).await?;
                Ok(json!({ "deleted": deleted }))
            }
            Action::MemoryList(p) => {
                let keys = self.memory.list(session, p.prefix.as_deref()).await?;
                Ok(json!({ "keys": keys }))
            }
            Action::WebFetch(p) => {
                let content = self.web.fetch(&p.url).await?;
                Ok(json!({ "url": p.url, "content": content }))
            }
            Action::WebSearch(p) => {
                let hits = self
                    .web
                    .search(&p.query, p.max_results.unwrap_or(10) as usize)
                    .await?;
                Ok(json!({ "results": hits }))
            }
            Action::BrowserLaunch(_) => {
                self.browser.launch().await?;
                Ok(json!({}))
            }
            Action::BrowserNavigate(p) => {
                self.browser.navigate(&p.url).await?;
                Ok(json!({}))
            }
            Action::BrowserSnapshot(_) => {
                let snapshot = self.browser.snapshot().await?;
                Ok(json!({ "snapshot": snapshot }))
            }
            Action::BrowserClick(p) => {
                self.browser.click(&p.selector).await?;
                Ok(json!({}))
            }
            Action::BrowserType(p) => {
                self.browser.type_text(&p.selector, &p.text).await?;
                Ok(json!({}))
            }
            Action::BrowserScreenshot(_) => {
                let image = self.browser.screenshot().await?;
                Ok(json!({ "bytes": image.len() }))
            }
            Action::BrowserClose(_) => {
                self.browser.close().await?;
                Ok(json!({}))
            }
            Action::SkillRead(p) => {
                let content = self.skills.read(&p.name).await?;
                Ok(json!({ "name": p.name, "content": content }))
            }
            Action::SkillList(_) => {
                let skills = self.skills.list().await?;
                Ok(json!({ "skills": skills }))
            }
            Action::SkillPropose(p) => {
                self.skills.propose(&p.name, &p.content).await?;
                Ok(json!({ "name": p.name, "status": "pending" }))
            }
            Action::AuditQuery(p) => {
                // Agents only see their own session's trail.
                let records = self.audit.query(&AuditFilter {
                    action: p.action.clone(),
                    session_id: Some(session.to_string()),
                    limit: Some(p.limit.unwrap_or(100)),
                    ..Default::default()
                })?;
                Ok(json!({ "records": records }))
            }
            Action::IdentityWrite(p) => {
                self.workspace.write_identity(&p.content).await?;
                Ok(json!({}))
            }
            Action::UserWrite(p) => {
                self.workspace.write_user_profile(&p.content).await?;
                Ok(json!({}))
            }
            Action::SchedulerAddCron(p) => {
                let job_id = self
                    .scheduler
                    .add_cron(
                        &ctx.session_id,
                        &p.expr,
                        &p.prompt,
                        p.max_token_budget,
                        p.run_once.unwrap_or(false),
                    )
                    .await?;
                Ok(json!({ "job_id": job_id }))
            }
            Action::SchedulerRunAt(p) => {
                let at = chrono::DateTime::parse_from_rfc3339(&p.at)
                    .map_err(|e| HandlerError::Failed(e.to_string()))?
                    .with_timezone(&Utc);
                let job_id = self.scheduler.run_at(&ctx.session_id, at, &p.prompt).await?;
                Ok(json!({ "job_id": job_id }))
            }
            Action::SchedulerRemoveCron(p) => {
                let removed = self.scheduler.remove(&p.job_id).await?;
                Ok(json!({ "removed": removed }))
            }
            Action::SchedulerListJobs(_) => {
                let jobs = self.scheduler.list(&ctx.session_id).await?;
                Ok(json!({ "jobs": jobs }))
            }
            Action::WorkspaceRead(p) => {
                let content = self
                    .workspace
                    .read(p.tier.to_tier(), &ctx.session_id, &p.path)
                    .await?;
                Ok(json!({ "path": p.path, "content": content }))
            }
            Action::WorkspaceWrite(p) => {
                self.workspace
                    .write(p.tier.to_tier(), &ctx.session_id, &p.path, &p.content)
                    .await?;
                Ok(json!({ "path": p.path }))
            }
            Action::WorkspaceList(p) => {
                let entries = self
                    .workspace
                    .list(p.tier.to_tier(), &ctx.session_id, p.path.as_deref())
                    .await?;
                Ok(json!({ "entries": entries }))
            }
            Action::ProposalList(_) => {
                let proposals = self.skills.list_proposals().await?;
                Ok(json!({ "proposals": proposals }))
            }
            Action::ProposalReview(p) => {
                self.skills.review(&p.name, p.approve).await?;
                Ok(json!({ "name": p.name, "approved": p.approve }))
            }
            Action::AgentDelegate(_) => Err(HandlerError::Failed(
                "agent_delegate must be routed through the dispatcher guards".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_audit::AuditJournal;

    fn ctx() -> ActionContext {
        ActionContext::new(
            SessionId::parse("cli:dm:user-1").unwrap(),
            "helper",
            TrustLevel::User,
        )
    }

    #[test]
    fn test_depth_parsing() {
        assert_eq!(ctx().depth(), 0);
        let deep = ActionContext::new(
            SessionId::parse("cli:dm:u").unwrap(),
            "helper.depth=2",
            TrustLevel::User,
        );
        assert_eq!(deep.depth(), 2);
    }

    #[test]
    fn test_child_increments_depth() {
        let child = ctx().child(None);
        assert_eq!(child.agent_id, "helper.depth=1");
        assert_eq!(child.depth(), 1);

        let grandchild = child.child(None);
        assert_eq!(grandchild.agent_id, "helper.depth=2");

        let named = ctx().child(Some("researcher"));
        assert_eq!(named.agent_id, "researcher.depth=1");
    }

    #[tokio::test]
    async fn test_memory_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let host = HostCapabilities::minimal(tmp.path(), AuditJournal::temporary().unwrap());
        let ctx = ctx();

        let write = Action::decode(&serde_json::json!({
            "action": "memory_write", "key": "color", "value": "teal"
        }))
        .unwrap();
        host.handle(&write, &ctx).await.unwrap();

        let read = Action::decode(&serde_json::json!({
            "action": "memory_read", "key": "color"
        }))
        .unwrap();
        let result = host.handle(&read, &ctx).await.unwrap();
        assert_eq!(result["entry"]["value"], "teal");
        assert_eq!(result["entry"]["taint"]["trust"], "user");
    }

    #[tokio::test]
    async fn test_workspace_write_then_read() {
        let tmp = tempfile::tempdir().unwrap();
        let host = HostCapabilities::minimal(tmp.path(), AuditJournal::temporary().unwrap());
        let ctx = ctx();

        let write = Action::decode(&serde_json::json!({
            "action": "workspace_write", "tier": "scratch", "path": "notes/x.md", "content": "hi"
        }))
        .unwrap();
        host.handle(&write, &ctx).await.unwrap();

        let read = Action::decode(&serde_json::json!({
            "action": "workspace_read", "tier": "scratch", "path": "notes/x.md"
        }))
        .unwrap();
        let result = host.handle(&read, &ctx).await.unwrap();
        assert_eq!(result["content"], "hi");
    }

    #[tokio::test]
    async fn test_agent_shared_tier_read_only() {
        let tmp = tempfile::tempdir().unwrap();
        let host = HostCapabilities::minimal(tmp.path(), AuditJournal::temporary().unwrap());
        let write = Action::decode(&serde_json::json!({
            "action": "workspace_write", "tier": "agent_shared", "path": "x.md", "content": "hi"
        }))
        .unwrap();
        let err = host.handle(&write, &ctx()).await.unwrap_err();
        assert!(matches!(err, HandlerError::Denied(_)));
    }

    #[tokio::test]
    async fn test_workspace_escape_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let host = HostCapabilities::minimal(tmp.path(), AuditJournal::temporary().unwrap());
        let read = Action::decode(&serde_json::json!({
            "action": "workspace_read", "tier": "user", "path": "../../secret"
        }))
        .unwrap();
        let err = host.handle(&read, &ctx()).await.unwrap_err();
        assert!(err.to_string().contains("escape"), "got: {}", err);
    }

    #[tokio::test]
    async fn test_skill_proposal_lifecycle() {
        let tmp = tempfile::tempdir().unwrap();
        let host = HostCapabilities::minimal(tmp.path(), AuditJournal::temporary().unwrap());
        let ctx = ctx();

        host.skills.propose("summarize", "# Summarize\nDo it well.").await.unwrap();
        assert_eq!(host.skills.list_proposals().await.unwrap(), vec!["summarize"]);

        host.skills.review("summarize", true).await.unwrap();
        assert!(host.skills.list_proposals().await.unwrap().is_empty());
        assert_eq!(host.skills.list().await.unwrap(), vec!["summarize"]);

        let read = Action::decode(&serde_json::json!({
            "action": "skill_read", "name": "summarize"
        }))
        .unwrap();
        let result = host.handle(&read, &ctx).await.unwrap();
        assert!(result["content"].as_str().unwrap().contains("Summarize"));
    }

    #[tokio::test]
    async fn test_unwired_capabilities_fail_closed() {
        let tmp = tempfile::tempdir().unwrap();
        let host = HostCapabilities::minimal(tmp.path(), AuditJournal::temporary().unwrap());
        let fetch = Action::decode(&serde_json::json!({
            "action": "web_fetch", "url": "https://example.com"
        }))
        .unwrap();
        assert!(matches!(
            host.handle(&fetch, &ctx()).await.unwrap_err(),
            HandlerError::Unavailable(_)
        ));
    }
}
