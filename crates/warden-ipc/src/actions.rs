//! # Action Schema Registry
//!
//! Every request on the dispatcher channel is an envelope
//! `{action: <name>, …fields}`. Decoding happens in two phases:
//!
//! 1. **Envelope probe** - a lenient decode of just the `action` field
//!    names the schema.
//! 2. **Strict payload decode** - the remaining fields are decoded into
//!    the action's payload struct with unknown fields rejected, then the
//!    payload's `validate()` enforces value constraints (length caps,
//!    numeric ranges, enum literals).
//!
//! The registry is the `match` in [`Action::decode`]: action name to
//! decoder. Adding an action means adding a payload struct, a match arm,
//! and its constraints; nothing is discovered dynamically.

use serde::Deserialize;
use serde_json::Value;

use crate::error::IpcError;

/// Longest accepted key/name-like field.
const MAX_KEY_LEN: usize = 256;

/// Longest accepted URL.
const MAX_URL_LEN: usize = 2048;

/// Longest accepted free-text field (prompts, contents, values).
const MAX_TEXT_LEN: usize = 64 * 1024;

/// Largest accepted list window.
const MAX_LIMIT: usize = 1000;

#[derive(Debug, Deserialize)]
struct Envelope {
    action: String,
}

/// Workspace tier selector carried by `workspace_*` requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierArg {
    AgentShared,
    User,
    Scratch,
}

impl TierArg {
    pub fn to_tier(self) -> warden_core::Tier {
        match self {
            TierArg::AgentShared => warden_core::Tier::AgentShared,
            TierArg::User => warden_core::Tier::User,
            TierArg::Scratch => warden_core::Tier::Scratch,
        }
    }
}

// ---------------------------------------------------------------------------
// Payload structs (strict: unknown fields rejected)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LlmCall {
    pub prompt: String,
    #[serde(default)]
    pub system: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryWrite {
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryQuery {
    pub query: String,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryRead {
    pub key: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryDelete {
    pub key: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryList {
    #[serde(default)]
    pub prefix: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WebFetch {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WebSearch {
    pub query: String,
    #[serde(default)]
    pub max_results: Option<u8>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BrowserNavigate {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BrowserClick {
    pub selector: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BrowserType {
    pub selector: String,
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SkillRead {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SkillPropose {
    pub name: String,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditQuery {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdentityWrite {
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserWrite {
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerAddCron {
    pub expr: String,
    pub prompt: String,
    #[serde(default)]
    pub max_token_budget: Option<u64>,
    #[serde(default)]
    pub run_once: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerRunAt {
    /// RFC 3339 timestamp.
    pub at: String,
    pub prompt: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerRemoveCron {
    pub job_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentDelegate {
    pub task: String,
    #[serde(default)]
    pub agent_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkspaceRead {
    pub tier: TierArg,
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkspaceWrite {
    pub tier: TierArg,
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkspaceList {
    pub tier: TierArg,
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProposalReview {
    pub name: String,
    pub approve: bool,
}

/// Empty payload for argument-less actions.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NoArgs {}

// ---------------------------------------------------------------------------
// The action sum type
// ---------------------------------------------------------------------------

/// A validated, typed request.
#[derive(Debug, Clone)]
pub enum Action {
    LlmCall(LlmCall),
    MemoryWrite(MemoryWrite),
    MemoryQuery(MemoryQuery),
    MemoryRead(MemoryRead),
    MemoryDelete(MemoryDelete),
    MemoryList(MemoryList),
    WebFetch(WebFetch),
    WebSearch(WebSearch),
    BrowserLaunch(NoArgs),
    BrowserNavigate(BrowserNavigate),
    BrowserSnapshot(NoArgs),
    BrowserClick(BrowserClick),
    BrowserType(BrowserType),
    BrowserScreenshot(NoArgs),
    BrowserClose(NoArgs),
    SkillRead(SkillRead),
    SkillList(NoArgs),
    SkillPropose(SkillPropose),
    AuditQuery(AuditQuery),
    IdentityWrite(IdentityWrite),
    UserWrite(UserWrite),
    SchedulerAddCron(SchedulerAddCron),
    SchedulerRunAt(SchedulerRunAt),
    SchedulerRemoveCron(SchedulerRemoveCron),
    SchedulerListJobs(NoArgs),
    AgentDelegate(AgentDelegate),
    WorkspaceRead(WorkspaceRead),
    WorkspaceWrite(WorkspaceWrite),
    WorkspaceList(WorkspaceList),
    ProposalList(NoArgs),
    ProposalReview(ProposalReview),
}

impl Action {
    /// The wire name of this action.
    pub fn name(&self) -> &'static str {
        match self {
            Action::LlmCall(_) => "llm_call",
            Action::MemoryWrite(_) => "memory_write",
            Action::MemoryQuery(_) => "memory_query",
            Action::MemoryRead(_) => "memory_read",
            Action::MemoryDelete(_) => "memory_delete",
            Action::MemoryList(_) => "memory_list",
            Action::WebFetch(_) => "web_fetch",
            Action::WebSearch(_) => "web_search",
            Action::BrowserLaunch(_) => "browser_launch",
            Action::BrowserNavigate(_) => "browser_navigate",
            Action::BrowserSnapshot(_) => "browser_snapshot",
            Action::BrowserClick(_) => "browser_click",
            Action::BrowserType(_) => "browser_type",
            Action::BrowserScreenshot(_) => "browser_screenshot",
            Action::BrowserClose(_) => "browser_close",
            Action::SkillRead(_) => "skill_read",
            Action::SkillList(_) => "skill_list",
            Action::SkillPropose(_) => "skill_propose",
            Action::AuditQuery(_) => "audit_query",
            Action::IdentityWrite(_) => "identity_write",
            Action::UserWrite(_) => "user_write",
            Action::SchedulerAddCron(_) => "scheduler_add_cron",
            Action::SchedulerRunAt(_) => "scheduler_run_at",
            Action::SchedulerRemoveCron(_) => "scheduler_remove_cron",
            Action::SchedulerListJobs(_) => "scheduler_list_jobs",
            Action::AgentDelegate(_) => "agent_delegate",
            Action::WorkspaceRead(_) => "workspace_read",
            Action::WorkspaceWrite(_) => "workspace_write",
            Action::WorkspaceList(_) => "workspace_list",
            Action::ProposalList(_) => "proposal_list",
            Action::ProposalReview(_) => "proposal_review",
        }
    }

    /// Decode an envelope into a typed, validated action.
    pub fn decode(value: &Value) -> Result<Action, IpcError> {
        let envelope: Envelope = serde_json::from_value(value.clone())
            .map_err(|_| IpcError::UnknownAction("<missing action field>".into()))?;

        let mut fields = match value.as_object() {
            Some(obj) => obj.clone(),
            None => return Err(IpcError::UnknownAction("<non-object envelope>".into())),
        };
        fields.remove("action");
        let payload = Value::Object(fields);
        let name = envelope.action.clone();

        let action = match envelope.action.as_str() {
            "llm_call" => Action::LlmCall(strict(&name, payload)?),
            "memory_write" => Action::MemoryWrite(strict(&name, payload)?),
            "memory_query" => Action::MemoryQuery(strict(&name, payload)?),
            "memory_read" => Action::MemoryRead(strict(&name, payload)?),
            "memory_delete" => Action::MemoryDelete(strict(&name, payload)?),
            "memory_list" => Action::MemoryList(strict(&name, payload)?),
            "web_fetch" => Action::WebFetch(strict(&name, payload)?),
            "web_search" => Action::WebSearch(strict(&name, payload)?),
            "browser_launch" => Action::BrowserLaunch(strict(&name, payload)?),
            "browser_navigate" => Action::BrowserNavigate(strict(&name, payload)?),
            "browser_snapshot" => Action::BrowserSnapshot(strict(&name, payload)?),
            "browser_click" => Action::BrowserClick(strict(&name, payload)?),
            "browser_type" => Action::BrowserType(strict(&name, payload)?),
            "browser_screenshot" => Action::BrowserScreenshot(strict(&name, payload)?),
            "browser_close" => Action::BrowserClose(strict(&name, payload)?),
            "skill_read" => Action::SkillRead(strict(&name, payload)?),
            "skill_list" => Action::SkillList(strict(&name, payload)?),
            "skill_propose" => Action::SkillPropose(strict(&name, payload)?),
            "audit_query" => Action::AuditQuery(strict(&name, payload)?),
            "identity_write" => Action::IdentityWrite(strict(&name, payload)?),
            "user_write" => Action::UserWrite(strict(&name, payload)?),
            "scheduler_add_cron" => Action::SchedulerAddCron(strict(&name, payload)?),
            "scheduler_run_at" => Action::SchedulerRunAt(strict(&name, payload)?),
            "scheduler_remove_cron" => Action::SchedulerRemoveCron(strict(&name, payload)?),
            "scheduler_list_jobs" => Action::SchedulerListJobs(strict(&name, payload)?),
            "agent_delegate" => Action::AgentDelegate(strict(&name, payload)?),
            "workspace_read" => Action::WorkspaceRead(strict(&name, payload)?),
            "workspace_write" => Action::WorkspaceWrite(strict(&name, payload)?),
            "workspace_list" => Action::WorkspaceList(strict(&name, payload)?),
            "proposal_list" => Action::ProposalList(strict(&name, payload)?),
            "proposal_review" => Action::ProposalReview(strict(&name, payload)?),
            other => return Err(IpcError::UnknownAction(other.to_string())),
        };

        action.validate().map_err(|e| match e {
            IpcError::Validation { action, detail } if action.is_empty() => {
                IpcError::Validation {
                    action: name,
                    detail,
                }
            }
            other => other,
        })?;
        Ok(action)
    }

    /// Enforce per-field value constraints.
    pub fn validate(&self) -> Result<(), IpcError> {
        match self {
            Action::LlmCall(p) => {
                check_text("prompt", &p.prompt)?;
                if let Some(system) = &p.system {
                    check_text("system", system)?;
                }
                if let Some(max) = p.max_tokens {
                    check_range("max_tokens", max as usize, 1, 200_000)?;
                }
            }
            Action::MemoryWrite(p) => {
                check_key("key", &p.key)?;
                check_text("value", &p.value)?;
                if let Some(tags) = &p.tags {
                    check_range("tags", tags.len(), 0, 32)?;
                    for tag in tags {
                        check_key("tag", tag)?;
                    }
                }
            }
            Action::MemoryQuery(p) => {
                check_key("query", &p.query)?;
                check_limit(p.limit)?;
            }
            Action::MemoryRead(p) => check_key("key", &p.key)?,
            Action::MemoryDelete(p) => check_key("key", &p.key)?,
            Action::MemoryList(p) => {
                if let Some(prefix) = &p.prefix {
                    check_key("prefix", prefix)?;
                }
            }
            Action::WebFetch(p) => check_url(&p.url)?,
            Action::WebSearch(p) => {
                check_key("query", &p.query)?;
                if let Some(max) = p.max_results {
                    check_range("max_results", max as usize, 1, 50)?;
                }
            }
            Action::BrowserNavigate(p) => check_url(&p.url)?,
            Action::BrowserClick(p) => check_key("selector", &p.selector)?,
            Action::BrowserType(p) => {
                check_key("selector", &p.selector)?;
                check_text("text", &p.text)?;
            }
            Action::SkillRead(p) => check_key("name", &p.name)?,
            Action::SkillPropose(p) => {
                check_key("name", &p.name)?;
                check_text("content", &p.content)?;
            }
            Action::AuditQuery(p) => {
                if let Some(action) = &p.action {
                    check_key("action", action)?;
                }
                check_limit(p.limit)?;
            }
            Action::IdentityWrite(p) => check_text("content", &p.content)?,
            Action::UserWrite(p) => check_text("content", &p.content)?,
            Action::SchedulerAddCron(p) => {
                check_key("expr", &p.expr)?;
                check_text("prompt", &p.prompt)?;
            }
            Action::SchedulerRunAt(p) => {
                check_key("at", &p.at)?;
                check_text("prompt", &p.prompt)?;
                if chrono::DateTime::parse_from_rfc3339(&p.at).is_err() {
                    return Err(IpcError::Validation {
                        action: "scheduler_run_at".into(),
                        detail: format!("'at' is not an RFC 3339 timestamp: {}", p.at),
                    });
                }
            }
            Action::SchedulerRemoveCron(p) => check_key("job_id", &p.job_id)?,
            Action::AgentDelegate(p) => {
                check_text("task", &p.task)?;
                if let Some(agent) = &p.agent_id {
                    check_key("agent_id", agent)?;
                }
            }
            Action::WorkspaceRead(p) => check_key("path", &p.path)?,
            Action::WorkspaceWrite(p) => {
                check_key("path", &p.path)?;
                check_text("content", &p.content)?;
            }
            Action::WorkspaceList(p) => {
                if let Some(path) = &p.path {
                    check_key("path", path)?;
                }
            }
            Action::ProposalReview(p) => check_key("name", &p.name)?,
            Action::BrowserLaunch(_)
            | Action::BrowserSnapshot(_)
            | Action::BrowserScreenshot(_)
            | Action::BrowserClose(_)
            | Action::SkillList(_)
            | Action::SchedulerListJobs(_)
            | Action::ProposalList(_) => {}
        }
        Ok(())
    }
}

fn strict<T: for<'de> Deserialize<'de>>(action: &str, payload: Value) -> Result<T, IpcError> {
    serde_json::from_value(payload.clone()).map_err(|e| IpcError::Validation {
        action: action.to_string(),
        detail: format!("{} (payload: {})", e, preview(&payload)),
    })
}

/// Bounded preview of a rejected payload for the audit trail.
fn preview(payload: &Value) -> String {
    let text = payload.to_string();
    if text.len() <= 500 {
        text
    } else {
        let mut cut = 500;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}…", &text[..cut])
    }
}

fn check_key(field: &str, value: &str) -> Result<(), IpcError> {
    if value.is_empty() || value.len() > MAX_KEY_LEN {
        return Err(IpcError::Validation {
            action: String::new(),
            detail: format!("field '{}' must be 1..={} bytes", field, MAX_KEY_LEN),
        });
    }
    Ok(())
}

fn check_text(field: &str, value: &str) -> Result<(), IpcError> {
    if value.is_empty() || value.len() > MAX_TEXT_LEN {
        return Err(IpcError::Validation {
            action: String::new(),
            detail: format!("field '{}' must be 1..={} bytes", field, MAX_TEXT_LEN),
        });
    }
    Ok(())
}

fn check_url(url: &str) -> Result<(), IpcError> {
    if url.len() > MAX_URL_LEN || !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(IpcError::Validation {
            action: String::new(),
            detail: format!("'url' must be an http(s) URL of at most {} bytes", MAX_URL_LEN),
        });
    }
    Ok(())
}

fn check_limit(limit: Option<usize>) -> Result<(), IpcError> {
    if let Some(limit) = limit {
        check_range("limit", limit, 1, MAX_LIMIT)?;
    }
    Ok(())
}

fn check_range(field: &str, value: usize, min: usize, max: usize) -> Result<(), IpcError> {
    if value < min || value > max {
        return Err(IpcError::Validation {
            action: String::new(),
            detail: format!("field '{}' must be in {}..={}", field, min, max),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_known_action() {
        let action =
            Action::decode(&json!({"action": "memory_read", "key": "notes"})).unwrap();
        assert_eq!(action.name(), "memory_read");
    }

    #[test]
    fn test_unknown_action_rejected() {
        let err = Action::decode(&json!({"action": "format_disk"})).unwrap_err();
        assert!(matches!(err, IpcError::UnknownAction(name) if name == "format_disk"));
    }

    #[test]
    fn test_missing_action_rejected() {
        let err = Action::decode(&json!({"key": "notes"})).unwrap_err();
        assert!(matches!(err, IpcError::UnknownAction(_)));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = Action::decode(&json!({
            "action": "memory_read",
            "key": "notes",
            "sneaky": true
        }))
        .unwrap_err();
        match err {
            IpcError::Validation { action, detail } => {
                assert_eq!(action, "memory_read");
                assert!(detail.contains("sneaky"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_required_field_rejected() {
        assert!(Action::decode(&json!({"action": "memory_write", "key": "k"})).is_err());
    }

    #[test]
    fn test_url_constraints() {
        assert!(Action::decode(&json!({"action": "web_fetch", "url": "https://example.com"})).is_ok());
        assert!(Action::decode(&json!({"action": "web_fetch", "url": "file:///etc/passwd"})).is_err());
        assert!(Action::decode(&json!({"action": "web_fetch", "url": "x".repeat(3000)})).is_err());
    }

    #[test]
    fn test_range_constraints() {
        assert!(Action::decode(&json!({
            "action": "llm_call", "prompt": "hi", "max_tokens": 0
        }))
        .is_err());
        assert!(Action::decode(&json!({
            "action": "memory_query", "query": "q", "limit": 10_000
        }))
        .is_err());
    }

    #[test]
    fn test_rfc3339_enforced() {
        assert!(Action::decode(&json!({
            "action": "scheduler_run_at", "at": "2026-03-01T09:00:00Z", "prompt": "p"
        }))
        .is_ok());
        assert!(Action::decode(&json!({
            "action": "scheduler_run_at", "at": "tomorrow", "prompt": "p"
        }))
        .is_err());
    }

    #[test]
    fn test_tier_enum_literals() {
        assert!(Action::decode(&json!({
            "action": "workspace_read", "tier": "user", "path": "notes.md"
        }))
        .is_ok());
        assert!(Action::decode(&json!({
            "action": "workspace_read", "tier": "root", "path": "notes.md"
        }))
        .is_err());
    }

    #[test]
    fn test_payload_preview_bounded() {
        let big = "y".repeat(5000);
        let err = Action::decode(&json!({
            "action": "memory_read", "key": "k", "extra": big
        }))
        .unwrap_err();
        if let IpcError::Validation { detail, .. } = err {
            assert!(detail.len() < 800, "preview too long: {} bytes", detail.len());
        } else {
            panic!("expected validation error");
        }
    }

    #[test]
    fn test_no_args_actions_reject_extras() {
        assert!(Action::decode(&json!({"action": "skill_list"})).is_ok());
        assert!(Action::decode(&json!({"action": "skill_list", "x": 1})).is_err());
    }
}
