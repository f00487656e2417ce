//! # Request Dispatcher
//!
//! The trusted server every sandboxed capability call flows through.
//! One connection, one loop; per inbound frame:
//!
//! 1. parse JSON (failure: audit `ipc_parse_error`, error reply)
//! 2. envelope-validate (failure: audit `ipc_unknown_action`)
//! 3. strict action decode (failure: audit `ipc_validation_failure` with
//!    a bounded payload preview)
//! 4. taint gate for gated actions (denial: audit `ipc_taint_blocked`,
//!    reply carries `taintBlocked: true`)
//! 5. handler invocation under the per-call timeout
//! 6. success: audit the action name with duration, reply `{ok: true, …}`
//! 7. handler failure: audit `ipc_handler_error`, reply `{ok: false, error}`
//!
//! Requests on one connection are processed sequentially, so replies are
//! FIFO per connection; there is no cross-connection ordering.
//!
//! The dispatcher owns the `agent_delegate` guards (see
//! [`crate::delegate`]); every other action lands in
//! [`HostCapabilities::handle`].

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use warden_audit::{AuditEntry, AuditJournal, AuditOutcome};
use warden_core::{is_gated, DelegationLimits, TaintLedger, TrustLevel};

use crate::actions::{Action, AgentDelegate};
use crate::delegate::DelegationGuard;
use crate::error::{HandlerError, IpcError};
use crate::frame::FrameCodec;
use crate::handlers::{ActionContext, HostCapabilities};

/// Future type produced by the delegate callback.
pub type DelegateFuture =
    std::pin::Pin<Box<dyn std::future::Future<Output = Result<Value, HandlerError>> + Send>>;

/// Host-supplied delegate callback: runs a task as a child agent and
/// returns its result fields.
pub type DelegateFn = Arc<dyn Fn(ActionContext, String) -> DelegateFuture + Send + Sync>;

/// Explicit dispatcher dependencies.
pub struct DispatcherDeps {
    pub audit: AuditJournal,
    pub taint: Arc<TaintLedger>,
    pub capabilities: Arc<HostCapabilities>,
    pub delegate: Option<DelegateFn>,
    pub limits: DelegationLimits,
    /// Per-call handler timeout.
    pub call_timeout: Duration,
}

/// The per-host dispatcher.
pub struct Dispatcher {
    audit: AuditJournal,
    taint: Arc<TaintLedger>,
    capabilities: Arc<HostCapabilities>,
    delegate: Option<DelegateFn>,
    delegation: DelegationGuard,
    call_timeout: Duration,
}

impl Dispatcher {
    pub fn new(deps: DispatcherDeps) -> Self {
        Self {
            audit: deps.audit,
            taint: deps.taint,
            capabilities: deps.capabilities,
            delegate: deps.delegate,
            delegation: DelegationGuard::new(deps.limits),
            call_timeout: deps.call_timeout,
        }
    }

    /// Bind a unix listener, removing any stale socket file first, and
    /// serve connections until the task is dropped.
    ///
    /// Every connection on this socket shares `ctx`: the socket is
    /// mounted into exactly one sandbox, so the peer's identity is the
    /// session the sandbox was spawned for.
    pub async fn serve_unix(self: Arc<Self>, socket_path: &Path, ctx: ActionContext) -> Result<(), IpcError> {
        if socket_path.exists() {
            let _ = std::fs::remove_file(socket_path);
        }
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let listener = UnixListener::bind(socket_path)?;
        info!(socket = %socket_path.display(), session = %ctx.session_id, "dispatcher listening");

        loop {
            let (stream, _) = listener.accept().await?;
            let dispatcher = Arc::clone(&self);
            let ctx = ctx.clone();
            tokio::spawn(async move {
                dispatcher.handle_connection(stream, ctx).await;
            });
        }
    }

    /// Serve one connection: sequential frame-in/frame-out.
    pub async fn handle_connection(&self, stream: UnixStream, ctx: ActionContext) {
        let mut framed = Framed::new(stream, FrameCodec::new());
        while let Some(frame) = framed.next().await {
            let bytes = match frame {
                Ok(bytes) => bytes,
                Err(e) => {
                    // Framing is unrecoverable: close the connection.
                    warn!(session = %ctx.session_id, error = %e, "dropping connection on framing error");
                    break;
                }
            };
            let reply = self.dispatch_bytes(&bytes, &ctx).await;
            if let Err(e) = framed.send(&reply).await {
                warn!(session = %ctx.session_id, error = %e, "reply write failed");
                break;
            }
        }
        debug!(session = %ctx.session_id, "connection closed");
    }

    /// Dispatch one raw frame payload.
    pub async fn dispatch_bytes(&self, bytes: &[u8], ctx: &ActionContext) -> Value {
        let value: Value = match serde_json::from_slice(bytes) {
            Ok(value) => value,
            Err(e) => {
                self.audit_event("ipc_parse_error", ctx, AuditOutcome::Error, json!({ "error": e.to_string() }));
                return error_reply(format!("request is not valid JSON: {e}"));
            }
        };
        self.dispatch_value(&value, ctx).await
    }

    /// Dispatch one parsed request value.
    pub async fn dispatch_value(&self, value: &Value, ctx: &ActionContext) -> Value {
        let action = match Action::decode(value) {
            Ok(action) => action,
            Err(IpcError::UnknownAction(name)) => {
                self.audit_event(
                    "ipc_unknown_action",
                    ctx,
                    AuditOutcome::Error,
                    json!({ "action": name }),
                );
                return error_reply(format!("unknown action: {name}"));
            }
            Err(IpcError::Validation { action, detail }) => {
                self.audit_event(
                    "ipc_validation_failure",
                    ctx,
                    AuditOutcome::Error,
                    json!({ "action": action, "detail": detail }),
                );
                return error_reply(format!("invalid payload: {detail}"));
            }
            Err(other) => return error_reply(other.to_string()),
        };

        let name = action.name();

        if is_gated(name) {
            let decision = self.taint.check(ctx.session_id.as_str(), name, ctx.trust);
            if !decision.allowed {
                let reason = decision
                    .reason
                    .unwrap_or_else(|| "taint budget exceeded".to_string());
                self.audit_event(
                    "ipc_taint_blocked",
                    ctx,
                    AuditOutcome::Blocked,
                    json!({ "action": name, "ratio": decision.ratio, "threshold": decision.threshold }),
                );
                return json!({ "ok": false, "taintBlocked": true, "error": reason });
            }
        }

        let start = Instant::now();
        let outcome = tokio::time::timeout(self.call_timeout, self.invoke(&action, ctx)).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok(fields)) => {
                self.audit.append(
                    AuditEntry::new(name, AuditOutcome::Success)
                        .with_session(ctx.session_id.as_str())
                        .with_taint(ctx.trust.label())
                        .with_duration_ms(duration_ms),
                ).ok();
                success_reply(fields)
            }
            Ok(Err(e)) => {
                self.audit_event(
                    "ipc_handler_error",
                    ctx,
                    AuditOutcome::Error,
                    json!({ "action": name, "error": e.to_string() }),
                );
                error_reply(e.to_string())
            }
            Err(_) => {
                self.audit_event(
                    "ipc_handler_error",
                    ctx,
                    AuditOutcome::Error,
                    json!({ "action": name, "error": "call timed out" }),
                );
                error_reply(format!(
                    "call timed out after {} seconds",
                    self.call_timeout.as_secs()
                ))
            }
        }
    }

    async fn invoke(&self, action: &Action, ctx: &ActionContext) -> Result<Value, HandlerError> {
        match action {
            Action::AgentDelegate(payload) => self.handle_delegate(payload, ctx).await,
            other => {
                let fields = self.capabilities.handle(other, ctx).await?;
                // Fetched web content is external by definition: charge it
                // to the session's taint budget before the agent sees it.
                if matches!(other, Action::WebFetch(_) | Action::WebSearch(_)) {
                    let bytes = fields.to_string().len();
                    self.taint
                        .record(ctx.session_id.as_str(), bytes, TrustLevel::External);
                }
                Ok(fields)
            }
        }
    }

    async fn handle_delegate(
        &self,
        payload: &AgentDelegate,
        ctx: &ActionContext,
    ) -> Result<Value, HandlerError> {
        let delegate = self
            .delegate
            .as_ref()
            .ok_or(HandlerError::Unavailable("no delegate callback configured"))?;

        self.delegation
            .check_depth(ctx.depth())
            .map_err(|e| HandlerError::Denied(e.to_string()))?;

        // The permit must exist before the first await so two racing
        // delegations cannot both slip under the limit.
        let _permit = self
            .delegation
            .try_acquire()
            .map_err(|e| HandlerError::Denied(e.to_string()))?;

        let child = ctx.child(payload.agent_id.as_deref());
        debug!(parent = %ctx.agent_id, child = %child.agent_id, "delegation started");
        delegate(child, payload.task.clone()).await
    }

    fn audit_event(&self, action: &str, ctx: &ActionContext, outcome: AuditOutcome, args: Value) {
        self.audit
            .append(
                AuditEntry::new(action, outcome)
                    .with_session(ctx.session_id.as_str())
                    .with_taint(ctx.trust.label())
                    .with_args(args),
            )
            .ok();
    }
}

fn success_reply(fields: Value) -> Value {
    let mut reply = json!({ "ok": true });
    if let (Some(reply_obj), Some(fields_obj)) = (reply.as_object_mut(), fields.as_object()) {
        for (k, v) in fields_obj {
            reply_obj.insert(k.clone(), v.clone());
        }
    }
    reply
}

fn error_reply(error: String) -> Value {
    json!({ "ok": false, "error": error })
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::SessionId;

    fn dispatcher(root: &std::path::Path) -> Dispatcher {
        let audit = AuditJournal::temporary().unwrap();
        Dispatcher::new(DispatcherDeps {
            audit: audit.clone(),
            taint: Arc::new(TaintLedger::new(0.5)),
            capabilities: Arc::new(HostCapabilities::minimal(root, audit)),
            delegate: None,
            limits: DelegationLimits::default(),
            call_timeout: Duration::from_secs(5),
        })
    }

    fn ctx() -> ActionContext {
        ActionContext::new(
            SessionId::parse("cli:dm:user-1").unwrap(),
            "helper",
            TrustLevel::User,
        )
    }

    #[tokio::test]
    async fn test_parse_error_reply() {
        let tmp = tempfile::tempdir().unwrap();
        let d = dispatcher(tmp.path());
        let reply = d.dispatch_bytes(b"{not json", &ctx()).await;
        assert_eq!(reply["ok"], false);
        assert!(reply["error"].as_str().unwrap().contains("JSON"));
    }

    #[tokio::test]
    async fn test_unknown_action_reply() {
        let tmp = tempfile::tempdir().unwrap();
        let d = dispatcher(tmp.path());
        let reply = d
            .dispatch_value(&json!({"action": "reboot_host"}), &ctx())
            .await;
        assert_eq!(reply["ok"], false);
        assert!(reply["error"].as_str().unwrap().contains("unknown action"));
    }

    #[tokio::test]
    async fn test_strict_schema_no_side_effects() {
        let tmp = tempfile::tempdir().unwrap();
        let d = dispatcher(tmp.path());
        let c = ctx();

        let reply = d
            .dispatch_value(
                &json!({"action": "memory_write", "key": "k", "value": "v", "extra": 1}),
                &c,
            )
            .await;
        assert_eq!(reply["ok"], false);

        // The rejected write must not have landed.
        let read = d
            .dispatch_value(&json!({"action": "memory_read", "key": "k"}), &c)
            .await;
        assert_eq!(read["ok"], false);
    }

    #[tokio::test]
    async fn test_success_merges_fields() {
        let tmp = tempfile::tempdir().unwrap();
        let d = dispatcher(tmp.path());
        let c = ctx();

        let reply = d
            .dispatch_value(
                &json!({"action": "memory_write", "key": "k", "value": "v"}),
                &c,
            )
            .await;
        assert_eq!(reply["ok"], true);
        assert_eq!(reply["key"], "k");
    }

    #[tokio::test]
    async fn test_taint_gate_blocks() {
        let tmp = tempfile::tempdir().unwrap();
        let c = ctx();

        // 4000 external vs 100 trusted with threshold 0.10.
        let audit = AuditJournal::temporary().unwrap();
        let d = Dispatcher::new(DispatcherDeps {
            audit: audit.clone(),
            taint: Arc::new(TaintLedger::new(0.10)),
            capabilities: Arc::new(HostCapabilities::minimal(tmp.path(), audit)),
            delegate: None,
            limits: DelegationLimits::default(),
            call_timeout: Duration::from_secs(5),
        });
        d.taint.record(c.session_id.as_str(), 4000, TrustLevel::External);
        d.taint.record(c.session_id.as_str(), 100, TrustLevel::User);

        let reply = d
            .dispatch_value(
                &json!({"action": "memory_write", "key": "k", "value": "v"}),
                &c,
            )
            .await;
        assert_eq!(reply["ok"], false);
        assert_eq!(reply["taintBlocked"], true);

        let rows = d
            .audit
            .query(&warden_audit::AuditFilter {
                action: Some("ipc_taint_blocked".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn test_delegate_without_callback_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let d = dispatcher(tmp.path());
        let reply = d
            .dispatch_value(&json!({"action": "agent_delegate", "task": "do x"}), &ctx())
            .await;
        assert_eq!(reply["ok"], false);
        assert!(reply["error"].as_str().unwrap().contains("delegate"));
    }

    #[tokio::test]
    async fn test_delegate_depth_refused() {
        let tmp = tempfile::tempdir().unwrap();
        let audit = AuditJournal::temporary().unwrap();
        let called = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let called_inner = Arc::clone(&called);
        let d = Dispatcher::new(DispatcherDeps {
            audit: audit.clone(),
            taint: Arc::new(TaintLedger::new(0.5)),
            capabilities: Arc::new(HostCapabilities::minimal(tmp.path(), audit)),
            delegate: Some(Arc::new(move |_ctx, _task| {
                called_inner.store(true, std::sync::atomic::Ordering::SeqCst);
                Box::pin(async { Ok(json!({"done": true})) })
            })),
            limits: DelegationLimits {
                max_concurrent: 3,
                max_depth: 2,
            },
            call_timeout: Duration::from_secs(5),
        });

        let deep = ActionContext::new(
            SessionId::parse("cli:dm:user-1").unwrap(),
            "helper.depth=2",
            TrustLevel::User,
        );
        let reply = d
            .dispatch_value(&json!({"action": "agent_delegate", "task": "go"}), &deep)
            .await;
        assert_eq!(reply["ok"], false);
        assert!(reply["error"].as_str().unwrap().contains("Max delegation depth"));
        assert!(!called.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_delegate_child_context_depth() {
        let tmp = tempfile::tempdir().unwrap();
        let audit = AuditJournal::temporary().unwrap();
        let seen = Arc::new(std::sync::Mutex::new(String::new()));
        let seen_inner = Arc::clone(&seen);
        let d = Dispatcher::new(DispatcherDeps {
            audit: audit.clone(),
            taint: Arc::new(TaintLedger::new(0.5)),
            capabilities: Arc::new(HostCapabilities::minimal(tmp.path(), audit)),
            delegate: Some(Arc::new(move |child, _task| {
                *seen_inner.lock().unwrap() = child.agent_id;
                Box::pin(async { Ok(json!({"done": true})) })
            })),
            limits: DelegationLimits::default(),
            call_timeout: Duration::from_secs(5),
        });

        // System trust so the gated action passes without taint setup.
        let c = ActionContext::new(
            SessionId::parse("cli:dm:user-1").unwrap(),
            "helper",
            TrustLevel::System,
        );
        let reply = d
            .dispatch_value(&json!({"action": "agent_delegate", "task": "go"}), &c)
            .await;
        assert_eq!(reply["ok"], true);
        assert_eq!(*seen.lock().unwrap(), "helper.depth=1");
    }
}
