//! # Completions Server
//!
//! The external HTTP surface: `POST /v1/chat/completions` (streaming and
//! non-streaming), `GET /v1/models`, `GET /healthz`.
//!
//! Two serving modes with different auth postures:
//!
//! - **Unix socket**: no bearer auth; filesystem permissions on the
//!   socket are the boundary.
//! - **Loopback TCP**: a bearer token is mandatory, checked in constant
//!   time; startup fails without one, and non-loopback binds are
//!   rejected outright.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Json;
use chrono::Utc;
use futures::stream;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use hyper_util::service::TowerToHyperService;
use serde_json::json;
use tokio::net::{TcpListener, UnixListener};
use tracing::{debug, info, warn};
use uuid::Uuid;

use warden_core::SessionId;

use crate::error::GatewayError;
use crate::models::{
    ChatCompletion, ChatCompletionChunk, ChatCompletionRequest, ChatMessage, Choice, ChunkChoice,
    Delta, ErrorBody, ModelEntry, ModelList, Usage,
};
use crate::pipeline::{CompletionOutcome, Pipeline};

/// Gateway-level configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Model id advertised on `/v1/models` and echoed in completions.
    pub model_id: String,
    /// Bearer token, mandatory in TCP mode.
    pub bearer_token: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            model_id: "warden-agent".into(),
            bearer_token: None,
        }
    }
}

pub struct Gateway {
    config: GatewayConfig,
    pipeline: Pipeline,
    started_at: Instant,
}

impl Gateway {
    pub fn new(config: GatewayConfig, pipeline: Pipeline) -> Self {
        Self {
            config,
            pipeline,
            started_at: Instant::now(),
        }
    }

    /// Assemble the router; `require_auth` layers the bearer check.
    pub fn router(self: &Arc<Self>, require_auth: bool) -> axum::Router {
        let mut router = axum::Router::new()
            .route("/v1/chat/completions", post(chat_completions))
            .route("/v1/models", get(list_models))
            .route("/healthz", get(healthz));
        if require_auth {
            router = router.layer(middleware::from_fn_with_state(
                Arc::clone(self),
                require_bearer,
            ));
        }
        router.with_state(Arc::clone(self))
    }

    /// Serve on a unix socket; OS permissions are the auth boundary.
    pub async fn serve_unix(self: Arc<Self>, socket_path: &std::path::Path) -> Result<(), GatewayError> {
        if socket_path.exists() {
            std::fs::remove_file(socket_path)?;
        }
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let listener = UnixListener::bind(socket_path)?;
        info!(socket = %socket_path.display(), "completions gateway listening (unix)");

        let service = TowerToHyperService::new(self.router(false));
        loop {
            let (stream, _) = listener.accept().await?;
            let service = service.clone();
            tokio::spawn(async move {
                if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                    .serve_connection(TokioIo::new(stream), service)
                    .await
                {
                    debug!(error = %e, "gateway connection ended");
                }
            });
        }
    }

    /// Serve on loopback TCP with mandatory bearer auth.
    ///
    /// Startup validation failures (missing token, non-loopback bind)
    /// are hard errors so the host exits nonzero instead of listening
    /// open.
    pub async fn serve_tcp(self: Arc<Self>, addr: SocketAddr) -> Result<(), GatewayError> {
        if self.config.bearer_token.as_deref().unwrap_or("").is_empty() {
            return Err(GatewayError::Startup(
                "TCP mode requires a bearer token; refusing to listen unauthenticated".into(),
            ));
        }
        if !addr.ip().is_loopback() {
            return Err(GatewayError::Startup(format!(
                "refusing to bind non-loopback address {addr}"
            )));
        }
        let listener = TcpListener::bind(addr).await?;
        info!(%addr, "completions gateway listening (tcp, bearer auth)");
        axum::serve(listener, self.router(true))
            .await
            .map_err(GatewayError::Io)
    }
}

/// Constant-time token comparison; a timing oracle on the bearer check
/// would let a local attacker recover the token byte by byte.
fn tokens_equal(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

async fn require_bearer(
    State(gateway): State<Arc<Gateway>>,
    request: Request,
    next: Next,
) -> Response {
    let expected = match gateway.config.bearer_token.as_deref() {
        Some(token) if !token.is_empty() => token,
        // serve_tcp refuses to start without a token; this arm only
        // protects against future wiring mistakes.
        _ => return unauthorized(),
    };
    let presented = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    match presented {
        Some(token) if tokens_equal(token, expected) => next.run(request).await,
        _ => unauthorized(),
    }
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorBody::new("missing or invalid bearer token", "authentication_error")),
    )
        .into_response()
}

async fn healthz(State(gateway): State<Arc<Gateway>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": gateway.started_at.elapsed().as_secs(),
    }))
}

async fn list_models(State(gateway): State<Arc<Gateway>>) -> Json<ModelList> {
    Json(ModelList {
        object: "list",
        data: vec![ModelEntry {
            id: gateway.config.model_id.clone(),
            object: "model",
            created: Utc::now().timestamp(),
            owned_by: "warden".into(),
        }],
    })
}

async fn chat_completions(
    State(gateway): State<Arc<Gateway>>,
    Json(request): Json<ChatCompletionRequest>,
) -> Response {
    if request.messages.is_empty() {
        return bad_request("messages must not be empty", "empty_messages");
    }
    let last_user = match request
        .messages
        .iter()
        .rev()
        .find(|m| m.role == "user")
    {
        Some(message) => message.content.clone(),
        None => return bad_request("no user message present", "no_user_message"),
    };

    let session_id = match &request.session_id {
        Some(raw) => match SessionId::parse(raw) {
            Ok(session) => session,
            Err(_) => {
                return bad_request(
                    "session_id must be a canonical UUID or a colon tuple of 3+ segments",
                    "invalid_session_id",
                )
            }
        },
        None => SessionId::generate(),
    };

    let model = request
        .model
        .clone()
        .unwrap_or_else(|| gateway.config.model_id.clone());
    let stream_requested = request.stream.unwrap_or(false);

    let outcome = gateway
        .pipeline
        .run(session_id.clone(), "api", "api-user", &last_user)
        .await;

    let (content, finish_reason) = match outcome {
        Ok(CompletionOutcome::Answered { content, .. }) => (content, "stop".to_string()),
        Ok(CompletionOutcome::Refused { reason }) => (
            format!("This message was refused by the security policy: {reason}"),
            "content_filter".to_string(),
        ),
        Err(GatewayError::AgentFailed { detail, suggestion }) => {
            warn!(%detail, "agent run failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(
                    ErrorBody::new(format!("{detail} ({suggestion})"), "server_error")
                        .with_code("agent_failed"),
                ),
            )
                .into_response();
        }
        Err(e) => {
            warn!(error = %e, "completion pipeline failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody::new(e.to_string(), "server_error")),
            )
                .into_response();
        }
    };

    let completion_id = format!("chatcmpl-{}", Uuid::new_v4().simple());
    let created = Utc::now().timestamp();

    if stream_requested {
        return stream_completion(completion_id, created, model, content, finish_reason);
    }

    let completion_tokens = approx_tokens(&content);
    Json(ChatCompletion {
        id: completion_id,
        object: "chat.completion",
        created,
        model,
        choices: vec![Choice {
            index: 0,
            message: ChatMessage {
                role: "assistant".into(),
                content,
            },
            finish_reason,
        }],
        usage: Usage {
            prompt_tokens: approx_tokens(&last_user),
            completion_tokens,
            total_tokens: approx_tokens(&last_user) + completion_tokens,
        },
    })
    .into_response()
}

/// The four-event SSE form: role delta, content delta, finish chunk,
/// terminal `[DONE]`.
fn stream_completion(
    id: String,
    created: i64,
    model: String,
    content: String,
    finish_reason: String,
) -> Response {
    let chunk = |delta: Delta, finish: Option<String>| ChatCompletionChunk {
        id: id.clone(),
        object: "chat.completion.chunk",
        created,
        model: model.clone(),
        choices: vec![ChunkChoice {
            index: 0,
            delta,
            finish_reason: finish,
        }],
    };

    let events = vec![
        chunk(
            Delta {
                role: Some("assistant".into()),
                content: None,
            },
            None,
        ),
        chunk(
            Delta {
                role: None,
                content: Some(content),
            },
            None,
        ),
        chunk(Delta::default(), Some(finish_reason)),
    ];

    let stream = stream::iter(
        events
            .into_iter()
            .map(|chunk| Event::default().json_data(&chunk))
            .chain(std::iter::once(Ok(Event::default().data("[DONE]"))))
            .collect::<Vec<_>>(),
    );
    Sse::new(stream).into_response()
}

fn bad_request(message: &str, code: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody::new(message, "invalid_request_error").with_code(code)),
    )
        .into_response()
}

/// Rough token estimate for the usage block (4 bytes per token).
fn approx_tokens(text: &str) -> u64 {
    (text.len() as u64).div_ceil(4)
}
