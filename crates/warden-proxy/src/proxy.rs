//! The proxy server: header rewrite, body limits, streaming passthrough.

use std::path::Path;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use hyper_util::service::TowerToHyperService;
use thiserror::Error;
use tokio::net::UnixListener;
use tracing::{debug, info, warn};

/// Maximum request body accepted from clients.
pub const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

/// Request headers never forwarded upstream.
const HOP_HEADERS: &[&str] = &["host", "connection", "content-length"];

/// Provider credential header.
const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("proxy io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("proxy has no upstream credentials configured")]
    NoCredentials,
}

/// Upstream wiring, read from the environment once at construction.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub upstream_base_url: String,
    pub api_key: Option<String>,
    pub oauth_token: Option<String>,
}

impl ProxyConfig {
    pub fn new(
        upstream_base_url: impl Into<String>,
        api_key: Option<String>,
        oauth_token: Option<String>,
    ) -> Self {
        Self {
            upstream_base_url: upstream_base_url.into(),
            api_key,
            oauth_token,
        }
    }

    /// Read credentials from the process environment (once).
    pub fn from_env(upstream_base_url: impl Into<String>) -> Self {
        let read = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        Self::new(
            upstream_base_url,
            read("WARDEN_UPSTREAM_API_KEY"),
            read("WARDEN_UPSTREAM_OAUTH_TOKEN"),
        )
    }

    pub fn has_credentials(&self) -> bool {
        self.api_key.is_some() || self.oauth_token.is_some()
    }
}

/// The credential-injecting forward proxy.
pub struct CredentialProxy {
    config: ProxyConfig,
    client: reqwest::Client,
}

impl CredentialProxy {
    pub fn new(config: ProxyConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// The axum router for this proxy. Exposed for in-process tests.
    pub fn router(self: &Arc<Self>) -> Router {
        Router::new()
            .route("/v1/messages", post(forward))
            .fallback(not_found)
            .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
            .with_state(Arc::clone(self))
    }

    /// Bind the unix socket (unlinking any stale file) and serve until
    /// dropped.
    ///
    /// Refuses to start without upstream credentials: a proxy that
    /// forwards whatever identity the agent supplies is worse than no
    /// proxy at all.
    pub async fn serve_unix(self: Arc<Self>, socket_path: &Path) -> Result<(), ProxyError> {
        if !self.config.has_credentials() {
            return Err(ProxyError::NoCredentials);
        }
        if socket_path.exists() {
            std::fs::remove_file(socket_path)?;
        }
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let listener = UnixListener::bind(socket_path)?;
        info!(socket = %socket_path.display(), upstream = %self.config.upstream_base_url, "credential proxy listening");

        let service = TowerToHyperService::new(self.router());
        loop {
            let (stream, _) = listener.accept().await?;
            let service = service.clone();
            tokio::spawn(async move {
                if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                    .serve_connection(TokioIo::new(stream), service)
                    .await
                {
                    debug!(error = %e, "proxy connection ended");
                }
            });
        }
    }

    /// Rewrite client headers for the upstream request.
    ///
    /// Hop headers are dropped; agent-supplied credentials are stripped
    /// and replaced by the proxy's own (API key preferred, OAuth bearer
    /// otherwise).
    fn rewrite_headers(&self, inbound: &HeaderMap) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in inbound {
            let lower = name.as_str().to_lowercase();
            if HOP_HEADERS.contains(&lower.as_str()) {
                continue;
            }
            headers.insert(name.clone(), value.clone());
        }

        if let Some(key) = &self.config.api_key {
            headers.remove("authorization");
            if let Ok(value) = key.parse() {
                headers.insert(API_KEY_HEADER, value);
            }
        } else if let Some(token) = &self.config.oauth_token {
            headers.remove(API_KEY_HEADER);
            if let Ok(value) = format!("Bearer {token}").parse() {
                headers.insert("authorization", value);
            }
        } else {
            // Fail closed: no credentials means no upstream identity at
            // all, not a passthrough of whatever the agent sent.
            headers.remove("authorization");
            headers.remove(API_KEY_HEADER);
        }
        headers
    }
}

async fn not_found() -> Response {
    StatusCode::NOT_FOUND.into_response()
}

async fn forward(
    State(proxy): State<Arc<CredentialProxy>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let url = format!("{}/v1/messages", proxy.config.upstream_base_url);
    let outbound = proxy.rewrite_headers(&headers);

    let upstream = proxy
        .client
        .post(&url)
        .headers(outbound)
        .body(body)
        .send()
        .await;

    let upstream = match upstream {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, "upstream request failed");
            return (
                StatusCode::BAD_GATEWAY,
                format!("upstream request failed: {e}"),
            )
                .into_response();
        }
    };

    let status = upstream.status();
    let mut response = Response::builder().status(status.as_u16());
    for (name, value) in upstream.headers() {
        if name.as_str().eq_ignore_ascii_case("transfer-encoding") {
            continue;
        }
        response = response.header(name, value);
    }

    // Stream the body through; dropping the client connection drops this
    // stream and aborts the upstream transfer with it.
    match response.body(Body::from_stream(upstream.bytes_stream())) {
        Ok(response) => response,
        Err(e) => (
            StatusCode::BAD_GATEWAY,
            format!("upstream response invalid: {e}"),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use tower::ServiceExt;

    fn proxy(api_key: Option<&str>, oauth: Option<&str>) -> Arc<CredentialProxy> {
        Arc::new(CredentialProxy::new(ProxyConfig::new(
            // A loopback port nothing listens on: upstream failures are
            // deterministic without touching the network.
            "http://127.0.0.1:9",
            api_key.map(String::from),
            oauth.map(String::from),
        )))
    }

    #[test]
    fn test_rewrite_injects_api_key_and_strips_agent_auth() {
        let proxy = proxy(Some("real-key"), None);
        let mut inbound = HeaderMap::new();
        inbound.insert("authorization", "Bearer agent-forged".parse().unwrap());
        inbound.insert("content-type", "application/json".parse().unwrap());
        inbound.insert("host", "evil.example".parse().unwrap());
        inbound.insert("content-length", "42".parse().unwrap());

        let out = proxy.rewrite_headers(&inbound);
        assert_eq!(out.get(API_KEY_HEADER).unwrap(), "real-key");
        assert!(out.get("authorization").is_none());
        assert!(out.get("host").is_none());
        assert!(out.get("content-length").is_none());
        assert_eq!(out.get("content-type").unwrap(), "application/json");
    }

    #[test]
    fn test_rewrite_prefers_key_over_oauth() {
        let proxy = proxy(Some("real-key"), Some("oauth-token"));
        let out = proxy.rewrite_headers(&HeaderMap::new());
        assert_eq!(out.get(API_KEY_HEADER).unwrap(), "real-key");
        assert!(out.get("authorization").is_none());
    }

    #[test]
    fn test_rewrite_oauth_bearer() {
        let proxy = proxy(None, Some("oauth-token"));
        let mut inbound = HeaderMap::new();
        inbound.insert(API_KEY_HEADER, "agent-forged".parse().unwrap());
        let out = proxy.rewrite_headers(&inbound);
        assert_eq!(out.get("authorization").unwrap(), "Bearer oauth-token");
        assert!(out.get(API_KEY_HEADER).is_none());
    }

    #[test]
    fn test_rewrite_no_credentials_strips_everything() {
        let proxy = proxy(None, None);
        let mut inbound = HeaderMap::new();
        inbound.insert("authorization", "Bearer forged".parse().unwrap());
        inbound.insert(API_KEY_HEADER, "forged".parse().unwrap());
        let out = proxy.rewrite_headers(&inbound);
        assert!(out.get("authorization").is_none());
        assert!(out.get(API_KEY_HEADER).is_none());
    }

    #[tokio::test]
    async fn test_startup_refused_without_credentials() {
        // The guard runs before any filesystem or bind work, so the path
        // never needs to exist.
        let err = proxy(None, None)
            .serve_unix(Path::new("/tmp/warden-proxy-nocreds.sock"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::NoCredentials));
    }

    #[tokio::test]
    async fn test_other_paths_404() {
        let router = proxy(Some("k"), None).router();
        let response = router
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/v1/models")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_oversize_body_413() {
        let router = proxy(Some("k"), None).router();
        let big = vec![b'x'; MAX_BODY_BYTES + 1];
        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/messages")
                    .body(Body::from(big))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_unreachable_upstream_502() {
        let router = proxy(Some("k"), None).router();
        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/messages")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
