//! Concrete capability adapters wired at the composition root: the
//! reqwest-backed web client, the upstream model client, and the bridge
//! from the dispatcher's scheduler trait onto the running scheduler.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use warden_core::{SessionId, UpstreamConfig};
use warden_ipc::{HandlerError, HandlerResult, LlmClient, LlmReply, SchedulerHandle, SearchHit, WebClient};
use warden_scheduler::Scheduler;

/// Cap on fetched page bytes handed back to an agent.
const MAX_FETCH_BYTES: usize = 1024 * 1024;

/// Host-side web access on the agent's behalf.
pub struct HttpWebClient {
    client: reqwest::Client,
}

impl HttpWebClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .unwrap_or_default(),
        }
    }
}

impl Default for HttpWebClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WebClient for HttpWebClient {
    async fn fetch(&self, url: &str) -> HandlerResult<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| HandlerError::Failed(format!("fetch failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(HandlerError::Failed(format!("fetch returned {status}")));
        }
        let mut text = response
            .text()
            .await
            .map_err(|e| HandlerError::Failed(format!("fetch body failed: {e}")))?;
        if text.len() > MAX_FETCH_BYTES {
            let mut cut = MAX_FETCH_BYTES;
            while !text.is_char_boundary(cut) {
                cut -= 1;
            }
            text.truncate(cut);
        }
        Ok(text)
    }

    async fn search(&self, _query: &str, _max_results: usize) -> HandlerResult<Vec<SearchHit>> {
        // No search provider is bundled; deployments wire their own.
        Err(HandlerError::Unavailable("no web search provider configured"))
    }
}

/// Model client for dispatcher-side `llm_call`, speaking the upstream
/// messages API with credentials from startup config.
pub struct UpstreamLlmClient {
    client: reqwest::Client,
    upstream: UpstreamConfig,
    model: String,
}

impl UpstreamLlmClient {
    pub fn new(upstream: UpstreamConfig, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            upstream,
            model: model.into(),
        }
    }
}

#[async_trait]
impl LlmClient for UpstreamLlmClient {
    async fn complete(
        &self,
        prompt: &str,
        system: Option<&str>,
        max_tokens: Option<u32>,
    ) -> HandlerResult<LlmReply> {
        let mut request = self
            .client
            .post(format!("{}/v1/messages", self.upstream.base_url))
            .header("anthropic-version", "2023-06-01");
        if let Some(key) = &self.upstream.api_key {
            request = request.header("x-api-key", key);
        } else if let Some(token) = &self.upstream.oauth_token {
            request = request.bearer_auth(token);
        } else {
            return Err(HandlerError::Unavailable("no upstream credentials configured"));
        }

        let mut body = json!({
            "model": self.model,
            "max_tokens": max_tokens.unwrap_or(1024),
            "messages": [{ "role": "user", "content": prompt }],
        });
        if let Some(system) = system {
            body["system"] = json!(system);
        }

        let response = request
            .json(&body)
            .send()
            .await
            .map_err(|e| HandlerError::Failed(format!("model call failed: {e}")))?;
        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .map_err(|e| HandlerError::Failed(format!("model response invalid: {e}")))?;
        if !status.is_success() {
            return Err(HandlerError::Failed(format!(
                "model call returned {status}: {}",
                payload["error"]["message"].as_str().unwrap_or("unknown")
            )));
        }

        let content = payload["content"][0]["text"].as_str().unwrap_or("").to_string();
        let tokens_used = payload["usage"]["output_tokens"].as_u64().unwrap_or(0)
            + payload["usage"]["input_tokens"].as_u64().unwrap_or(0);
        Ok(LlmReply {
            content,
            tokens_used,
        })
    }
}

/// Bridges dispatcher `scheduler_*` actions onto the running scheduler.
pub struct SchedulerBridge {
    scheduler: Arc<Scheduler>,
    agent_id: String,
}

impl SchedulerBridge {
    pub fn new(scheduler: Arc<Scheduler>, agent_id: impl Into<String>) -> Self {
        Self {
            scheduler,
            agent_id: agent_id.into(),
        }
    }
}

#[async_trait]
impl SchedulerHandle for SchedulerBridge {
    async fn add_cron(
        &self,
        session: &SessionId,
        expr: &str,
        prompt: &str,
        max_token_budget: Option<u64>,
        run_once: bool,
    ) -> HandlerResult<String> {
        self.scheduler
            .add_cron(
                session.clone(),
                &self.agent_id,
                expr,
                prompt,
                max_token_budget,
                run_once,
            )
            .map_err(|e| HandlerError::Failed(e.to_string()))
    }

    async fn run_at(
        &self,
        session: &SessionId,
        at: DateTime<Utc>,
        prompt: &str,
    ) -> HandlerResult<String> {
        Ok(self
            .scheduler
            .run_at(session.clone(), &self.agent_id, at, prompt))
    }

    async fn remove(&self, job_id: &str) -> HandlerResult<bool> {
        Ok(self.scheduler.remove_job(job_id))
    }

    async fn list(&self, session: &SessionId) -> HandlerResult<Value> {
        serde_json::to_value(self.scheduler.list_jobs(session))
            .map_err(|e| HandlerError::Failed(e.to_string()))
    }
}
