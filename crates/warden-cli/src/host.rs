//! Host assembly: builds every component from configuration, wires the
//! explicit dependency structs, and runs the serving loops.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use warden_audit::{AuditJournal, ConversationJournal};
use warden_core::router::Router as SecurityRouter;
use warden_core::{HostConfig, MessageQueue, RouterDeps, TaintLedger};
use warden_gateway::{Gateway, GatewayConfig, Pipeline};
use warden_ipc::{Dispatcher, DispatcherDeps, HostCapabilities, InMemoryKvLog, SkillStore, UnavailableBrowser, WorkspaceFiles};
use warden_proxy::{CredentialProxy, ProxyConfig};
use warden_sandbox::{select_backend, BackendKind};
use warden_scanner::Scanner;
use warden_scheduler::{Scheduler, SchedulerConfig, SchedulerDeps};

use crate::adapters::{HttpWebClient, SchedulerBridge, UpstreamLlmClient};

/// Options from the `start` subcommand.
#[derive(Debug, Clone)]
pub struct StartOptions {
    /// Gateway unix socket path (default: `<home>/data/gateway.sock`).
    pub socket: Option<PathBuf>,
    /// Loopback TCP port; switches the gateway to bearer-auth mode.
    pub port: Option<u16>,
    pub bearer_token: Option<String>,
    /// Agent identity directory name.
    pub agent: String,
    /// Command run inside each sandbox.
    pub agent_command: Vec<String>,
    pub backend: Option<BackendKind>,
}

/// Build everything and serve until ctrl-c.
pub async fn run(config: HostConfig, options: StartOptions) -> Result<()> {
    let layout = config.layout();
    std::fs::create_dir_all(layout.data_dir()).context("creating data directory")?;

    let audit = AuditJournal::open(layout.data_dir().join("journal"))
        .context("opening audit journal")?;
    let conversations =
        ConversationJournal::attach(audit.db()).context("opening conversation journal")?;

    let scanner = Arc::new(Scanner::with_threshold(config.scanner_threshold));
    let taint = Arc::new(TaintLedger::new(config.taint_threshold));
    let queue = Arc::new(MessageQueue::new(config.queue_capacity));
    let router = Arc::new(SecurityRouter::new(RouterDeps {
        scanner: Arc::clone(&scanner),
        audit: audit.clone(),
        taint: Arc::clone(&taint),
        queue: Arc::clone(&queue),
    }));

    // Scheduler and its delivery loop: scheduled prompts re-enter the
    // same security pipeline as channel traffic.
    let (delivery_tx, mut delivery_rx) = mpsc::channel(64);
    let agent_dir = layout.agent_shared_dir(&options.agent)?;
    let scheduler = Arc::new(Scheduler::new(
        SchedulerConfig {
            agent_dir: Some(agent_dir.clone()),
            ..SchedulerConfig::default()
        },
        SchedulerDeps {
            audit: audit.clone(),
            delivery: delivery_tx,
        },
    ));
    tokio::spawn({
        let scheduler = Arc::clone(&scheduler);
        async move { scheduler.run().await }
    });
    tokio::spawn({
        let router = Arc::clone(&router);
        async move {
            while let Some(message) = delivery_rx.recv().await {
                match router.process_inbound(&message) {
                    Ok(outcome) if outcome.queued => {
                        info!(session = %outcome.session_id, "scheduled prompt queued");
                    }
                    Ok(outcome) => {
                        warn!(session = %outcome.session_id, "scheduled prompt dropped");
                    }
                    Err(e) => error!(error = %e, "scheduled prompt failed routing"),
                }
            }
        }
    });

    // Dispatcher capabilities.
    let skills_dir = layout.skills_dir(&options.agent)?;
    let capabilities = Arc::new(HostCapabilities {
        memory: Arc::new(InMemoryKvLog::default()),
        web: Arc::new(HttpWebClient::new()),
        browser: Arc::new(UnavailableBrowser),
        llm: Arc::new(UpstreamLlmClient::new(
            config.upstream.clone(),
            "claude-sonnet-4-20250514",
        )),
        scheduler: Arc::new(SchedulerBridge::new(
            Arc::clone(&scheduler),
            options.agent.clone(),
        )),
        workspace: WorkspaceFiles::new(layout.clone(), options.agent.clone(), "default"),
        skills: SkillStore::new(&skills_dir),
        audit: audit.clone(),
    });
    let dispatcher = Arc::new(Dispatcher::new(DispatcherDeps {
        audit: audit.clone(),
        taint: Arc::clone(&taint),
        capabilities,
        delegate: None,
        limits: config.delegation,
        call_timeout: Duration::from_secs(config.call_timeout_secs),
    }));

    // Credential proxy on its own socket. It refuses to start without
    // upstream credentials, so don't spawn a task doomed to fail.
    let proxy_config = ProxyConfig::new(
        config.upstream.base_url.clone(),
        config.upstream.api_key.clone(),
        config.upstream.oauth_token.clone(),
    );
    if proxy_config.has_credentials() {
        let proxy = Arc::new(CredentialProxy::new(proxy_config));
        let proxy_socket = layout.data_dir().join("proxy.sock");
        tokio::spawn(async move {
            if let Err(e) = proxy.serve_unix(&proxy_socket).await {
                error!(error = %e, "credential proxy exited");
            }
        });
    } else {
        warn!("no upstream credentials configured; credential proxy not started");
    }

    // Completions gateway.
    let backend = select_backend(options.backend).context("selecting sandbox backend")?;
    let pipeline = Pipeline {
        router,
        conversations,
        backend,
        dispatcher: Some(dispatcher),
        agent_command: options.agent_command.clone(),
        skills_dir: Some(skills_dir),
        scratch_root: layout.root().join("scratch"),
        sandbox_timeout: Duration::from_secs(300),
        history_limit: 40,
    };
    let gateway = Arc::new(Gateway::new(
        GatewayConfig {
            model_id: "warden-agent".into(),
            bearer_token: options.bearer_token.clone(),
        },
        pipeline,
    ));

    let serve = async {
        match options.port {
            Some(port) => {
                let addr = format!("127.0.0.1:{port}").parse()?;
                gateway.serve_tcp(addr).await.map_err(anyhow::Error::from)
            }
            None => {
                let socket = options
                    .socket
                    .clone()
                    .unwrap_or_else(|| layout.data_dir().join("gateway.sock"));
                gateway.serve_unix(&socket).await.map_err(anyhow::Error::from)
            }
        }
    };

    tokio::select! {
        result = serve => result,
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
            audit.flush().ok();
            Ok(())
        }
    }
}

/// Validate configuration without serving.
pub fn check(config: &HostConfig) -> Result<()> {
    let layout = config.layout();
    println!("home:              {}", layout.root().display());
    println!("scanner threshold: {}", config.scanner_threshold);
    println!("taint threshold:   {}", config.taint_threshold);
    println!(
        "delegation:        max_concurrent={} max_depth={}",
        config.delegation.max_concurrent, config.delegation.max_depth
    );
    println!(
        "upstream:          {} ({})",
        config.upstream.base_url,
        if config.upstream.api_key.is_some() {
            "api key"
        } else if config.upstream.oauth_token.is_some() {
            "oauth token"
        } else {
            "no credentials"
        }
    );
    let backend = select_backend(None).context("no sandbox backend available")?;
    println!("sandbox backend:   {}", backend.name());
    Ok(())
}
