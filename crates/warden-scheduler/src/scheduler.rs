//! # Scheduler Facade
//!
//! Owns the timers and the delivery of host-originated messages:
//!
//! - a cron check tick fixed at 60 seconds,
//! - a heartbeat tick at a coarse configurable interval (minutes),
//! - one-shot `run_at` timers,
//! - the proactive-hint gate.
//!
//! Both recurring ticks are gated by the active-hours window evaluated in
//! the configured IANA zone. Fired prompts become synthetic inbound
//! messages with `system` trust, pushed over an explicit channel to
//! whatever routes them (the router in production, a test receiver in
//! tests); the scheduler never reaches into the router directly.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use warden_audit::{AuditEntry, AuditJournal, AuditOutcome};
use warden_core::{InboundMessage, Scope, SessionAddress, SessionId};

use crate::active_hours::ActiveHours;
use crate::error::Result;
use crate::hints::{HintDecision, HintGate, HintGateConfig, ProactiveHint};
use crate::jobs::{job_id, CronJob, Delivery, JobStore};

/// Cron check cadence. Coarse on purpose; the last-fired-minute map in
/// the job store makes the tick idempotent within a minute.
pub const CRON_TICK: StdDuration = StdDuration::from_secs(60);

/// Default heartbeat prompt when no override file exists.
const DEFAULT_HEARTBEAT_PROMPT: &str =
    "Heartbeat: review pending work and surface anything that needs attention.";

/// Heartbeat override filename, looked up in the agent directory.
pub const HEARTBEAT_FILE: &str = "HEARTBEAT.md";

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Heartbeat cadence; zero disables heartbeats.
    pub heartbeat_interval: StdDuration,
    pub active_hours: ActiveHours,
    /// Agent directory searched for `HEARTBEAT.md`.
    pub agent_dir: Option<PathBuf>,
    /// Session address heartbeats are delivered to.
    pub heartbeat_address: SessionAddress,
    pub hints: HintGateConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: StdDuration::from_secs(30 * 60),
            active_hours: ActiveHours::always(chrono_tz::UTC),
            agent_dir: None,
            heartbeat_address: SessionAddress::new(
                "scheduler",
                Scope::Dm,
                vec!["heartbeat".into()],
            ),
            hints: HintGateConfig::default(),
        }
    }
}

/// Explicit scheduler dependencies.
pub struct SchedulerDeps {
    pub audit: AuditJournal,
    /// Synthetic-inbound delivery channel; the receiver routes into the
    /// security pipeline.
    pub delivery: mpsc::Sender<InboundMessage>,
}

pub struct Scheduler {
    config: SchedulerConfig,
    audit: AuditJournal,
    delivery: mpsc::Sender<InboundMessage>,
    jobs: JobStore,
    hints: HintGate,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig, deps: SchedulerDeps) -> Self {
        let hints = HintGate::new(config.hints.clone());
        Self {
            config,
            audit: deps.audit,
            delivery: deps.delivery,
            jobs: JobStore::new(),
            hints,
        }
    }

    // -- Job management -----------------------------------------------------

    /// Register a recurring (or `run_once`) cron job.
    pub fn add_cron(
        &self,
        session: SessionId,
        agent_id: &str,
        expr: &str,
        prompt: &str,
        max_token_budget: Option<u64>,
        run_once: bool,
    ) -> Result<String> {
        let job = CronJob {
            id: job_id(),
            expr: expr.to_string(),
            session,
            agent_id: agent_id.to_string(),
            prompt: prompt.to_string(),
            max_token_budget,
            delivery: Delivery::Session,
            run_once,
            created_at: Utc::now(),
        };
        let id = job.id.clone();
        let session_str = job.session.as_str().to_string();
        self.jobs.insert(job)?;
        self.audit.append(
            AuditEntry::new("scheduler_add_cron", AuditOutcome::Success)
                .with_session(session_str)
                .with_args(json!({ "job_id": id, "expr": expr, "run_once": run_once })),
        )?;
        info!(job = %id, expr, "cron job added");
        Ok(id)
    }

    pub fn remove_job(&self, job_id: &str) -> bool {
        let removed = self.jobs.remove(job_id);
        if removed {
            info!(job = %job_id, "cron job removed");
        }
        removed
    }

    pub fn list_jobs(&self, session: &SessionId) -> Vec<CronJob> {
        self.jobs.for_session(session)
    }

    /// Schedule a one-shot firing at `at`; fires immediately when `at` is
    /// in the past.
    pub fn run_at(
        self: &Arc<Self>,
        session: SessionId,
        agent_id: &str,
        at: DateTime<Utc>,
        prompt: &str,
    ) -> String {
        let id = job_id();
        let scheduler = Arc::clone(self);
        let job = CronJob {
            id: id.clone(),
            expr: String::new(),
            session,
            agent_id: agent_id.to_string(),
            prompt: prompt.to_string(),
            max_token_budget: None,
            delivery: Delivery::Session,
            run_once: true,
            created_at: Utc::now(),
        };
        tokio::spawn(async move {
            let wait = (at - Utc::now()).to_std().unwrap_or(StdDuration::ZERO);
            tokio::time::sleep(wait).await;
            scheduler.fire(&job, "scheduler_run_at").await;
        });
        id
    }

    // -- Timers -------------------------------------------------------------

    /// Run both recurring ticks until the task is dropped.
    pub async fn run(self: Arc<Self>) {
        let cron = {
            let scheduler = Arc::clone(&self);
            tokio::spawn(async move {
                let mut tick = tokio::time::interval(CRON_TICK);
                tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    tick.tick().await;
                    scheduler.tick_cron(Utc::now()).await;
                }
            })
        };

        if !self.config.heartbeat_interval.is_zero() {
            let scheduler = Arc::clone(&self);
            tokio::spawn(async move {
                let mut tick = tokio::time::interval(scheduler.config.heartbeat_interval);
                tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                // The first interval tick is immediate; skip it so the
                // heartbeat starts one full interval after boot.
                tick.tick().await;
                loop {
                    tick.tick().await;
                    scheduler.tick_heartbeat(Utc::now()).await;
                }
            });
        }

        let _ = cron.await;
    }

    /// One cron check pass at `now`. Public for tests.
    pub async fn tick_cron(&self, now: DateTime<Utc>) {
        if !self.config.active_hours.contains(now) {
            debug!("cron tick outside active hours");
            return;
        }
        let local = now.with_timezone(&self.config.active_hours.tz());
        for job in self.jobs.due(&local) {
            self.fire(&job, "scheduler_cron_fire").await;
        }
    }

    /// One heartbeat pass at `now`. Public for tests.
    pub async fn tick_heartbeat(&self, now: DateTime<Utc>) {
        if !self.config.active_hours.contains(now) {
            debug!("heartbeat outside active hours");
            return;
        }
        let prompt = self.heartbeat_prompt().await;
        let message = InboundMessage::system(self.config.heartbeat_address.clone(), prompt);
        self.deliver(message, "scheduler_heartbeat", None).await;
    }

    async fn heartbeat_prompt(&self) -> String {
        if let Some(dir) = &self.config.agent_dir {
            if let Ok(content) = tokio::fs::read_to_string(dir.join(HEARTBEAT_FILE)).await {
                let content = content.trim();
                if !content.is_empty() {
                    return content.to_string();
                }
            }
        }
        DEFAULT_HEARTBEAT_PROMPT.to_string()
    }

    async fn fire(&self, job: &CronJob, audit_action: &str) {
        debug!(job = %job.id, "job fired");
        let message = InboundMessage::system(
            SessionAddress::new("scheduler", Scope::Dm, vec![job.id.clone()]),
            job.prompt.clone(),
        );
        self.deliver(message, audit_action, Some(job)).await;
    }

    async fn deliver(&self, message: InboundMessage, audit_action: &str, job: Option<&CronJob>) {
        let args = match job {
            Some(job) => json!({ "job_id": job.id, "prompt": job.prompt }),
            None => json!({ "prompt": message.content }),
        };
        let session = job
            .map(|j| j.session.as_str().to_string())
            .unwrap_or_else(|| "scheduler:dm:heartbeat".to_string());
        if self.delivery.send(message).await.is_err() {
            warn!("delivery channel closed; dropping scheduled message");
            return;
        }
        self.audit
            .append(
                AuditEntry::new(audit_action, AuditOutcome::Success)
                    .with_session(session)
                    .with_taint("system")
                    .with_args(args),
            )
            .ok();
    }

    // -- Hints --------------------------------------------------------------

    /// Evaluate a hint through the gate; fires it as a synthetic inbound
    /// when admitted, audits the suppression reason otherwise.
    pub async fn submit_hint(&self, hint: ProactiveHint) -> HintDecision {
        let now = Utc::now();
        let in_hours = self.config.active_hours.contains(now);
        let decision = self.hints.evaluate(&hint, now, in_hours);
        match &decision {
            HintDecision::Fire => {
                let message = InboundMessage::system(
                    SessionAddress::new("scheduler", Scope::Dm, vec!["hint".into(), hint.kind.clone()]),
                    hint.suggested_prompt.clone(),
                );
                self.deliver(message, "scheduler_hint_fire", None).await;
            }
            HintDecision::Suppressed { reason } => {
                self.audit
                    .append(
                        AuditEntry::new("scheduler_hint_suppressed", AuditOutcome::Blocked)
                            .with_args(json!({ "kind": hint.kind, "reason": reason })),
                    )
                    .ok();
            }
            HintDecision::OverBudget => {
                self.audit
                    .append(
                        AuditEntry::new("scheduler_hint_over_budget", AuditOutcome::Blocked)
                            .with_args(json!({ "kind": hint.kind, "scope": hint.scope })),
                    )
                    .ok();
            }
        }
        decision
    }

    /// Record model token usage for hint budgeting.
    pub fn record_token_usage(&self, scope: &str, tokens: u64) {
        self.hints.record_token_usage(scope, tokens);
    }

    /// Drain hints queued for operator inspection.
    pub fn over_budget_hints(&self) -> Vec<ProactiveHint> {
        self.hints.take_over_budget()
    }
}
