//! # Warden Scheduler
//!
//! Host-originated time: cron jobs, one-shot timers, heartbeats, and the
//! proactive-hint gate, all fenced by an active-hours window in a
//! configured IANA time zone.
//!
//! Everything the scheduler emits is a synthetic [`warden_core::InboundMessage`]
//! with `system` trust, pushed over an explicit channel into the same
//! security pipeline as channel traffic. The scheduler never bypasses the
//! router.
//!
//! - [`cron`] - five-field expression parser and minute-granular matcher
//! - [`jobs`] - job store with last-fired-minute dedup
//! - [`active_hours`] - the wall-clock window
//! - [`hints`] - confidence/cooldown/budget gating for proactive nudges
//! - [`scheduler`] - the facade owning the timers

pub mod active_hours;
pub mod cron;
pub mod error;
pub mod hints;
pub mod jobs;
pub mod scheduler;

pub use active_hours::ActiveHours;
pub use cron::CronExpr;
pub use error::{Result, SchedulerError};
pub use hints::{HintDecision, HintGate, HintGateConfig, ProactiveHint};
pub use jobs::{job_id, CronJob, Delivery, JobStore};
pub use scheduler::{Scheduler, SchedulerConfig, SchedulerDeps, CRON_TICK, HEARTBEAT_FILE};
