//! Cron job model and the in-process job store.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use warden_core::SessionId;

use crate::cron::CronExpr;
use crate::error::Result;

/// How a fired job's prompt is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    /// Route as a synthetic inbound message to the job's session.
    #[default]
    Session,
    /// Fire silently; only the audit trail records it.
    AuditOnly,
}

/// One scheduled job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronJob {
    pub id: String,
    pub expr: String,
    pub session: SessionId,
    pub agent_id: String,
    pub prompt: String,
    pub max_token_budget: Option<u64>,
    pub delivery: Delivery,
    pub run_once: bool,
    pub created_at: DateTime<Utc>,
}

/// Thread-safe job map with the per-job last-fired-minute record.
///
/// The last-fired map is what makes the coarse 60-second check tick safe:
/// a job fires at most once per matching minute even if two ticks land in
/// the same minute.
#[derive(Default)]
pub struct JobStore {
    jobs: RwLock<HashMap<String, (CronJob, CronExpr)>>,
    last_fired: Mutex<HashMap<String, String>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a job, parsing and retaining its expression.
    pub fn insert(&self, job: CronJob) -> Result<()> {
        let expr = CronExpr::parse(&job.expr)?;
        self.jobs
            .write()
            .expect("job lock poisoned")
            .insert(job.id.clone(), (job, expr));
        Ok(())
    }

    pub fn remove(&self, job_id: &str) -> bool {
        self.last_fired
            .lock()
            .expect("fired lock poisoned")
            .remove(job_id);
        self.jobs
            .write()
            .expect("job lock poisoned")
            .remove(job_id)
            .is_some()
    }

    pub fn get(&self, job_id: &str) -> Option<CronJob> {
        self.jobs
            .read()
            .expect("job lock poisoned")
            .get(job_id)
            .map(|(job, _)| job.clone())
    }

    /// Jobs bound to one session.
    pub fn for_session(&self, session: &SessionId) -> Vec<CronJob> {
        self.jobs
            .read()
            .expect("job lock poisoned")
            .values()
            .filter(|(job, _)| &job.session == session)
            .map(|(job, _)| job.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.read().expect("job lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Jobs whose expression matches this minute and which have not fired
    /// in it yet. Marks them fired and removes `run_once` jobs.
    pub fn due<Tz: chrono::TimeZone>(&self, now: &DateTime<Tz>) -> Vec<CronJob> {
        let minute_key = format!(
            "{}",
            now.naive_local().format("%Y-%m-%d %H:%M")
        );
        let mut due = Vec::new();
        {
            let jobs = self.jobs.read().expect("job lock poisoned");
            let mut fired = self.last_fired.lock().expect("fired lock poisoned");
            for (id, (job, expr)) in jobs.iter() {
                if !expr.matches(now) {
                    continue;
                }
                if fired.get(id).map(String::as_str) == Some(minute_key.as_str()) {
                    continue;
                }
                fired.insert(id.clone(), minute_key.clone());
                due.push(job.clone());
            }
        }
        for job in &due {
            if job.run_once {
                self.remove(&job.id);
            }
        }
        due
    }
}

/// Mint a job id.
pub fn job_id() -> String {
    format!("job-{}", Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn job(id: &str, expr: &str, run_once: bool) -> CronJob {
        CronJob {
            id: id.into(),
            expr: expr.into(),
            session: SessionId::parse("scheduler:dm:s1").unwrap(),
            agent_id: "helper".into(),
            prompt: "morning check".into(),
            max_token_budget: None,
            delivery: Delivery::Session,
            run_once,
            created_at: Utc::now(),
        }
    }

    fn monday_nine() -> DateTime<Utc> {
        // 2026-03-02 is a Monday.
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_due_fires_once_per_minute() {
        let store = JobStore::new();
        store.insert(job("j1", "0 9 * * 1", false)).unwrap();

        let at_nine = monday_nine();
        assert_eq!(store.due(&at_nine).len(), 1);

        // Second tick in the same minute (09:00:30): no refire.
        let same_minute = at_nine + chrono::Duration::seconds(30);
        assert!(store.due(&same_minute).is_empty());

        // Next week's Monday fires again.
        let next_week = at_nine + chrono::Duration::weeks(1);
        assert_eq!(store.due(&next_week).len(), 1);
    }

    #[test]
    fn test_run_once_removed_after_firing() {
        let store = JobStore::new();
        store.insert(job("j1", "* * * * *", true)).unwrap();
        assert_eq!(store.due(&Utc::now()).len(), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn test_non_matching_minute_not_due() {
        let store = JobStore::new();
        store.insert(job("j1", "0 9 * * 1", false)).unwrap();
        let tuesday = monday_nine() + chrono::Duration::days(1);
        assert!(store.due(&tuesday).is_empty());
    }

    #[test]
    fn test_bad_expression_rejected_at_insert() {
        let store = JobStore::new();
        assert!(store.insert(job("j1", "not cron", false)).is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn test_for_session_filters() {
        let store = JobStore::new();
        store.insert(job("j1", "* * * * *", false)).unwrap();
        let mut other = job("j2", "* * * * *", false);
        other.session = SessionId::parse("scheduler:dm:s2").unwrap();
        store.insert(other).unwrap();

        let session = SessionId::parse("scheduler:dm:s1").unwrap();
        let jobs = store.for_session(&session);
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, "j1");
    }
}
