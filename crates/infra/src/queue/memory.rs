//! In-process queue backend for dev/tests.
//!
//! Nothing drains it on its own; the worker-side transitions
//! (`activate`, `complete`, `fail_attempt`) exist so callers and tests can
//! drive a job through its lifecycle the way an external consumer would.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use feedlens_core::JobId;

use super::backend::{QueueBackend, QueueError};
use super::types::{JobCounts, JobOptions, JobRecord, JobState, QueuedJob};

#[derive(Debug, Clone)]
struct Entry {
    record: JobRecord,
    options: JobOptions,
}

#[derive(Debug)]
pub struct InMemoryQueueBackend {
    jobs: RwLock<HashMap<JobId, Entry>>,
    reachable: AtomicBool,
}

impl Default for InMemoryQueueBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryQueueBackend {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            reachable: AtomicBool::new(true),
        }
    }

    /// Simulate the broker going away (or coming back).
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    fn check_reachable(&self) -> Result<(), QueueError> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(QueueError::Connection("in-memory broker marked unreachable".to_string()))
        }
    }

    /// waiting/delayed -> active.
    pub async fn activate(&self, job_id: JobId) -> Result<(), QueueError> {
        self.check_reachable()?;
        let mut jobs = self.jobs.write().await;
        let entry = jobs
            .get_mut(&job_id)
            .ok_or_else(|| QueueError::Command(format!("no such job: {job_id}")))?;
        match entry.record.state {
            JobState::Waiting | JobState::Delayed => {
                entry.record.state = JobState::Active;
                Ok(())
            }
            other => Err(QueueError::Command(format!("cannot activate a {other} job"))),
        }
    }

    /// active -> completed.
    pub async fn complete(&self, job_id: JobId, now: DateTime<Utc>) -> Result<(), QueueError> {
        self.check_reachable()?;
        let mut jobs = self.jobs.write().await;
        let entry = jobs
            .get_mut(&job_id)
            .ok_or_else(|| QueueError::Command(format!("no such job: {job_id}")))?;
        if entry.record.state != JobState::Active {
            return Err(QueueError::Command(format!(
                "cannot complete a {} job",
                entry.record.state
            )));
        }
        entry.record.attempts_made += 1;
        entry.record.state = JobState::Completed;
        entry.record.finished_at = Some(now);
        Ok(())
    }

    /// active -> delayed (retry budget left) or failed.
    ///
    /// Returns the new state.
    pub async fn fail_attempt(
        &self,
        job_id: JobId,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<JobState, QueueError> {
        self.check_reachable()?;
        let mut jobs = self.jobs.write().await;
        let entry = jobs
            .get_mut(&job_id)
            .ok_or_else(|| QueueError::Command(format!("no such job: {job_id}")))?;
        if entry.record.state != JobState::Active {
            return Err(QueueError::Command(format!("cannot fail a {} job", entry.record.state)));
        }

        entry.record.attempts_made += 1;
        entry.record.failure_reason = Some(reason.into());
        if entry.options.retry.should_retry(entry.record.attempts_made) {
            entry.record.state = JobState::Delayed;
        } else {
            entry.record.state = JobState::Failed;
            entry.record.finished_at = Some(now);
        }
        Ok(entry.record.state)
    }
}

#[async_trait]
impl QueueBackend for InMemoryQueueBackend {
    async fn ping(&self) -> Result<(), QueueError> {
        self.check_reachable()
    }

    async fn add(&self, job: &QueuedJob) -> Result<(), QueueError> {
        self.check_reachable()?;
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.job_id) {
            return Err(QueueError::AlreadyExists(job.job_id));
        }
        jobs.insert(
            job.job_id,
            Entry {
                record: JobRecord {
                    job_id: job.job_id,
                    state: JobState::Waiting,
                    failure_reason: None,
                    attempts_made: 0,
                    created_at: job.created_at,
                    finished_at: None,
                },
                options: job.options.clone(),
            },
        );
        Ok(())
    }

    async fn get(&self, job_id: JobId) -> Result<Option<JobRecord>, QueueError> {
        self.check_reachable()?;
        Ok(self.jobs.read().await.get(&job_id).map(|e| e.record.clone()))
    }

    async fn counts(&self) -> Result<JobCounts, QueueError> {
        self.check_reachable()?;
        let jobs = self.jobs.read().await;
        let mut counts = JobCounts::default();
        for entry in jobs.values() {
            let slot = match entry.record.state {
                JobState::Waiting => &mut counts.waiting,
                JobState::Active => &mut counts.active,
                JobState::Completed => &mut counts.completed,
                JobState::Failed => &mut counts.failed,
                JobState::Delayed => &mut counts.delayed,
            };
            *slot += 1;
        }
        Ok(counts)
    }

    async fn remove_expired(&self, now: DateTime<Utc>) -> Result<u64, QueueError> {
        self.check_reachable()?;
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, entry| {
            let keep_for = match entry.record.state {
                JobState::Completed => entry.options.keep_completed_for,
                JobState::Failed => entry.options.keep_failed_for,
                _ => return true,
            };
            match (entry.record.finished_at, chrono::Duration::from_std(keep_for)) {
                (Some(finished), Ok(keep_for)) => finished + keep_for > now,
                _ => true,
            }
        });
        Ok((before - jobs.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::queue::types::RetryPolicy;

    fn job(max_attempts: u32) -> QueuedJob {
        QueuedJob::new(
            JobId::new(),
            json!({ "text": "hello" }),
            JobOptions::with_retry(RetryPolicy::exponential(max_attempts)),
        )
    }

    #[tokio::test]
    async fn added_jobs_start_waiting() {
        let backend = InMemoryQueueBackend::new();
        let job = job(3);
        backend.add(&job).await.unwrap();

        let record = backend.get(job.job_id).await.unwrap().unwrap();
        assert_eq!(record.state, JobState::Waiting);
        assert_eq!(record.attempts_made, 0);
        assert_eq!(backend.counts().await.unwrap().waiting, 1);
    }

    #[tokio::test]
    async fn duplicate_ids_are_rejected() {
        let backend = InMemoryQueueBackend::new();
        let job = job(3);
        backend.add(&job).await.unwrap();
        assert_eq!(backend.add(&job).await, Err(QueueError::AlreadyExists(job.job_id)));
    }

    #[tokio::test]
    async fn failures_retry_until_the_budget_is_spent() {
        let backend = InMemoryQueueBackend::new();
        let job = job(2);
        backend.add(&job).await.unwrap();
        let now = Utc::now();

        backend.activate(job.job_id).await.unwrap();
        assert_eq!(backend.fail_attempt(job.job_id, "boom", now).await.unwrap(), JobState::Delayed);

        backend.activate(job.job_id).await.unwrap();
        assert_eq!(backend.fail_attempt(job.job_id, "boom again", now).await.unwrap(), JobState::Failed);

        let record = backend.get(job.job_id).await.unwrap().unwrap();
        assert_eq!(record.attempts_made, 2);
        assert_eq!(record.failure_reason.as_deref(), Some("boom again"));
        assert_eq!(record.finished_at, Some(now));
    }

    #[tokio::test]
    async fn expired_jobs_are_collected_per_retention() {
        let backend = InMemoryQueueBackend::new();
        let done = job(1);
        let failed = job(1);
        let pending = job(1);
        for j in [&done, &failed, &pending] {
            backend.add(j).await.unwrap();
        }

        let t0 = Utc::now();
        backend.activate(done.job_id).await.unwrap();
        backend.complete(done.job_id, t0).await.unwrap();
        backend.activate(failed.job_id).await.unwrap();
        backend.fail_attempt(failed.job_id, "boom", t0).await.unwrap();

        // One day later: completed expired, failed kept for a week.
        let removed = backend.remove_expired(t0 + chrono::Duration::hours(25)).await.unwrap();
        assert_eq!(removed, 1);
        assert!(backend.get(done.job_id).await.unwrap().is_none());
        assert!(backend.get(failed.job_id).await.unwrap().is_some());

        let removed = backend.remove_expired(t0 + chrono::Duration::days(8)).await.unwrap();
        assert_eq!(removed, 1);
        assert!(backend.get(pending.job_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn unreachable_backend_reports_connection_errors() {
        let backend = InMemoryQueueBackend::new();
        backend.set_reachable(false);
        assert!(backend.ping().await.unwrap_err().is_connection());
        assert!(backend.counts().await.unwrap_err().is_connection());
    }
}
