//! Job queue facade.
//!
//! Every operation answers `None` when the broker is unavailable, disabled or
//! fails mid-call. Callers treat `None` as "ask the store", never as an
//! error. A connection-level failure also flips the memoized availability
//! flag so later calls skip the broker without waiting on it.

pub mod backend;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;
pub mod types;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use feedlens_core::JobId;

use crate::connections::{ConnectionManager, PROBE_TIMEOUT};

pub use backend::{QueueBackend, QueueError};
pub use memory::InMemoryQueueBackend;
#[cfg(feature = "redis")]
pub use redis::RedisQueueBackend;
pub use types::{
    BackoffStrategy, COMPLETED_RETENTION, FAILED_RETENTION, JobCounts, JobOptions, JobRecord, JobState,
    QUEUE_NAME, QueuedJob, RetryPolicy, stored_retention,
};

#[derive(Debug, Clone)]
pub struct JobQueue {
    connections: Arc<ConnectionManager>,
    options: JobOptions,
    op_timeout: Duration,
}

impl JobQueue {
    pub fn new(connections: Arc<ConnectionManager>, options: JobOptions) -> Self {
        Self {
            connections,
            options,
            op_timeout: PROBE_TIMEOUT,
        }
    }

    /// Upper bound on a single broker command. A broker that stops answering
    /// is treated like one that dropped the connection.
    pub fn with_op_timeout(mut self, timeout: Duration) -> Self {
        self.op_timeout = timeout;
        self
    }

    pub fn name(&self) -> &'static str {
        QUEUE_NAME
    }

    pub fn options(&self) -> &JobOptions {
        &self.options
    }

    /// Run `op` against the broker if it is believed reachable.
    async fn with_broker<T, F, Fut>(&self, operation: &'static str, op: F) -> Option<T>
    where
        F: FnOnce(Arc<dyn QueueBackend>) -> Fut,
        Fut: Future<Output = Result<T, QueueError>>,
    {
        if !self.connections.is_broker_available().await {
            return None;
        }

        let backend = match self.connections.broker().await {
            Ok(backend) => backend,
            Err(e) => {
                warn!(operation, error = %e, "broker handle unavailable");
                self.connections.mark_broker_unavailable();
                return None;
            }
        };

        match tokio::time::timeout(self.op_timeout, op(backend)).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                if e.is_connection() {
                    self.connections.mark_broker_unavailable();
                }
                warn!(operation, error = %e, "queue operation failed");
                None
            }
            Err(_) => {
                warn!(
                    operation,
                    timeout_ms = self.op_timeout.as_millis() as u64,
                    "queue operation timed out"
                );
                self.connections.mark_broker_unavailable();
                None
            }
        }
    }

    /// Add a job with the configured retry/retention options.
    pub async fn enqueue(&self, job_id: JobId, payload: JsonValue) -> Option<()> {
        let job = QueuedJob::new(job_id, payload, self.options.clone());
        let added = self
            .with_broker("enqueue", |backend| async move { backend.add(&job).await })
            .await;
        if added.is_some() {
            debug!(job_id = %job_id, queue = QUEUE_NAME, "job enqueued");
        }
        added
    }

    pub async fn get_job(&self, job_id: JobId) -> Option<JobRecord> {
        self.with_broker("get_job", |backend| async move { backend.get(job_id).await })
            .await
            .flatten()
    }

    pub async fn counts(&self) -> Option<JobCounts> {
        self.with_broker("counts", |backend| async move { backend.counts().await })
            .await
    }

    /// Remove finished jobs past their retention window.
    pub async fn collect_expired(&self, now: DateTime<Utc>) -> Option<u64> {
        self.with_broker("collect_expired", |backend| async move { backend.remove_expired(now).await })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::store::{FeedbackStore, InMemoryFeedbackStore};

    fn queue_with(broker: Option<Arc<InMemoryQueueBackend>>) -> JobQueue {
        let store: Arc<dyn FeedbackStore> = Arc::new(InMemoryFeedbackStore::new());
        let broker = broker.map(|b| b as Arc<dyn QueueBackend>);
        JobQueue::new(
            Arc::new(ConnectionManager::with_handles(store, broker)),
            JobOptions::default(),
        )
    }

    #[tokio::test]
    async fn enqueue_and_lookup_with_a_live_broker() {
        let queue = queue_with(Some(Arc::new(InMemoryQueueBackend::new())));
        let id = JobId::new();

        assert_eq!(queue.enqueue(id, json!({ "text": "hi" })).await, Some(()));
        assert_eq!(queue.get_job(id).await.map(|r| r.state), Some(JobState::Waiting));
        assert_eq!(queue.counts().await.map(|c| c.waiting), Some(1));
        assert_eq!(queue.get_job(JobId::new()).await, None);
    }

    #[tokio::test]
    async fn everything_degrades_to_none_without_a_broker() {
        let queue = queue_with(None);
        let id = JobId::new();

        assert_eq!(queue.enqueue(id, json!({})).await, None);
        assert_eq!(queue.get_job(id).await, None);
        assert_eq!(queue.counts().await, None);
        assert_eq!(queue.collect_expired(Utc::now()).await, None);
    }

    #[tokio::test]
    async fn connection_errors_mark_the_broker_unavailable() {
        let broker = Arc::new(InMemoryQueueBackend::new());
        let queue = queue_with(Some(broker.clone()));
        assert!(queue.counts().await.is_some());

        broker.set_reachable(false);
        assert_eq!(queue.counts().await, None);

        // Broker is back, but the flag is memoized: no automatic re-probe.
        broker.set_reachable(true);
        assert_eq!(queue.counts().await, None);
    }

    #[tokio::test]
    async fn collect_expired_reports_removed_jobs() {
        let broker = Arc::new(InMemoryQueueBackend::new());
        let queue = queue_with(Some(broker.clone()));
        let id = JobId::new();
        queue.enqueue(id, json!({})).await;

        let t0 = Utc::now();
        broker.activate(id).await.unwrap();
        broker.complete(id, t0).await.unwrap();

        assert_eq!(queue.collect_expired(t0).await, Some(0));
        assert_eq!(queue.collect_expired(t0 + chrono::Duration::days(2)).await, Some(1));
    }
}
