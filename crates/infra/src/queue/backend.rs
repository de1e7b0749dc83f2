use async_trait::async_trait;
use chrono::{DateTime, Utc};

use feedlens_core::JobId;

use super::types::{JobCounts, JobRecord, QueuedJob};

/// Broker-side storage for queue jobs.
///
/// Implementations report reachability problems as
/// [`QueueError::Connection`]; everything else is a command failure.
#[async_trait]
pub trait QueueBackend: Send + Sync + 'static {
    /// Lightweight reachability check.
    async fn ping(&self) -> Result<(), QueueError>;

    /// Add a job in the `waiting` state.
    async fn add(&self, job: &QueuedJob) -> Result<(), QueueError>;

    async fn get(&self, job_id: JobId) -> Result<Option<JobRecord>, QueueError>;

    async fn counts(&self) -> Result<JobCounts, QueueError>;

    /// Drop finished jobs whose retention window ended before `now`.
    /// Returns how many were removed.
    async fn remove_expired(&self, now: DateTime<Utc>) -> Result<u64, QueueError>;
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("broker connection error: {0}")]
    Connection(String),

    #[error("broker command error: {0}")]
    Command(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("job already exists: {0}")]
    AlreadyExists(JobId),
}

impl QueueError {
    pub fn is_connection(&self) -> bool {
        matches!(self, QueueError::Connection(_))
    }
}
