//! Durable feedback store.
//!
//! The single source of truth for finished work: status lookups, history,
//! stats and clear all read the same `feedback_results` records.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use feedlens_core::{FeedbackItem, JobId, Sentiment, UserId};

pub use memory::InMemoryFeedbackStore;
pub use postgres::PostgresFeedbackStore;

/// Offset pagination window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub skip: u64,
    pub limit: u64,
}

impl PageRequest {
    /// `(OFFSET, LIMIT)` as SQL `BIGINT`s, saturating at `i64::MAX`.
    pub fn sql_bounds(&self) -> (i64, i64) {
        (
            i64::try_from(self.skip).unwrap_or(i64::MAX),
            i64::try_from(self.limit).unwrap_or(i64::MAX),
        )
    }
}

/// Per-sentiment aggregate for one user.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SentimentGroup {
    pub sentiment: Sentiment,
    pub count: u64,
    pub avg_confidence: f64,
}

#[async_trait]
pub trait FeedbackStore: Send + Sync + 'static {
    /// Insert a new record. Records are immutable; a second insert for the
    /// same job id is a [`StoreError::Duplicate`].
    async fn insert(&self, item: &FeedbackItem) -> Result<(), StoreError>;

    async fn find_by_job_id(&self, job_id: JobId) -> Result<Option<FeedbackItem>, StoreError>;

    /// The user's records, newest `processed_at` first.
    async fn list_for_user(&self, user_id: &UserId, page: PageRequest) -> Result<Vec<FeedbackItem>, StoreError>;

    async fn count_for_user(&self, user_id: &UserId) -> Result<u64, StoreError>;

    /// One group per sentiment the user actually has records for.
    async fn sentiment_groups(&self, user_id: &UserId) -> Result<Vec<SentimentGroup>, StoreError>;

    /// Delete every record owned by the user; returns how many were deleted.
    async fn clear_for_user(&self, user_id: &UserId) -> Result<u64, StoreError>;
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("store connection error: {0}")]
    Connection(String),

    #[error("duplicate record: {0}")]
    Duplicate(JobId),

    #[error("database error: {0}")]
    Database(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}
