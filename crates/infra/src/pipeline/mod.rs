//! Request-facing orchestration: submit, status, history, stats, clear,
//! health.
//!
//! ## Submission flow
//!
//! ```text
//! raw text
//!   ↓
//! 1. Validate (non-empty after trim, ≤ 5000 chars)
//!   ↓
//! 2. Allocate job id + submission timestamp (no IO)
//!   ↓
//! 3. Gateway classify ── Unavailable ──► local fallback
//!   ↓
//! 4. Persist FeedbackItem (failure here aborts with Persistence)
//!   ↓
//! 5. record_outcome hook, optional enqueue hook
//!   ↓
//! full analysis + job id, same call
//! ```
//!
//! ## Status lookup
//!
//! Broker first when it is reachable (`completed` still reads the store for
//! the canonical result), otherwise, or when the broker has no record, the
//! store by job id. The store is authoritative for finished work.

mod error;
pub mod views;

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value as JsonValue, json};
use tracing::{debug, error, info, instrument, warn};

use feedlens_ai::ClassifierChain;
use feedlens_core::{FeedbackItem, FeedbackText, JobId, UserId, round_to};
use feedlens_observability::{Outcome, OutcomeRecorder};

use crate::connections::ConnectionManager;
use crate::queue::{JobQueue, JobState, QUEUE_NAME};
use crate::store::{FeedbackStore, PageRequest};

pub use error::PipelineError;
pub use views::{
    AnalysisView, HistoryEntry, HistoryPage, JobStatusView, MetadataSummary, Pagination, QueueHealth,
    QueueStatus, ResultSummary, SentimentBreakdown, StatsView, SubmitMetrics, SubmitOutcome,
};

pub const DEFAULT_PAGE_LIMIT: u64 = 10;
pub const MAX_PAGE_LIMIT: u64 = 50;

const DISCONNECTED_MESSAGE: &str =
    "Broker not available; status lookups read the feedback store directly.";

/// Normalize caller paging input: page ≥ 1, limit in [1, 50] (default 10).
pub fn page_window(page: Option<i64>, limit: Option<i64>) -> (u64, u64) {
    let page = page.filter(|p| *p >= 1).unwrap_or(1) as u64;
    let limit = limit
        .map(|l| l.clamp(1, MAX_PAGE_LIMIT as i64) as u64)
        .unwrap_or(DEFAULT_PAGE_LIMIT);
    (page, limit)
}

pub struct Pipeline {
    connections: Arc<ConnectionManager>,
    queue: JobQueue,
    classifier: ClassifierChain,
    recorder: Option<Arc<dyn OutcomeRecorder>>,
    enqueue_submissions: bool,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("connections", &self.connections)
            .field("enqueue_submissions", &self.enqueue_submissions)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    pub fn new(connections: Arc<ConnectionManager>, queue: JobQueue, classifier: ClassifierChain) -> Self {
        Self {
            connections,
            queue,
            classifier,
            recorder: None,
            enqueue_submissions: false,
        }
    }

    pub fn with_recorder(mut self, recorder: Arc<dyn OutcomeRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Also hand each persisted submission to the queue for an external
    /// consumer.
    ///
    /// The job stays `waiting` until that consumer moves it, and status
    /// lookups report the broker state over the stored row while it does.
    /// Without a consumer, leave this off: submissions already return their
    /// analysis and `status` then answers `completed` from the store.
    pub fn with_enqueue(mut self, enabled: bool) -> Self {
        self.enqueue_submissions = enabled;
        self
    }

    pub fn connections(&self) -> &Arc<ConnectionManager> {
        &self.connections
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    async fn store(&self, operation: &'static str) -> Result<Arc<dyn FeedbackStore>, PipelineError> {
        self.connections.store().await.map_err(|e| {
            error!(operation, error = %e, "feedback store unavailable");
            PipelineError::internal(operation, e)
        })
    }

    /// Validate, classify (gateway or fallback), persist, and return the full
    /// analysis.
    #[instrument(skip(self, text, metadata), fields(user_id = %user_id))]
    pub async fn submit(
        &self,
        user_id: &UserId,
        text: &str,
        metadata: Map<String, JsonValue>,
    ) -> Result<SubmitOutcome, PipelineError> {
        let text = FeedbackText::parse(text)?;

        let job_id = JobId::new();
        let submitted_at = Utc::now();

        let analysis = self.classifier.analyze(text.as_str()).await;
        let view = AnalysisView::from(&analysis);

        let item = FeedbackItem::from_analysis(
            job_id,
            user_id.clone(),
            &text,
            analysis,
            metadata,
            submitted_at,
            Utc::now(),
        );

        let store = self.connections.store().await.map_err(|e| {
            error!(job_id = %job_id, error = %e, "feedback store unavailable; submission not recorded");
            PipelineError::from(e)
        })?;
        store.insert(&item).await.map_err(|e| {
            error!(job_id = %job_id, error = %e, "failed to persist feedback");
            PipelineError::from(e)
        })?;

        if let Some(recorder) = &self.recorder {
            recorder.record_outcome(&Outcome {
                job_id,
                sentiment: item.sentiment,
                ai_processed: item.ai_processed,
                intents: item.intents.clone(),
            });
        }

        if self.enqueue_submissions {
            let payload = json!({
                "jobId": job_id,
                "userId": user_id,
                "text": text.as_str(),
            });
            if self.queue.enqueue(job_id, payload).await.is_none() {
                debug!(job_id = %job_id, "enqueue skipped; broker unavailable");
            }
        }

        info!(
            job_id = %job_id,
            sentiment = %item.sentiment,
            ai_processed = item.ai_processed,
            "feedback submitted"
        );

        Ok(SubmitOutcome {
            job_id,
            analysis: view,
            metrics: SubmitMetrics {
                word_count: text.word_count(),
                char_count: text.char_count(),
                processed_at: item.processed_at,
            },
        })
    }

    /// Two-tier status lookup: broker record first, then the store.
    #[instrument(skip(self))]
    pub async fn status(&self, raw_job_id: &str) -> Result<JobStatusView, PipelineError> {
        let raw_job_id = raw_job_id.trim();
        if raw_job_id.is_empty() {
            return Err(PipelineError::Validation("Job ID is required".to_string()));
        }

        // An id that does not parse was never issued.
        let Ok(job_id) = raw_job_id.parse::<JobId>() else {
            return Err(PipelineError::NotFound("Job not found".to_string()));
        };

        let store = self.store("get feedback result").await?;

        if let Some(record) = self.queue.get_job(job_id).await {
            match record.state {
                JobState::Completed => {
                    // Fall through to the store read below when the row is missing.
                    debug!(job_id = %job_id, "broker reports completed; reading store");
                }
                JobState::Failed => return Ok(JobStatusView::failed(record.failure_reason)),
                state => return Ok(JobStatusView::in_progress(state)),
            }
        }

        let item = store
            .find_by_job_id(job_id)
            .await
            .map_err(|e| PipelineError::internal("get feedback result", e))?;

        match item {
            Some(item) => Ok(JobStatusView::completed(&item)),
            None => Err(PipelineError::NotFound("Job not found".to_string())),
        }
    }

    /// The user's feedback, newest first.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn history(
        &self,
        user_id: &UserId,
        page: Option<i64>,
        limit: Option<i64>,
    ) -> Result<HistoryPage, PipelineError> {
        const OP: &str = "get feedback history";
        let (page, limit) = page_window(page, limit);
        let store = self.store(OP).await?;

        let request = PageRequest {
            skip: (page - 1).saturating_mul(limit),
            limit,
        };
        let items = store
            .list_for_user(user_id, request)
            .await
            .map_err(|e| PipelineError::internal(OP, e))?;
        let total = store
            .count_for_user(user_id)
            .await
            .map_err(|e| PipelineError::internal(OP, e))?;

        Ok(HistoryPage {
            data: items.into_iter().map(HistoryEntry::from).collect(),
            pagination: Pagination {
                page,
                limit,
                total,
                pages: total.div_ceil(limit),
            },
        })
    }

    /// Per-sentiment counts, share of total and average confidence.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn stats(&self, user_id: &UserId) -> Result<StatsView, PipelineError> {
        const OP: &str = "get feedback statistics";
        let store = self.store(OP).await?;

        let groups = store
            .sentiment_groups(user_id)
            .await
            .map_err(|e| PipelineError::internal(OP, e))?;
        let total = store
            .count_for_user(user_id)
            .await
            .map_err(|e| PipelineError::internal(OP, e))?;

        let breakdown = groups
            .into_iter()
            .map(|g| {
                let percentage = if total > 0 {
                    round_to(g.count as f64 / total as f64 * 100.0, 1)
                } else {
                    0.0
                };
                (
                    g.sentiment.as_str().to_string(),
                    SentimentBreakdown {
                        count: g.count,
                        percentage,
                        avg_confidence: round_to(g.avg_confidence, 3),
                    },
                )
            })
            .collect::<BTreeMap<_, _>>();

        Ok(StatsView { total, breakdown })
    }

    /// Delete all of the user's feedback. Returns how many records went.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn clear(&self, user_id: &UserId) -> Result<u64, PipelineError> {
        const OP: &str = "clear feedback history";
        let store = self.store(OP).await?;
        let deleted = store
            .clear_for_user(user_id)
            .await
            .map_err(|e| PipelineError::internal(OP, e))?;
        info!(user_id = %user_id, deleted, "feedback history cleared");
        Ok(deleted)
    }

    /// Queue connectivity and live counts. Never fails.
    pub async fn health(&self) -> QueueHealth {
        let disconnected = || QueueHealth {
            name: QUEUE_NAME,
            status: QueueStatus::Disconnected,
            message: Some(DISCONNECTED_MESSAGE.to_string()),
            counts: None,
        };

        if !self.connections.is_broker_available().await {
            return disconnected();
        }

        match self.queue.counts().await {
            Some(counts) => QueueHealth {
                name: QUEUE_NAME,
                status: QueueStatus::Connected,
                message: None,
                counts: Some(counts),
            },
            None => {
                warn!("queue counts unavailable; reporting broker as disconnected");
                self.connections.mark_broker_unavailable();
                disconnected()
            }
        }
    }
}
