//! Submission outcome hook.
//!
//! Metrics registration/export is owned by whoever embeds the pipeline; the
//! pipeline only calls [`OutcomeRecorder::record_outcome`] once per persisted
//! submission.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use feedlens_core::{Intent, JobId, Sentiment};

/// What happened to one submission.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub job_id: JobId,
    pub sentiment: Sentiment,
    pub ai_processed: bool,
    pub intents: Vec<Intent>,
}

pub trait OutcomeRecorder: Send + Sync + 'static {
    fn record_outcome(&self, outcome: &Outcome);
}

/// Emits one structured `info` event per outcome.
#[derive(Debug, Default, Copy, Clone)]
pub struct TracingOutcomeRecorder;

impl OutcomeRecorder for TracingOutcomeRecorder {
    fn record_outcome(&self, outcome: &Outcome) {
        let intents = outcome.intents.iter().map(|i| i.as_str()).collect::<Vec<_>>().join(",");
        ::tracing::info!(
            job_id = %outcome.job_id,
            sentiment = %outcome.sentiment,
            ai_processed = outcome.ai_processed,
            intents = %intents,
            "feedback analyzed"
        );
    }
}

/// Point-in-time view of [`CountingOutcomeRecorder`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeSnapshot {
    pub submitted: u64,
    pub ai_processed: u64,
    pub fallback: u64,
    pub positive: u64,
    pub neutral: u64,
    pub negative: u64,
}

/// Process-local counters: total submissions, per source, per sentiment.
#[derive(Debug, Default)]
pub struct CountingOutcomeRecorder {
    submitted: AtomicU64,
    ai_processed: AtomicU64,
    fallback: AtomicU64,
    positive: AtomicU64,
    neutral: AtomicU64,
    negative: AtomicU64,
}

impl CountingOutcomeRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> OutcomeSnapshot {
        OutcomeSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            ai_processed: self.ai_processed.load(Ordering::Relaxed),
            fallback: self.fallback.load(Ordering::Relaxed),
            positive: self.positive.load(Ordering::Relaxed),
            neutral: self.neutral.load(Ordering::Relaxed),
            negative: self.negative.load(Ordering::Relaxed),
        }
    }
}

impl OutcomeRecorder for CountingOutcomeRecorder {
    fn record_outcome(&self, outcome: &Outcome) {
        self.submitted.fetch_add(1, Ordering::Relaxed);

        let source = if outcome.ai_processed { &self.ai_processed } else { &self.fallback };
        source.fetch_add(1, Ordering::Relaxed);

        let by_sentiment = match outcome.sentiment {
            Sentiment::Positive => &self.positive,
            Sentiment::Neutral => &self.neutral,
            Sentiment::Negative => &self.negative,
        };
        by_sentiment.fetch_add(1, Ordering::Relaxed);
    }
}

/// Forwards every outcome to each inner recorder, in order.
#[derive(Default, Clone)]
pub struct FanoutRecorder {
    inner: Vec<Arc<dyn OutcomeRecorder>>,
}

impl FanoutRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, recorder: Arc<dyn OutcomeRecorder>) -> Self {
        self.inner.push(recorder);
        self
    }
}

impl OutcomeRecorder for FanoutRecorder {
    fn record_outcome(&self, outcome: &Outcome) {
        for recorder in &self.inner {
            recorder.record_outcome(outcome);
        }
    }
}
