//! Response payloads produced by the pipeline.
//!
//! These serialize to the camelCase shapes the HTTP layer returns; the API
//! only adds the `success` envelope.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use feedlens_core::{
    Analysis, AnalysisSource, FeedbackItem, Intent, JobId, ScoredLabel, Sentiment, format_percentage,
};

use crate::queue::{JobCounts, JobState};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisView {
    pub sentiment: Sentiment,
    pub confidence: f64,
    pub confidence_percent: String,
    pub all_scores: Vec<ScoredLabel>,
    pub intents: Vec<Intent>,
    pub ai_processed: bool,
}

impl From<&Analysis> for AnalysisView {
    fn from(a: &Analysis) -> Self {
        Self {
            sentiment: a.sentiment,
            confidence: a.confidence,
            confidence_percent: a.confidence_percent(),
            all_scores: a.all_scores.clone(),
            intents: a.intents.clone(),
            ai_processed: a.ai_processed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitMetrics {
    pub word_count: usize,
    pub char_count: usize,
    pub processed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitOutcome {
    pub job_id: JobId,
    pub analysis: AnalysisView,
    pub metrics: SubmitMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultSummary {
    pub sentiment: Sentiment,
    pub confidence: f64,
    pub processed_at: DateTime<Utc>,
}

impl From<&FeedbackItem> for ResultSummary {
    fn from(item: &FeedbackItem) -> Self {
        Self {
            sentiment: item.sentiment,
            confidence: item.confidence,
            processed_at: item.processed_at,
        }
    }
}

/// Answer to a status lookup.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusView {
    pub status: JobState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ResultSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_reason: Option<String>,
}

impl JobStatusView {
    pub fn completed(item: &FeedbackItem) -> Self {
        Self {
            status: JobState::Completed,
            result: Some(ResultSummary::from(item)),
            message: None,
            failed_reason: None,
        }
    }

    pub fn failed(reason: Option<String>) -> Self {
        Self {
            status: JobState::Failed,
            result: None,
            message: Some("Analysis failed".to_string()),
            failed_reason: reason,
        }
    }

    pub fn in_progress(state: JobState) -> Self {
        Self {
            status: state,
            result: None,
            message: Some(format!("Job is {state}")),
            failed_reason: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataSummary {
    pub source: AnalysisSource,
    pub word_count: usize,
    pub char_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub job_id: JobId,
    pub text: String,
    pub sentiment: Sentiment,
    pub confidence: f64,
    pub confidence_percent: String,
    pub all_scores: Vec<ScoredLabel>,
    pub intents: Vec<Intent>,
    pub ai_processed: bool,
    pub submitted_at: DateTime<Utc>,
    pub processed_at: DateTime<Utc>,
    pub metadata: MetadataSummary,
}

impl From<FeedbackItem> for HistoryEntry {
    fn from(item: FeedbackItem) -> Self {
        Self {
            job_id: item.job_id,
            confidence_percent: format_percentage(item.confidence),
            text: item.text,
            sentiment: item.sentiment,
            confidence: item.confidence,
            all_scores: item.all_scores,
            intents: item.intents,
            ai_processed: item.ai_processed,
            submitted_at: item.submitted_at,
            processed_at: item.processed_at,
            metadata: MetadataSummary {
                source: item.metadata.source,
                word_count: item.metadata.word_count,
                char_count: item.metadata.char_count,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    pub pages: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryPage {
    pub data: Vec<HistoryEntry>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SentimentBreakdown {
    pub count: u64,
    /// Share of the user's total, one decimal.
    pub percentage: f64,
    /// Three decimals.
    pub avg_confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsView {
    pub total: u64,
    pub breakdown: BTreeMap<String, SentimentBreakdown>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Connected,
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueHealth {
    pub name: &'static str,
    pub status: QueueStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub counts: Option<JobCounts>,
}
