//! Feedback submissions and the persisted record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::error::DomainError;
use crate::id::{JobId, UserId};
use crate::sentiment::{Analysis, Intent, ScoredLabel, Sentiment};

/// Maximum accepted length of a submission, in characters.
pub const MAX_FEEDBACK_CHARS: usize = 5000;

/// Validated, trimmed feedback text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackText(String);

impl FeedbackText {
    /// Validate raw caller input.
    ///
    /// The length limit applies to the input as received; the stored text is
    /// the trimmed form.
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DomainError::validation("Feedback text is required"));
        }
        if raw.chars().count() > MAX_FEEDBACK_CHARS {
            return Err(DomainError::validation(format!(
                "Feedback text exceeds maximum length of {} characters",
                MAX_FEEDBACK_CHARS
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn word_count(&self) -> usize {
        self.0.split_whitespace().count()
    }

    pub fn char_count(&self) -> usize {
        self.0.chars().count()
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

/// Which classifier produced the stored analysis.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnalysisSource {
    #[serde(rename = "ai-analysis")]
    AiAnalysis,
    #[serde(rename = "fallback-analysis")]
    FallbackAnalysis,
}

impl AnalysisSource {
    pub fn for_analysis(analysis: &Analysis) -> Self {
        if analysis.ai_processed {
            AnalysisSource::AiAnalysis
        } else {
            AnalysisSource::FallbackAnalysis
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisSource::AiAnalysis => "ai-analysis",
            AnalysisSource::FallbackAnalysis => "fallback-analysis",
        }
    }
}

/// Submission metadata.
///
/// Caller-supplied keys are kept in `extra`; `source`, `wordCount` and
/// `charCount` are always computed server-side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackMetadata {
    pub source: AnalysisSource,
    pub word_count: usize,
    pub char_count: usize,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl FeedbackMetadata {
    pub fn new(source: AnalysisSource, text: &FeedbackText, caller: Map<String, JsonValue>) -> Self {
        let mut extra = caller;
        for reserved in ["source", "wordCount", "charCount"] {
            extra.remove(reserved);
        }
        Self {
            source,
            word_count: text.word_count(),
            char_count: text.char_count(),
            extra,
        }
    }
}

/// Durable record of one submission and its analysis.
///
/// Immutable once written; only a bulk clear removes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackItem {
    pub job_id: JobId,
    pub user_id: UserId,
    pub text: String,
    pub sentiment: Sentiment,
    pub confidence: f64,
    pub all_scores: Vec<ScoredLabel>,
    pub intents: Vec<Intent>,
    pub ai_processed: bool,
    pub raw: Option<JsonValue>,
    pub submitted_at: DateTime<Utc>,
    pub processed_at: DateTime<Utc>,
    pub metadata: FeedbackMetadata,
}

impl FeedbackItem {
    /// Assemble the record for a finished analysis.
    pub fn from_analysis(
        job_id: JobId,
        user_id: UserId,
        text: &FeedbackText,
        analysis: Analysis,
        caller_metadata: Map<String, JsonValue>,
        submitted_at: DateTime<Utc>,
        processed_at: DateTime<Utc>,
    ) -> Self {
        let source = AnalysisSource::for_analysis(&analysis);
        Self {
            job_id,
            user_id,
            text: text.as_str().to_string(),
            sentiment: analysis.sentiment,
            confidence: analysis.confidence,
            all_scores: analysis.all_scores,
            intents: analysis.intents,
            ai_processed: analysis.ai_processed,
            raw: analysis.raw,
            submitted_at,
            processed_at,
            metadata: FeedbackMetadata::new(source, text, caller_metadata),
        }
    }

    /// The analysis view of this record.
    pub fn analysis(&self) -> Analysis {
        Analysis {
            sentiment: self.sentiment,
            confidence: self.confidence,
            all_scores: self.all_scores.clone(),
            intents: self.intents.clone(),
            ai_processed: self.ai_processed,
            raw: self.raw.clone(),
        }
    }
}
