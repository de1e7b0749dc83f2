//! Sentiment/intent vocabulary and the analysis payload.

use core::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::DomainError;

/// Fixed 3-way sentiment.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl Sentiment {
    pub const ALL: [Sentiment; 3] = [Sentiment::Positive, Sentiment::Neutral, Sentiment::Negative];

    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Neutral => "neutral",
            Sentiment::Negative => "negative",
        }
    }
}

impl core::fmt::Display for Sentiment {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sentiment {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "positive" => Ok(Sentiment::Positive),
            "neutral" => Ok(Sentiment::Neutral),
            "negative" => Ok(Sentiment::Negative),
            other => Err(DomainError::UnknownSentiment(other.to_string())),
        }
    }
}

/// Tag describing the purpose of a piece of feedback.
///
/// Declaration order is the order tags are reported in.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    SupportRequest,
    BugReport,
    FeatureRequest,
    ChurnRisk,
    PositiveFeedback,
    NegativeFeedback,
    PricingConcern,
    GeneralFeedback,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::SupportRequest => "support_request",
            Intent::BugReport => "bug_report",
            Intent::FeatureRequest => "feature_request",
            Intent::ChurnRisk => "churn_risk",
            Intent::PositiveFeedback => "positive_feedback",
            Intent::NegativeFeedback => "negative_feedback",
            Intent::PricingConcern => "pricing_concern",
            Intent::GeneralFeedback => "general_feedback",
        }
    }
}

impl core::fmt::Display for Intent {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Round `value` to `decimals` decimal places (half away from zero).
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10_f64.powi(decimals);
    (value * factor).round() / factor
}

/// Format a [0, 1] score as a one-decimal percentage string ("90.0%").
pub fn format_percentage(score: f64) -> String {
    format!("{:.1}%", score * 100.0)
}

/// One classifier candidate, as reported back to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredLabel {
    pub label: String,
    /// Score rounded to two decimals.
    pub score: f64,
    pub percentage: String,
}

impl ScoredLabel {
    /// Build from an unrounded score. The percentage string is derived from
    /// the unrounded value.
    pub fn new(label: impl Into<String>, raw_score: f64) -> Self {
        Self {
            label: label.into(),
            score: round_to(raw_score, 2),
            percentage: format_percentage(raw_score),
        }
    }
}

/// Final analysis of one piece of feedback (gateway or fallback).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    pub sentiment: Sentiment,
    pub confidence: f64,
    pub all_scores: Vec<ScoredLabel>,
    /// Never empty; `general_feedback` when nothing else matched.
    pub intents: Vec<Intent>,
    pub ai_processed: bool,
    /// Verbatim classifier response; `None` on fallback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<JsonValue>,
}

impl Analysis {
    pub fn confidence_percent(&self) -> String {
        format_percentage(self.confidence)
    }
}
