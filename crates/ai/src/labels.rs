//! Label vocabulary normalization.
//!
//! Classifier models report either human labels (`POSITIVE`, `negative`, ...)
//! or ordinal labels (`LABEL_0` .. `LABEL_2`). Both map onto the fixed 3-way
//! sentiment; anything else passes through lower-cased.

use feedlens_core::Sentiment;

/// Normalize a raw model label.
pub fn normalize_label(label: &str) -> String {
    let trimmed = label.trim();
    match trimmed.to_ascii_uppercase().as_str() {
        "POSITIVE" | "LABEL_2" => "positive".to_string(),
        "NEUTRAL" | "LABEL_1" => "neutral".to_string(),
        "NEGATIVE" | "LABEL_0" => "negative".to_string(),
        _ => trimmed.to_lowercase(),
    }
}

/// Map a raw model label onto the sentiment vocabulary, if it belongs to it.
pub fn label_to_sentiment(label: &str) -> Option<Sentiment> {
    normalize_label(label).parse().ok()
}
