use feedlens_core::{Analysis, ScoredLabel, Sentiment};

use crate::intents::extract_intents;

/// Confidence reported for every local analysis.
pub const FALLBACK_CONFIDENCE: f64 = 0.7;

const POSITIVE_WORDS: &[&str] = &[
    "good", "great", "excellent", "amazing", "wonderful", "fantastic", "love", "best", "happy",
    "satisfied", "awesome", "perfect", "helpful", "friendly", "thank",
];

const NEGATIVE_WORDS: &[&str] = &[
    "bad", "terrible", "awful", "horrible", "hate", "worst", "disappointed", "angry",
    "frustrated", "poor", "slow", "broken", "useless", "annoying", "problem",
];

/// Deterministic keyword-scored sentiment/intent tagger.
///
/// Model:
/// - Count how many positive and how many negative keywords appear in the
///   lower-cased text (each keyword counts at most once).
/// - The larger count wins; a tie (including 0/0) is neutral.
#[derive(Debug, Default, Copy, Clone)]
pub struct FallbackClassifier;

impl FallbackClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Full local analysis. Always succeeds.
    pub fn classify_locally(&self, text: &str) -> Analysis {
        let sentiment = score_sentiment(text);
        Analysis {
            sentiment,
            confidence: FALLBACK_CONFIDENCE,
            all_scores: vec![ScoredLabel::new(sentiment.as_str(), FALLBACK_CONFIDENCE)],
            intents: extract_intents(text),
            ai_processed: false,
            raw: None,
        }
    }
}

/// Keyword-majority sentiment.
pub fn score_sentiment(text: &str) -> Sentiment {
    let lower = text.to_lowercase();
    let positive = keyword_hits(&lower, POSITIVE_WORDS);
    let negative = keyword_hits(&lower, NEGATIVE_WORDS);

    match positive.cmp(&negative) {
        std::cmp::Ordering::Greater => Sentiment::Positive,
        std::cmp::Ordering::Less => Sentiment::Negative,
        std::cmp::Ordering::Equal => Sentiment::Neutral,
    }
}

fn keyword_hits(lower: &str, words: &[&str]) -> usize {
    words.iter().filter(|w| lower.contains(*w)).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use feedlens_core::Intent;
    use proptest::prelude::*;

    #[test]
    fn positive_keywords_win() {
        let a = FallbackClassifier::new().classify_locally("This is great and amazing");
        assert_eq!(a.sentiment, Sentiment::Positive);
        assert_eq!(a.confidence, 0.7);
        assert!(!a.ai_processed);
        assert_eq!(a.intents, vec![Intent::PositiveFeedback]);
    }

    #[test]
    fn negative_keywords_win() {
        let a = FallbackClassifier::new().classify_locally("This is terrible and broken");
        assert_eq!(a.sentiment, Sentiment::Negative);
        assert_eq!(a.intents, vec![Intent::BugReport, Intent::NegativeFeedback]);
    }

    #[test]
    fn keyword_free_text_is_neutral() {
        let a = FallbackClassifier::new().classify_locally("The package arrived on Tuesday");
        assert_eq!(a.sentiment, Sentiment::Neutral);
        assert_eq!(a.intents, vec![Intent::GeneralFeedback]);
    }

    #[test]
    fn tie_is_neutral() {
        assert_eq!(score_sentiment("good but slow"), Sentiment::Neutral);
    }

    #[test]
    fn repeated_keyword_counts_once() {
        // "bad bad bad" is one negative hit, "great" + "love" are two positive hits.
        assert_eq!(score_sentiment("bad bad bad, but great and I love it"), Sentiment::Positive);
    }

    #[test]
    fn all_scores_mirror_the_sentiment() {
        let a = FallbackClassifier::new().classify_locally("awful");
        assert_eq!(a.all_scores.len(), 1);
        assert_eq!(a.all_scores[0].label, "negative");
        assert_eq!(a.all_scores[0].score, 0.7);
        assert_eq!(a.all_scores[0].percentage, "70.0%");
    }

    proptest! {
        #[test]
        fn local_analysis_is_total(text in "\\PC{0,400}") {
            let a = FallbackClassifier::new().classify_locally(&text);
            prop_assert!(Sentiment::ALL.contains(&a.sentiment));
            prop_assert!(!a.intents.is_empty());
            prop_assert_eq!(a.confidence, FALLBACK_CONFIDENCE);
        }

        #[test]
        fn local_analysis_is_deterministic(text in "\\PC{0,200}") {
            let c = FallbackClassifier::new();
            prop_assert_eq!(c.classify_locally(&text), c.classify_locally(&text));
        }
    }
}
