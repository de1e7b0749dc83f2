use feedlens_core::Intent;

/// Keyword groups, checked in order. A group matches if any keyword is a
/// substring of the lower-cased text.
const INTENT_KEYWORDS: &[(Intent, &[&str])] = &[
    (Intent::SupportRequest, &["help", "support"]),
    (Intent::BugReport, &["bug", "error", "broken"]),
    (Intent::FeatureRequest, &["feature", "suggest", "wish"]),
    (Intent::ChurnRisk, &["cancel", "refund"]),
    (Intent::PositiveFeedback, &["love", "great", "amazing"]),
    (Intent::NegativeFeedback, &["hate", "terrible", "worst"]),
    (Intent::PricingConcern, &["price", "cost", "expensive"]),
];

/// Tag the purpose of a piece of feedback.
///
/// Pure function of the text. Never returns an empty list: text matching no
/// group is `general_feedback`.
pub fn extract_intents(text: &str) -> Vec<Intent> {
    let lower = text.to_lowercase();

    let intents: Vec<Intent> = INTENT_KEYWORDS
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(intent, _)| *intent)
        .collect();

    if intents.is_empty() {
        vec![Intent::GeneralFeedback]
    } else {
        intents
    }
}
