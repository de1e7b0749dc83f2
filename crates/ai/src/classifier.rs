use async_trait::async_trait;

use crate::result::{Classification, UnavailableReason};

/// A remote (or remote-like) sentiment classifier.
///
/// Implementations must never fail outward: every failure mode maps to
/// `Classification::Unavailable`.
#[async_trait]
pub trait SentimentClassifier: Send + Sync + 'static {
    async fn classify(&self, text: &str) -> Classification;
}

/// Classifier used when no endpoint is configured. Always unavailable.
#[derive(Debug, Default, Copy, Clone)]
pub struct DisabledClassifier;

#[async_trait]
impl SentimentClassifier for DisabledClassifier {
    async fn classify(&self, _text: &str) -> Classification {
        Classification::Unavailable(UnavailableReason::Disabled)
    }
}
