use std::sync::Arc;

use feedlens_core::Analysis;
use tracing::info;

use crate::classifier::SentimentClassifier;
use crate::fallback::FallbackClassifier;
use crate::result::Classification;

/// Gateway first, local fallback second.
///
/// Exactly one of the two produces the final analysis; this never fails.
#[derive(Clone)]
pub struct ClassifierChain {
    primary: Arc<dyn SentimentClassifier>,
    fallback: FallbackClassifier,
}

impl ClassifierChain {
    pub fn new(primary: Arc<dyn SentimentClassifier>) -> Self {
        Self {
            primary,
            fallback: FallbackClassifier::new(),
        }
    }

    pub async fn analyze(&self, text: &str) -> Analysis {
        match self.primary.classify(text).await {
            Classification::Scored(analysis) => analysis,
            Classification::Unavailable(reason) => {
                info!(reason = %reason, "classifier unavailable; using fallback analysis");
                self.fallback.classify_locally(text)
            }
        }
    }
}

impl std::fmt::Debug for ClassifierChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassifierChain").finish_non_exhaustive()
    }
}
