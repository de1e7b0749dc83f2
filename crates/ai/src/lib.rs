//! Sentiment/intent classification boundary.
//!
//! This crate is intentionally **not** part of the storage model:
//! - It must not persist anything.
//! - It never surfaces upstream failures as errors; an unreachable classifier
//!   is a `Classification::Unavailable`, and callers degrade to the local
//!   fallback.

pub mod chain;
pub mod classifier;
pub mod fallback;
pub mod gateway;
pub mod intents;
pub mod labels;
pub mod result;

pub use chain::ClassifierChain;
pub use classifier::{DisabledClassifier, SentimentClassifier};
pub use fallback::FallbackClassifier;
pub use gateway::{ClassifierGateway, GatewayConfig, DEFAULT_CLASSIFIER_URL, CLASSIFIER_TIMEOUT};
pub use intents::extract_intents;
pub use labels::normalize_label;
pub use result::{Classification, ClassifierError, UnavailableReason};
