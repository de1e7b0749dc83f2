//! `feedlens-core`: feedback domain building blocks.
//!
//! This crate contains **pure domain** types (no infrastructure concerns):
//! identifiers, the sentiment/intent vocabulary, validated feedback text and
//! the persisted `FeedbackItem` record.

pub mod error;
pub mod feedback;
pub mod id;
pub mod sentiment;

pub use error::{DomainError, DomainResult};
pub use feedback::{
    AnalysisSource, FeedbackItem, FeedbackMetadata, FeedbackText, MAX_FEEDBACK_CHARS,
};
pub use id::{JobId, UserId};
pub use sentiment::{Analysis, Intent, ScoredLabel, Sentiment, format_percentage, round_to};
