//! Tracing, logging, metrics (shared setup).

/// Initialize process-wide observability (tracing/logging).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}

/// Tracing configuration (filters, layers).
pub mod tracing;

/// Submission outcome hook (`record_outcome`) and its recorders.
pub mod metrics;

pub use metrics::{
    CountingOutcomeRecorder, FanoutRecorder, Outcome, OutcomeRecorder, OutcomeSnapshot,
    TracingOutcomeRecorder,
};
