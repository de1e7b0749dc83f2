//! Queue-side job types and the retry/retention policy.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};

use feedlens_core::JobId;

/// Queue name shared with any external consumer.
pub const QUEUE_NAME: &str = "feedback-processing";

/// Completed jobs are collectible after this long.
pub const COMPLETED_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// Failed jobs are collectible after this long.
pub const FAILED_RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Broker-side job state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Waiting,
    Active,
    Completed,
    Failed,
    Delayed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Waiting => "waiting",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Delayed => "delayed",
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the broker knows about one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: JobId,
    pub state: JobState,
    pub failure_reason: Option<String>,
    pub attempts_made: u32,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Per-state job totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounts {
    pub waiting: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
    pub delayed: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    Fixed,
    /// base * 2^(attempt-1)
    Exponential,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub strategy: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential(3)
    }
}

impl RetryPolicy {
    /// Exponential from 1s, capped at one minute.
    pub fn exponential(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            strategy: BackoffStrategy::Exponential,
        }
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            max_delay: delay,
            strategy: BackoffStrategy::Fixed,
        }
    }

    /// Delay before retrying after attempt `attempt` (1-indexed) failed.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        match self.strategy {
            BackoffStrategy::Fixed => self.base_delay,
            BackoffStrategy::Exponential => {
                let factor = 2u32.saturating_pow(attempt - 1);
                self.base_delay.saturating_mul(factor).min(self.max_delay)
            }
        }
    }

    /// Whether another attempt is allowed after `attempts_made`.
    pub fn should_retry(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }
}

/// Options attached to every enqueued job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOptions {
    pub retry: RetryPolicy,
    pub keep_completed_for: Duration,
    pub keep_failed_for: Duration,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self::with_retry(RetryPolicy::default())
    }
}

impl JobOptions {
    pub fn with_retry(retry: RetryPolicy) -> Self {
        Self {
            retry,
            keep_completed_for: COMPLETED_RETENTION,
            keep_failed_for: FAILED_RETENTION,
        }
    }

    /// Job options in the shape BullMQ workers read from the job hash.
    pub fn to_bull_opts(&self) -> JsonValue {
        let backoff_type = match self.retry.strategy {
            BackoffStrategy::Fixed => "fixed",
            BackoffStrategy::Exponential => "exponential",
        };
        json!({
            "attempts": self.retry.max_attempts,
            "backoff": {
                "type": backoff_type,
                "delay": self.retry.base_delay.as_millis() as u64,
            },
            "removeOnComplete": { "age": self.keep_completed_for.as_secs() },
            "removeOnFail": { "age": self.keep_failed_for.as_secs() },
        })
    }
}

/// Retention a job carries in its stored `opts`, for the finished state
/// `state`. `None` when the options do not say (or the state never expires).
pub fn stored_retention(opts: &JsonValue, state: JobState) -> Option<Duration> {
    let field = match state {
        JobState::Completed => "removeOnComplete",
        JobState::Failed => "removeOnFail",
        _ => return None,
    };
    opts.get(field)?.get("age")?.as_u64().map(Duration::from_secs)
}

/// A job handed to the broker.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedJob {
    pub job_id: JobId,
    pub name: String,
    pub payload: JsonValue,
    pub options: JobOptions,
    pub created_at: DateTime<Utc>,
}

impl QueuedJob {
    pub fn new(job_id: JobId, payload: JsonValue, options: JobOptions) -> Self {
        Self {
            job_id,
            name: "analyze-feedback".to_string(),
            payload,
            options,
            created_at: Utc::now(),
        }
    }
}
