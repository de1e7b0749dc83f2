//! Redis-backed queue using the BullMQ key layout.
//!
//! ## Keys (prefix `bull:<queue>`)
//!
//! - `bull:<queue>:<id>`: job hash (`name`, `data`, `opts`, `timestamp`,
//!   `attemptsMade`, `failedReason`, `finishedOn`)
//! - `bull:<queue>:wait`, `bull:<queue>:active`: lists of job ids
//! - `bull:<queue>:completed`, `bull:<queue>:failed`: sorted sets scored by
//!   `finishedOn` (ms)
//! - `bull:<queue>:delayed`: sorted set scored by the due time
//!
//! Only the producer side lives here; an external worker speaking the same
//! convention moves jobs between the lists/sets.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use redis::aio::MultiplexedConnection;
use tokio::sync::OnceCell;
use tracing::instrument;

use feedlens_core::JobId;

use super::backend::{QueueBackend, QueueError};
use super::types::{
    COMPLETED_RETENTION, FAILED_RETENTION, JobCounts, JobRecord, JobState, QueuedJob, stored_retention,
};

pub struct RedisQueueBackend {
    client: redis::Client,
    prefix: String,
    connection: OnceCell<MultiplexedConnection>,
}

impl std::fmt::Debug for RedisQueueBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisQueueBackend")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl RedisQueueBackend {
    /// Does not connect; the first command does.
    pub fn new(redis_url: impl AsRef<str>, queue_name: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| QueueError::Connection(e.to_string()))?;
        Ok(Self {
            client,
            prefix: format!("bull:{queue_name}"),
            connection: OnceCell::new(),
        })
    }

    fn key(&self, suffix: &str) -> String {
        format!("{}:{}", self.prefix, suffix)
    }

    async fn connection(&self) -> Result<MultiplexedConnection, QueueError> {
        let conn = self
            .connection
            .get_or_try_init(|| async {
                self.client
                    .get_multiplexed_async_connection()
                    .await
                    .map_err(map_redis_error)
            })
            .await?;
        Ok(conn.clone())
    }

    /// Remove members of a finished set whose own retention (from the job's
    /// stored `opts`, else `default_keep`) ended at or before `now`.
    async fn expire_set(
        &self,
        conn: &mut MultiplexedConnection,
        state: JobState,
        default_keep: std::time::Duration,
        now: DateTime<Utc>,
    ) -> Result<u64, QueueError> {
        let set_key = self.key(state.as_str());
        let finished: Vec<(String, f64)> = redis::cmd("ZRANGEBYSCORE")
            .arg(&set_key)
            .arg("-inf")
            .arg(now.timestamp_millis())
            .arg("WITHSCORES")
            .query_async(conn)
            .await
            .map_err(map_redis_error)?;

        if finished.is_empty() {
            return Ok(0);
        }

        let mut opts_pipe = redis::pipe();
        for (id, _) in &finished {
            opts_pipe.cmd("HGET").arg(self.key(id)).arg("opts");
        }
        let opts: Vec<Option<String>> = opts_pipe
            .query_async(conn)
            .await
            .map_err(map_redis_error)?;

        let expired: Vec<&String> = finished
            .iter()
            .zip(opts.iter())
            .filter(|((_, finished_ms), opts)| {
                let keep = opts
                    .as_deref()
                    .and_then(|raw| serde_json::from_str::<serde_json::Value>(raw).ok())
                    .and_then(|opts| stored_retention(&opts, state))
                    .unwrap_or(default_keep);
                let finished_on = Utc
                    .timestamp_millis_opt(*finished_ms as i64)
                    .single()
                    .unwrap_or(now);
                cutoff(now, keep) >= finished_on
            })
            .map(|((id, _), _)| id)
            .collect();

        if expired.is_empty() {
            return Ok(0);
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        for id in &expired {
            pipe.cmd("ZREM").arg(&set_key).arg(*id).ignore();
            pipe.cmd("DEL").arg(self.key(id)).ignore();
        }
        pipe.query_async::<_, ()>(conn).await.map_err(map_redis_error)?;
        Ok(expired.len() as u64)
    }
}

#[async_trait]
impl QueueBackend for RedisQueueBackend {
    async fn ping(&self) -> Result<(), QueueError> {
        // Fresh connection: the probe must observe the broker as it is now.
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(map_redis_error)?;
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        if pong == "PONG" {
            Ok(())
        } else {
            Err(QueueError::Command(format!("unexpected PING reply: {pong}")))
        }
    }

    #[instrument(skip(self, job), fields(job_id = %job.job_id), err)]
    async fn add(&self, job: &QueuedJob) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        let job_key = self.key(&job.job_id.to_string());

        let exists: bool = redis::cmd("EXISTS")
            .arg(&job_key)
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        if exists {
            return Err(QueueError::AlreadyExists(job.job_id));
        }

        let data = serde_json::to_string(&job.payload)
            .map_err(|e| QueueError::Serialization(e.to_string()))?;
        let opts = serde_json::to_string(&job.options.to_bull_opts())
            .map_err(|e| QueueError::Serialization(e.to_string()))?;

        redis::pipe()
            .atomic()
            .cmd("HSET")
            .arg(&job_key)
            .arg("name")
            .arg(&job.name)
            .arg("data")
            .arg(data)
            .arg("opts")
            .arg(opts)
            .arg("timestamp")
            .arg(job.created_at.timestamp_millis())
            .arg("attemptsMade")
            .arg(0)
            .ignore()
            .cmd("LPUSH")
            .arg(self.key("wait"))
            .arg(job.job_id.to_string())
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(map_redis_error)
    }

    #[instrument(skip(self), fields(job_id = %job_id), err)]
    async fn get(&self, job_id: JobId) -> Result<Option<JobRecord>, QueueError> {
        let mut conn = self.connection().await?;
        let id = job_id.to_string();

        let hash: HashMap<String, String> = redis::cmd("HGETALL")
            .arg(self.key(&id))
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        if hash.is_empty() {
            return Ok(None);
        }

        let (completed, failed, delayed, active_pos): (Option<f64>, Option<f64>, Option<f64>, Option<i64>) =
            redis::pipe()
                .cmd("ZSCORE")
                .arg(self.key("completed"))
                .arg(&id)
                .cmd("ZSCORE")
                .arg(self.key("failed"))
                .arg(&id)
                .cmd("ZSCORE")
                .arg(self.key("delayed"))
                .arg(&id)
                .cmd("LPOS")
                .arg(self.key("active"))
                .arg(&id)
                .query_async(&mut conn)
                .await
                .map_err(map_redis_error)?;

        let state = if completed.is_some() {
            JobState::Completed
        } else if failed.is_some() {
            JobState::Failed
        } else if delayed.is_some() {
            JobState::Delayed
        } else if active_pos.is_some() {
            JobState::Active
        } else {
            JobState::Waiting
        };

        let millis = |field: &str| {
            hash.get(field)
                .and_then(|v| v.parse::<i64>().ok())
                .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        };

        Ok(Some(JobRecord {
            job_id,
            state,
            failure_reason: hash.get("failedReason").filter(|r| !r.is_empty()).cloned(),
            attempts_made: hash
                .get("attemptsMade")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            created_at: millis("timestamp").unwrap_or_else(Utc::now),
            finished_at: millis("finishedOn"),
        }))
    }

    async fn counts(&self) -> Result<JobCounts, QueueError> {
        let mut conn = self.connection().await?;
        let (waiting, active, completed, failed, delayed): (u64, u64, u64, u64, u64) = redis::pipe()
            .cmd("LLEN")
            .arg(self.key("wait"))
            .cmd("LLEN")
            .arg(self.key("active"))
            .cmd("ZCARD")
            .arg(self.key("completed"))
            .cmd("ZCARD")
            .arg(self.key("failed"))
            .cmd("ZCARD")
            .arg(self.key("delayed"))
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;

        Ok(JobCounts {
            waiting,
            active,
            completed,
            failed,
            delayed,
        })
    }

    #[instrument(skip(self), err)]
    async fn remove_expired(&self, now: DateTime<Utc>) -> Result<u64, QueueError> {
        let mut conn = self.connection().await?;
        let completed = self
            .expire_set(&mut conn, JobState::Completed, COMPLETED_RETENTION, now)
            .await?;
        let failed = self
            .expire_set(&mut conn, JobState::Failed, FAILED_RETENTION, now)
            .await?;
        Ok(completed + failed)
    }
}

fn cutoff(now: DateTime<Utc>, keep_for: std::time::Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(keep_for)
        .ok()
        .and_then(|keep_for| now.checked_sub_signed(keep_for))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn map_redis_error(err: redis::RedisError) -> QueueError {
    if err.is_io_error() || err.is_connection_refusal() || err.is_connection_dropped() || err.is_timeout() {
        QueueError::Connection(err.to_string())
    } else {
        QueueError::Command(err.to_string())
    }
}
