//! Postgres-backed feedback store.
//!
//! One table, `<namespace>.feedback_results`, keyed by job id and indexed by
//! `(user_id, processed_at DESC)` for history paging. The schema is created
//! on first use, so a lazily-connected pool never touches the database until
//! a request needs it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value as JsonValue};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tokio::sync::OnceCell;
use tracing::instrument;
use uuid::Uuid;

use feedlens_core::{FeedbackItem, FeedbackMetadata, Intent, JobId, ScoredLabel, Sentiment, UserId};

use super::{FeedbackStore, PageRequest, SentimentGroup, StoreError};

pub struct PostgresFeedbackStore {
    pool: PgPool,
    table: String,
    namespace: String,
    schema_ready: OnceCell<()>,
}

impl std::fmt::Debug for PostgresFeedbackStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresFeedbackStore")
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

impl PostgresFeedbackStore {
    /// `namespace` is interpolated into SQL; callers validate it as a plain
    /// identifier (see `AppConfig`).
    pub fn new(pool: PgPool, namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        Self {
            pool,
            table: format!("{namespace}.feedback_results"),
            namespace,
            schema_ready: OnceCell::new(),
        }
    }

    async fn ensure_schema(&self) -> Result<(), StoreError> {
        self.schema_ready
            .get_or_try_init(|| async {
                let statements = [
                    format!("CREATE SCHEMA IF NOT EXISTS {}", self.namespace),
                    format!(
                        r#"
                        CREATE TABLE IF NOT EXISTS {} (
                            job_id        UUID PRIMARY KEY,
                            user_id       TEXT NOT NULL,
                            text          TEXT NOT NULL,
                            sentiment     TEXT NOT NULL,
                            confidence    DOUBLE PRECISION NOT NULL,
                            all_scores    JSONB NOT NULL,
                            intents       JSONB NOT NULL,
                            ai_processed  BOOLEAN NOT NULL,
                            raw           JSONB,
                            submitted_at  TIMESTAMPTZ NOT NULL,
                            processed_at  TIMESTAMPTZ NOT NULL,
                            metadata      JSONB NOT NULL
                        )
                        "#,
                        self.table
                    ),
                    format!(
                        "CREATE INDEX IF NOT EXISTS feedback_results_user_processed_idx ON {} (user_id, processed_at DESC)",
                        self.table
                    ),
                ];

                for statement in &statements {
                    sqlx::query(statement)
                        .execute(&self.pool)
                        .await
                        .map_err(|e| map_sqlx_error("ensure_schema", e))?;
                }
                Ok(())
            })
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl FeedbackStore for PostgresFeedbackStore {
    #[instrument(skip(self, item), fields(job_id = %item.job_id, user_id = %item.user_id), err)]
    async fn insert(&self, item: &FeedbackItem) -> Result<(), StoreError> {
        self.ensure_schema().await?;

        let metadata = serde_json::to_value(&item.metadata)
            .map_err(|e| StoreError::Corrupt(format!("metadata: {e}")))?;

        sqlx::query(&format!(
            r#"
            INSERT INTO {} (
                job_id, user_id, text, sentiment, confidence, all_scores,
                intents, ai_processed, raw, submitted_at, processed_at, metadata
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
            self.table
        ))
        .bind(*item.job_id.as_uuid())
        .bind(item.user_id.as_str())
        .bind(&item.text)
        .bind(item.sentiment.as_str())
        .bind(item.confidence)
        .bind(Json(&item.all_scores))
        .bind(Json(&item.intents))
        .bind(item.ai_processed)
        .bind(item.raw.as_ref().map(Json))
        .bind(item.submitted_at)
        .bind(item.processed_at)
        .bind(Json(metadata))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Duplicate(item.job_id)
            } else {
                map_sqlx_error("insert", e)
            }
        })?;

        Ok(())
    }

    #[instrument(skip(self), fields(job_id = %job_id), err)]
    async fn find_by_job_id(&self, job_id: JobId) -> Result<Option<FeedbackItem>, StoreError> {
        self.ensure_schema().await?;

        let row = sqlx::query(&format!("SELECT * FROM {} WHERE job_id = $1", self.table))
            .bind(*job_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_by_job_id", e))?;

        row.as_ref().map(row_to_item).transpose()
    }

    #[instrument(skip(self), fields(user_id = %user_id, skip = page.skip, limit = page.limit), err)]
    async fn list_for_user(&self, user_id: &UserId, page: PageRequest) -> Result<Vec<FeedbackItem>, StoreError> {
        self.ensure_schema().await?;
        let (offset, limit) = page.sql_bounds();

        let rows = sqlx::query(&format!(
            r#"
            SELECT * FROM {}
            WHERE user_id = $1
            ORDER BY processed_at DESC, job_id DESC
            OFFSET $2 LIMIT $3
            "#,
            self.table
        ))
        .bind(user_id.as_str())
        .bind(offset)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_for_user", e))?;

        rows.iter().map(row_to_item).collect()
    }

    #[instrument(skip(self), fields(user_id = %user_id), err)]
    async fn count_for_user(&self, user_id: &UserId) -> Result<u64, StoreError> {
        self.ensure_schema().await?;

        let count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM {} WHERE user_id = $1",
            self.table
        ))
        .bind(user_id.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("count_for_user", e))?;

        Ok(count.max(0) as u64)
    }

    #[instrument(skip(self), fields(user_id = %user_id), err)]
    async fn sentiment_groups(&self, user_id: &UserId) -> Result<Vec<SentimentGroup>, StoreError> {
        self.ensure_schema().await?;

        let rows = sqlx::query(&format!(
            r#"
            SELECT sentiment, COUNT(*) AS count, AVG(confidence) AS avg_confidence
            FROM {}
            WHERE user_id = $1
            GROUP BY sentiment
            "#,
            self.table
        ))
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("sentiment_groups", e))?;

        let mut groups = rows
            .iter()
            .map(|row| {
                let sentiment: String = get(row, "sentiment")?;
                let count: i64 = get(row, "count")?;
                let avg_confidence: Option<f64> = get(row, "avg_confidence")?;
                Ok(SentimentGroup {
                    sentiment: sentiment
                        .parse::<Sentiment>()
                        .map_err(|e| StoreError::Corrupt(e.to_string()))?,
                    count: count.max(0) as u64,
                    avg_confidence: avg_confidence.unwrap_or(0.0),
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        groups.sort_by_key(|g| g.sentiment);
        Ok(groups)
    }

    #[instrument(skip(self), fields(user_id = %user_id), err)]
    async fn clear_for_user(&self, user_id: &UserId) -> Result<u64, StoreError> {
        self.ensure_schema().await?;

        let result = sqlx::query(&format!("DELETE FROM {} WHERE user_id = $1", self.table))
            .bind(user_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("clear_for_user", e))?;

        Ok(result.rows_affected())
    }
}

fn get<'r, T>(row: &'r PgRow, column: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(column)
        .map_err(|e| StoreError::Corrupt(format!("failed to read {column}: {e}")))
}

fn row_to_item(row: &PgRow) -> Result<FeedbackItem, StoreError> {
    let job_id: Uuid = get(row, "job_id")?;
    let user_id: String = get(row, "user_id")?;
    let sentiment: String = get(row, "sentiment")?;
    let Json(all_scores): Json<Vec<ScoredLabel>> = get(row, "all_scores")?;
    let Json(intents): Json<Vec<Intent>> = get(row, "intents")?;
    let raw: Option<Json<JsonValue>> = get(row, "raw")?;
    let Json(metadata): Json<Map<String, JsonValue>> = get(row, "metadata")?;
    let submitted_at: DateTime<Utc> = get(row, "submitted_at")?;
    let processed_at: DateTime<Utc> = get(row, "processed_at")?;

    let metadata: FeedbackMetadata = serde_json::from_value(JsonValue::Object(metadata))
        .map_err(|e| StoreError::Corrupt(format!("metadata: {e}")))?;

    Ok(FeedbackItem {
        job_id: JobId::from_uuid(job_id),
        user_id: UserId::new(user_id).map_err(|e| StoreError::Corrupt(e.to_string()))?,
        text: get(row, "text")?,
        sentiment: sentiment
            .parse()
            .map_err(|e: feedlens_core::DomainError| StoreError::Corrupt(e.to_string()))?,
        confidence: get(row, "confidence")?,
        all_scores,
        intents,
        ai_processed: get(row, "ai_processed")?,
        raw: raw.map(|Json(v)| v),
        submitted_at,
        processed_at,
        metadata,
    })
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            StoreError::Database(format!("database error in {}: {}", operation, db_err.message()))
        }
        sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
            StoreError::Connection(format!("{} failed: {}", operation, err))
        }
        _ => StoreError::Database(format!("sqlx error in {}: {}", operation, err)),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}
