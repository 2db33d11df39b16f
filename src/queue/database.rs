use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{
    error::{QueueError, QueueResult},
    traits::{JobQueue, JobStatus, QueuedJob, STALE_JOB_ERROR},
};
use crate::{
    db::{DbPool, DbPoolRef},
    jobs::{JobKind, JobPayload},
};

const COLUMNS: &str = "id, title, payload, status, run_at, attempts, last_error, messages, created_at, updated_at";

/// Job queue persisted in a database table.
///
/// The default table is created by the bundled migrations; other names are
/// created on demand by [`DatabaseJobQueue::ensure_table`].
pub struct DatabaseJobQueue {
    pool: Arc<DbPool>,
    table_name: String,
}

impl DatabaseJobQueue {
    /// `table_name` must be a validated identifier.
    pub fn new(pool: Arc<DbPool>, table_name: String) -> Self {
        Self { pool, table_name }
    }

    pub async fn ensure_table(&self) -> QueueResult<()> {
        match self.pool.pool() {
            DbPoolRef::Sqlite(pool) => {
                sqlx::query(&format!(
                    r#"
                    CREATE TABLE IF NOT EXISTS "{table}" (
                        id TEXT PRIMARY KEY NOT NULL,
                        kind TEXT NOT NULL,
                        title TEXT NOT NULL,
                        payload TEXT NOT NULL,
                        status TEXT NOT NULL,
                        run_at INTEGER NOT NULL,
                        attempts INTEGER NOT NULL DEFAULT 0,
                        last_error TEXT,
                        messages TEXT NOT NULL DEFAULT '[]',
                        created_at TEXT NOT NULL,
                        updated_at TEXT NOT NULL
                    )
                    "#,
                    table = self.table_name
                ))
                .execute(pool)
                .await?;

                sqlx::query(&format!(
                    r#"CREATE INDEX IF NOT EXISTS "idx_{table}_due" ON "{table}" (status, run_at)"#,
                    table = self.table_name
                ))
                .execute(pool)
                .await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl JobQueue for DatabaseJobQueue {
    async fn enqueue(&self, payload: JobPayload, run_at: DateTime<Utc>) -> QueueResult<Uuid> {
        let job = QueuedJob::new(payload, run_at);
        let payload = serde_json::to_string(&job.payload)
            .map_err(|e| QueueError::Serialization(e.to_string()))?;

        match self.pool.pool() {
            DbPoolRef::Sqlite(pool) => {
                sqlx::query(&format!(
                    r#"
                    INSERT INTO "{}" (id, kind, title, payload, status, run_at, attempts, last_error, messages, created_at, updated_at)
                    VALUES (?, ?, ?, ?, ?, ?, 0, NULL, '[]', ?, ?)
                    "#,
                    self.table_name
                ))
                .bind(job.id.to_string())
                .bind(job.kind().as_str())
                .bind(&job.title)
                .bind(&payload)
                .bind(job.status.as_str())
                .bind(job.run_at.timestamp_millis())
                .bind(job.created_at)
                .bind(job.updated_at)
                .execute(pool)
                .await?;
            }
        }

        tracing::debug!(job_id = %job.id, kind = %job.kind(), run_at = %job.run_at, "Job queued");
        Ok(job.id)
    }

    async fn claim_next(&self, now: DateTime<Utc>) -> QueueResult<Option<QueuedJob>> {
        let row = match self.pool.pool() {
            DbPoolRef::Sqlite(pool) => {
                // Single statement so two workers cannot claim the same job
                sqlx::query_as::<_, QueuedJobRow>(&format!(
                    r#"
                    UPDATE "{table}" SET status = 'running', updated_at = ?
                    WHERE id = (
                        SELECT id FROM "{table}"
                        WHERE status = 'new' AND run_at <= ?
                        ORDER BY run_at ASC, rowid ASC
                        LIMIT 1
                    )
                    RETURNING {COLUMNS}
                    "#,
                    table = self.table_name
                ))
                .bind(Utc::now())
                .bind(now.timestamp_millis())
                .fetch_optional(pool)
                .await?
            }
        };

        row.map(QueuedJobRow::into_job).transpose()
    }

    async fn requeue_stale(
        &self,
        stale_before: DateTime<Utc>,
        max_attempts: u32,
    ) -> QueueResult<u64> {
        let rows_affected = match self.pool.pool() {
            DbPoolRef::Sqlite(pool) => sqlx::query(&format!(
                r#"
                UPDATE "{}"
                SET status = CASE WHEN attempts + 1 >= ? THEN 'failed' ELSE 'new' END,
                    attempts = attempts + 1,
                    last_error = ?,
                    updated_at = ?
                WHERE status = 'running' AND julianday(updated_at) < julianday(?)
                "#,
                self.table_name
            ))
            .bind(i64::from(max_attempts))
            .bind(STALE_JOB_ERROR)
            .bind(Utc::now())
            .bind(stale_before)
            .execute(pool)
            .await?
            .rows_affected(),
        };
        Ok(rows_affected)
    }

    async fn save(&self, job: &QueuedJob) -> QueueResult<()> {
        let payload = serde_json::to_string(&job.payload)
            .map_err(|e| QueueError::Serialization(e.to_string()))?;
        let messages = serde_json::to_string(&job.messages)
            .map_err(|e| QueueError::Serialization(e.to_string()))?;

        match self.pool.pool() {
            DbPoolRef::Sqlite(pool) => {
                sqlx::query(&format!(
                    r#"UPDATE "{}" SET payload = ?, messages = ?, updated_at = ? WHERE id = ?"#,
                    self.table_name
                ))
                .bind(&payload)
                .bind(&messages)
                .bind(Utc::now())
                .bind(job.id.to_string())
                .execute(pool)
                .await?;
            }
        }
        Ok(())
    }

    async fn finish(
        &self,
        id: Uuid,
        status: JobStatus,
        error: Option<String>,
    ) -> QueueResult<bool> {
        let rows_affected = match self.pool.pool() {
            DbPoolRef::Sqlite(pool) => sqlx::query(&format!(
                r#"
                UPDATE "{}" SET status = ?, last_error = COALESCE(?, last_error), updated_at = ?
                WHERE id = ? AND status = 'running'
                "#,
                self.table_name
            ))
            .bind(status.as_str())
            .bind(error)
            .bind(Utc::now())
            .bind(id.to_string())
            .execute(pool)
            .await?
            .rows_affected(),
        };
        Ok(rows_affected > 0)
    }

    async fn reschedule(
        &self,
        id: Uuid,
        run_at: DateTime<Utc>,
        attempts: u32,
        error: String,
    ) -> QueueResult<bool> {
        let rows_affected = match self.pool.pool() {
            DbPoolRef::Sqlite(pool) => sqlx::query(&format!(
                r#"
                UPDATE "{}" SET status = 'new', run_at = ?, attempts = ?, last_error = ?, updated_at = ?
                WHERE id = ? AND status = 'running'
                "#,
                self.table_name
            ))
            .bind(run_at.timestamp_millis())
            .bind(i64::from(attempts))
            .bind(error)
            .bind(Utc::now())
            .bind(id.to_string())
            .execute(pool)
            .await?
            .rows_affected(),
        };
        Ok(rows_affected > 0)
    }

    async fn cancel(&self, id: Uuid) -> QueueResult<bool> {
        let rows_affected = match self.pool.pool() {
            DbPoolRef::Sqlite(pool) => sqlx::query(&format!(
                r#"
                UPDATE "{}" SET status = 'cancelled', updated_at = ?
                WHERE id = ? AND status IN ('new', 'running')
                "#,
                self.table_name
            ))
            .bind(Utc::now())
            .bind(id.to_string())
            .execute(pool)
            .await?
            .rows_affected(),
        };
        Ok(rows_affected > 0)
    }

    async fn count_active(&self, kind: JobKind) -> QueueResult<u64> {
        let count: i64 = match self.pool.pool() {
            DbPoolRef::Sqlite(pool) => {
                sqlx::query_scalar(&format!(
                    r#"SELECT COUNT(*) FROM "{}" WHERE kind = ? AND status IN ('new', 'running')"#,
                    self.table_name
                ))
                .bind(kind.as_str())
                .fetch_one(pool)
                .await?
            }
        };
        Ok(count as u64)
    }

    async fn get(&self, id: Uuid) -> QueueResult<Option<QueuedJob>> {
        let row = match self.pool.pool() {
            DbPoolRef::Sqlite(pool) => {
                sqlx::query_as::<_, QueuedJobRow>(&format!(
                    r#"SELECT {COLUMNS} FROM "{}" WHERE id = ?"#,
                    self.table_name
                ))
                .bind(id.to_string())
                .fetch_optional(pool)
                .await?
            }
        };

        row.map(QueuedJobRow::into_job).transpose()
    }
}

#[derive(sqlx::FromRow)]
struct QueuedJobRow {
    id: String,
    title: String,
    payload: String,
    status: String,
    run_at: i64,
    attempts: i64,
    last_error: Option<String>,
    messages: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl QueuedJobRow {
    fn into_job(self) -> QueueResult<QueuedJob> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| QueueError::Deserialization(format!("Invalid UUID: {e}")))?;
        let payload = serde_json::from_str(&self.payload)
            .map_err(|e| QueueError::Deserialization(format!("Invalid payload JSON: {e}")))?;
        let messages = serde_json::from_str(&self.messages)
            .map_err(|e| QueueError::Deserialization(format!("Invalid messages JSON: {e}")))?;
        let run_at = DateTime::from_timestamp_millis(self.run_at).ok_or_else(|| {
            QueueError::Deserialization(format!("Invalid run_at: {}", self.run_at))
        })?;

        Ok(QueuedJob {
            id,
            title: self.title,
            payload,
            status: self.status.parse()?,
            run_at,
            attempts: u32::try_from(self.attempts).unwrap_or(0),
            last_error: self.last_error,
            messages,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
