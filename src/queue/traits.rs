use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{QueueError, QueueResult};
use crate::{
    jobs::{JobKind, JobPayload},
    models::JobMessage,
};

/// Lifecycle of a queued job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    New,
    Running,
    Complete,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::New => "new",
            JobStatus::Running => "running",
            JobStatus::Complete => "complete",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// New or running.
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::New | JobStatus::Running)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(JobStatus::New),
            "running" => Ok(JobStatus::Running),
            "complete" => Ok(JobStatus::Complete),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            other => Err(QueueError::Deserialization(format!(
                "Unknown job status: {other}"
            ))),
        }
    }
}

/// A job and its persisted state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedJob {
    pub id: Uuid,
    pub title: String,
    pub payload: JobPayload,
    pub status: JobStatus,
    /// Not claimable before this instant.
    pub run_at: DateTime<Utc>,
    /// Failed attempts so far.
    pub attempts: u32,
    pub last_error: Option<String>,
    pub messages: Vec<JobMessage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl QueuedJob {
    pub fn new(payload: JobPayload, run_at: DateTime<Utc>) -> Self {
        let now = truncate_to_millis(Utc::now());
        Self {
            id: Uuid::new_v4(),
            title: payload.title(),
            payload,
            status: JobStatus::New,
            run_at: truncate_to_millis(run_at),
            attempts: 0,
            last_error: None,
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn kind(&self) -> JobKind {
        self.payload.kind()
    }
}

/// Recorded on jobs recovered from a stopped worker.
pub const STALE_JOB_ERROR: &str = "Worker stopped before the job finished";

/// Durable stores keep `run_at` at millisecond precision.
pub(crate) fn truncate_to_millis(dt: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(dt.timestamp_millis()).unwrap_or(dt)
}

/// Store for queued jobs.
///
/// Jobs are claimed oldest `run_at` first, ties broken by enqueue order.
/// Implementations must be safe to share between a CLI and worker in the
/// same process.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Queue a job to run at or after `run_at`.
    async fn enqueue(&self, payload: JobPayload, run_at: DateTime<Utc>) -> QueueResult<Uuid>;

    /// Mark the next due job as running and return it.
    async fn claim_next(&self, now: DateTime<Utc>) -> QueueResult<Option<QueuedJob>>;

    /// Put running jobs last saved before `stale_before` back on the queue.
    ///
    /// Their worker is assumed gone, so the interruption counts as a failed
    /// attempt; jobs reaching `max_attempts` are marked failed instead.
    /// Returns how many jobs were recovered.
    async fn requeue_stale(
        &self,
        stale_before: DateTime<Utc>,
        max_attempts: u32,
    ) -> QueueResult<u64>;

    /// Persist a running job's payload and messages. Status is left alone.
    async fn save(&self, job: &QueuedJob) -> QueueResult<()>;

    /// Move a running job to a terminal status. Returns false if the job was
    /// not running (e.g. it was cancelled meanwhile).
    async fn finish(&self, id: Uuid, status: JobStatus, error: Option<String>)
    -> QueueResult<bool>;

    /// Return a running job to the queue for another attempt.
    async fn reschedule(
        &self,
        id: Uuid,
        run_at: DateTime<Utc>,
        attempts: u32,
        error: String,
    ) -> QueueResult<bool>;

    /// Cancel a new or running job. Returns false if it had already ended.
    async fn cancel(&self, id: Uuid) -> QueueResult<bool>;

    /// Jobs of `kind` that are new or running.
    async fn count_active(&self, kind: JobKind) -> QueueResult<u64>;

    async fn get(&self, id: Uuid) -> QueueResult<Option<QueuedJob>>;
}
