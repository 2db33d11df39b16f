//! Garbage collection jobs.
//!
//! Jobs are resumable state machines: the queue persists their payload
//! after every step. A job left running by a stopped worker is requeued once
//! it has gone `stale_after_secs` without a save, and resumes from its last
//! saved step.
//!
//! - **Collector jobs** run one collector's discovery, then execute the
//!   planned operations `batch_size` at a time.
//! - **Recurring sweeps** queue a collector job per registered collector and
//!   schedule the next sweep `seconds_between_jobs` later.
//!
//! # Example
//!
//! ```toml
//! [jobs]
//! batch_size = 10
//! seconds_between_jobs = 86400
//! ```

mod collector_job;
mod recurring;

use std::str::FromStr;

use chrono::{DateTime, Utc};
pub use collector_job::{BatchPhase, CollectorJob};
pub use recurring::{RecurringSweepJob, enqueue_sweep, ensure_default_job};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    config::JobsConfig,
    db::DbError,
    gc::GarbageCollectorService,
    models::JobMessage,
    queue::{JobQueue, QueueError},
};

/// Serialised state of a queued job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobPayload {
    Collector(CollectorJob),
    RecurringSweep(RecurringSweepJob),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Collector,
    RecurringSweep,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Collector => "collector",
            JobKind::RecurringSweep => "recurring_sweep",
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "collector" => Ok(JobKind::Collector),
            "recurring_sweep" => Ok(JobKind::RecurringSweep),
            other => Err(format!("Unknown job kind: {other}")),
        }
    }
}

/// What a job step needs from its surroundings.
pub struct JobContext<'a> {
    pub service: &'a GarbageCollectorService,
    pub queue: &'a dyn JobQueue,
    pub jobs: &'a JobsConfig,
    pub now: DateTime<Utc>,
}

/// Result of one `process` call.
#[derive(Debug, Default)]
pub struct StepOutcome {
    pub messages: Vec<JobMessage>,
    pub complete: bool,
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error("No Processors found for collector {0}")]
    NoProcessors(String),

    #[error("Unknown collector: {0}")]
    UnknownCollector(String),

    #[error("Store error: {0}")]
    Transient(#[from] DbError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Next sweep {0}s after {1} is out of range")]
    Schedule(u64, DateTime<Utc>),
}

impl JobError {
    /// Fatal errors are configuration problems; retrying cannot help.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            JobError::NoProcessors(_) | JobError::UnknownCollector(_) | JobError::Schedule(..)
        )
    }
}

impl JobPayload {
    pub fn kind(&self) -> JobKind {
        match self {
            JobPayload::Collector(_) => JobKind::Collector,
            JobPayload::RecurringSweep(_) => JobKind::RecurringSweep,
        }
    }

    pub fn title(&self) -> String {
        match self {
            JobPayload::Collector(job) => job.title(),
            JobPayload::RecurringSweep(job) => job.title(),
        }
    }

    pub fn phase(&self) -> BatchPhase {
        match self {
            JobPayload::Collector(job) => job.phase,
            JobPayload::RecurringSweep(job) => job.phase,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.phase() == BatchPhase::Complete
    }

    /// Prepare the job for its first step. Does nothing once set up.
    pub async fn setup(&mut self, ctx: &JobContext<'_>) -> Result<(), JobError> {
        if self.phase() != BatchPhase::Created {
            return Ok(());
        }
        match self {
            JobPayload::Collector(job) => job.setup(ctx).await,
            JobPayload::RecurringSweep(job) => job.setup(ctx).await,
        }
    }

    pub async fn process(&mut self, ctx: &JobContext<'_>) -> Result<StepOutcome, JobError> {
        match self {
            JobPayload::Collector(job) => job.process(ctx).await,
            JobPayload::RecurringSweep(job) => job.process(ctx).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_tagged_by_kind() {
        let payload = JobPayload::Collector(CollectorJob::new("versioned", 10));
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["kind"], "collector");
        assert_eq!(json["collector"], "versioned");
        assert_eq!(payload.kind(), JobKind::Collector);

        let sweep: JobPayload =
            serde_json::from_str(r#"{"kind": "recurring_sweep", "phase": "created"}"#).unwrap();
        assert_eq!(sweep.kind(), JobKind::RecurringSweep);
    }

    #[test]
    fn test_job_kind_names() {
        for kind in [JobKind::Collector, JobKind::RecurringSweep] {
            assert_eq!(kind.as_str().parse::<JobKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_fatal_errors() {
        assert!(JobError::NoProcessors("versioned".into()).is_fatal());
        assert!(JobError::UnknownCollector("ghost".into()).is_fatal());
        assert!(!JobError::Transient(DbError::Internal("locked".into())).is_fatal());
        assert_eq!(
            JobError::NoProcessors("versioned".into()).to_string(),
            "No Processors found for collector versioned"
        );
    }
}
