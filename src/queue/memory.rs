use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    error::QueueResult,
    traits::{JobQueue, JobStatus, QueuedJob, STALE_JOB_ERROR},
};
use crate::jobs::{JobKind, JobPayload};

/// In-process job queue. Jobs are lost when the process exits.
#[derive(Default)]
pub struct MemoryJobQueue {
    // Insertion order breaks run_at ties
    jobs: RwLock<Vec<QueuedJob>>,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every job ever queued, in enqueue order.
    pub async fn snapshot(&self) -> Vec<QueuedJob> {
        self.jobs.read().await.clone()
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, payload: JobPayload, run_at: DateTime<Utc>) -> QueueResult<Uuid> {
        let job = QueuedJob::new(payload, run_at);
        let id = job.id;
        self.jobs.write().await.push(job);
        Ok(id)
    }

    async fn claim_next(&self, now: DateTime<Utc>) -> QueueResult<Option<QueuedJob>> {
        let mut jobs = self.jobs.write().await;
        let next = jobs
            .iter_mut()
            .filter(|j| j.status == JobStatus::New && j.run_at <= now)
            .min_by_key(|j| j.run_at);

        Ok(next.map(|job| {
            job.status = JobStatus::Running;
            job.updated_at = Utc::now();
            job.clone()
        }))
    }

    async fn requeue_stale(
        &self,
        stale_before: DateTime<Utc>,
        max_attempts: u32,
    ) -> QueueResult<u64> {
        let mut jobs = self.jobs.write().await;
        let mut recovered = 0;
        for job in jobs
            .iter_mut()
            .filter(|j| j.status == JobStatus::Running && j.updated_at < stale_before)
        {
            job.attempts += 1;
            job.status = if job.attempts >= max_attempts {
                JobStatus::Failed
            } else {
                JobStatus::New
            };
            job.last_error = Some(STALE_JOB_ERROR.to_string());
            job.updated_at = Utc::now();
            recovered += 1;
        }
        Ok(recovered)
    }

    async fn save(&self, job: &QueuedJob) -> QueueResult<()> {
        let mut jobs = self.jobs.write().await;
        if let Some(stored) = jobs.iter_mut().find(|j| j.id == job.id) {
            stored.payload = job.payload.clone();
            stored.messages = job.messages.clone();
            stored.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn finish(
        &self,
        id: Uuid,
        status: JobStatus,
        error: Option<String>,
    ) -> QueueResult<bool> {
        let mut jobs = self.jobs.write().await;
        match jobs
            .iter_mut()
            .find(|j| j.id == id && j.status == JobStatus::Running)
        {
            Some(job) => {
                job.status = status;
                if error.is_some() {
                    job.last_error = error;
                }
                job.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn reschedule(
        &self,
        id: Uuid,
        run_at: DateTime<Utc>,
        attempts: u32,
        error: String,
    ) -> QueueResult<bool> {
        let mut jobs = self.jobs.write().await;
        match jobs
            .iter_mut()
            .find(|j| j.id == id && j.status == JobStatus::Running)
        {
            Some(job) => {
                job.status = JobStatus::New;
                job.run_at = run_at;
                job.attempts = attempts;
                job.last_error = Some(error);
                job.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn cancel(&self, id: Uuid) -> QueueResult<bool> {
        let mut jobs = self.jobs.write().await;
        match jobs
            .iter_mut()
            .find(|j| j.id == id && j.status.is_active())
        {
            Some(job) => {
                job.status = JobStatus::Cancelled;
                job.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn count_active(&self, kind: JobKind) -> QueueResult<u64> {
        let jobs = self.jobs.read().await;
        Ok(jobs
            .iter()
            .filter(|j| j.kind() == kind && j.status.is_active())
            .count() as u64)
    }

    async fn get(&self, id: Uuid) -> QueueResult<Option<QueuedJob>> {
        let jobs = self.jobs.read().await;
        Ok(jobs.iter().find(|j| j.id == id).cloned())
    }
}
