use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{BatchPhase, CollectorJob, JobContext, JobError, JobKind, JobPayload, StepOutcome};
use crate::{
    gc::GarbageCollectorService,
    models::JobMessage,
    observability::metrics,
    queue::{JobQueue, QueueResult},
};

/// Schedules its own next run, then queues a collector job for every
/// collector.
///
/// Each enqueue is its own step so a retried sweep resumes from the saved
/// payload and never queues a job twice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecurringSweepJob {
    /// Collector jobs queued so far.
    #[serde(default)]
    pub current_step: u32,
    #[serde(default)]
    pub total_steps: u32,
    #[serde(default)]
    pub phase: BatchPhase,
    /// The follow-up sweep, once queued.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_sweep: Option<Uuid>,
}

impl RecurringSweepJob {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(&self) -> String {
        "Garbage Collection processing for all collectors".to_string()
    }

    pub(super) async fn setup(&mut self, ctx: &JobContext<'_>) -> Result<(), JobError> {
        self.total_steps = ctx.service.collectors().len() as u32;
        self.current_step = 0;
        self.phase = BatchPhase::Running;
        Ok(())
    }

    pub(super) async fn process(&mut self, ctx: &JobContext<'_>) -> Result<StepOutcome, JobError> {
        let mut messages = Vec::new();

        if self.next_sweep.is_none() {
            let next_run = ctx
                .jobs
                .next_sweep_at(ctx.now)
                .ok_or(JobError::Schedule(ctx.jobs.seconds_between_jobs, ctx.now))?;
            let next = ctx
                .queue
                .enqueue(JobPayload::RecurringSweep(RecurringSweepJob::new()), next_run)
                .await?;
            self.next_sweep = Some(next);
            messages.push(JobMessage::info(format!(
                "Next sweep {next} scheduled for {next_run}"
            )));
            tracing::info!(job_id = %next, %next_run, "Next garbage collection sweep scheduled");
        } else if let Some(collector) = ctx.service.collectors().get(self.current_step as usize) {
            let job = CollectorJob::new(collector.name(), ctx.jobs.batch_size);
            let id = ctx.queue.enqueue(JobPayload::Collector(job), ctx.now).await?;
            tracing::debug!(job_id = %id, collector = collector.name(), "Collector job queued");
            messages.push(JobMessage::info(format!(
                "Queued collector job {id} for {}",
                collector.name()
            )));
            self.current_step += 1;
        }

        metrics::record_job_step("recurring_sweep");
        let complete =
            self.next_sweep.is_some() && self.current_step as usize >= ctx.service.collectors().len();
        if complete {
            self.phase = BatchPhase::Complete;
        }
        Ok(StepOutcome { messages, complete })
    }
}

/// Queue a collector job for every registered collector at `run_at`.
pub async fn enqueue_sweep(
    queue: &dyn JobQueue,
    service: &GarbageCollectorService,
    batch_size: usize,
    run_at: DateTime<Utc>,
) -> QueueResult<Vec<Uuid>> {
    let mut ids = Vec::with_capacity(service.collectors().len());
    for collector in service.collectors() {
        let job = CollectorJob::new(collector.name(), batch_size);
        let id = queue.enqueue(JobPayload::Collector(job), run_at).await?;
        tracing::debug!(job_id = %id, collector = collector.name(), "Collector job queued");
        ids.push(id);
    }
    Ok(ids)
}

/// Queue a recurring sweep at `run_at` unless one is already new or running.
pub async fn ensure_default_job(
    queue: &dyn JobQueue,
    run_at: DateTime<Utc>,
) -> QueueResult<Option<Uuid>> {
    if queue.count_active(JobKind::RecurringSweep).await? > 0 {
        tracing::debug!("Recurring sweep already queued");
        return Ok(None);
    }
    let id = queue
        .enqueue(JobPayload::RecurringSweep(RecurringSweepJob::new()), run_at)
        .await?;
    Ok(Some(id))
}
