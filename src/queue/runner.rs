//! Worker loop for queued garbage collection jobs.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::{
    error::QueueResult,
    traits::{JobQueue, JobStatus, QueuedJob},
};
use crate::{
    config::JobsConfig,
    gc::GarbageCollectorService,
    jobs::{JobContext, JobError},
    observability::metrics,
};

/// Claims due jobs and steps them to completion.
pub struct JobRunner {
    queue: Arc<dyn JobQueue>,
    service: Arc<GarbageCollectorService>,
    config: JobsConfig,
}

impl JobRunner {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        service: Arc<GarbageCollectorService>,
        config: JobsConfig,
    ) -> Self {
        Self {
            queue,
            service,
            config,
        }
    }

    /// Run every job that is due at `now`, after requeueing jobs abandoned by
    /// a stopped worker. Returns how many were run.
    pub async fn run_pending(&self, now: DateTime<Utc>) -> QueueResult<usize> {
        let stale_before = self.config.stale_before(now);
        let recovered = self
            .queue
            .requeue_stale(stale_before, self.config.max_attempts)
            .await?;
        if recovered > 0 {
            tracing::warn!(
                jobs = recovered,
                %stale_before,
                "Requeued jobs left running by a stopped worker"
            );
        }

        let mut ran = 0;
        while let Some(job) = self.queue.claim_next(now).await? {
            self.run_job(job, now).await?;
            ran += 1;
        }
        Ok(ran)
    }

    /// Step a claimed job until it completes, fails, is cancelled, or is
    /// handed back for retry. Returns the job's status afterwards.
    pub async fn run_job(&self, mut job: QueuedJob, now: DateTime<Utc>) -> QueueResult<JobStatus> {
        let ctx = JobContext {
            service: &self.service,
            queue: self.queue.as_ref(),
            jobs: &self.config,
            now,
        };

        tracing::info!(job_id = %job.id, kind = %job.kind(), title = %job.title, "Running job");

        if let Err(e) = job.payload.setup(&ctx).await {
            return self.handle_error(&job, e, now).await;
        }
        self.queue.save(&job).await?;

        loop {
            if job.payload.is_complete() {
                self.queue.finish(job.id, JobStatus::Complete, None).await?;
                tracing::info!(job_id = %job.id, "Job complete");
                return Ok(JobStatus::Complete);
            }

            if self.is_cancelled(&job).await? {
                tracing::info!(job_id = %job.id, "Job cancelled, abandoning");
                return Ok(JobStatus::Cancelled);
            }

            match job.payload.process(&ctx).await {
                Ok(outcome) => {
                    for message in &outcome.messages {
                        tracing::debug!(job_id = %job.id, %message, "Job message");
                    }
                    job.messages.extend(outcome.messages);
                    self.queue.save(&job).await?;
                }
                Err(e) => return self.handle_error(&job, e, now).await,
            }
        }
    }

    async fn is_cancelled(&self, job: &QueuedJob) -> QueueResult<bool> {
        Ok(self
            .queue
            .get(job.id)
            .await?
            .is_some_and(|stored| stored.status == JobStatus::Cancelled))
    }

    async fn handle_error(
        &self,
        job: &QueuedJob,
        error: JobError,
        now: DateTime<Utc>,
    ) -> QueueResult<JobStatus> {
        metrics::record_error("job");
        let reason = error.to_string();

        if error.is_fatal() {
            tracing::error!(job_id = %job.id, error = %reason, "Job failed");
            self.queue
                .finish(job.id, JobStatus::Failed, Some(reason))
                .await?;
            return Ok(JobStatus::Failed);
        }

        let attempts = job.attempts + 1;
        if attempts >= self.config.max_attempts {
            tracing::error!(
                job_id = %job.id,
                attempts,
                error = %reason,
                "Job failed after retries"
            );
            self.queue
                .finish(job.id, JobStatus::Failed, Some(reason))
                .await?;
            return Ok(JobStatus::Failed);
        }

        let Some(retry_at) = self.config.retry_at(now, attempts) else {
            tracing::error!(job_id = %job.id, attempts, error = %reason, "Job retry out of range");
            self.queue
                .finish(job.id, JobStatus::Failed, Some(reason))
                .await?;
            return Ok(JobStatus::Failed);
        };
        tracing::warn!(
            job_id = %job.id,
            attempts,
            %retry_at,
            error = %reason,
            "Job step failed, will retry"
        );
        self.queue
            .reschedule(job.id, retry_at, attempts, reason)
            .await?;
        Ok(JobStatus::New)
    }
}

/// Starts the garbage collection worker.
///
/// Runs due jobs, then sleeps `poll_interval_secs` once the queue is empty.
/// Runs until the task is cancelled.
pub async fn start_gc_worker(runner: JobRunner) {
    let interval = runner.config.poll_interval();
    tracing::info!(
        poll_interval_secs = runner.config.poll_interval_secs,
        collectors = runner.service.collectors().len(),
        "Starting garbage collection worker"
    );

    loop {
        match runner.run_pending(Utc::now()).await {
            Ok(0) => {}
            Ok(ran) => tracing::info!(jobs = ran, "Garbage collection jobs processed"),
            Err(e) => {
                metrics::record_error("queue");
                tracing::error!(error = %e, "Job queue error");
            }
        }
        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::Duration;

    use super::*;
    use crate::{
        db::{DbError, DbResult},
        gc::{Collector, Processor, ProcessorKind},
        jobs::{CollectorJob, JobKind, JobPayload, ensure_default_job},
        models::{MessageLevel, PlannedOperation, RawSql},
        queue::MemoryJobQueue,
    };

    struct TestCollector {
        processors: Vec<ProcessorKind>,
        fail: bool,
        calls: AtomicUsize,
    }

    impl TestCollector {
        fn new(processors: Vec<ProcessorKind>, fail: bool) -> Self {
            Self {
                processors,
                fail,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Collector for TestCollector {
        fn name(&self) -> &str {
            "obsolete_tables"
        }

        fn processors(&self) -> &[ProcessorKind] {
            &self.processors
        }

        async fn collections(&self, _now: DateTime<Utc>) -> DbResult<Vec<PlannedOperation>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(DbError::Internal("database is locked".into()));
            }
            Ok((0..12)
                .map(|i| {
                    PlannedOperation::RawStatement(RawSql {
                        statement: format!(r#"DROP TABLE IF EXISTS "_obsolete_{i}""#),
                        target: format!("_obsolete_{i}"),
                    })
                })
                .collect())
        }
    }

    struct OkProcessor;

    #[async_trait]
    impl Processor for OkProcessor {
        fn kind(&self) -> ProcessorKind {
            ProcessorKind::RawSql
        }

        async fn process(&self, _op: &PlannedOperation) -> DbResult<u64> {
            Ok(1)
        }
    }

    fn runner(collector: Arc<TestCollector>) -> (JobRunner, Arc<MemoryJobQueue>) {
        let queue = Arc::new(MemoryJobQueue::new());
        let collector: Arc<dyn Collector> = collector;
        let processor: Arc<dyn Processor> = Arc::new(OkProcessor);
        let service = Arc::new(GarbageCollectorService::new(
            vec![collector],
            vec![processor],
        ));
        let config = JobsConfig {
            batch_size: 5,
            ..Default::default()
        };
        let shared: Arc<dyn JobQueue> = queue.clone();
        (JobRunner::new(shared, service, config), queue)
    }

    fn collector_job() -> JobPayload {
        JobPayload::Collector(CollectorJob::new("obsolete_tables", 5))
    }

    #[tokio::test]
    async fn test_job_runs_to_completion() {
        let collector = Arc::new(TestCollector::new(vec![ProcessorKind::RawSql], false));
        let (runner, queue) = runner(collector);
        let now = Utc::now();
        let id = queue.enqueue(collector_job(), now).await.unwrap();

        assert_eq!(runner.run_pending(now).await.unwrap(), 1);

        let job = queue.get(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Complete);
        assert_eq!(job.messages.len(), 12);
        assert!(job.messages.iter().all(|m| m.level == MessageLevel::Info));
        let JobPayload::Collector(state) = &job.payload else {
            panic!("expected collector payload");
        };
        assert_eq!(state.total_steps, 3);
        assert_eq!(state.current_step, 3);
        assert!(state.remaining.is_empty());
    }

    #[tokio::test]
    async fn test_no_processors_fails_without_retry() {
        let collector = Arc::new(TestCollector::new(Vec::new(), false));
        let (runner, queue) = runner(collector);
        let now = Utc::now();
        let id = queue.enqueue(collector_job(), now).await.unwrap();

        runner.run_pending(now).await.unwrap();

        let job = queue.get(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.attempts, 0);
        assert_eq!(
            job.last_error.as_deref(),
            Some("No Processors found for collector obsolete_tables")
        );
    }

    #[tokio::test]
    async fn test_transient_failure_retried_then_failed() {
        let collector = Arc::new(TestCollector::new(vec![ProcessorKind::RawSql], true));
        let (runner, queue) = runner(collector.clone());
        let now = Utc::now();
        let id = queue.enqueue(collector_job(), now).await.unwrap();

        runner.run_pending(now).await.unwrap();
        let job = queue.get(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::New);
        assert_eq!(job.attempts, 1);
        assert_eq!(
            job.run_at.timestamp_millis(),
            (now + Duration::seconds(60)).timestamp_millis()
        );

        // Not due yet
        assert_eq!(runner.run_pending(now).await.unwrap(), 0);

        let second = now + Duration::seconds(60);
        runner.run_pending(second).await.unwrap();
        let job = queue.get(id).await.unwrap().unwrap();
        assert_eq!(job.attempts, 2);
        assert_eq!(
            job.run_at.timestamp_millis(),
            (second + Duration::seconds(120)).timestamp_millis()
        );

        runner
            .run_pending(second + Duration::seconds(120))
            .await
            .unwrap();
        let job = queue.get(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.last_error.as_deref(), Some("Store error: Internal error: database is locked"));
        assert_eq!(collector.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_job_left_running_resumes_after_restart() {
        let collector = Arc::new(TestCollector::new(vec![ProcessorKind::RawSql], false));
        let (runner, queue) = runner(collector.clone());
        let now = Utc::now();
        let id = queue.enqueue(collector_job(), now).await.unwrap();

        // First worker sets the job up, runs one step, then stops
        let mut claimed = queue.claim_next(now).await.unwrap().unwrap();
        let ctx = JobContext {
            service: &runner.service,
            queue: queue.as_ref(),
            jobs: &runner.config,
            now,
        };
        claimed.payload.setup(&ctx).await.unwrap();
        let outcome = claimed.payload.process(&ctx).await.unwrap();
        claimed.messages.extend(outcome.messages);
        queue.save(&claimed).await.unwrap();

        // Still within the lease
        assert_eq!(runner.run_pending(now).await.unwrap(), 0);

        let shared: Arc<dyn JobQueue> = queue.clone();
        let restarted = JobRunner::new(shared, runner.service.clone(), runner.config.clone());
        let later = now + Duration::days(30);
        assert_eq!(restarted.run_pending(later).await.unwrap(), 1);

        let job = queue.get(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Complete);
        assert_eq!(job.attempts, 1);
        assert_eq!(job.messages.len(), 12);
        assert_eq!(collector.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_interrupted_sweep_does_not_block_scheduling() {
        let collector = Arc::new(TestCollector::new(vec![ProcessorKind::RawSql], false));
        let (runner, queue) = runner(collector);
        let now = Utc::now();
        ensure_default_job(queue.as_ref(), now)
            .await
            .unwrap()
            .unwrap();
        queue.claim_next(now).await.unwrap().unwrap();

        let later = now + Duration::days(30);
        runner.run_pending(later).await.unwrap();

        assert!(
            queue
                .snapshot()
                .await
                .iter()
                .any(|j| j.kind() == JobKind::RecurringSweep && j.status == JobStatus::Complete)
        );
        assert_eq!(
            queue
                .count_active(JobKind::RecurringSweep)
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_cancelled_job_abandoned() {
        let collector = Arc::new(TestCollector::new(vec![ProcessorKind::RawSql], false));
        let (runner, queue) = runner(collector);
        let now = Utc::now();
        let id = queue.enqueue(collector_job(), now).await.unwrap();

        let claimed = queue.claim_next(now).await.unwrap().unwrap();
        queue.cancel(id).await.unwrap();

        assert_eq!(
            runner.run_job(claimed, now).await.unwrap(),
            JobStatus::Cancelled
        );
        let job = queue.get(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
        assert!(job.messages.is_empty());
    }
}
