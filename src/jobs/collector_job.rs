use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::{JobContext, JobError, StepOutcome};
use crate::{models::PlannedOperation, observability::metrics};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchPhase {
    #[default]
    Created,
    Running,
    Complete,
}

/// Executes one collector's planned operations in bounded batches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectorJob {
    pub collector: String,
    pub batch_size: usize,
    #[serde(default)]
    pub remaining: VecDeque<PlannedOperation>,
    #[serde(default)]
    pub current_step: u32,
    #[serde(default)]
    pub total_steps: u32,
    #[serde(default)]
    pub phase: BatchPhase,
    /// Operations were supplied up front; setup skips discovery.
    #[serde(default)]
    pub hydrated: bool,
}

impl CollectorJob {
    pub fn new(collector: impl Into<String>, batch_size: usize) -> Self {
        Self {
            collector: collector.into(),
            batch_size,
            remaining: VecDeque::new(),
            current_step: 0,
            total_steps: 0,
            phase: BatchPhase::Created,
            hydrated: false,
        }
    }

    pub fn with_operations(
        collector: impl Into<String>,
        batch_size: usize,
        operations: Vec<PlannedOperation>,
    ) -> Self {
        Self {
            remaining: operations.into(),
            hydrated: true,
            ..Self::new(collector, batch_size)
        }
    }

    pub fn title(&self) -> String {
        format!(
            "Garbage Collection processing for {} collector",
            self.collector
        )
    }

    fn batch_size(&self) -> usize {
        self.batch_size.max(1)
    }

    pub(super) async fn setup(&mut self, ctx: &JobContext<'_>) -> Result<(), JobError> {
        let collector = ctx
            .service
            .collector(&self.collector)
            .ok_or_else(|| JobError::UnknownCollector(self.collector.clone()))?;

        if !self.hydrated {
            self.remaining = collector.collections(ctx.now).await?.into();
        }
        self.total_steps = self.remaining.len().div_ceil(self.batch_size()) as u32;
        self.current_step = 0;
        self.phase = BatchPhase::Running;

        tracing::info!(
            collector = %self.collector,
            operations = self.remaining.len(),
            total_steps = self.total_steps,
            "Collector job set up"
        );
        Ok(())
    }

    pub(super) async fn process(&mut self, ctx: &JobContext<'_>) -> Result<StepOutcome, JobError> {
        if self.remaining.is_empty() {
            self.phase = BatchPhase::Complete;
            return Ok(StepOutcome {
                messages: Vec::new(),
                complete: true,
            });
        }

        let collector = ctx
            .service
            .collector(&self.collector)
            .ok_or_else(|| JobError::UnknownCollector(self.collector.clone()))?;
        let processors = ctx.service.processors_for(collector.as_ref());
        if processors.is_empty() {
            return Err(JobError::NoProcessors(self.collector.clone()));
        }

        self.phase = BatchPhase::Running;
        let take = self.batch_size().min(self.remaining.len());
        let mut messages = Vec::with_capacity(take);
        for op in self.remaining.drain(..take) {
            messages.push(
                ctx.service
                    .process_collection(&self.collector, &processors, &op)
                    .await,
            );
        }

        self.current_step += 1;
        metrics::record_job_step("collector");
        if self.remaining.is_empty() {
            self.phase = BatchPhase::Complete;
        }

        tracing::debug!(
            collector = %self.collector,
            step = self.current_step,
            total_steps = self.total_steps,
            remaining = self.remaining.len(),
            "Collector job step finished"
        );
        Ok(StepOutcome {
            messages,
            complete: self.phase == BatchPhase::Complete,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    use super::*;
    use crate::{
        config::JobsConfig,
        db::DbResult,
        gc::{Collector, GarbageCollectorService, Processor, ProcessorKind},
        models::{MessageLevel, RawSql, RecordList},
        queue::MemoryJobQueue,
    };

    struct StaticCollector {
        name: &'static str,
        processors: Vec<ProcessorKind>,
        operations: Vec<PlannedOperation>,
    }

    #[async_trait]
    impl Collector for StaticCollector {
        fn name(&self) -> &str {
            self.name
        }

        fn processors(&self) -> &[ProcessorKind] {
            &self.processors
        }

        async fn collections(&self, _now: DateTime<Utc>) -> DbResult<Vec<PlannedOperation>> {
            Ok(self.operations.clone())
        }
    }

    #[derive(Default)]
    struct CountingProcessor {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Processor for CountingProcessor {
        fn kind(&self) -> ProcessorKind {
            ProcessorKind::RawSql
        }

        async fn process(&self, _op: &PlannedOperation) -> DbResult<u64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(1)
        }
    }

    fn drops(n: usize) -> Vec<PlannedOperation> {
        (0..n)
            .map(|i| {
                PlannedOperation::RawStatement(RawSql {
                    statement: format!(r#"DROP TABLE IF EXISTS "_obsolete_{i}""#),
                    target: format!("_obsolete_{i}"),
                })
            })
            .collect()
    }

    fn service(
        processors: Vec<ProcessorKind>,
        operations: Vec<PlannedOperation>,
    ) -> (GarbageCollectorService, Arc<CountingProcessor>) {
        let processor = Arc::new(CountingProcessor::default());
        let collector: Arc<dyn Collector> = Arc::new(StaticCollector {
            name: "obsolete_tables",
            processors,
            operations,
        });
        let shared: Arc<dyn Processor> = processor.clone();
        let service = GarbageCollectorService::new(vec![collector], vec![shared]);
        (service, processor)
    }

    #[tokio::test]
    async fn test_twenty_five_items_in_three_steps() {
        let (service, processor) = service(vec![ProcessorKind::RawSql], drops(25));
        let queue = MemoryJobQueue::new();
        let jobs = JobsConfig::default();
        let ctx = JobContext {
            service: &service,
            queue: &queue,
            jobs: &jobs,
            now: Utc::now(),
        };

        let mut job = CollectorJob::new("obsolete_tables", 10);
        job.setup(&ctx).await.unwrap();
        assert_eq!(job.total_steps, 3);
        assert_eq!(job.remaining.len(), 25);

        let mut sizes = Vec::new();
        while job.phase != BatchPhase::Complete {
            let before = job.current_step;
            let outcome = job.process(&ctx).await.unwrap();
            assert_eq!(job.current_step, before + 1);
            sizes.push(outcome.messages.len());
        }
        assert_eq!(sizes, vec![10, 10, 5]);
        assert_eq!(job.current_step, 3);
        assert_eq!(processor.calls.load(Ordering::SeqCst), 25);
    }

    #[tokio::test]
    async fn test_empty_job_completes() {
        let (service, _) = service(vec![ProcessorKind::RawSql], Vec::new());
        let queue = MemoryJobQueue::new();
        let jobs = JobsConfig::default();
        let ctx = JobContext {
            service: &service,
            queue: &queue,
            jobs: &jobs,
            now: Utc::now(),
        };

        let mut job = CollectorJob::new("obsolete_tables", 10);
        job.setup(&ctx).await.unwrap();
        assert_eq!(job.total_steps, 0);
        let outcome = job.process(&ctx).await.unwrap();
        assert!(outcome.complete);
        assert_eq!(job.current_step, 0);
    }

    #[tokio::test]
    async fn test_no_processors_is_fatal() {
        let (service, processor) = service(Vec::new(), drops(3));
        let queue = MemoryJobQueue::new();
        let jobs = JobsConfig::default();
        let ctx = JobContext {
            service: &service,
            queue: &queue,
            jobs: &jobs,
            now: Utc::now(),
        };

        let mut job = CollectorJob::new("obsolete_tables", 10);
        job.setup(&ctx).await.unwrap();
        let err = job.process(&ctx).await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(
            err.to_string(),
            "No Processors found for collector obsolete_tables"
        );
        assert_eq!(job.remaining.len(), 3);
        assert_eq!(processor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unmatched_operations_skipped_with_notice() {
        let mut operations = drops(1);
        operations.push(PlannedOperation::ListDeletion(RecordList {
            table: "ChangeSetItem".into(),
            column: "ID".into(),
            ids: vec![1],
        }));
        let (service, processor) = service(vec![ProcessorKind::RawSql], Vec::new());
        let queue = MemoryJobQueue::new();
        let jobs = JobsConfig::default();
        let ctx = JobContext {
            service: &service,
            queue: &queue,
            jobs: &jobs,
            now: Utc::now(),
        };

        let mut job = CollectorJob::with_operations("obsolete_tables", 10, operations);
        job.setup(&ctx).await.unwrap();
        let outcome = job.process(&ctx).await.unwrap();
        assert!(outcome.complete);
        assert_eq!(outcome.messages[0].level, MessageLevel::Info);
        assert_eq!(outcome.messages[1].level, MessageLevel::Notice);
        assert_eq!(
            outcome.messages[1].text,
            "Unable to find processor for ChangeSetItem"
        );
        assert_eq!(processor.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_collector() {
        let (service, _) = service(vec![ProcessorKind::RawSql], Vec::new());
        let queue = MemoryJobQueue::new();
        let jobs = JobsConfig::default();
        let ctx = JobContext {
            service: &service,
            queue: &queue,
            jobs: &jobs,
            now: Utc::now(),
        };

        let mut job = CollectorJob::new("ghost", 10);
        assert!(matches!(
            job.setup(&ctx).await,
            Err(JobError::UnknownCollector(name)) if name == "ghost"
        ));
    }

    #[test]
    fn test_title() {
        assert_eq!(
            CollectorJob::new("versioned", 10).title(),
            "Garbage Collection processing for versioned collector"
        );
    }
}
