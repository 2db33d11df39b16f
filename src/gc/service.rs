use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};

use super::{
    ChangeSetCollector, Collector, ObsoleteTableCollector, SchemaRegistry, TableResolver,
    VersionedCollector,
    processors::{
        DataListProcessor, Processor, ProcessorKind, RawSqlProcessor, SqlExpressionProcessor,
    },
};
use crate::{
    config::GcConfig,
    db::{DbPool, DbResult},
    models::{JobMessage, PlannedOperation},
    observability::metrics,
};

/// Registered collectors and the processors that execute their operations.
pub struct GarbageCollectorService {
    collectors: Vec<Arc<dyn Collector>>,
    processors: HashMap<ProcessorKind, Arc<dyn Processor>>,
}

impl GarbageCollectorService {
    pub fn new(
        collectors: Vec<Arc<dyn Collector>>,
        processors: Vec<Arc<dyn Processor>>,
    ) -> Self {
        let processors = processors.into_iter().map(|p| (p.kind(), p)).collect();
        Self {
            collectors,
            processors,
        }
    }

    /// Register the enabled collectors and every processor against `db`.
    pub fn from_config(config: &GcConfig, db: &DbPool) -> Self {
        let registry = Arc::new(SchemaRegistry::from_config(&config.schema));
        let resolver = TableResolver::from_config(&config.localisation);
        let collectors_config = &config.collectors;

        let mut collectors: Vec<Arc<dyn Collector>> = Vec::new();
        if collectors_config.versioned.enabled {
            collectors.push(Arc::new(VersionedCollector::new(
                collectors_config.versioned.clone(),
                registry,
                resolver,
                db.versions(),
            )));
        }
        if collectors_config.change_sets.enabled {
            collectors.push(Arc::new(ChangeSetCollector::new(
                collectors_config.change_sets.clone(),
                db.change_sets(),
            )));
        }
        if collectors_config.obsolete_tables.enabled {
            collectors.push(Arc::new(ObsoleteTableCollector::new(
                collectors_config.obsolete_tables.clone(),
                db.schema(),
            )));
        }

        let processors: Vec<Arc<dyn Processor>> = vec![
            Arc::new(SqlExpressionProcessor::new(db.deletions())),
            Arc::new(RawSqlProcessor::new(db.deletions())),
            Arc::new(DataListProcessor::new(db.deletions())),
        ];

        tracing::debug!(
            collectors = ?collectors.iter().map(|c| c.name()).collect::<Vec<_>>(),
            "Garbage collector service configured"
        );
        Self::new(collectors, processors)
    }

    pub fn collectors(&self) -> &[Arc<dyn Collector>] {
        &self.collectors
    }

    pub fn collector(&self, name: &str) -> Option<Arc<dyn Collector>> {
        self.collectors.iter().find(|c| c.name() == name).cloned()
    }

    /// Processors available to a collector, in its declared order.
    pub fn processors_for(&self, collector: &dyn Collector) -> Vec<Arc<dyn Processor>> {
        collector
            .processors()
            .iter()
            .filter_map(|kind| self.processors.get(kind).cloned())
            .collect()
    }

    /// Discover operations for every collector without executing them.
    pub async fn plan(
        &self,
        now: DateTime<Utc>,
    ) -> DbResult<Vec<(String, Vec<PlannedOperation>)>> {
        let mut plans = Vec::with_capacity(self.collectors.len());
        for collector in &self.collectors {
            let operations = collector.collections(now).await?;
            plans.push((collector.name().to_string(), operations));
        }
        Ok(plans)
    }

    /// Run one operation on the first processor that accepts it.
    ///
    /// Processor failures are reported in the returned message; they never
    /// abort the caller.
    pub async fn process_collection(
        &self,
        collector: &str,
        processors: &[Arc<dyn Processor>],
        op: &PlannedOperation,
    ) -> JobMessage {
        let target = op.target();
        let Some(processor) = processors.iter().find(|p| p.accepts(op)) else {
            tracing::info!(
                collector,
                table = target,
                kind = %op.kind(),
                "No processor accepts operation"
            );
            return JobMessage::notice(format!("Unable to find processor for {target}"));
        };

        match processor.process(op).await {
            Ok(count) => {
                let name = processor.kind().name();
                metrics::record_deletion(collector, name, count);
                tracing::debug!(collector, table = target, processor = name, count, "Processed records");
                JobMessage::info(format!("Processed {count} records for {target} using {name}"))
            }
            Err(e) => {
                tracing::warn!(collector, table = target, error = %e, "Unable to process records");
                metrics::record_error("process");
                JobMessage::error(format!("Unable to process records: \"{e}\""))
            }
        }
    }
}
