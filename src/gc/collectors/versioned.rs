use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::Collector;
use crate::{
    config::VersionedCollectorConfig,
    db::{DbResult, VersionRepo},
    gc::{
        CandidateFinder, DeletionPlanner, ProcessorKind, SchemaRegistry, TableResolver,
        VersionSelector,
    },
    models::PlannedOperation,
};

pub const VERSIONED_COLLECTOR: &str = "versioned";

/// Prunes old versions of versioned records.
///
/// Store failures while looking up candidates or versions skip the affected
/// class or record; this collector never fails discovery as a whole.
pub struct VersionedCollector {
    config: VersionedCollectorConfig,
    registry: Arc<SchemaRegistry>,
    finder: CandidateFinder,
    selector: VersionSelector,
    planner: DeletionPlanner,
}

impl VersionedCollector {
    pub fn new(
        config: VersionedCollectorConfig,
        registry: Arc<SchemaRegistry>,
        resolver: TableResolver,
        versions: Arc<dyn VersionRepo>,
    ) -> Self {
        Self {
            finder: CandidateFinder::new(Arc::clone(&versions), resolver.clone()),
            selector: VersionSelector::new(versions, resolver.clone()),
            planner: DeletionPlanner::new(Arc::clone(&registry), resolver),
            registry,
            config,
        }
    }
}

#[async_trait]
impl Collector for VersionedCollector {
    fn name(&self) -> &str {
        VERSIONED_COLLECTOR
    }

    fn processors(&self) -> &[ProcessorKind] {
        &self.config.processors
    }

    async fn collections(&self, now: DateTime<Utc>) -> DbResult<Vec<PlannedOperation>> {
        let mut operations = Vec::new();

        for name in &self.config.base_classes {
            let Some(class) = self.registry.get(name) else {
                tracing::warn!(class = %name, "Base class is not in the schema, skipping");
                continue;
            };
            let window = self.config.window_for(name);

            for record in self.finder.find_candidate_records(class, &window, now).await {
                let selection = self
                    .selector
                    .select_versions_for_deletion(class, &record, &window, now)
                    .await;

                for (class_name, versions) in &selection {
                    let batches = self.planner.plan_batches(
                        class_name,
                        record.record_id,
                        versions,
                        &window,
                    );
                    if batches.is_empty() {
                        tracing::debug!(
                            class = %class_name,
                            record_id = record.record_id,
                            "No tables for class, skipping versions"
                        );
                    }
                    operations.extend(
                        batches
                            .into_iter()
                            .map(PlannedOperation::ExpressionDeletion),
                    );
                }
            }
        }

        tracing::debug!(operations = operations.len(), "Versioned collection complete");
        Ok(operations)
    }
}
