use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::Collector;
use crate::{
    config::{ObsoleteTableCollectorConfig, is_valid_identifier},
    db::{DbResult, SchemaRepo},
    gc::ProcessorKind,
    models::{PlannedOperation, RawSql},
};

pub const OBSOLETE_TABLE_COLLECTOR: &str = "obsolete_tables";

/// Drops tables left behind by schema changes.
pub struct ObsoleteTableCollector {
    config: ObsoleteTableCollectorConfig,
    schema: Arc<dyn SchemaRepo>,
}

impl ObsoleteTableCollector {
    pub fn new(config: ObsoleteTableCollectorConfig, schema: Arc<dyn SchemaRepo>) -> Self {
        Self { config, schema }
    }

    fn is_skipped(&self, table: &str) -> bool {
        let name = table
            .strip_prefix(&self.config.table_prefix)
            .unwrap_or(table);
        self.config.skip_tables.iter().any(|s| s == name)
    }
}

#[async_trait]
impl Collector for ObsoleteTableCollector {
    fn name(&self) -> &str {
        OBSOLETE_TABLE_COLLECTOR
    }

    fn processors(&self) -> &[ProcessorKind] {
        &self.config.processors
    }

    async fn collections(&self, _now: DateTime<Utc>) -> DbResult<Vec<PlannedOperation>> {
        let tables = self
            .schema
            .list_tables_with_prefix(&self.config.table_prefix)
            .await?;

        let mut operations = Vec::new();
        for table in tables {
            if self.is_skipped(&table) {
                tracing::debug!(%table, "Obsolete table is in the skip list");
                continue;
            }
            if !is_valid_identifier(&table) {
                tracing::warn!(%table, "Obsolete table name cannot be quoted safely, skipping");
                continue;
            }
            operations.push(PlannedOperation::RawStatement(RawSql {
                statement: format!(r#"DROP TABLE IF EXISTS "{table}""#),
                target: table,
            }));
        }
        Ok(operations)
    }
}
