use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use super::Collector;
use crate::{
    config::ChangeSetCollectorConfig,
    db::{ChangeSetRepo, DbResult},
    gc::ProcessorKind,
    models::{DeleteOperation, KeyFilter, PlannedOperation, TableJoin},
};

pub const CHANGE_SET_COLLECTOR: &str = "change_sets";

/// Removes expired change sets along with their items and item references.
pub struct ChangeSetCollector {
    config: ChangeSetCollectorConfig,
    change_sets: Arc<dyn ChangeSetRepo>,
}

impl ChangeSetCollector {
    pub fn new(config: ChangeSetCollectorConfig, change_sets: Arc<dyn ChangeSetRepo>) -> Self {
        Self {
            config,
            change_sets,
        }
    }

    /// Change sets last edited before this instant have expired.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(Duration::days(i64::from(self.config.deletion_lifetime)))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    fn delete_for(&self, ids: &[i64]) -> DeleteOperation {
        let c = &self.config;
        DeleteOperation {
            table: c.table.clone(),
            filter: KeyFilter::Ids {
                column: "ID".to_string(),
                ids: ids.to_vec(),
            },
            joins: vec![
                TableJoin::on_foreign_key(&c.item_table, &c.table, format!("{}ID", c.table)),
                TableJoin::on_foreign_key(
                    &c.reference_table,
                    &c.item_table,
                    format!("{}ID", c.item_table),
                ),
            ],
        }
    }
}

#[async_trait]
impl Collector for ChangeSetCollector {
    fn name(&self) -> &str {
        CHANGE_SET_COLLECTOR
    }

    fn processors(&self) -> &[ProcessorKind] {
        &self.config.processors
    }

    async fn collections(&self, now: DateTime<Utc>) -> DbResult<Vec<PlannedOperation>> {
        let limit = self
            .config
            .deletion_limit
            .saturating_mul(self.config.query_limit);
        let ids = self
            .change_sets
            .find_expired_ids(&self.config.table, self.cutoff(now), limit)
            .await?;

        tracing::debug!(
            table = %self.config.table,
            expired = ids.len(),
            "Found expired change sets"
        );

        Ok(ids
            .chunks(self.config.deletion_limit.max(1) as usize)
            .map(|chunk| PlannedOperation::ExpressionDeletion(self.delete_for(chunk)))
            .collect())
    }
}
