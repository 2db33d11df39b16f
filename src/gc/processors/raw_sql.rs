use std::sync::Arc;

use async_trait::async_trait;

use super::{Processor, ProcessorKind};
use crate::{
    db::{DbError, DbResult, DeletionRepo},
    models::PlannedOperation,
};

/// Runs raw statements. Always reports one record processed.
pub struct RawSqlProcessor {
    deletions: Arc<dyn DeletionRepo>,
}

impl RawSqlProcessor {
    pub fn new(deletions: Arc<dyn DeletionRepo>) -> Self {
        Self { deletions }
    }
}

#[async_trait]
impl Processor for RawSqlProcessor {
    fn kind(&self) -> ProcessorKind {
        ProcessorKind::RawSql
    }

    async fn process(&self, op: &PlannedOperation) -> DbResult<u64> {
        let PlannedOperation::RawStatement(raw) = op else {
            return Err(DbError::Internal(format!(
                "{} cannot process {} operations",
                self.kind(),
                op.kind()
            )));
        };
        self.deletions.execute_raw(raw).await?;
        Ok(1)
    }
}
