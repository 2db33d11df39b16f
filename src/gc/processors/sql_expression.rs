use std::sync::Arc;

use async_trait::async_trait;

use super::{Processor, ProcessorKind};
use crate::{
    db::{DbError, DbResult, DeletionRepo},
    models::PlannedOperation,
};

/// Runs keyed deletes across a base table and its joined tables.
pub struct SqlExpressionProcessor {
    deletions: Arc<dyn DeletionRepo>,
}

impl SqlExpressionProcessor {
    pub fn new(deletions: Arc<dyn DeletionRepo>) -> Self {
        Self { deletions }
    }
}

#[async_trait]
impl Processor for SqlExpressionProcessor {
    fn kind(&self) -> ProcessorKind {
        ProcessorKind::SqlExpression
    }

    async fn process(&self, op: &PlannedOperation) -> DbResult<u64> {
        let PlannedOperation::ExpressionDeletion(delete) = op else {
            return Err(DbError::Internal(format!(
                "{} cannot process {} operations",
                self.kind(),
                op.kind()
            )));
        };
        self.deletions.execute_delete(delete).await
    }
}
