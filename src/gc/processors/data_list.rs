use std::sync::Arc;

use async_trait::async_trait;

use super::{Processor, ProcessorKind};
use crate::{
    db::{DbError, DbResult, DeletionRepo},
    models::PlannedOperation,
};

/// Deletes listed rows one at a time by key.
pub struct DataListProcessor {
    deletions: Arc<dyn DeletionRepo>,
}

impl DataListProcessor {
    pub fn new(deletions: Arc<dyn DeletionRepo>) -> Self {
        Self { deletions }
    }
}

#[async_trait]
impl Processor for DataListProcessor {
    fn kind(&self) -> ProcessorKind {
        ProcessorKind::DataList
    }

    async fn process(&self, op: &PlannedOperation) -> DbResult<u64> {
        let PlannedOperation::ListDeletion(list) = op else {
            return Err(DbError::Internal(format!(
                "{} cannot process {} operations",
                self.kind(),
                op.kind()
            )));
        };

        let mut deleted = 0;
        for id in &list.ids {
            deleted += self
                .deletions
                .delete_row(&list.table, &list.column, *id)
                .await?;
        }
        Ok(deleted)
    }
}
