use async_trait::async_trait;

use crate::{
    db::error::DbResult,
    models::{DeleteOperation, RawSql},
};

#[async_trait]
pub trait DeletionRepo: Send + Sync {
    /// Delete the operation's base rows and every matching joined row in one
    /// transaction. Returns the number of base rows deleted; re-running the
    /// same operation deletes nothing.
    async fn execute_delete(&self, op: &DeleteOperation) -> DbResult<u64>;

    /// Delete a single row by key. Returns rows affected.
    async fn delete_row(&self, table: &str, column: &str, id: i64) -> DbResult<u64>;

    /// Run a raw statement.
    async fn execute_raw(&self, raw: &RawSql) -> DbResult<()>;
}
