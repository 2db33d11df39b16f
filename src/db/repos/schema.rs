use async_trait::async_trait;

use crate::db::error::DbResult;

#[async_trait]
pub trait SchemaRepo: Send + Sync {
    /// Names of user tables starting with `prefix`, sorted.
    async fn list_tables_with_prefix(&self, prefix: &str) -> DbResult<Vec<String>>;
}
