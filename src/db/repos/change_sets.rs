use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::db::error::DbResult;

#[async_trait]
pub trait ChangeSetRepo: Send + Sync {
    /// IDs of change sets last edited before `cutoff`, ascending, at most `limit`.
    async fn find_expired_ids(
        &self,
        table: &str,
        cutoff: DateTime<Utc>,
        limit: u32,
    ) -> DbResult<Vec<i64>>;
}
