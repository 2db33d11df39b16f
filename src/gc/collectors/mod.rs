//! Collectors discover deletable data and describe how to remove it.

mod change_set;
mod obsolete_table;
mod versioned;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
pub use change_set::ChangeSetCollector;
pub use obsolete_table::ObsoleteTableCollector;
pub use versioned::VersionedCollector;

use super::ProcessorKind;
use crate::{db::DbResult, models::PlannedOperation};

#[async_trait]
pub trait Collector: Send + Sync {
    /// Registry name, used on the command line and in job payloads.
    fn name(&self) -> &str;

    /// Processors this collector's operations may run on, in preference order.
    fn processors(&self) -> &[ProcessorKind];

    /// Everything currently eligible for deletion.
    async fn collections(&self, now: DateTime<Utc>) -> DbResult<Vec<PlannedOperation>>;
}
