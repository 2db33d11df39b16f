//! Durable job queue and the worker that drains it.

#[cfg(feature = "database-sqlite")]
mod database;
mod error;
mod memory;
mod runner;
mod traits;

use std::sync::Arc;

#[cfg(feature = "database-sqlite")]
pub use database::DatabaseJobQueue;
pub use error::{QueueError, QueueResult};
pub use memory::MemoryJobQueue;
pub use runner::{JobRunner, start_gc_worker};
pub use traits::{JobQueue, JobStatus, QueuedJob, STALE_JOB_ERROR};

use crate::{
    config::{JobQueueConfig, JobsConfig},
    db::DbPool,
};

/// Create the job queue described by configuration.
pub async fn create_queue(
    config: &JobsConfig,
    db: Option<&Arc<DbPool>>,
) -> QueueResult<Arc<dyn JobQueue>> {
    #[cfg(not(feature = "database-sqlite"))]
    let _ = &db;

    let queue: Arc<dyn JobQueue> = match &config.queue {
        JobQueueConfig::Memory => {
            tracing::warn!("Using in-memory job queue; queued jobs are lost on exit");
            Arc::new(MemoryJobQueue::new())
        }

        #[cfg(feature = "database-sqlite")]
        JobQueueConfig::Database { table_name } => {
            let db = db.ok_or_else(|| {
                QueueError::NotConfigured(
                    "Database job queue configured but no database connection available"
                        .to_string(),
                )
            })?;
            let queue = DatabaseJobQueue::new(db.clone(), table_name.clone());
            queue.ensure_table().await?;
            Arc::new(queue)
        }
        #[cfg(not(feature = "database-sqlite"))]
        JobQueueConfig::Database { .. } => {
            return Err(QueueError::NotConfigured(
                "Database job queue configured but no database feature is enabled. \
                Rebuild with: cargo build --features database-sqlite"
                    .to_string(),
            ));
        }
    };

    Ok(queue)
}
