mod error;
pub mod repos;
#[cfg(feature = "database-sqlite")]
pub mod sqlite;

#[cfg(all(test, feature = "database-sqlite"))]
pub mod tests;

use std::sync::Arc;

pub use error::{DbError, DbResult};
pub use repos::*;

use crate::config::DatabaseConfig;

/// Cached repository trait objects, created once at startup.
struct CachedRepos {
    versions: Arc<dyn VersionRepo>,
    change_sets: Arc<dyn ChangeSetRepo>,
    schema: Arc<dyn SchemaRepo>,
    deletions: Arc<dyn DeletionRepo>,
}

enum PoolStorage {
    #[cfg(feature = "database-sqlite")]
    Sqlite(sqlx::SqlitePool),
    #[cfg(not(feature = "database-sqlite"))]
    _None(std::convert::Infallible),
}

/// Borrowed reference to the underlying database pool.
/// Used for database-specific operations that need direct pool access.
pub enum DbPoolRef<'a> {
    #[cfg(feature = "database-sqlite")]
    Sqlite(&'a sqlx::SqlitePool),
    #[cfg(not(feature = "database-sqlite"))]
    _None(std::convert::Infallible, std::marker::PhantomData<&'a ()>),
}

/// Database pool and the repositories the collectors run against.
///
/// Repositories are cached at construction time to avoid allocation on each access.
pub struct DbPool {
    inner: PoolStorage,
    repos: CachedRepos,
}

impl DbPool {
    /// Create a DbPool from an existing SQLite pool.
    /// Primarily useful for testing.
    #[cfg(feature = "database-sqlite")]
    pub fn from_sqlite(pool: sqlx::SqlitePool) -> Self {
        let repos = CachedRepos {
            versions: Arc::new(sqlite::SqliteVersionRepo::new(pool.clone())),
            change_sets: Arc::new(sqlite::SqliteChangeSetRepo::new(pool.clone())),
            schema: Arc::new(sqlite::SqliteSchemaRepo::new(pool.clone())),
            deletions: Arc::new(sqlite::SqliteDeletionRepo::new(pool.clone())),
        };
        Self {
            inner: PoolStorage::Sqlite(pool),
            repos,
        }
    }

    /// Create a database pool from configuration
    pub async fn from_config(config: &DatabaseConfig) -> DbResult<Self> {
        match config {
            DatabaseConfig::None => Err(DbError::NotConfigured),
            #[cfg(feature = "database-sqlite")]
            DatabaseConfig::Sqlite(cfg) => {
                let pool = sqlx::sqlite::SqlitePoolOptions::new()
                    .max_connections(cfg.max_connections)
                    .connect_with(
                        sqlx::sqlite::SqliteConnectOptions::new()
                            .filename(&cfg.path)
                            .create_if_missing(cfg.create_if_missing)
                            .journal_mode(if cfg.wal_mode {
                                sqlx::sqlite::SqliteJournalMode::Wal
                            } else {
                                sqlx::sqlite::SqliteJournalMode::Delete
                            })
                            .busy_timeout(std::time::Duration::from_millis(cfg.busy_timeout_ms)),
                    )
                    .await?;

                tracing::debug!(
                    path = %cfg.path,
                    max_connections = cfg.max_connections,
                    "Connected to SQLite database"
                );

                let db = Self::from_sqlite(pool);
                if cfg.run_migrations {
                    db.run_migrations().await?;
                }
                Ok(db)
            }
        }
    }

    /// Run database migrations using sqlx's migration runner.
    /// This automatically creates and manages a _sqlx_migrations table.
    pub async fn run_migrations(&self) -> DbResult<()> {
        match &self.inner {
            #[cfg(feature = "database-sqlite")]
            PoolStorage::Sqlite(pool) => {
                tracing::info!("Running SQLite migrations");
                sqlx::migrate!("./migrations_sqlx/sqlite").run(pool).await?;
                tracing::info!("SQLite migrations completed successfully");
                Ok(())
            }
            #[cfg(not(feature = "database-sqlite"))]
            PoolStorage::_None(infallible) => match *infallible {},
        }
    }

    /// Get version history repository
    pub fn versions(&self) -> Arc<dyn VersionRepo> {
        Arc::clone(&self.repos.versions)
    }

    /// Get change set repository
    pub fn change_sets(&self) -> Arc<dyn ChangeSetRepo> {
        Arc::clone(&self.repos.change_sets)
    }

    /// Get schema introspection repository
    pub fn schema(&self) -> Arc<dyn SchemaRepo> {
        Arc::clone(&self.repos.schema)
    }

    /// Get deletion repository
    pub fn deletions(&self) -> Arc<dyn DeletionRepo> {
        Arc::clone(&self.repos.deletions)
    }

    /// Get a reference to the underlying database pool.
    /// Useful for database-specific operations that need direct pool access.
    pub fn pool(&self) -> DbPoolRef<'_> {
        match &self.inner {
            #[cfg(feature = "database-sqlite")]
            PoolStorage::Sqlite(pool) => DbPoolRef::Sqlite(pool),
            #[cfg(not(feature = "database-sqlite"))]
            PoolStorage::_None(infallible) => match *infallible {},
        }
    }

    /// Health check for database connectivity
    pub async fn health_check(&self) -> DbResult<()> {
        match &self.inner {
            #[cfg(feature = "database-sqlite")]
            PoolStorage::Sqlite(pool) => {
                sqlx::query("SELECT 1").execute(pool).await?;
                Ok(())
            }
            #[cfg(not(feature = "database-sqlite"))]
            PoolStorage::_None(infallible) => match *infallible {},
        }
    }
}
