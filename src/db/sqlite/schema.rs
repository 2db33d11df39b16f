use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use super::common::escape_like;
use crate::db::{error::DbResult, repos::SchemaRepo};

pub struct SqliteSchemaRepo {
    pool: SqlitePool,
}

impl SqliteSchemaRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SchemaRepo for SqliteSchemaRepo {
    async fn list_tables_with_prefix(&self, prefix: &str) -> DbResult<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT name FROM sqlite_master
            WHERE type = 'table' AND name LIKE ? ESCAPE '\'
            ORDER BY name
            "#,
        )
        .bind(format!("{}%", escape_like(prefix)))
        .fetch_all(&self.pool)
        .await?;

        // LIKE is case-insensitive for ASCII in SQLite
        Ok(rows
            .iter()
            .map(|row| row.get::<String, _>("name"))
            .filter(|name| name.starts_with(prefix))
            .collect())
    }
}
