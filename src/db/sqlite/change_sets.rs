use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use super::common::{format_timestamp, quote_ident};
use crate::db::{error::DbResult, repos::ChangeSetRepo};

pub struct SqliteChangeSetRepo {
    pool: SqlitePool,
}

impl SqliteChangeSetRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChangeSetRepo for SqliteChangeSetRepo {
    async fn find_expired_ids(
        &self,
        table: &str,
        cutoff: DateTime<Utc>,
        limit: u32,
    ) -> DbResult<Vec<i64>> {
        let sql = format!(
            "SELECT \"ID\" FROM {} WHERE datetime(\"LastEdited\") < datetime(?) ORDER BY \"ID\" ASC LIMIT ?",
            quote_ident(table)?
        );

        let rows = sqlx::query(&sql)
            .bind(format_timestamp(cutoff))
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(|row| row.get("ID")).collect())
    }
}
