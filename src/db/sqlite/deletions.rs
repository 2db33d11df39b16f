use async_trait::async_trait;
use sqlx::{
    Sqlite, SqlitePool,
    query::Query,
    sqlite::SqliteArguments,
};

use super::common::{placeholders, quote_ident};
use crate::{
    db::{
        error::{DbError, DbResult},
        repos::DeletionRepo,
    },
    models::{DeleteOperation, KeyFilter, RawSql},
};

pub struct SqliteDeletionRepo {
    pool: SqlitePool,
}

impl SqliteDeletionRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Check that every join refers to the base table or an earlier join.
fn validate_joins(op: &DeleteOperation) -> DbResult<()> {
    let mut known = vec![op.table.as_str()];
    for join in &op.joins {
        if !known.contains(&join.parent.as_str()) {
            return Err(DbError::Validation(format!(
                "Join on {} refers to {} before it is joined",
                join.table, join.parent
            )));
        }
        if known.contains(&join.table.as_str()) {
            return Err(DbError::Validation(format!(
                "Table {} appears more than once in delete",
                join.table
            )));
        }
        if join.on.is_empty() {
            return Err(DbError::Validation(format!(
                "Join on {} has no columns",
                join.table
            )));
        }
        known.push(join.table.as_str());
    }
    Ok(())
}

/// Number of joins between `table` and the base table.
fn depth(op: &DeleteOperation, table: &str) -> usize {
    let mut depth = 0;
    let mut current = table;
    while let Some(join) = op.join(current) {
        depth += 1;
        current = &join.parent;
    }
    depth
}

fn filter_condition(op: &DeleteOperation) -> DbResult<String> {
    let base = quote_ident(&op.table)?;
    Ok(match &op.filter {
        KeyFilter::Versions { versions, .. } => format!(
            "{base}.\"RecordID\" = ? AND {base}.\"Version\" IN ({})",
            placeholders(versions.len())
        ),
        KeyFilter::Ids { column, ids } => format!(
            "{base}.{} IN ({})",
            quote_ident(column)?,
            placeholders(ids.len())
        ),
    })
}

/// Condition selecting the rows of `table` that belong to the operation.
///
/// Joined tables are correlated to their parent through nested `EXISTS`
/// subqueries ending at the base table filter.
fn row_condition(op: &DeleteOperation, table: &str) -> DbResult<String> {
    let Some(join) = op.join(table) else {
        return filter_condition(op);
    };

    let this = quote_ident(&join.table)?;
    let parent = quote_ident(&join.parent)?;
    let on = join
        .on
        .iter()
        .map(|c| {
            Ok(format!(
                "{parent}.{} = {this}.{}",
                quote_ident(&c.parent_column)?,
                quote_ident(&c.column)?
            ))
        })
        .collect::<DbResult<Vec<_>>>()?
        .join(" AND ");

    Ok(format!(
        "EXISTS (SELECT 1 FROM {parent} WHERE {on} AND {})",
        row_condition(op, &join.parent)?
    ))
}

fn bind_filter<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    filter: &KeyFilter,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match filter {
        KeyFilter::Versions {
            record_id,
            versions,
        } => {
            query = query.bind(*record_id);
            for version in versions {
                query = query.bind(*version);
            }
        }
        KeyFilter::Ids { ids, .. } => {
            for id in ids {
                query = query.bind(*id);
            }
        }
    }
    query
}

#[async_trait]
impl DeletionRepo for SqliteDeletionRepo {
    async fn execute_delete(&self, op: &DeleteOperation) -> DbResult<u64> {
        if op.key_count() == 0 {
            return Ok(0);
        }
        validate_joins(op)?;

        // Children before parents, so every EXISTS chain still resolves.
        let mut joins: Vec<&str> = op.joins.iter().map(|j| j.table.as_str()).collect();
        joins.sort_by_key(|t| std::cmp::Reverse(depth(op, t)));

        let statements = joins
            .into_iter()
            .chain(std::iter::once(op.table.as_str()))
            .map(|table| {
                Ok(format!(
                    "DELETE FROM {} WHERE {}",
                    quote_ident(table)?,
                    row_condition(op, table)?
                ))
            })
            .collect::<DbResult<Vec<_>>>()?;

        let mut tx = self.pool.begin().await?;
        let mut base_deleted = 0;
        let last = statements.len() - 1;
        for (i, sql) in statements.iter().enumerate() {
            let result = bind_filter(sqlx::query(sql), &op.filter)
                .execute(&mut *tx)
                .await?;
            if i == last {
                base_deleted = result.rows_affected();
            }
        }
        tx.commit().await?;

        Ok(base_deleted)
    }

    async fn delete_row(&self, table: &str, column: &str, id: i64) -> DbResult<u64> {
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?",
            quote_ident(table)?,
            quote_ident(column)?
        );
        let result = sqlx::query(&sql).bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn execute_raw(&self, raw: &RawSql) -> DbResult<()> {
        sqlx::query(&raw.statement).execute(&self.pool).await?;
        Ok(())
    }
}
