use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use super::common::{format_timestamp, quote_ident};
use crate::{
    db::{error::DbResult, repos::VersionRepo},
    models::{CandidateQuery, CandidateRecord, VersionFilter, VersionQuery, VersionRow},
};

pub struct SqliteVersionRepo {
    pool: SqlitePool,
}

impl SqliteVersionRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// `FROM` clause shared by both lookups. `v` is the versions table, `l` the
/// localised table and `p` the latest published version per record.
fn from_clause(
    versions_table: &str,
    locale_table: Option<&str>,
    filter: &VersionFilter,
) -> DbResult<String> {
    let versions = quote_ident(versions_table)?;
    let mut sql = format!("FROM {versions} v");

    if let Some(locale_table) = locale_table {
        let localised = quote_ident(locale_table)?;
        sql.push_str(&format!(
            " INNER JOIN {localised} l ON l.\"RecordID\" = v.\"RecordID\" AND l.\"Version\" = v.\"Version\""
        ));
    }

    if filter.keep_unpublished_drafts {
        sql.push_str(&format!(
            " INNER JOIN (SELECT \"RecordID\", MAX(\"Version\") AS max_published \
             FROM {versions} WHERE \"WasPublished\" = 1 GROUP BY \"RecordID\") p \
             ON p.\"RecordID\" = v.\"RecordID\""
        ));
    }

    Ok(sql)
}

/// Retention predicates; binds one parameter (the cutoff).
fn filter_clause(filter: &VersionFilter) -> String {
    let mut sql = String::from(
        "datetime(v.\"LastEdited\") <= datetime(?) \
         AND v.\"ClassName\" IS NOT NULL AND v.\"ClassName\" != ''",
    );
    if !filter.include_published {
        sql.push_str(" AND v.\"WasPublished\" = 0");
    }
    if filter.keep_unpublished_drafts {
        sql.push_str(" AND v.\"Version\" <= p.max_published");
    }
    sql
}

#[async_trait]
impl VersionRepo for SqliteVersionRepo {
    async fn find_candidate_records(
        &self,
        query: &CandidateQuery,
    ) -> DbResult<Vec<CandidateRecord>> {
        let localised = query.locale_table.is_some();
        let select = if localised {
            "SELECT v.\"RecordID\" AS record_id, l.\"Locale\" AS locale"
        } else {
            "SELECT v.\"RecordID\" AS record_id"
        };
        let (group, order) = if localised {
            (
                "v.\"RecordID\", l.\"Locale\"",
                "v.\"RecordID\" ASC, l.\"Locale\" ASC",
            )
        } else {
            ("v.\"RecordID\"", "v.\"RecordID\" ASC")
        };

        let sql = format!(
            "{select} {from} WHERE {filter} GROUP BY {group} HAVING COUNT(*) > ? ORDER BY {order} LIMIT ?",
            from = from_clause(
                &query.versions_table,
                query.locale_table.as_deref(),
                &query.filter
            )?,
            filter = filter_clause(&query.filter),
        );

        let rows = sqlx::query(&sql)
            .bind(format_timestamp(query.filter.cutoff))
            .bind(i64::from(query.keep_limit))
            .bind(i64::from(query.limit))
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| CandidateRecord {
                record_id: row.get("record_id"),
                locale: if localised { row.get("locale") } else { None },
            })
            .collect())
    }

    async fn find_eligible_versions(&self, query: &VersionQuery) -> DbResult<Vec<VersionRow>> {
        let locale = query
            .locale_table
            .as_ref()
            .and(query.record.locale.as_deref());
        let locale_clause = if locale.is_some() {
            " AND l.\"Locale\" = ?"
        } else {
            ""
        };

        let sql = format!(
            "SELECT v.\"Version\" AS version, v.\"ClassName\" AS class_name {from} \
             WHERE v.\"RecordID\" = ? AND {filter}{locale_clause} \
             ORDER BY v.\"Version\" DESC LIMIT ? OFFSET ?",
            from = from_clause(
                &query.versions_table,
                query.locale_table.as_deref(),
                &query.filter
            )?,
            filter = filter_clause(&query.filter),
        );

        let mut q = sqlx::query(&sql)
            .bind(query.record.record_id)
            .bind(format_timestamp(query.filter.cutoff));
        if let Some(locale) = locale {
            q = q.bind(locale);
        }
        let rows = q
            .bind(i64::from(query.limit))
            .bind(i64::from(query.offset))
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| VersionRow {
                version: row.get("version"),
                class_name: row.get("class_name"),
            })
            .collect())
    }
}
