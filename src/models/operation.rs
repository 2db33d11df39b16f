use serde::{Deserialize, Serialize};

/// A unit of deletion work produced by a collector.
///
/// Serialisable so the job queue can persist the remaining work of a job
/// between steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlannedOperation {
    /// A raw statement such as `DROP TABLE`.
    RawStatement(RawSql),
    /// Rows deleted one at a time by primary key.
    ListDeletion(RecordList),
    /// A keyed delete across a base table and its joined tables.
    ExpressionDeletion(DeleteOperation),
}

/// Discriminant of [`PlannedOperation`], used for processor dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    RawStatement,
    ListDeletion,
    ExpressionDeletion,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationKind::RawStatement => write!(f, "raw_statement"),
            OperationKind::ListDeletion => write!(f, "list_deletion"),
            OperationKind::ExpressionDeletion => write!(f, "expression_deletion"),
        }
    }
}

impl PlannedOperation {
    pub fn kind(&self) -> OperationKind {
        match self {
            PlannedOperation::RawStatement(_) => OperationKind::RawStatement,
            PlannedOperation::ListDeletion(_) => OperationKind::ListDeletion,
            PlannedOperation::ExpressionDeletion(_) => OperationKind::ExpressionDeletion,
        }
    }

    /// Table the operation targets, for operator messages.
    pub fn target(&self) -> &str {
        match self {
            PlannedOperation::RawStatement(raw) => &raw.target,
            PlannedOperation::ListDeletion(list) => &list.table,
            PlannedOperation::ExpressionDeletion(op) => &op.table,
        }
    }
}

/// A raw statement and the table it affects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSql {
    pub statement: String,
    pub target: String,
}

/// Primary keys of rows in a single table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordList {
    pub table: String,
    pub column: String,
    pub ids: Vec<i64>,
}

/// A delete keyed on the base table, extended to every joined table.
///
/// SQLite has no multi-table `DELETE ... JOIN`, so executors delete joined
/// rows (deepest first) before the base rows, inside one transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteOperation {
    pub table: String,
    pub filter: KeyFilter,
    /// Joined tables, each referring to the base table or an earlier join.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub joins: Vec<TableJoin>,
}

impl DeleteOperation {
    /// Every table touched, base first.
    pub fn tables(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.table.as_str()).chain(self.joins.iter().map(|j| j.table.as_str()))
    }

    /// Number of keys the filter names.
    pub fn key_count(&self) -> usize {
        match &self.filter {
            KeyFilter::Versions { versions, .. } => versions.len(),
            KeyFilter::Ids { ids, .. } => ids.len(),
        }
    }

    pub fn join(&self, table: &str) -> Option<&TableJoin> {
        self.joins.iter().find(|j| j.table == table)
    }
}

/// Rows of the base table to delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum KeyFilter {
    /// `RecordID = record_id AND Version IN (versions)`.
    Versions { record_id: i64, versions: Vec<i64> },
    /// `<column> IN (ids)`.
    Ids { column: String, ids: Vec<i64> },
}

/// A table left-joined into a [`DeleteOperation`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableJoin {
    pub table: String,
    /// Table this one is joined to.
    pub parent: String,
    pub on: Vec<JoinColumn>,
}

impl TableJoin {
    /// Join on matching `(RecordID, Version)` keys.
    pub fn on_version_key(table: impl Into<String>, parent: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            parent: parent.into(),
            on: vec![
                JoinColumn::same("RecordID"),
                JoinColumn::same("Version"),
            ],
        }
    }

    /// Join on `parent.ID = table.<column>`.
    pub fn on_foreign_key(
        table: impl Into<String>,
        parent: impl Into<String>,
        column: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            parent: parent.into(),
            on: vec![JoinColumn {
                parent_column: "ID".to_string(),
                column: column.into(),
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinColumn {
    pub parent_column: String,
    pub column: String,
}

impl JoinColumn {
    pub fn same(column: &str) -> Self {
        Self {
            parent_column: column.to_string(),
            column: column.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ship_delete() -> DeleteOperation {
        DeleteOperation {
            table: "Ship_Versions".into(),
            filter: KeyFilter::Versions {
                record_id: 1,
                versions: vec![1, 2, 3],
            },
            joins: vec![TableJoin::on_version_key("CargoShip_Versions", "Ship_Versions")],
        }
    }

    #[test]
    fn test_kind_and_target() {
        let op = PlannedOperation::ExpressionDeletion(ship_delete());
        assert_eq!(op.kind(), OperationKind::ExpressionDeletion);
        assert_eq!(op.target(), "Ship_Versions");

        let raw = PlannedOperation::RawStatement(RawSql {
            statement: "DROP TABLE IF EXISTS \"_obsolete_Foo\"".into(),
            target: "_obsolete_Foo".into(),
        });
        assert_eq!(raw.kind(), OperationKind::RawStatement);
        assert_eq!(raw.target(), "_obsolete_Foo");
    }

    #[test]
    fn test_tables_base_first() {
        let op = ship_delete();
        assert_eq!(
            op.tables().collect::<Vec<_>>(),
            vec!["Ship_Versions", "CargoShip_Versions"]
        );
        assert_eq!(op.key_count(), 3);
    }

    #[test]
    fn test_serialized_shape() {
        let op = PlannedOperation::ExpressionDeletion(ship_delete());
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["type"], "expression_deletion");
        assert_eq!(json["filter"]["by"], "versions");
        assert_eq!(json["joins"][0]["table"], "CargoShip_Versions");

        let back: PlannedOperation = serde_json::from_value(json).unwrap();
        assert_eq!(back, op);
    }
}
