//! Executors for planned operations.
//!
//! Each processor accepts exactly one [`OperationKind`]; a collector lists
//! the processors it may use and the first one accepting an operation runs it.

mod data_list;
mod raw_sql;
mod sql_expression;

use async_trait::async_trait;
pub use data_list::DataListProcessor;
pub use raw_sql::RawSqlProcessor;
use serde::{Deserialize, Serialize};
pub use sql_expression::SqlExpressionProcessor;

use crate::{
    db::DbResult,
    models::{OperationKind, PlannedOperation},
};

/// Processor identifiers used in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(rename_all = "snake_case")]
pub enum ProcessorKind {
    SqlExpression,
    RawSql,
    DataList,
}

impl ProcessorKind {
    pub fn accepts(self, kind: OperationKind) -> bool {
        matches!(
            (self, kind),
            (ProcessorKind::SqlExpression, OperationKind::ExpressionDeletion)
                | (ProcessorKind::RawSql, OperationKind::RawStatement)
                | (ProcessorKind::DataList, OperationKind::ListDeletion)
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            ProcessorKind::SqlExpression => "SqlExpressionProcessor",
            ProcessorKind::RawSql => "RawSqlProcessor",
            ProcessorKind::DataList => "DataListProcessor",
        }
    }
}

impl std::fmt::Display for ProcessorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[async_trait]
pub trait Processor: Send + Sync {
    fn kind(&self) -> ProcessorKind;

    fn accepts(&self, op: &PlannedOperation) -> bool {
        self.kind().accepts(op.kind())
    }

    /// Execute the operation, returning the number of records affected.
    async fn process(&self, op: &PlannedOperation) -> DbResult<u64>;
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(ProcessorKind::SqlExpression, OperationKind::ExpressionDeletion, true)]
    #[case(ProcessorKind::SqlExpression, OperationKind::ListDeletion, false)]
    #[case(ProcessorKind::RawSql, OperationKind::RawStatement, true)]
    #[case(ProcessorKind::RawSql, OperationKind::ExpressionDeletion, false)]
    #[case(ProcessorKind::DataList, OperationKind::ListDeletion, true)]
    #[case(ProcessorKind::DataList, OperationKind::RawStatement, false)]
    fn test_processor_accepts(
        #[case] processor: ProcessorKind,
        #[case] kind: OperationKind,
        #[case] expected: bool,
    ) {
        assert_eq!(processor.accepts(kind), expected);
    }

    #[test]
    fn test_processor_kind_config_names() {
        let kinds: Vec<ProcessorKind> =
            serde_json::from_str(r#"["sql_expression", "raw_sql", "data_list"]"#).unwrap();
        assert_eq!(
            kinds,
            vec![
                ProcessorKind::SqlExpression,
                ProcessorKind::RawSql,
                ProcessorKind::DataList
            ]
        );
        assert_eq!(ProcessorKind::DataList.to_string(), "DataListProcessor");
    }
}
