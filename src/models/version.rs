use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One row of a `<Table>_Versions` history table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub record_id: i64,
    /// Strictly increasing per record, never reused.
    pub version: i64,
    /// Concrete class of the record at this version. Rows without one are
    /// never eligible for deletion.
    pub class_name: Option<String>,
    pub last_edited: DateTime<Utc>,
    pub was_published: bool,
}

impl VersionRecord {
    pub fn has_class_name(&self) -> bool {
        self.class_name.as_deref().is_some_and(|c| !c.is_empty())
    }
}

/// A record (optionally narrowed to one locale) holding more versions than
/// its retention window keeps.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub record_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
}

impl CandidateRecord {
    pub fn new(record_id: i64) -> Self {
        Self {
            record_id,
            locale: None,
        }
    }

    pub fn localised(record_id: i64, locale: impl Into<String>) -> Self {
        Self {
            record_id,
            locale: Some(locale.into()),
        }
    }
}

/// A version eligible for deletion together with its concrete class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRow {
    pub version: i64,
    pub class_name: String,
}

/// Retention predicates shared by candidate and version queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionFilter {
    /// Rows edited after this instant are kept.
    pub cutoff: DateTime<Utc>,
    /// When false only unpublished rows are considered.
    pub include_published: bool,
    /// When true rows newer than the record's latest published version are kept.
    pub keep_unpublished_drafts: bool,
}

/// Candidate lookup for one base class.
#[derive(Debug, Clone)]
pub struct CandidateQuery {
    /// `<Table>_Versions` of the base class.
    pub versions_table: String,
    /// `<Table>_Localised_Versions`; when set, candidates are grouped per locale.
    pub locale_table: Option<String>,
    pub filter: VersionFilter,
    /// Records need strictly more than this many matching versions.
    pub keep_limit: u32,
    pub limit: u32,
}

/// Eligible-version lookup for one record.
#[derive(Debug, Clone)]
pub struct VersionQuery {
    pub versions_table: String,
    pub locale_table: Option<String>,
    pub record: CandidateRecord,
    pub filter: VersionFilter,
    /// Newest matching versions skipped.
    pub offset: u32,
    pub limit: u32,
}
