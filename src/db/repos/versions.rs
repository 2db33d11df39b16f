use async_trait::async_trait;

use crate::{
    db::error::DbResult,
    models::{CandidateQuery, CandidateRecord, VersionQuery, VersionRow},
};

#[async_trait]
pub trait VersionRepo: Send + Sync {
    /// Records (or record/locale pairs) with more matching versions than the
    /// query's keep limit, ascending by record ID then locale.
    async fn find_candidate_records(&self, query: &CandidateQuery)
    -> DbResult<Vec<CandidateRecord>>;

    /// Matching versions of one record, newest first, after skipping
    /// `query.offset` rows and returning at most `query.limit`.
    async fn find_eligible_versions(&self, query: &VersionQuery) -> DbResult<Vec<VersionRow>>;
}
