use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::{EntityClass, RetentionWindow, TableResolver};
use crate::{
    db::VersionRepo,
    models::{CandidateQuery, CandidateRecord},
    observability::metrics,
};

/// Finds records holding more history than their retention window keeps.
pub struct CandidateFinder {
    versions: Arc<dyn VersionRepo>,
    resolver: TableResolver,
}

impl CandidateFinder {
    pub fn new(versions: Arc<dyn VersionRepo>, resolver: TableResolver) -> Self {
        Self { versions, resolver }
    }

    /// At most `window.deletion_record_limit` candidates for a base class,
    /// ascending by record ID (then locale).
    ///
    /// Store errors are logged and reported as "nothing to do".
    pub async fn find_candidate_records(
        &self,
        class: &EntityClass,
        window: &RetentionWindow,
        now: DateTime<Utc>,
    ) -> Vec<CandidateRecord> {
        let query = CandidateQuery {
            versions_table: self.resolver.versions_table(class),
            locale_table: self.resolver.localised_versions_table(class),
            filter: window.record_filter(now),
            keep_limit: window.keep_limit,
            limit: window.deletion_record_limit,
        };

        match self.versions.find_candidate_records(&query).await {
            Ok(records) => {
                tracing::debug!(
                    class = %class.name,
                    table = %query.versions_table,
                    candidates = records.len(),
                    "Found candidate records"
                );
                records
            }
            Err(e) => {
                tracing::warn!(
                    class = %class.name,
                    table = %query.versions_table,
                    error = %e,
                    "Failed to find candidate records, skipping class"
                );
                metrics::record_error("find_candidates");
                Vec::new()
            }
        }
    }
}
