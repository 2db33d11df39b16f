use std::{collections::BTreeMap, sync::Arc};

use chrono::{DateTime, Utc};

use super::{EntityClass, RetentionWindow, TableResolver};
use crate::{
    db::VersionRepo,
    models::{CandidateRecord, VersionQuery},
    observability::metrics,
};

/// Versions to delete for one record, keyed by concrete class, each ascending.
pub type VersionSelection = BTreeMap<String, Vec<i64>>;

/// Chooses which versions of a candidate record can go.
pub struct VersionSelector {
    versions: Arc<dyn VersionRepo>,
    resolver: TableResolver,
}

impl VersionSelector {
    pub fn new(versions: Arc<dyn VersionRepo>, resolver: TableResolver) -> Self {
        Self { versions, resolver }
    }

    /// Skips the newest `keep_limit` matching versions and returns at most
    /// `deletion_version_limit * query_limit` of the rest.
    ///
    /// Store errors are logged and produce an empty selection.
    pub async fn select_versions_for_deletion(
        &self,
        class: &EntityClass,
        record: &CandidateRecord,
        window: &RetentionWindow,
        now: DateTime<Utc>,
    ) -> VersionSelection {
        let locale_table = record
            .locale
            .as_ref()
            .and_then(|_| self.resolver.localised_versions_table(class));
        let query = VersionQuery {
            versions_table: self.resolver.versions_table(class),
            locale_table,
            record: record.clone(),
            filter: window.version_filter(now),
            offset: window.keep_limit,
            limit: window.versions_per_pass(),
        };

        let rows = match self.versions.find_eligible_versions(&query).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(
                    class = %class.name,
                    record_id = record.record_id,
                    locale = record.locale.as_deref().unwrap_or(""),
                    error = %e,
                    "Failed to select versions, skipping record"
                );
                metrics::record_error("select_versions");
                return VersionSelection::new();
            }
        };

        let mut selection = VersionSelection::new();
        // Rows arrive newest first
        for row in rows.into_iter().rev() {
            selection.entry(row.class_name).or_default().push(row.version);
        }
        selection
    }
}
