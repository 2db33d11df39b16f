//! Retention windows and the reference eligibility rules.
//!
//! [`eligible_versions`] is the in-memory statement of the rules. The store
//! queries issued by the candidate finder and version selector apply the same
//! predicates in SQL; tests cross-check the two.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{VersionFilter, VersionRecord};

/// How much version history a class keeps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct RetentionWindow {
    /// Newest matching versions always kept.
    #[serde(default = "default_keep_limit")]
    pub keep_limit: u32,

    /// Versions edited within this many days are kept.
    #[serde(default = "default_keep_lifetime")]
    pub keep_lifetime: u32,

    /// Count published versions when looking for candidate records.
    #[serde(default)]
    pub delete_published_records: bool,

    /// Allow published versions themselves to be deleted.
    #[serde(default)]
    pub delete_published_versions: bool,

    /// Keep drafts newer than the latest published version.
    #[serde(default)]
    pub keep_unpublished_drafts: bool,

    /// Candidate records per pass for each class.
    #[serde(default = "default_deletion_record_limit")]
    pub deletion_record_limit: u32,

    /// Versions per delete operation.
    #[serde(default = "default_deletion_version_limit")]
    pub deletion_version_limit: u32,

    /// Delete operations per record per pass.
    #[serde(default = "default_query_limit")]
    pub query_limit: u32,
}

impl Default for RetentionWindow {
    fn default() -> Self {
        Self {
            keep_limit: default_keep_limit(),
            keep_lifetime: default_keep_lifetime(),
            delete_published_records: false,
            delete_published_versions: false,
            keep_unpublished_drafts: false,
            deletion_record_limit: default_deletion_record_limit(),
            deletion_version_limit: default_deletion_version_limit(),
            query_limit: default_query_limit(),
        }
    }
}

/// Per-class overrides; unset fields fall back to the default window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct RetentionOverrides {
    pub keep_limit: Option<u32>,
    pub keep_lifetime: Option<u32>,
    pub delete_published_records: Option<bool>,
    pub delete_published_versions: Option<bool>,
    pub keep_unpublished_drafts: Option<bool>,
    pub deletion_record_limit: Option<u32>,
    pub deletion_version_limit: Option<u32>,
    pub query_limit: Option<u32>,
}

impl RetentionWindow {
    pub fn with_overrides(&self, o: &RetentionOverrides) -> Self {
        Self {
            keep_limit: o.keep_limit.unwrap_or(self.keep_limit),
            keep_lifetime: o.keep_lifetime.unwrap_or(self.keep_lifetime),
            delete_published_records: o
                .delete_published_records
                .unwrap_or(self.delete_published_records),
            delete_published_versions: o
                .delete_published_versions
                .unwrap_or(self.delete_published_versions),
            keep_unpublished_drafts: o
                .keep_unpublished_drafts
                .unwrap_or(self.keep_unpublished_drafts),
            deletion_record_limit: o.deletion_record_limit.unwrap_or(self.deletion_record_limit),
            deletion_version_limit: o
                .deletion_version_limit
                .unwrap_or(self.deletion_version_limit),
            query_limit: o.query_limit.unwrap_or(self.query_limit),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.deletion_record_limit == 0 {
            return Err("deletion_record_limit must be at least 1".into());
        }
        if self.deletion_version_limit == 0 {
            return Err("deletion_version_limit must be at least 1".into());
        }
        if self.query_limit == 0 {
            return Err("query_limit must be at least 1".into());
        }
        Ok(())
    }

    /// Versions edited at or before this instant may be deleted.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(Duration::days(i64::from(self.keep_lifetime)))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Filter used to find candidate records.
    pub fn record_filter(&self, now: DateTime<Utc>) -> VersionFilter {
        VersionFilter {
            cutoff: self.cutoff(now),
            include_published: self.delete_published_records,
            keep_unpublished_drafts: self.keep_unpublished_drafts,
        }
    }

    /// Filter used to select a record's deletable versions.
    pub fn version_filter(&self, now: DateTime<Utc>) -> VersionFilter {
        VersionFilter {
            cutoff: self.cutoff(now),
            include_published: self.delete_published_versions,
            keep_unpublished_drafts: self.keep_unpublished_drafts,
        }
    }

    /// Most versions selected for one record in a single pass.
    pub fn versions_per_pass(&self) -> u32 {
        self.deletion_version_limit.saturating_mul(self.query_limit)
    }
}

/// Versions of one record that may be deleted, oldest first.
///
/// `history` may be in any order and must belong to a single record.
pub fn eligible_versions<'a>(
    window: &RetentionWindow,
    now: DateTime<Utc>,
    history: &'a [VersionRecord],
) -> Vec<&'a VersionRecord> {
    let filter = window.version_filter(now);

    let latest_published = history
        .iter()
        .filter(|v| v.was_published)
        .map(|v| v.version)
        .max();

    if filter.keep_unpublished_drafts && latest_published.is_none() {
        return Vec::new();
    }

    let mut matching: Vec<&VersionRecord> = history
        .iter()
        .filter(|v| v.has_class_name())
        .filter(|v| v.last_edited <= filter.cutoff)
        .filter(|v| filter.include_published || !v.was_published)
        .filter(|v| {
            !filter.keep_unpublished_drafts || latest_published.is_some_and(|max| v.version <= max)
        })
        .collect();

    matching.sort_by(|a, b| b.version.cmp(&a.version));

    let mut eligible: Vec<&VersionRecord> = matching
        .into_iter()
        .skip(window.keep_limit as usize)
        .collect();
    eligible.reverse();
    eligible
}

fn default_keep_limit() -> u32 {
    2
}

fn default_keep_lifetime() -> u32 {
    180
}

fn default_deletion_record_limit() -> u32 {
    100
}

fn default_deletion_version_limit() -> u32 {
    100
}

fn default_query_limit() -> u32 {
    10
}
