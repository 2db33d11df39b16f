//! Collector configuration.
//!
//! Each collector can be enabled independently. The versioned collector is
//! driven by a default [`RetentionWindow`] that can be overridden per class.
//!
//! # Example
//!
//! ```toml
//! [collectors.versioned]
//! base_classes = ["Ship", "Page"]
//!
//! [collectors.versioned.retention]
//! keep_limit = 2
//! keep_lifetime = 180
//!
//! [collectors.versioned.overrides.Page]
//! keep_limit = 10
//! delete_published_versions = true
//!
//! [collectors.change_sets]
//! enabled = true
//! deletion_lifetime = 100
//!
//! [collectors.obsolete_tables]
//! enabled = true
//! skip_tables = ["SiteTree_Archive"]
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{ConfigError, is_valid_identifier};
use crate::gc::{ProcessorKind, RetentionOverrides, RetentionWindow};

/// All collector configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct CollectorsConfig {
    #[serde(default)]
    pub versioned: VersionedCollectorConfig,

    #[serde(default)]
    pub change_sets: ChangeSetCollectorConfig,

    #[serde(default)]
    pub obsolete_tables: ObsoleteTableCollectorConfig,
}

impl CollectorsConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.versioned.validate()?;
        self.change_sets.validate()?;
        self.obsolete_tables.validate()?;
        Ok(())
    }

    /// True if any collector is enabled.
    pub fn has_any_enabled(&self) -> bool {
        self.versioned.enabled || self.change_sets.enabled || self.obsolete_tables.enabled
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Versioned records
// ─────────────────────────────────────────────────────────────────────────────

/// Old version history of versioned records.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct VersionedCollectorConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Base classes to sweep. Each must be defined in `[schema]`.
    #[serde(default)]
    pub base_classes: Vec<String>,

    /// Default retention window for every base class.
    #[serde(default)]
    pub retention: RetentionWindow,

    /// Per-class overrides of the default retention window.
    #[serde(default)]
    pub overrides: HashMap<String, RetentionOverrides>,

    /// Processors able to execute this collector's operations, in priority order.
    #[serde(default = "default_expression_processors")]
    pub processors: Vec<ProcessorKind>,
}

impl Default for VersionedCollectorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_classes: Vec::new(),
            retention: RetentionWindow::default(),
            overrides: HashMap::new(),
            processors: default_expression_processors(),
        }
    }
}

impl VersionedCollectorConfig {
    /// Effective retention window for a class.
    pub fn window_for(&self, class: &str) -> RetentionWindow {
        match self.overrides.get(class) {
            Some(overrides) => self.retention.with_overrides(overrides),
            None => self.retention.clone(),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.retention
            .validate()
            .map_err(|e| ConfigError::Validation(format!("collectors.versioned.retention: {e}")))?;
        for (class, overrides) in &self.overrides {
            self.retention
                .with_overrides(overrides)
                .validate()
                .map_err(|e| {
                    ConfigError::Validation(format!("collectors.versioned.overrides.{class}: {e}"))
                })?;
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Change sets
// ─────────────────────────────────────────────────────────────────────────────

/// Expired change sets and their items.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct ChangeSetCollectorConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Days after last edit before a change set is deleted.
    #[serde(default = "default_deletion_lifetime")]
    pub deletion_lifetime: u32,

    /// Change set IDs per delete operation.
    #[serde(default = "default_deletion_limit")]
    pub deletion_limit: u32,

    /// Delete operations per sweep pass.
    #[serde(default = "default_change_set_query_limit")]
    pub query_limit: u32,

    /// Change set table.
    #[serde(default = "default_change_set_table")]
    pub table: String,

    /// Change set item table, joined on `ChangeSetID`.
    #[serde(default = "default_change_set_item_table")]
    pub item_table: String,

    /// Item reference table, joined on `ChangeSetItemID`.
    #[serde(default = "default_change_set_reference_table")]
    pub reference_table: String,

    #[serde(default = "default_expression_processors")]
    pub processors: Vec<ProcessorKind>,
}

impl Default for ChangeSetCollectorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            deletion_lifetime: default_deletion_lifetime(),
            deletion_limit: default_deletion_limit(),
            query_limit: default_change_set_query_limit(),
            table: default_change_set_table(),
            item_table: default_change_set_item_table(),
            reference_table: default_change_set_reference_table(),
            processors: default_expression_processors(),
        }
    }
}

impl ChangeSetCollectorConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.deletion_limit == 0 || self.query_limit == 0 {
            return Err(ConfigError::Validation(
                "collectors.change_sets deletion_limit and query_limit must be at least 1".into(),
            ));
        }
        for table in [&self.table, &self.item_table, &self.reference_table] {
            if !is_valid_identifier(table) {
                return Err(ConfigError::Validation(format!(
                    "collectors.change_sets table '{table}' is not a valid identifier"
                )));
            }
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Obsolete tables
// ─────────────────────────────────────────────────────────────────────────────

/// Tables renamed out of the way by schema migrations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct ObsoleteTableCollectorConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Prefix marking a table as obsolete.
    #[serde(default = "default_table_prefix")]
    pub table_prefix: String,

    /// Table names (without prefix) that must never be dropped.
    #[serde(default)]
    pub skip_tables: Vec<String>,

    #[serde(default = "default_raw_processors")]
    pub processors: Vec<ProcessorKind>,
}

impl Default for ObsoleteTableCollectorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            table_prefix: default_table_prefix(),
            skip_tables: Vec::new(),
            processors: default_raw_processors(),
        }
    }
}

impl ObsoleteTableCollectorConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.table_prefix.is_empty() {
            return Err(ConfigError::Validation(
                "collectors.obsolete_tables.table_prefix cannot be empty".into(),
            ));
        }
        if !is_valid_identifier(&self.table_prefix) {
            return Err(ConfigError::Validation(format!(
                "collectors.obsolete_tables.table_prefix '{}' is not a valid identifier",
                self.table_prefix
            )));
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_expression_processors() -> Vec<ProcessorKind> {
    vec![ProcessorKind::SqlExpression, ProcessorKind::DataList]
}

fn default_raw_processors() -> Vec<ProcessorKind> {
    vec![ProcessorKind::RawSql]
}

fn default_deletion_lifetime() -> u32 {
    100
}

fn default_deletion_limit() -> u32 {
    100
}

fn default_change_set_query_limit() -> u32 {
    5
}

fn default_change_set_table() -> String {
    "ChangeSet".to_string()
}

fn default_change_set_item_table() -> String {
    "ChangeSetItem".to_string()
}

fn default_change_set_reference_table() -> String {
    "ChangeSetItem_ReferencedBy".to_string()
}

fn default_table_prefix() -> String {
    "_obsolete_".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CollectorsConfig::default();
        assert!(config.versioned.enabled);
        assert!(!config.change_sets.enabled);
        assert!(!config.obsolete_tables.enabled);
        assert_eq!(config.versioned.retention.keep_limit, 2);
        assert_eq!(config.versioned.retention.keep_lifetime, 180);
        assert_eq!(config.change_sets.deletion_lifetime, 100);
        assert_eq!(config.change_sets.query_limit, 5);
        assert_eq!(config.obsolete_tables.table_prefix, "_obsolete_");
        assert_eq!(
            config.versioned.processors,
            vec![ProcessorKind::SqlExpression, ProcessorKind::DataList]
        );
    }

    #[test]
    fn test_parse_with_overrides() {
        let config: CollectorsConfig = toml::from_str(
            r#"
            [versioned]
            base_classes = ["Ship", "Page"]

            [versioned.retention]
            keep_limit = 3
            keep_lifetime = 30

            [versioned.overrides.Page]
            keep_limit = 10
            delete_published_versions = true

            [change_sets]
            enabled = true
            deletion_lifetime = 7

            [obsolete_tables]
            enabled = true
            skip_tables = ["Keep"]
        "#,
        )
        .unwrap();

        config.validate().unwrap();
        assert_eq!(config.versioned.base_classes, vec!["Ship", "Page"]);

        let ship = config.versioned.window_for("Ship");
        assert_eq!(ship.keep_limit, 3);
        assert_eq!(ship.keep_lifetime, 30);
        assert!(!ship.delete_published_versions);

        let page = config.versioned.window_for("Page");
        assert_eq!(page.keep_limit, 10);
        assert_eq!(page.keep_lifetime, 30);
        assert!(page.delete_published_versions);

        assert_eq!(config.change_sets.deletion_lifetime, 7);
        assert_eq!(config.obsolete_tables.skip_tables, vec!["Keep"]);
    }

    #[test]
    fn test_invalid_override_rejected() {
        let config: CollectorsConfig = toml::from_str(
            r#"
            [versioned.overrides.Ship]
            deletion_version_limit = 0
        "#,
        )
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("overrides.Ship"));
    }

    #[test]
    fn test_empty_prefix_rejected() {
        let config: CollectorsConfig = toml::from_str(
            r#"
            [obsolete_tables]
            table_prefix = ""
        "#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_processor_names() {
        let config: CollectorsConfig = toml::from_str(
            r#"
            [change_sets]
            processors = ["data_list"]
        "#,
        )
        .unwrap();
        assert_eq!(config.change_sets.processors, vec![ProcessorKind::DataList]);
    }
}
