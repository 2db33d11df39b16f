//! Entity class and localisation configuration.
//!
//! Classes describe the versioned tables the collectors operate on. A class
//! with a `parent` inherits its parent's tables (multi-table inheritance):
//! deleting a version of a subclass instance removes rows from every table in
//! its ancestry.
//!
//! # Example
//!
//! ```toml
//! [[schema.classes]]
//! name = "Ship"
//!
//! [[schema.classes]]
//! name = "CargoShip"
//! parent = "Ship"
//!
//! [localisation]
//! enabled = true
//! ```

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::{ConfigError, is_valid_identifier};

/// Schema configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct SchemaConfig {
    /// Known entity classes.
    #[serde(default)]
    pub classes: Vec<EntityClassConfig>,
}

/// A single entity class.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct EntityClassConfig {
    /// Class name, as stored in the `ClassName` column of version rows.
    pub name: String,

    /// Table name. Defaults to the class name.
    #[serde(default)]
    pub table: Option<String>,

    /// Parent class, for multi-table inheritance.
    #[serde(default)]
    pub parent: Option<String>,

    /// Whether the class keeps a `<Table>_Versions` history table.
    #[serde(default = "default_true")]
    pub versioned: bool,

    /// Whether the class keeps a `<Table>_Localised_Versions` table.
    #[serde(default)]
    pub localised: bool,
}

impl EntityClassConfig {
    pub fn table_name(&self) -> &str {
        self.table.as_deref().unwrap_or(&self.name)
    }
}

impl SchemaConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut by_name = HashMap::new();
        for class in &self.classes {
            if !is_valid_identifier(&class.name) {
                return Err(ConfigError::Validation(format!(
                    "schema class name '{}' is not a valid identifier",
                    class.name
                )));
            }
            if !is_valid_identifier(class.table_name()) {
                return Err(ConfigError::Validation(format!(
                    "schema class '{}' has invalid table name '{}'",
                    class.name,
                    class.table_name()
                )));
            }
            if by_name.insert(class.name.as_str(), class).is_some() {
                return Err(ConfigError::Validation(format!(
                    "schema class '{}' is defined more than once",
                    class.name
                )));
            }
        }

        for class in &self.classes {
            let mut seen = HashSet::new();
            seen.insert(class.name.as_str());
            let mut current = class;
            while let Some(parent) = current.parent.as_deref() {
                let Some(next) = by_name.get(parent) else {
                    return Err(ConfigError::Validation(format!(
                        "schema class '{}' has unknown parent '{parent}'",
                        current.name
                    )));
                };
                if !seen.insert(parent) {
                    return Err(ConfigError::Validation(format!(
                        "schema class '{}' has a cyclic parent chain",
                        class.name
                    )));
                }
                current = next;
            }
        }

        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.iter().any(|c| c.name == name)
    }
}

/// Localisation configuration.
///
/// When enabled, version retention is evaluated per (record, locale) and
/// localised version tables are included in deletes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct LocalisationConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Suffix appended to a class table to name its localised version table.
    #[serde(default = "default_localised_suffix")]
    pub suffix: String,
}

impl Default for LocalisationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            suffix: default_localised_suffix(),
        }
    }
}

impl LocalisationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.enabled && !is_valid_identifier(&self.suffix) {
            return Err(ConfigError::Validation(format!(
                "localisation.suffix '{}' is not a valid identifier",
                self.suffix
            )));
        }
        Ok(())
    }
}

fn default_localised_suffix() -> String {
    "_Localised_Versions".to_string()
}

fn default_true() -> bool {
    true
}
