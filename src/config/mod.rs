//! Configuration module for the garbage collector.
//!
//! The collector is configured via a TOML file, with support for environment
//! variable interpolation using `${VAR_NAME}` syntax.
//!
//! # Example
//!
//! ```toml
//! [database]
//! type = "sqlite"
//! path = "${DATA_DIR}/site.db"
//!
//! [[schema.classes]]
//! name = "Ship"
//!
//! [collectors.versioned]
//! base_classes = ["Ship"]
//! ```

mod collectors;
mod database;
mod jobs;
mod observability;
mod schema;

use std::path::Path;

pub use collectors::*;
pub use database::*;
pub use jobs::*;
pub use observability::*;
use once_cell::sync::Lazy;
use regex::Regex;
pub use schema::*;
use serde::{Deserialize, Serialize};

/// Root configuration.
///
/// All sections are optional with sensible defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct GcConfig {
    /// Database holding the versioned data (and the job queue table).
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Observability configuration (logging, metrics).
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Job queue and worker settings.
    #[serde(default)]
    pub jobs: JobsConfig,

    /// Entity classes known to the collectors.
    #[serde(default)]
    pub schema: SchemaConfig,

    /// Per-locale version handling.
    #[serde(default)]
    pub localisation: LocalisationConfig,

    /// Collector settings.
    #[serde(default)]
    pub collectors: CollectorsConfig,
}

impl GcConfig {
    /// Load configuration from a TOML file.
    ///
    /// Environment variables in the format `${VAR_NAME}` are expanded.
    /// Missing required variables will cause an error.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e, path.as_ref().to_path_buf()))?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(contents: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(contents)?;
        let config: GcConfig = toml::from_str(&expanded).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration for consistency and completeness.
    fn validate(&self) -> Result<(), ConfigError> {
        self.database.validate()?;
        self.observability.validate()?;
        self.jobs.validate()?;
        self.schema.validate()?;
        self.localisation.validate()?;
        self.collectors.validate()?;

        for class in &self.collectors.versioned.base_classes {
            let Some(entry) = self.schema.classes.iter().find(|c| &c.name == class) else {
                return Err(ConfigError::Validation(format!(
                    "collectors.versioned.base_classes: '{class}' is not defined in [schema]"
                )));
            };
            if !entry.versioned {
                return Err(ConfigError::Validation(format!(
                    "collectors.versioned.base_classes: '{class}' is not versioned"
                )));
            }
            if entry.parent.is_some() {
                return Err(ConfigError::Validation(format!(
                    "collectors.versioned.base_classes: '{class}' is not a base class"
                )));
            }
        }

        for class in self.collectors.versioned.overrides.keys() {
            if !self.schema.contains(class) {
                return Err(ConfigError::Validation(format!(
                    "collectors.versioned.overrides: '{class}' is not defined in [schema]"
                )));
            }
        }

        Ok(())
    }

    /// Generate the JSON schema for the configuration.
    #[cfg(feature = "json-schema")]
    pub fn json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(GcConfig)
    }

    /// Generate the JSON schema as a pretty-printed JSON string.
    #[cfg(feature = "json-schema")]
    pub fn json_schema_string() -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::json_schema())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {1}: {0}")]
    Io(std::io::Error, std::path::PathBuf),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

static ENV_VAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([^}]+)\}").expect("env var pattern is valid"));

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid"));

/// True if `name` can be used as a table or column name without escaping.
pub fn is_valid_identifier(name: &str) -> bool {
    IDENTIFIER_RE.is_match(name)
}

/// Expand `${VAR}` references, leaving anything after a `#` untouched.
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut result = String::with_capacity(input.len());

    for line in input.lines() {
        let comment_pos = line.find('#');
        let mut last_end = 0;

        for cap in ENV_VAR_RE.captures_iter(line) {
            let Some(whole) = cap.get(0) else { continue };

            if let Some(pos) = comment_pos
                && whole.start() >= pos
            {
                continue;
            }

            result.push_str(&line[last_end..whole.start()]);
            let var_name = &cap[1];
            let value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;
            result.push_str(&value);
            last_end = whole.end();
        }

        result.push_str(&line[last_end..]);
        result.push('\n');
    }

    // Remove trailing newline if input didn't have one
    if !input.ends_with('\n') && result.ends_with('\n') {
        result.pop();
    }

    Ok(result)
}
