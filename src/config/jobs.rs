//! Job queue and worker configuration.
//!
//! # Example
//!
//! ```toml
//! [jobs]
//! batch_size = 10
//! seconds_between_jobs = 86400
//! poll_interval_secs = 30
//! max_attempts = 3
//! stale_after_secs = 3600
//!
//! [jobs.queue]
//! type = "database"
//! table_name = "gc_queued_jobs"
//! ```

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Job configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct JobsConfig {
    /// Planned operations processed per job step.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Delay between recurring sweeps, in seconds. Default: 86400 (one day).
    #[serde(default = "default_seconds_between_jobs")]
    pub seconds_between_jobs: u64,

    /// How long the worker sleeps when no job is due, in seconds.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Attempts before a job failing with transient errors is marked failed.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base retry delay in seconds; multiplied by the attempt number.
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,

    /// A running job not saved for this many seconds belongs to a stopped
    /// worker and is put back on the queue.
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,

    /// Queue backend.
    #[serde(default)]
    pub queue: JobQueueConfig,
}

/// Upper bound for every interval setting: ten years.
pub const MAX_INTERVAL_SECS: u64 = 10 * 365 * 86400;

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            seconds_between_jobs: default_seconds_between_jobs(),
            poll_interval_secs: default_poll_interval_secs(),
            max_attempts: default_max_attempts(),
            retry_delay_secs: default_retry_delay_secs(),
            stale_after_secs: default_stale_after_secs(),
            queue: JobQueueConfig::default(),
        }
    }
}

impl JobsConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Validation(
                "jobs.batch_size must be at least 1".into(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::Validation(
                "jobs.max_attempts must be at least 1".into(),
            ));
        }
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "jobs.poll_interval_secs must be at least 1".into(),
            ));
        }
        if self.stale_after_secs == 0 {
            return Err(ConfigError::Validation(
                "jobs.stale_after_secs must be at least 1".into(),
            ));
        }
        for (name, secs) in [
            ("seconds_between_jobs", self.seconds_between_jobs),
            ("poll_interval_secs", self.poll_interval_secs),
            ("retry_delay_secs", self.retry_delay_secs),
            ("stale_after_secs", self.stale_after_secs),
        ] {
            if secs > MAX_INTERVAL_SECS {
                return Err(ConfigError::Validation(format!(
                    "jobs.{name} must be at most {MAX_INTERVAL_SECS}"
                )));
            }
        }
        if let JobQueueConfig::Database { table_name } = &self.queue
            && !super::is_valid_identifier(table_name)
        {
            return Err(ConfigError::Validation(format!(
                "jobs.queue.table_name '{table_name}' is not a valid table name"
            )));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// When retry number `attempt` (1-based) is due, or `None` if that is out
    /// of range. The delay grows linearly with the attempt number.
    pub fn retry_at(&self, now: DateTime<Utc>, attempt: u32) -> Option<DateTime<Utc>> {
        seconds_after(
            now,
            self.retry_delay_secs.saturating_mul(u64::from(attempt)),
        )
    }

    /// When the sweep after one running at `now` is due, or `None` if that
    /// is out of range.
    pub fn next_sweep_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        seconds_after(now, self.seconds_between_jobs)
    }

    /// Running jobs last saved before this instant are stale.
    pub fn stale_before(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        i64::try_from(self.stale_after_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .and_then(|age| now.checked_sub_signed(age))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

fn seconds_after(now: DateTime<Utc>, secs: u64) -> Option<DateTime<Utc>> {
    let delta = TimeDelta::try_seconds(i64::try_from(secs).ok()?)?;
    now.checked_add_signed(delta)
}

/// Job queue backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(tag = "type", rename_all = "snake_case")]
#[serde(deny_unknown_fields)]
pub enum JobQueueConfig {
    /// Jobs persisted in a database table; survives restarts.
    Database {
        #[serde(default = "default_queue_table")]
        table_name: String,
    },

    /// Jobs held in process memory; lost on exit.
    Memory,
}

impl Default for JobQueueConfig {
    fn default() -> Self {
        JobQueueConfig::Database {
            table_name: default_queue_table(),
        }
    }
}

fn default_batch_size() -> usize {
    10
}

fn default_seconds_between_jobs() -> u64 {
    86400
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_secs() -> u64 {
    60
}

fn default_stale_after_secs() -> u64 {
    3600
}

fn default_queue_table() -> String {
    "gc_queued_jobs".to_string()
}
