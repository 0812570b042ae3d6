//! Configuration types mapping to the TOML schema.
//!
//! Top-level config:
//! ```toml
//! [database]    # session store location
//! [attempts]    # attempt submission limits
//! [guard]       # exactly-once guard status table
//! [backoff]     # lock-conflict polling intervals
//! [secrets]     # default secret access policy
//! [task]        # round runner limits
//! [logging]     # console + JSON file logging
//! ```

use std::path::PathBuf;

use drover_types::{defaults, is_plain_identifier};
use serde::{Deserialize, Serialize};

use crate::{ConfigError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g., project-local
/// overrides) can be loaded and merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DroverConfig {
    /// Session store location.
    pub database: Option<DatabaseConfig>,

    /// Attempt submission limits.
    pub attempts: Option<AttemptsConfig>,

    /// Exactly-once guard settings.
    pub guard: Option<GuardConfig>,

    /// Polling backoff after lock conflicts.
    pub backoff: Option<BackoffConfig>,

    /// Secret access defaults.
    pub secrets: Option<SecretsConfig>,

    /// Round runner limits.
    pub task: Option<TaskConfig>,

    /// Logging configuration.
    pub logging: Option<LoggingConfig>,
}

impl DroverConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    pub fn merge(&mut self, other: DroverConfig) {
        if other.database.is_some() {
            self.database = other.database;
        }

        if other.attempts.is_some() {
            self.attempts = other.attempts;
        }

        if other.guard.is_some() {
            self.guard = other.guard;
        }

        if other.backoff.is_some() {
            self.backoff = other.backoff;
        }

        if other.secrets.is_some() {
            self.secrets = other.secrets;
        }

        if other.task.is_some() {
            self.task = other.task;
        }

        if other.logging.is_some() {
            self.logging = other.logging;
        }
    }

    /// Effective attempt limits (section or defaults).
    pub fn attempts(&self) -> AttemptsConfig {
        self.attempts.clone().unwrap_or_default()
    }

    /// Effective guard settings.
    pub fn guard(&self) -> GuardConfig {
        self.guard.clone().unwrap_or_default()
    }

    /// Effective backoff settings.
    pub fn backoff(&self) -> BackoffConfig {
        self.backoff.clone().unwrap_or_default()
    }

    /// Effective secret access defaults.
    pub fn secrets(&self) -> SecretsConfig {
        self.secrets.clone().unwrap_or_default()
    }

    /// Effective round runner limits.
    pub fn task(&self) -> TaskConfig {
        self.task.clone().unwrap_or_default()
    }

    /// Effective logging settings.
    pub fn logging(&self) -> LoggingConfig {
        self.logging.clone().unwrap_or_default()
    }

    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let attempts = self.attempts();
        if attempts.max_active_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "attempts.max_active_attempts".into(),
                reason: "must be at least 1".into(),
            });
        }

        let backoff = self.backoff();
        if backoff.initial_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "backoff.initial_interval_secs".into(),
                reason: "must be at least 1".into(),
            });
        }
        if backoff.initial_interval_secs > backoff.max_interval_secs {
            return Err(ConfigError::Invalid {
                field: "backoff.max_interval_secs".into(),
                reason: format!(
                    "must not be smaller than initial_interval_secs ({})",
                    backoff.initial_interval_secs
                ),
            });
        }

        let guard = self.guard();
        if !is_plain_identifier(&guard.status_table) {
            return Err(ConfigError::Invalid {
                field: "guard.status_table".into(),
                reason: format!("'{}' is not a plain table identifier", guard.status_table),
            });
        }

        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Database Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Session store location.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path to the SQLite database. `None` keeps the store in memory.
    pub path: Option<PathBuf>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Attempt Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Attempt submission limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttemptsConfig {
    /// Site id stamped on created attempts.
    pub site_id: i32,
    /// Advisory ceiling on simultaneously active attempts.
    pub max_active_attempts: u64,
    /// Largest serialized session-parameter document accepted.
    pub max_params_bytes: usize,
}

impl Default for AttemptsConfig {
    fn default() -> Self {
        Self {
            site_id: defaults::SITE_ID,
            max_active_attempts: defaults::MAX_ACTIVE_ATTEMPTS,
            max_params_bytes: defaults::MAX_PARAMS_BYTES,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Guard Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Exactly-once guard settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Use the status table. `false` runs protected statements on every retry.
    pub strict: bool,
    /// Status table name on the target database.
    pub status_table: String,
    /// Status rows older than this are purged by cleanup.
    pub status_table_cleanup_secs: u64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            strict: true,
            status_table: defaults::STATUS_TABLE.to_string(),
            status_table_cleanup_secs: defaults::STATUS_TABLE_CLEANUP_SECS,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Backoff Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Polling backoff after lock conflicts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub initial_interval_secs: u64,
    pub max_interval_secs: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_interval_secs: defaults::INITIAL_POLL_INTERVAL_SECS,
            max_interval_secs: defaults::MAX_POLL_INTERVAL_SECS,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Secrets Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Secret access defaults.
///
/// ```toml
/// [secrets]
/// default_access = ["public", "shared.readonly"]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretsConfig {
    /// Key prefixes any task may read without an explicit grant.
    pub default_access: Vec<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Task Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Round runner limits. Zero disables a limit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    pub round_timeout_secs: u64,
    pub max_rounds: u32,
}

// ─────────────────────────────────────────────────────────────────────────────
// Logging Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Logging configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Console filter directive (`RUST_LOG` syntax).
    pub level: String,
    /// Directory for daily-rolling JSON logs. `None` disables file logging.
    pub json_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_dir: None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
