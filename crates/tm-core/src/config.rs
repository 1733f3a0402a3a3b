//! Configuration types and parsing for tidemark.yml

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable that overrides `database.path`
pub const DATABASE_ENV_VAR: &str = "TM_DATABASE";

/// Main configuration from tidemark.yml
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Name of the service whose database is being migrated
    pub name: String,

    /// Target database connection
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Collection holding one document per applied step
    #[serde(default = "default_ledger_collection")]
    pub ledger_collection: String,

    /// Collection holding the last failure of each failed step
    #[serde(default = "default_failure_collection")]
    pub failure_collection: String,

    /// Collection holding the singleton migration lock
    #[serde(default = "default_lock_collection")]
    pub lock_collection: String,

    /// Migration lock settings
    #[serde(default)]
    pub lock: LockConfig,
}

/// Database connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Path to the DuckDB file, or `:memory:`
    #[serde(default = "default_db_path")]
    pub path: String,

    /// How long to wait for another process to release the database file
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

/// Migration lock configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LockConfig {
    /// Seconds after which a lock left by a dead runner may be reclaimed
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,

    /// Readable prefix of the lock owner id. The process id and a random
    /// suffix are always appended, so instances sharing this file still get
    /// distinct owners.
    #[serde(default)]
    pub owner_prefix: Option<String>,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: default_stale_after_secs(),
            owner_prefix: None,
        }
    }
}

fn default_db_path() -> String {
    "tidemark.duckdb".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

fn default_ledger_collection() -> String {
    "tidemark_migrations".to_string()
}

fn default_failure_collection() -> String {
    "tidemark_failures".to_string()
}

fn default_lock_collection() -> String {
    "tidemark_lock".to_string()
}

fn default_stale_after_secs() -> u64 {
    600
}

impl Config {
    /// Configuration with every default and the given name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            database: DatabaseConfig::default(),
            ledger_collection: default_ledger_collection(),
            failure_collection: default_failure_collection(),
            lock_collection: default_lock_collection(),
            lock: LockConfig::default(),
        }
    }

    /// Load configuration from a file path
    pub fn load(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            return Err(CoreError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| CoreError::IoWithPath {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Config = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a project directory
    /// Looks for tidemark.yml or tidemark.yaml
    pub fn load_from_dir(dir: &Path) -> CoreResult<Self> {
        let yml_path = dir.join("tidemark.yml");
        let yaml_path = dir.join("tidemark.yaml");

        if yml_path.exists() {
            Self::load(&yml_path)
        } else if yaml_path.exists() {
            Self::load(&yaml_path)
        } else {
            Err(CoreError::ConfigNotFound {
                path: yml_path.display().to_string(),
            })
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> CoreResult<()> {
        if self.name.trim().is_empty() {
            return Err(CoreError::ConfigInvalid {
                message: "Name cannot be empty".to_string(),
            });
        }

        if self.database.path.trim().is_empty() {
            return Err(CoreError::ConfigInvalid {
                message: "database.path cannot be empty".to_string(),
            });
        }

        let collections = [
            ("ledger_collection", &self.ledger_collection),
            ("failure_collection", &self.failure_collection),
            ("lock_collection", &self.lock_collection),
        ];
        for (field, value) in &collections {
            if value.trim().is_empty() {
                return Err(CoreError::ConfigInvalid {
                    message: format!("{field} cannot be empty"),
                });
            }
        }
        for (i, (field, value)) in collections.iter().enumerate() {
            if let Some((other, _)) = collections[i + 1..].iter().find(|(_, v)| v == value) {
                return Err(CoreError::ConfigInvalid {
                    message: format!("{field} and {other} must name different collections"),
                });
            }
        }

        if self.lock.stale_after_secs == 0 {
            return Err(CoreError::ConfigInvalid {
                message: "lock.stale_after_secs must be greater than zero".to_string(),
            });
        }

        if matches!(&self.lock.owner_prefix, Some(prefix) if prefix.trim().is_empty()) {
            return Err(CoreError::ConfigInvalid {
                message: "lock.owner_prefix cannot be empty when set".to_string(),
            });
        }

        Ok(())
    }

    /// How long a lock may be held before another runner can reclaim it
    pub fn lock_stale_after(&self) -> Duration {
        Duration::from_secs(self.lock.stale_after_secs)
    }

    /// How long to wait for the database file when another process has it open
    pub fn database_busy_timeout(&self) -> Duration {
        Duration::from_millis(self.database.busy_timeout_ms)
    }

    /// Resolve the database path
    ///
    /// Priority: CLI flag > TM_DATABASE env var > `database.path`
    pub fn resolve_database_path(&self, cli_database: Option<&str>) -> String {
        Self::resolve_database(cli_database).unwrap_or_else(|| self.database.path.clone())
    }

    /// Resolve a database override from CLI flag or TM_DATABASE environment variable
    pub fn resolve_database(cli_database: Option<&str>) -> Option<String> {
        cli_database
            .map(String::from)
            .or_else(|| std::env::var(DATABASE_ENV_VAR).ok())
            .filter(|p| !p.is_empty())
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
