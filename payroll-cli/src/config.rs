//! `payroll.toml` handling.
//!
//! ```toml
//! [database]
//! backend = "sqlite"
//! connection_string = "payroll.db"
//!
//! [engine]
//! currency_scale = 0
//! max_concurrency = 8
//! require_distinct_approver = true
//!
//! [logging]
//! level = "info"
//! file = "payroll.log"
//!
//! [users]
//! "hr@acme" = "hr"
//! "finance@acme" = "finance"
//! ```
//!
//! Every table is optional; missing keys fall back to their defaults.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use payroll_core::db::DbConfig;
use payroll_core::{PayrollConfig, Role, StaticRoleResolver};
use serde::{Deserialize, Serialize};

/// File looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "payroll.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// EnvFilter directive used when `RUST_LOG` is unset.
    pub level: String,

    /// Log records are appended here as well as to stderr.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub database: DbConfig,
    pub engine: PayrollConfig,
    pub logging: LoggingConfig,

    /// User id to role. Users missing here are refused every operation.
    pub users: HashMap<String, Role>,
}

impl CliConfig {
    pub fn from_toml(
        input: &str,
        path: &Path,
    ) -> Result<Self, ConfigError> {
        toml::from_str(input).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&contents, path)
    }

    /// Loads `path` when given, otherwise [`DEFAULT_CONFIG_FILE`] if it
    /// exists, otherwise the defaults.
    pub fn discover(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let fallback = Path::new(DEFAULT_CONFIG_FILE);
                if fallback.is_file() {
                    Self::load(fallback)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn role_resolver(&self) -> StaticRoleResolver {
        StaticRoleResolver::new(self.users.clone())
    }
}
