//! Core configuration.
//!
//! JSON document naming the store file, the snapshot directory, the
//! retention limit and the logging setup. Paths must be absolute.

use crate::logging::default_log_level;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

pub const DEFAULT_MAX_SNAPSHOTS: usize = 7;
const DB_FILE_NAME: &str = "officina.db";

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse(serde_json::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "cannot access config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "malformed config: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreConfig {
    /// SQLite store file.
    pub db_path: PathBuf,
    /// Directory holding `backup_*` snapshots.
    pub backup_dir: PathBuf,
    /// Snapshots kept after pruning.
    #[serde(default = "default_max_snapshots")]
    pub max_snapshots: usize,
    #[serde(default = "default_level")]
    pub log_level: String,
    pub log_dir: PathBuf,
}

fn default_max_snapshots() -> usize {
    DEFAULT_MAX_SNAPSHOTS
}

fn default_level() -> String {
    default_log_level().to_string()
}

impl CoreConfig {
    /// Conventional layout under one data directory.
    pub fn defaults_in(data_dir: impl AsRef<Path>) -> Self {
        let data_dir = data_dir.as_ref();
        Self {
            db_path: data_dir.join(DB_FILE_NAME),
            backup_dir: data_dir.join("backups"),
            max_snapshots: DEFAULT_MAX_SNAPSHOTS,
            log_level: default_level(),
            log_dir: data_dir.join("logs"),
        }
    }

    /// Parses and validates a JSON config document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        self.validate()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, path) in [
            ("db_path", &self.db_path),
            ("backup_dir", &self.backup_dir),
            ("log_dir", &self.log_dir),
        ] {
            if !path.is_absolute() {
                return Err(ConfigError::Invalid(format!(
                    "`{name}` must be an absolute path, got `{}`",
                    path.display()
                )));
            }
        }
        if self.max_snapshots == 0 {
            return Err(ConfigError::Invalid(
                "`max_snapshots` must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
