//! Runtime configuration, loaded from TOML with environment overrides.

use crate::constants::{
    DEFAULT_AUDIT_MAX_ENTRIES, DEFAULT_LOG_LEVEL, DEFAULT_STORAGE_PATH, DEFAULT_TOKEN_TTL_SECS,
};
use crate::error::{DirectoryError, DirectoryResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_PATH_ENV: &str = "ORGTREE_CONFIG";
pub const STORAGE_PATH_ENV: &str = "ORGTREE_STORAGE_PATH";
pub const LOG_LEVEL_ENV: &str = "ORGTREE_LOG_LEVEL";
pub const DEFAULT_CONFIG_PATH: &str = "config/orgtree.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// Directory holding the sled database
    pub storage_path: PathBuf,
    /// Use a throwaway database that is removed on drop
    pub temporary: bool,
    /// Lifetime of issued claims, in seconds
    pub token_ttl_secs: i64,
    /// Events kept by the in-memory audit log
    pub audit_max_entries: usize,
    pub log_level: String,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            storage_path: PathBuf::from(DEFAULT_STORAGE_PATH),
            temporary: false,
            token_ttl_secs: DEFAULT_TOKEN_TTL_SECS,
            audit_max_entries: DEFAULT_AUDIT_MAX_ENTRIES,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl DirectoryConfig {
    pub fn new(storage_path: impl Into<PathBuf>) -> Self {
        Self {
            storage_path: storage_path.into(),
            ..Default::default()
        }
    }

    pub fn temporary() -> Self {
        Self {
            temporary: true,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> DirectoryResult<()> {
        if self.token_ttl_secs <= 0 {
            return Err(DirectoryError::Config(format!(
                "token_ttl_secs must be positive, got {}",
                self.token_ttl_secs
            )));
        }
        if self.audit_max_entries == 0 {
            return Err(DirectoryError::Config("audit_max_entries must be at least 1".to_string()));
        }
        if !self.temporary && self.storage_path.as_os_str().is_empty() {
            return Err(DirectoryError::Config("storage_path must not be empty".to_string()));
        }
        Ok(())
    }

    /// Applies `ORGTREE_STORAGE_PATH` and `ORGTREE_LOG_LEVEL` when set.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var(STORAGE_PATH_ENV) {
            if !path.trim().is_empty() {
                self.storage_path = PathBuf::from(path);
            }
        }
        if let Ok(level) = std::env::var(LOG_LEVEL_ENV) {
            if !level.trim().is_empty() {
                self.log_level = level;
            }
        }
    }

    /// Opens the sled database this configuration points at.
    pub fn open_db(&self) -> DirectoryResult<sled::Db> {
        let db = if self.temporary {
            sled::Config::new().temporary(true).open()?
        } else {
            if let Some(parent) = self.storage_path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
            sled::open(&self.storage_path)?
        };
        Ok(db)
    }
}

/// Loads the configuration from `path`, then `ORGTREE_CONFIG`, then the
/// default location. A missing file yields the defaults; a malformed one is
/// an error. Environment overrides are applied last.
pub fn load_config(path: Option<&Path>) -> DirectoryResult<DirectoryConfig> {
    let config_path = path
        .map(Path::to_path_buf)
        .or_else(|| std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    let mut config = match fs::read_to_string(&config_path) {
        Ok(content) if content.trim().is_empty() => DirectoryConfig::default(),
        Ok(content) => toml::from_str::<DirectoryConfig>(&content).map_err(|e| {
            log::error!("Failed to parse {}: {}", config_path.display(), e);
            DirectoryError::from(e)
        })?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::debug!("No config at {}, using defaults", config_path.display());
            DirectoryConfig::default()
        }
        Err(e) => return Err(e.into()),
    };

    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config.token_ttl_secs, DEFAULT_TOKEN_TTL_SECS);
        assert_eq!(config.audit_max_entries, DEFAULT_AUDIT_MAX_ENTRIES);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "token_ttl_secs = 60\ntemporary = true").unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.token_ttl_secs, 60);
        assert!(config.temporary);
        assert_eq!(config.audit_max_entries, DEFAULT_AUDIT_MAX_ENTRIES);
    }

    #[test]
    fn test_malformed_toml_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "token_ttl_secs = \"soon\"").unwrap();
        let err = load_config(Some(file.path())).unwrap_err();
        assert_eq!(err.error_code(), "CONFIGURATION_ERROR");
    }

    #[test]
    fn test_validation() {
        let mut config = DirectoryConfig::temporary();
        assert!(config.validate().is_ok());
        config.token_ttl_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_open_temporary_db() {
        let db = DirectoryConfig::temporary().open_db().unwrap();
        assert!(db.is_empty());
    }

    #[test]
    fn test_open_on_disk_db() {
        let dir = tempfile::tempdir().unwrap();
        let config = DirectoryConfig::new(dir.path().join("nested").join("db"));
        let db = config.open_db().unwrap();
        db.insert("k", "v").unwrap();
        assert!(dir.path().join("nested").exists());
    }
}
