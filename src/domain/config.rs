//! Configuration models for the backup subsystem.
//!
//! Every field carries a serde default so a partial (or missing) config file
//! still yields a complete configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Configuration for the backup trigger and export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Interval between scheduled runs in seconds.
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Whether the scheduler is enabled.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Rows pulled from the database per export batch.
    #[serde(default = "default_batch_size")]
    pub export_batch_size: usize,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            enabled: default_enabled(),
            export_batch_size: default_batch_size(),
        }
    }
}

const fn default_interval() -> u64 {
    3600 // hourly
}

const fn default_enabled() -> bool {
    true
}

const fn default_batch_size() -> usize {
    500
}

/// Filesystem layout for artifacts.
///
/// Relative directories resolve under `root_path`, which itself defaults to
/// the data directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub root_path: Option<PathBuf>,

    /// Snapshot artifact directory.
    #[serde(default = "default_backup_files")]
    pub backup_files: PathBuf,

    /// Error log directory.
    #[serde(default = "default_error_logs")]
    pub error_logs: PathBuf,

    /// Profile asset directory (created on init, unused by backups).
    #[serde(default = "default_profile_images")]
    pub profile_images: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root_path: None,
            backup_files: default_backup_files(),
            error_logs: default_error_logs(),
            profile_images: default_profile_images(),
        }
    }
}

fn default_backup_files() -> PathBuf {
    PathBuf::from("backups")
}

fn default_error_logs() -> PathBuf {
    PathBuf::from("logs")
}

fn default_profile_images() -> PathBuf {
    PathBuf::from("profiles")
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DatabaseConfig {
    /// SQLite database file.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Path configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PathConfig {
    /// Base data directory.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

/// Complete application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub backup: BackupConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub paths: PathConfig,
}

impl AppConfig {
    /// Configuration rooted at a specific data directory.
    #[cfg(test)]
    #[must_use]
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            paths: PathConfig {
                data_dir: Some(data_dir.into()),
            },
            ..Self::default()
        }
    }

    /// Get the data directory, using default if not configured.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.paths
            .data_dir
            .clone()
            .unwrap_or_else(Self::default_data_dir)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".hr-backup")
    }

    /// Root that relative storage directories resolve against.
    #[must_use]
    pub fn storage_root(&self) -> PathBuf {
        self.storage
            .root_path
            .clone()
            .unwrap_or_else(|| self.data_dir())
    }

    fn resolve(&self, dir: &Path) -> PathBuf {
        if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            self.storage_root().join(dir)
        }
    }

    /// Snapshot artifact directory.
    #[must_use]
    pub fn backups_dir(&self) -> PathBuf {
        self.resolve(&self.storage.backup_files)
    }

    /// Error log directory.
    #[must_use]
    pub fn error_logs_dir(&self) -> PathBuf {
        self.resolve(&self.storage.error_logs)
    }

    /// Profile asset directory.
    #[must_use]
    pub fn profile_images_dir(&self) -> PathBuf {
        self.resolve(&self.storage.profile_images)
    }

    /// Get the database path.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .unwrap_or_else(|| self.data_dir().join("hrbank.db"))
    }

    /// Get the config file path.
    #[must_use]
    pub fn config_file_path(&self) -> PathBuf {
        self.data_dir().join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.backup.interval_secs, 3600);
        assert!(config.backup.enabled);
        assert_eq!(config.backup.export_batch_size, 500);
        assert_eq!(config.storage.backup_files, PathBuf::from("backups"));
    }

    #[test]
    fn test_relative_dirs_resolve_under_root() {
        let config = AppConfig::with_data_dir("/srv/hr");
        assert_eq!(config.backups_dir(), PathBuf::from("/srv/hr/backups"));
        assert_eq!(config.error_logs_dir(), PathBuf::from("/srv/hr/logs"));
        assert_eq!(config.database_path(), PathBuf::from("/srv/hr/hrbank.db"));
    }

    #[test]
    fn test_absolute_dirs_are_kept() {
        let mut config = AppConfig::with_data_dir("/srv/hr");
        config.storage.root_path = Some(PathBuf::from("/data"));
        config.storage.error_logs = PathBuf::from("/var/log/hr");

        assert_eq!(config.backups_dir(), PathBuf::from("/data/backups"));
        assert_eq!(config.error_logs_dir(), PathBuf::from("/var/log/hr"));
        assert_eq!(config.profile_images_dir(), PathBuf::from("/data/profiles"));
    }
}
