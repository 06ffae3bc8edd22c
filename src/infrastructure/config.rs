//! Configuration file management.
//!
//! Handles loading and saving TOML configuration files.

use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::{AppConfig, AppError, Result};

/// Default configuration file content.
const DEFAULT_CONFIG: &str = r#"# HR Backup Configuration
# Auto-generated - edit as needed

[backup]
# Interval between scheduled backups in seconds (default: 3600 = hourly)
interval_secs = 3600

# Whether the scheduler is enabled
enabled = true

# Rows read from the database per export batch
export_batch_size = 500

[storage]
# Root for relative directories below (optional, defaults to the data dir)
# root_path = "/var/lib/hr-backup"

# Snapshot CSV files
backup_files = "backups"

# Error logs written when a backup fails
error_logs = "logs"

# Profile image assets
profile_images = "profiles"

[database]
# SQLite database (optional, defaults to <data_dir>/hrbank.db)
# path = "/var/lib/hr-backup/hrbank.db"
"#;

/// Load configuration from an explicit file, or the default location.
///
/// A missing file at the default location yields the default configuration.
///
/// # Errors
/// Returns error if the file exists but cannot be read or parsed, or if an
/// explicit path does not exist.
pub fn load_config(explicit: Option<&Path>) -> Result<AppConfig> {
    if let Some(path) = explicit {
        return load_config_from_file(path);
    }

    let config_path = config_file_path();
    if config_path.exists() {
        load_config_from_file(&config_path)
    } else {
        tracing::debug!(path = %config_path.display(), "No config file, using defaults");
        Ok(AppConfig::default())
    }
}

/// Load configuration from a specific file.
///
/// # Errors
/// Returns error if file cannot be read or parsed.
pub fn load_config_from_file(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .map_err(|e| AppError::io(format!("Failed to read config file: {}", path.display()), e))?;

    toml::from_str(&content).map_err(|e| AppError::Config {
        message: format!("Failed to parse config file: {e}"),
    })
}

/// Create the default configuration file if it doesn't exist.
///
/// Returns the path of the configuration file.
///
/// # Errors
/// Returns error if file cannot be created.
pub fn ensure_config_exists(config: &AppConfig) -> Result<PathBuf> {
    let config_path = config.config_file_path();

    if !config_path.exists() {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| AppError::io("Failed to create config directory", e))?;
        }

        fs::write(&config_path, DEFAULT_CONFIG)
            .map_err(|e| AppError::io("Failed to create default config", e))?;

        tracing::info!(path = %config_path.display(), "Created default configuration");
    }

    Ok(config_path)
}

/// Get the path to the default configuration file.
#[must_use]
pub fn config_file_path() -> PathBuf {
    AppConfig::default_data_dir().join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_parses() {
        let config: AppConfig = toml::from_str(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.backup.interval_secs, 3600);
        assert_eq!(config.backup.export_batch_size, 500);
        assert_eq!(config.storage.error_logs, PathBuf::from("logs"));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: AppConfig = toml::from_str("[backup]\ninterval_secs = 60\n").unwrap();
        assert_eq!(config.backup.interval_secs, 60);
        assert!(config.backup.enabled);
        assert_eq!(config.storage.backup_files, PathBuf::from("backups"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");

        let mut config = AppConfig::default();
        config.backup.interval_secs = 900;

        let content = toml::to_string_pretty(&config).unwrap();
        fs::write(&config_path, content).unwrap();

        let loaded = load_config(Some(&config_path)).unwrap();
        assert_eq!(loaded.backup.interval_secs, 900);
    }

    #[test]
    fn test_ensure_config_exists_writes_once() {
        let dir = tempdir().unwrap();
        let config = AppConfig::with_data_dir(dir.path());

        let path = ensure_config_exists(&config).unwrap();
        fs::write(&path, "[backup]\ninterval_secs = 5\n").unwrap();
        ensure_config_exists(&config).unwrap();

        let loaded = load_config_from_file(&path).unwrap();
        assert_eq!(loaded.backup.interval_secs, 5);
    }

    #[test]
    fn test_invalid_config_is_config_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[backup\n").unwrap();

        assert!(matches!(
            load_config_from_file(&path),
            Err(AppError::Config { .. })
        ));
    }
}
