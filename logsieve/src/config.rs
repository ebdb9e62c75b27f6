use config::{Config as ConfigBuilder, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::errors::{SieveError, SieveResult};

/// Engine settings for a filtering run.
///
/// # Configuration Locations
///
/// Settings are merged from these files, later ones winning:
/// 1. Global `$CONFIG_DIR/logsieve/config.yaml`
/// 2. Local `.logsieve.yaml` in the current directory
/// 3. A file passed explicitly to `load_from`
///
/// # Configuration Format
///
/// ```yaml
/// # Parallel workers (default: number of CPUs)
/// worker_count: 8
///
/// # Log level (trace, debug, info, warn, error)
/// log_level: "info"
///
/// # Read buffer per worker, in bytes
/// read_buffer_size: 65536
///
/// # Draw a progress bar on stderr
/// show_progress: true
///
/// # Lines a worker scans between cancellation checks
/// cancel_check_interval: 4096
/// ```
///
/// Filter definitions are not part of this file; callers build a
/// `FilterSet` themselves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SieveConfig {
    /// Number of parallel workers; `None` means one per CPU
    #[serde(default)]
    pub worker_count: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Buffer capacity for each worker's reader
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,

    /// Whether to draw a progress bar while scanning
    #[serde(default)]
    pub show_progress: bool,

    /// How many lines a worker scans between checks for cancellation
    #[serde(default = "default_cancel_check_interval")]
    pub cancel_check_interval: usize,
}

/// Values a caller sets explicitly on top of the loaded configuration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    pub worker_count: Option<usize>,
    pub log_level: Option<String>,
    pub read_buffer_size: Option<usize>,
    pub show_progress: Option<bool>,
    pub cancel_check_interval: Option<usize>,
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_read_buffer_size() -> usize {
    64 * 1024
}

fn default_cancel_check_interval() -> usize {
    4096
}

impl Default for SieveConfig {
    fn default() -> Self {
        Self {
            worker_count: None,
            log_level: default_log_level(),
            read_buffer_size: default_read_buffer_size(),
            show_progress: false,
            cancel_check_interval: default_cancel_check_interval(),
        }
    }
}

impl SieveConfig {
    /// Loads configuration from the default locations
    pub fn load() -> SieveResult<Self> {
        Self::load_from(None)
    }

    /// Loads configuration, layering an optional explicit file on top
    pub fn load_from(config_path: Option<&Path>) -> SieveResult<Self> {
        let mut builder = ConfigBuilder::builder();

        let config_files = [
            dirs::config_dir().map(|p| p.join("logsieve/config.yaml")),
            Some(PathBuf::from(".logsieve.yaml")),
        ];

        for path in config_files.iter().flatten() {
            if path.exists() {
                builder = builder.add_source(File::from(path.as_path()));
            }
        }

        // An explicit file must exist
        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(true));
        }

        Ok(builder.build()?.try_deserialize()?)
    }

    /// Applies caller-supplied values over file values.
    ///
    /// Only fields set in `overrides` change, so a caller can restore a
    /// default the file had replaced.
    pub fn merge_overrides(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(worker_count) = overrides.worker_count {
            self.worker_count = Some(worker_count);
        }
        if let Some(log_level) = overrides.log_level {
            self.log_level = log_level;
        }
        if let Some(read_buffer_size) = overrides.read_buffer_size {
            self.read_buffer_size = read_buffer_size;
        }
        if let Some(show_progress) = overrides.show_progress {
            self.show_progress = show_progress;
        }
        if let Some(interval) = overrides.cancel_check_interval {
            self.cancel_check_interval = interval;
        }
        self
    }

    /// Requested parallelism, defaulting to the number of CPUs
    pub fn resolve_worker_count(&self) -> SieveResult<usize> {
        match self.worker_count {
            Some(0) => Err(SieveError::invalid_configuration(
                "worker count must be positive",
            )),
            Some(n) => Ok(n),
            None => Ok(num_cpus::get().max(1)),
        }
    }

    /// Rejects settings that would make a run meaningless
    pub fn validate(&self) -> SieveResult<()> {
        self.resolve_worker_count()?;
        if self.read_buffer_size == 0 {
            return Err(SieveError::invalid_configuration(
                "read buffer size must be positive",
            ));
        }
        if self.cancel_check_interval == 0 {
            return Err(SieveError::invalid_configuration(
                "cancel check interval must be positive",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_load_config_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.yaml");
        let config_content = r#"
            worker_count: 4
            log_level: "debug"
            read_buffer_size: 8192
            show_progress: true
            cancel_check_interval: 128
        "#;

        let mut file = File::create(&config_path).unwrap();
        file.write_all(config_content.as_bytes()).unwrap();

        let config = SieveConfig::load_from(Some(&config_path)).unwrap();
        assert_eq!(config.worker_count, Some(4));
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.read_buffer_size, 8192);
        assert!(config.show_progress);
        assert_eq!(config.cancel_check_interval, 128);
    }

    #[test]
    fn test_default_values() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.yaml");
        let mut file = File::create(&config_path).unwrap();
        file.write_all(b"log_level: \"info\"\n").unwrap();

        let config = SieveConfig::load_from(Some(&config_path)).unwrap();
        assert_eq!(config.worker_count, None);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.read_buffer_size, 64 * 1024);
        assert!(!config.show_progress);
        assert_eq!(config.resolve_worker_count().unwrap(), num_cpus::get().max(1));
    }

    #[test]
    fn test_merge_overrides() {
        let from_file = SieveConfig {
            worker_count: Some(4),
            log_level: "info".to_string(),
            read_buffer_size: 8192,
            show_progress: false,
            cancel_check_interval: 128,
        };
        let overrides = ConfigOverrides {
            worker_count: Some(2),
            show_progress: Some(true),
            ..ConfigOverrides::default()
        };

        let merged = from_file.merge_overrides(overrides);
        assert_eq!(merged.worker_count, Some(2));
        assert_eq!(merged.log_level, "info"); // File value
        assert_eq!(merged.read_buffer_size, 8192); // File value
        assert!(merged.show_progress);
        assert_eq!(merged.cancel_check_interval, 128);
    }

    #[test]
    fn test_overrides_can_restore_defaults() {
        let from_file = SieveConfig {
            log_level: "debug".to_string(),
            show_progress: true,
            read_buffer_size: 8192,
            ..SieveConfig::default()
        };
        let overrides = ConfigOverrides {
            log_level: Some(default_log_level()),
            show_progress: Some(false),
            read_buffer_size: Some(default_read_buffer_size()),
            ..ConfigOverrides::default()
        };

        let merged = from_file.merge_overrides(overrides);
        assert_eq!(merged, SieveConfig::default());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let config = SieveConfig {
            worker_count: Some(0),
            ..SieveConfig::default()
        };
        assert!(matches!(
            config.resolve_worker_count(),
            Err(SieveError::InvalidConfiguration(_))
        ));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_config() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.yaml");
        let mut file = File::create(&config_path).unwrap();
        file.write_all(b"worker_count: \"many\"\n").unwrap();

        assert!(matches!(
            SieveConfig::load_from(Some(&config_path)),
            Err(SieveError::Config(_))
        ));
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = SieveConfig::load_from(Some(Path::new("nonexistent.yaml")));
        assert!(result.is_err());
    }
}
