use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::batch::{BatchConfig, RetryPolicy};
use crate::logging::LogConfig;
use crate::sync::DEFAULT_CHUNK_SIZE;
use crate::zones::UnclassifiedMode;

/// Main application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Configuration metadata
    pub metadata: ConfigMetadata,

    /// Where activities and raw detail live
    pub storage: StorageSettings,

    /// Zone computation batch settings
    pub batch: BatchSettings,

    /// Zone accumulation settings
    pub zones: ZoneSettings,

    /// Ingestion settings
    pub sync: SyncSettings,

    pub logging: LogConfig,
}

/// Configuration metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigMetadata {
    /// Configuration format version
    pub version: String,

    /// Last modification timestamp
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// SQLite metadata database
    pub database_path: PathBuf,

    /// Directory of `<id>.json` detail objects
    pub detail_dir: PathBuf,

    /// Write new detail objects gzip-compressed
    pub compress_details: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
    /// Worker threads, rayon's default when absent
    pub num_threads: Option<usize>,
    pub show_progress: bool,
    /// Attempts per zone total write, first try included
    pub max_write_attempts: u32,
    pub initial_backoff_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneSettings {
    /// How intervals without heart rate are counted
    pub unclassified_mode: UnclassifiedMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Metadata write chunk size
    pub chunk_size: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            metadata: ConfigMetadata::default(),
            storage: StorageSettings::default(),
            batch: BatchSettings::default(),
            zones: ZoneSettings::default(),
            sync: SyncSettings::default(),
            logging: LogConfig::default(),
        }
    }
}

impl Default for ConfigMetadata {
    fn default() -> Self {
        ConfigMetadata {
            version: "1.0".to_string(),
            updated_at: Utc::now(),
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        let data_dir = AppConfig::default_data_dir();
        StorageSettings {
            database_path: data_dir.join("activities.db"),
            detail_dir: data_dir.join("details"),
            compress_details: false,
        }
    }
}

impl Default for BatchSettings {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        BatchSettings {
            num_threads: None,
            show_progress: true,
            max_write_attempts: retry.max_attempts,
            initial_backoff_ms: retry.initial_backoff_ms,
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Configuration management implementation
impl AppConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: AppConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML configuration: {}", path.as_ref().display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file, creating parent directories
    pub fn save_to_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.metadata.updated_at = Utc::now();

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }

        let toml_content = toml::to_string_pretty(self)
            .with_context(|| "Failed to serialize configuration to TOML")?;

        fs::write(&path, toml_content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        debug!("Configuration saved to {}", path.as_ref().display());
        Ok(())
    }

    /// `~/.hrzones/config.toml`
    pub fn default_config_path() -> PathBuf {
        Self::home().join("config.toml")
    }

    /// `~/.hrzones/data`
    pub fn default_data_dir() -> PathBuf {
        Self::home().join("data")
    }

    fn home() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".hrzones")
    }

    /// Load `path`, or the default location, falling back to defaults when
    /// the file does not exist. A file that exists but is invalid is an error.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let config_path = path.map(Path::to_path_buf).unwrap_or_else(Self::default_config_path);

        if config_path.exists() {
            Self::load_from_file(&config_path)
        } else {
            if path.is_some() {
                warn!("Config file not found, using defaults: {}", config_path.display());
            }
            Ok(Self::default())
        }
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.batch.max_write_attempts == 0 {
            anyhow::bail!("batch.max_write_attempts must be at least 1");
        }
        if self.sync.chunk_size == 0 {
            anyhow::bail!("sync.chunk_size must be at least 1");
        }
        if self.batch.num_threads == Some(0) {
            anyhow::bail!("batch.num_threads must be at least 1 when set");
        }
        Ok(())
    }

    /// Batch processor settings derived from this configuration
    pub fn batch_config(&self) -> BatchConfig {
        BatchConfig {
            num_threads: self.batch.num_threads,
            show_progress: self.batch.show_progress,
            unclassified_mode: self.zones.unclassified_mode,
            retry: RetryPolicy {
                max_attempts: self.batch.max_write_attempts,
                initial_backoff_ms: self.batch.initial_backoff_ms,
            },
        }
    }
}
