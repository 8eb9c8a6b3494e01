//! Configuration module for the switchboard.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//! - CLI argument overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `SB_` and use double underscores
//! to separate nested levels:
//! - `SB_UNIT_COUNT=4` sets `unit_count`
//! - `SB_PRODUCER__TICK_MS=250` sets `producer.tick_ms`
//! - `SB_READER__ENABLED=false` sets `reader.enabled`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory holding the settings file, searched for from the current
/// directory upwards.
pub const CONFIG_DIR: &str = ".switchboard";

const SETTINGS_FILE: &str = "settings.toml";
const ENV_PREFIX: &str = "SB_";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Directory holding one file per unit
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    /// Workspace root directory (where .switchboard is located)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<PathBuf>,

    /// Number of units registered at startup
    #[serde(default = "default_unit_count")]
    pub unit_count: usize,

    /// Delay between starting the synchronizer and consuming events
    #[serde(default = "default_startup_delay_ms")]
    pub startup_delay_ms: u64,

    /// Producer settings
    #[serde(default)]
    pub producer: ProducerConfig,

    /// Reconciliation settings
    #[serde(default)]
    pub sync: SyncConfig,

    /// Simulated reader settings
    #[serde(default)]
    pub reader: ReaderConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProducerConfig {
    /// Interval between two records, in milliseconds
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SyncConfig {
    /// Interval between reconciliation cycles, in milliseconds
    #[serde(default = "default_sync_interval_ms")]
    pub interval_ms: u64,

    /// Number of events one read of the inotify descriptor can hold
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ReaderConfig {
    /// Whether to run the simulated reader
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Delay before the first read session
    #[serde(default = "default_reader_start_delay_ms")]
    pub start_delay_ms: u64,

    /// Upper bound (exclusive) on a read session's length
    #[serde(default = "default_max_read_ms")]
    pub max_read_ms: u64,

    /// Pause between sessions when nothing could be read
    #[serde(default = "default_idle_ms")]
    pub idle_ms: u64,

    /// Always read this unit instead of rotating through the registry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Default level for every module
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-module level overrides
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_base_dir() -> PathBuf {
    PathBuf::from(".switchboard/units")
}
fn default_unit_count() -> usize {
    10
}
fn default_startup_delay_ms() -> u64 {
    1000
}
fn default_tick_ms() -> u64 {
    1000
}
fn default_sync_interval_ms() -> u64 {
    1000
}
fn default_event_capacity() -> usize {
    crate::watcher::DEFAULT_EVENT_CAPACITY
}
fn default_true() -> bool {
    true
}
fn default_reader_start_delay_ms() -> u64 {
    3000
}
fn default_max_read_ms() -> u64 {
    3000
}
fn default_idle_ms() -> u64 {
    1000
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            base_dir: default_base_dir(),
            workspace_root: None,
            unit_count: default_unit_count(),
            startup_delay_ms: default_startup_delay_ms(),
            producer: ProducerConfig::default(),
            sync: SyncConfig::default(),
            reader: ReaderConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_sync_interval_ms(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            start_delay_ms: default_reader_start_delay_ms(),
            max_read_ms: default_max_read_ms(),
            idle_ms: default_idle_ms(),
            unit: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl ProducerConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

impl SyncConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        // Try to find the workspace root by looking for .switchboard directory
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join(SETTINGS_FILE));

        Self::figment(config_path)
            .extract()
            .map_err(Box::new)
            .map(|mut settings: Settings| {
                // If workspace_root is not set in config, detect it
                if settings.workspace_root.is_none() {
                    settings.workspace_root = Self::workspace_root();
                }
                settings
            })
    }

    /// Load configuration from a specific file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Self::figment(path.as_ref().to_path_buf())
            .extract()
            .map_err(Box::new)
    }

    fn figment(config_path: PathBuf) -> Figment {
        Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Settings::default()))
            // Layer in config file if it exists
            .merge(Toml::file(config_path))
            // Double underscore (__) separates nested levels
            .merge(Env::prefixed(ENV_PREFIX).map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
    }

    /// Find the workspace config by looking for .switchboard directory
    /// Searches from current directory up to root
    fn find_workspace_config() -> Option<PathBuf> {
        Self::workspace_root().map(|root| root.join(CONFIG_DIR).join(SETTINGS_FILE))
    }

    /// Get the workspace root directory (where .switchboard is located)
    pub fn workspace_root() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        current
            .ancestors()
            .find(|ancestor| ancestor.join(CONFIG_DIR).is_dir())
            .map(Path::to_path_buf)
    }

    /// Absolute unit directory.
    ///
    /// Relative `base_dir` values are resolved against the workspace root,
    /// falling back to the current directory. Watch paths must be absolute
    /// so the notification paths match the keys the switchboard counts.
    pub fn resolved_base_dir(&self) -> PathBuf {
        if self.base_dir.is_absolute() {
            return self.base_dir.clone();
        }

        let root = self
            .workspace_root
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));
        root.join(&self.base_dir)
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file
    pub fn init_config_file(force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = PathBuf::from(CONFIG_DIR).join(SETTINGS_FILE);
        let existed = config_path.exists();

        if !force && existed {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        let mut settings = Settings::default();
        if let Ok(current_dir) = std::env::current_dir() {
            settings.workspace_root = Some(current_dir);
        }

        settings.save(&config_path)?;
        if existed {
            println!("Overwrote configuration at: {}", config_path.display());
        } else {
            println!("Created default configuration at: {}", config_path.display());
        }

        Ok(config_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.version, 1);
        assert_eq!(settings.unit_count, 10);
        assert_eq!(settings.producer.tick(), Duration::from_secs(1));
        assert_eq!(settings.sync.interval(), Duration::from_secs(1));
        assert!(settings.reader.enabled);
        assert_eq!(settings.logging.default, "info");
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        let toml_content = r#"
version = 2
base_dir = "/var/run/units"
unit_count = 3

[producer]
tick_ms = 250

[reader]
enabled = false
unit = "7"

[logging]
default = "warn"

[logging.modules]
switchboard = "debug"
"#;

        fs::write(&config_path, toml_content).unwrap();

        let settings = Settings::load_from(&config_path).unwrap();
        assert_eq!(settings.version, 2);
        assert_eq!(settings.base_dir, PathBuf::from("/var/run/units"));
        assert_eq!(settings.unit_count, 3);
        assert_eq!(settings.producer.tick_ms, 250);
        assert!(!settings.reader.enabled);
        assert_eq!(settings.reader.unit.as_deref(), Some("7"));
        assert_eq!(settings.logging.default, "warn");
        assert_eq!(settings.logging.modules["switchboard"], "debug");
    }

    #[test]
    fn test_save_settings() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("settings.toml");

        let mut settings = Settings::default();
        settings.unit_count = 2;
        settings.sync.interval_ms = 50;

        settings.save(&config_path).unwrap();

        let loaded = Settings::load_from(&config_path).unwrap();
        assert_eq!(loaded.unit_count, 2);
        assert_eq!(loaded.sync.interval_ms, 50);
    }

    #[test]
    fn test_partial_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        fs::write(&config_path, "[sync]\ninterval_ms = 200\n").unwrap();

        let settings = Settings::load_from(&config_path).unwrap();

        // Modified value
        assert_eq!(settings.sync.interval_ms, 200);
        // Defaults still present
        assert_eq!(settings.sync.event_capacity, 100);
        assert_eq!(settings.producer.tick_ms, 1000);
        assert_eq!(settings.reader.max_read_ms, 3000);
    }

    #[test]
    fn test_env_overrides_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");
        fs::write(&config_path, "[reader]\nidle_ms = 10\n").unwrap();

        unsafe {
            std::env::set_var("SB_READER__IDLE_MS", "42");
        }

        let settings = Settings::load_from(&config_path).unwrap();

        unsafe {
            std::env::remove_var("SB_READER__IDLE_MS");
        }

        assert_eq!(settings.reader.idle_ms, 42);
    }

    #[test]
    fn test_resolved_base_dir() {
        let settings = Settings {
            base_dir: PathBuf::from("units"),
            workspace_root: Some(PathBuf::from("/srv/board")),
            ..Settings::default()
        };
        assert_eq!(settings.resolved_base_dir(), PathBuf::from("/srv/board/units"));

        let absolute = Settings {
            base_dir: PathBuf::from("/tmp/units"),
            ..Settings::default()
        };
        assert_eq!(absolute.resolved_base_dir(), PathBuf::from("/tmp/units"));
    }
}
