use layoutsync_core::{BuildMode, Session};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Source of a configuration value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::File => write!(f, "file"),
            ConfigSource::Environment => write!(f, "environment"),
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }
}

fn default_interval_secs() -> u64 {
    layoutsync_core::SYNC_INTERVAL.as_secs()
}

/// Sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Server URL (e.g., "http://localhost:8080")
    pub server_url: Option<String>,
    /// API key for authentication; its presence is the user session
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Store layouts on the server (default: false)
    #[serde(default)]
    pub remote_layouts: bool,
    /// Seconds between automatic syncs in `watch`
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            api_key: None,
            remote_layouts: false,
            interval_secs: default_interval_secs(),
        }
    }
}

impl SyncConfig {
    /// Returns true if sync is configured (has both server_url and api_key)
    pub fn is_configured(&self) -> bool {
        self.server_url.is_some() && self.api_key.is_some()
    }

    /// The signed-in session, if sync is configured.
    pub fn session(&self) -> Option<Session> {
        if !self.is_configured() {
            return None;
        }
        self.api_key.as_ref().map(Session::new)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

/// Application configuration with source tracking
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Path to the SQLite layout cache
    pub cache_path: ConfigValue<PathBuf>,
    /// Build mode; the debug sync surface is only offered in development
    pub build_mode: ConfigValue<BuildMode>,
    /// Config file path used (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
    /// Sync configuration
    pub sync: SyncConfig,
}

/// Internal struct for deserializing config file
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    cache_path: Option<PathBuf>,
    build_mode: Option<BuildMode>,
    sync: Option<SyncConfig>,
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let default_cache_path = Self::default_data_dir().join("layouts.db");

        // Start with defaults
        let mut cache_path = ConfigValue::new(default_cache_path, ConfigSource::Default);
        let mut build_mode = ConfigValue::new(BuildMode::current(), ConfigSource::Default);
        let mut config_file = None;
        let mut sync = SyncConfig::default();

        // Try to load from config file
        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            let file_config: ConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;

            config_file = Some(path.clone());

            if let Some(file_cache_path) = file_config.cache_path {
                // Resolve relative paths against config file's directory
                let resolved_path = if file_cache_path.is_relative() {
                    path.parent()
                        .map(|p| p.join(&file_cache_path))
                        .unwrap_or(file_cache_path)
                } else {
                    file_cache_path
                };
                cache_path = ConfigValue::new(resolved_path, ConfigSource::File);
            }
            if let Some(mode) = file_config.build_mode {
                build_mode = ConfigValue::new(mode, ConfigSource::File);
            }
            if let Some(sync_config) = file_config.sync {
                sync = sync_config;
            }
        }

        // Apply environment variable overrides
        if let Ok(env_path) = std::env::var("LAYOUTS_CACHE_PATH") {
            cache_path = ConfigValue::new(PathBuf::from(env_path), ConfigSource::Environment);
        }
        if let Ok(mode) = std::env::var("LAYOUTS_BUILD_MODE") {
            let mode = mode
                .parse()
                .map_err(|e| ConfigError::InvalidValue("LAYOUTS_BUILD_MODE", e))?;
            build_mode = ConfigValue::new(mode, ConfigSource::Environment);
        }
        // Sync env var overrides
        if let Ok(url) = std::env::var("LAYOUTS_SYNC_URL") {
            sync.server_url = Some(url);
        }
        if let Ok(key) = std::env::var("LAYOUTS_SYNC_API_KEY") {
            sync.api_key = Some(key);
        }
        if let Ok(flag) = std::env::var("LAYOUTS_REMOTE_LAYOUTS") {
            sync.remote_layouts = parse_bool(&flag)
                .ok_or_else(|| ConfigError::InvalidValue("LAYOUTS_REMOTE_LAYOUTS", flag))?;
        }

        Ok(Self {
            cache_path,
            build_mode,
            config_file,
            sync,
        })
    }

    /// Default config directory (platform-specific):
    /// - Linux: ~/.config/layouts/
    /// - macOS: ~/Library/Application Support/layouts/
    /// - Windows: %APPDATA%/layouts/
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("layouts")
    }

    /// Default data directory (platform-specific):
    /// - Linux: ~/.local/share/layouts/
    /// - macOS: ~/Library/Application Support/layouts/
    /// - Windows: %APPDATA%/layouts/
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("layouts")
    }

    /// Default config file path (platform-specific config dir + config.yaml)
    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.yaml")
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
    InvalidValue(&'static str, String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::InvalidValue(name, value) => {
                write!(f, "Invalid value for {}: {}", name, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
