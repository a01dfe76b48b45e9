//! Configuration management for Sous
//!
//! Provides persistent settings storage with schema versioning and migrations.
//! Configuration is stored in `~/.sous/config.json` and cached in memory after
//! first access. Sessions take a [`SessionSettings`] snapshot at creation so a
//! settings change never alters a session that is already running.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

/// Current config schema version
const CURRENT_VERSION: u32 = 2;

/// Global config instance for caching
static CONFIG: OnceLock<RwLock<Config>> = OnceLock::new();

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to access config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Unknown config version: {0}")]
    UnknownVersion(u32),
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Schema version for migrations
    pub version: u32,
    /// Cooking session behaviour
    pub session: SessionConfig,
    /// Speech recognition and synthesis settings
    pub speech: SpeechConfig,
    /// Smart timer settings
    pub timer: TimerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            session: SessionConfig::default(),
            speech: SpeechConfig::default(),
            timer: TimerConfig::default(),
        }
    }
}

/// Cooking session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How long a command feedback toast stays visible (ms)
    pub feedback_clear_ms: u64,
    /// Delay before a newly selected step is read aloud (ms)
    pub auto_read_delay_ms: u64,
    /// Read each step aloud on navigation while listening
    pub auto_read_on_navigation: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            feedback_clear_ms: 1000,
            auto_read_delay_ms: 300,
            auto_read_on_navigation: true,
        }
    }
}

/// Speech I/O configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Language commands are recognised in
    pub recognition_language: String,
    /// Voice language for text without CJK characters
    pub english_voice_language: String,
    /// Voice language for text containing CJK characters
    pub cjk_voice_language: String,
    /// Speaking rate (1.0 = normal)
    pub rate: f32,
    /// Voice pitch (1.0 = normal)
    pub pitch: f32,
    /// Restart recognition when the engine stops on its own
    pub auto_restart_recognition: bool,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            recognition_language: "en-US".to_string(),
            english_voice_language: "en-US".to_string(),
            cjk_voice_language: "zh-HK".to_string(),
            rate: 1.0,
            pitch: 1.0,
            auto_restart_recognition: true,
        }
    }
}

/// Smart timer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    /// Speak an announcement when a timer finishes
    pub announce_completion: bool,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            announce_completion: true,
        }
    }
}

/// Settings a cooking session runs with, resolved once at session start
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub feedback_clear: Duration,
    pub auto_read_delay: Duration,
    pub auto_read_on_navigation: bool,
    pub announce_timer_completion: bool,
    pub speech: SpeechConfig,
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        Self {
            feedback_clear: Duration::from_millis(config.session.feedback_clear_ms),
            auto_read_delay: Duration::from_millis(config.session.auto_read_delay_ms),
            auto_read_on_navigation: config.session.auto_read_on_navigation,
            announce_timer_completion: config.timer.announce_completion,
            speech: config.speech.clone(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

/// Get the path to the config file (~/.sous/config.json)
pub fn get_config_path() -> PathBuf {
    get_config_dir().join("config.json")
}

/// Get the path to the config directory (~/.sous)
pub fn get_config_dir() -> PathBuf {
    home_dir_or_fallback().join(".sous")
}

/// Get the home directory, falling back to /tmp if unavailable
fn home_dir_or_fallback() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| {
        tracing::error!("Could not determine home directory, using /tmp");
        PathBuf::from("/tmp")
    })
}

/// Load configuration from a specific file, migrating older schemas
///
/// A missing file yields the defaults. A migrated config is written back.
pub fn load_from_path(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        tracing::info!("Config file not found at {:?}, using defaults", path);
        return Ok(Config::default());
    }

    let contents = fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&contents)?;

    let original_version = config.version;
    let migrated = migrate_config(config)?;
    if migrated.version != original_version {
        save_to_path(&migrated, path)?;
    }

    Ok(migrated)
}

/// Save configuration to a specific file, creating parent directories
pub fn save_to_path(config: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        if !dir.exists() {
            fs::create_dir_all(dir)?;
        }
    }

    let contents = serde_json::to_string_pretty(config)?;
    fs::write(path, contents)?;

    tracing::info!("Config saved to {:?}", path);
    Ok(())
}

/// Migrate configuration from older schema versions
fn migrate_config(mut config: Config) -> Result<Config, ConfigError> {
    let original_version = config.version;

    // Apply migrations sequentially
    while config.version < CURRENT_VERSION {
        config = apply_migration(config)?;
    }

    if config.version > CURRENT_VERSION {
        return Err(ConfigError::UnknownVersion(config.version));
    }

    if config.version != original_version {
        tracing::info!(
            "Migrated config from version {} to {}",
            original_version,
            config.version
        );
    }

    Ok(config)
}

/// Apply a single migration step
fn apply_migration(config: Config) -> Result<Config, ConfigError> {
    match config.version {
        // Version 0 -> 1: initial schema
        0 => {
            let mut migrated = config;
            migrated.version = 1;
            Ok(migrated)
        }
        // Version 1 -> 2: auto-read delay below 100ms was clipped by speech
        // engines that had not finished cancelling the previous utterance
        1 => {
            let mut migrated = config;
            migrated.session.auto_read_delay_ms = migrated.session.auto_read_delay_ms.max(100);
            migrated.version = 2;
            Ok(migrated)
        }
        v => Err(ConfigError::UnknownVersion(v)),
    }
}

/// Get the global config instance
fn get_config_instance() -> &'static RwLock<Config> {
    CONFIG.get_or_init(|| {
        let config = load_from_path(&get_config_path()).unwrap_or_else(|e| {
            tracing::error!("Failed to load config, using defaults: {}", e);
            Config::default()
        });
        RwLock::new(config)
    })
}

/// Get the current configuration
///
/// The config is cached in memory and loaded from disk on first access.
pub fn get_config() -> Config {
    get_config_instance().read().clone()
}

/// Update the configuration
///
/// Persists the provided config and replaces the cached copy. The version
/// field is always set to the current schema.
pub fn set_config(mut config: Config) -> Result<(), ConfigError> {
    config.version = CURRENT_VERSION;

    // Save to disk first
    save_to_path(&config, &get_config_path())?;

    let mut cached = get_config_instance().write();
    *cached = config;

    tracing::info!("Configuration updated");
    Ok(())
}

/// Reset configuration to defaults and persist them
pub fn reset_config() -> Result<Config, ConfigError> {
    let default_config = Config::default();

    save_to_path(&default_config, &get_config_path())?;

    let mut cached = get_config_instance().write();
    *cached = default_config.clone();

    tracing::info!("Configuration reset to defaults");
    Ok(default_config)
}

/// Settings for a new session, taken from the cached configuration
pub fn session_settings() -> SessionSettings {
    SessionSettings::from(&*get_config_instance().read())
}
