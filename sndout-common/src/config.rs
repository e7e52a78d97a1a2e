//! Configuration loading
//!
//! Bootstrap configuration is a single TOML file. Every field has a built-in
//! default, so a missing file degrades to defaults instead of failing.
//!
//! # Settings Sources Priority
//!
//! 1. Explicit path passed by the host application
//! 2. Environment variable (`SNDOUT_CONFIG`)
//! 3. Platform config directory (`<config_dir>/sndout/config.toml`)
//! 4. Built-in defaults (code constants)

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming an alternative config file
pub const CONFIG_ENV_VAR: &str = "SNDOUT_CONFIG";

/// Complete output configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Device to open; empty selects the default device
    pub device: String,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Streaming and background scheduler tuning
    pub streaming: StreamingConfig,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            device: String::new(),
            logging: LoggingConfig::default(),
            streaming: StreamingConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Streaming feeder and scheduler parameters
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Duration of audio held by one streaming buffer, in seconds
    ///
    /// Default: 0.125
    pub buffer_duration_secs: f32,

    /// Buffers cycled per stream
    ///
    /// Default: 6
    pub ring_buffers: usize,

    /// Upper bound on the scheduler's idle wait, in milliseconds
    ///
    /// Default: 50
    pub poll_interval_ms: u64,

    /// Loudness values produced per second of analysed audio
    ///
    /// Default: 20
    pub loudness_samples_per_sec: f32,

    /// Upper bound on the voice pool size
    ///
    /// Default: 256
    pub max_voices: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            buffer_duration_secs: 0.125,
            ring_buffers: 6,
            poll_interval_ms: 50,
            loudness_samples_per_sec: 20.0,
            max_voices: 256,
        }
    }
}

/// Longest accepted streaming buffer, in seconds
pub const MAX_BUFFER_DURATION_SECS: f32 = 10.0;

/// Most buffers accepted in one stream's ring
pub const MAX_RING_BUFFERS: usize = 64;

impl StreamingConfig {
    /// Scheduler idle wait as a Duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if !(self.buffer_duration_secs > 0.0 && self.buffer_duration_secs <= MAX_BUFFER_DURATION_SECS) {
            return Err(Error::Config(format!(
                "buffer_duration_secs must be in (0, {}], got {}",
                MAX_BUFFER_DURATION_SECS, self.buffer_duration_secs
            )));
        }
        if !(1..=MAX_RING_BUFFERS).contains(&self.ring_buffers) {
            return Err(Error::Config(format!(
                "ring_buffers must be between 1 and {}, got {}",
                MAX_RING_BUFFERS, self.ring_buffers
            )));
        }
        if self.poll_interval_ms == 0 {
            return Err(Error::Config("poll_interval_ms must be at least 1".to_string()));
        }
        if !(self.loudness_samples_per_sec.is_finite() && self.loudness_samples_per_sec > 0.0) {
            return Err(Error::Config(format!(
                "loudness_samples_per_sec must be positive, got {}",
                self.loudness_samples_per_sec
            )));
        }
        if self.max_voices == 0 {
            return Err(Error::Config("max_voices must be at least 1".to_string()));
        }
        Ok(())
    }
}

impl OutputConfig {
    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: OutputConfig = toml::from_str(text)
            .map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))?;
        config.streaming.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        let config = Self::from_toml_str(&text)?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Resolve and load configuration, falling back to defaults.
    ///
    /// An explicit path must exist and parse. Implicit locations (environment
    /// variable, platform config dir) only log a warning when unusable.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            match Self::load(Path::new(&path)) {
                Ok(config) => return Ok(config),
                Err(e) => warn!("Ignoring {}={}: {}", CONFIG_ENV_VAR, path, e),
            }
        }

        if let Some(path) = default_config_path() {
            if path.exists() {
                match Self::load(&path) {
                    Ok(config) => return Ok(config),
                    Err(e) => warn!("Ignoring {:?}: {}", path, e),
                }
            }
        }

        info!("No configuration file found, using built-in defaults");
        Ok(Self::default())
    }
}

/// Platform config file location
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("sndout").join("config.toml"))
}
