use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Shared configuration for both binaries. The relay reads `[capture]`
/// and `[server]`; the viewer reads `[viewer]`. Every field has a
/// default, so an empty file is a valid config.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub viewer: ViewerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureConfig {
    /// Captures per second.
    #[serde(default = "default_frequency")]
    pub frequency: f64,
    /// Simulator to capture; defaults to the first booted one.
    #[serde(default)]
    pub simulator_udid: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ViewerConfig {
    #[serde(default = "default_source_url")]
    pub source_url: String,
    /// Polls per second.
    #[serde(default = "default_frequency")]
    pub frequency: f64,
    #[serde(default = "default_fade_duration_ms")]
    pub fade_duration_ms: u64,
    #[serde(default = "default_fade_steps")]
    pub fade_steps: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            frequency: default_frequency(),
            simulator_udid: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            source_url: default_source_url(),
            frequency: default_frequency(),
            fade_duration_ms: default_fade_duration_ms(),
            fade_steps: default_fade_steps(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl CaptureConfig {
    /// Tick period derived from the capture frequency.
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frequency)
    }
}

impl ViewerConfig {
    /// Tick period derived from the poll frequency.
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frequency)
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the runtime would choke on. There is no
    /// silent fallback to a default port or frequency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        validate_frequency("capture", self.capture.frequency)?;
        validate_frequency("viewer", self.viewer.frequency)?;
        if self.viewer.fade_steps == 0 {
            return Err(ConfigError::InvalidFadeSteps);
        }
        Ok(())
    }
}

/// Frequencies are ticks per second and must divide into a finite period.
pub fn validate_frequency(what: &'static str, frequency: f64) -> Result<(), ConfigError> {
    if !frequency.is_finite() || frequency <= 0.0 {
        return Err(ConfigError::InvalidFrequency(what, frequency));
    }
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("port must be in 1-65535")]
    InvalidPort,
    #[error("{0} frequency {1} is invalid: must be a positive number of ticks per second")]
    InvalidFrequency(&'static str, f64),
    #[error("fade_steps must be at least 1")]
    InvalidFadeSteps,
}

// Default value functions
fn default_frequency() -> f64 {
    1.0
}
fn default_port() -> u16 {
    8080
}
fn default_source_url() -> String {
    "http://localhost:8080/latest.png".into()
}
fn default_fade_duration_ms() -> u64 {
    300
}
fn default_fade_steps() -> u32 {
    15
}
fn default_log_level() -> String {
    "info".into()
}
