//! # Configuration Management
//!
//! This module handles loading and parsing configuration from the frida-config.toml file.
//! It provides a centralized way to configure the arrivals feed, the display panel,
//! speech, buttons and development mode.
//!
//! Configuration is loaded once at startup and never changes afterwards. Environment
//! variables are applied on top of the file:
//! - `FRIDA_TRANSIT_URL`: arrivals feed URL
//! - `FRIDA_API_KEY`: bearer token for the feed
//! - `FRIDA_DEV_MODE`: `1`/`true` to run without hardware

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use std::{env, fs, io};
use thiserror::Error;
use tracing::info;

/// Default configuration file name, looked up in the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "frida-config.toml";

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file exists but could not be read
    #[error("config IO: {0}")]
    Io(#[from] io::Error),

    /// The file is not valid TOML or has the wrong shape
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// The file parsed but a value is out of range
    #[error("invalid config value: {0}")]
    Invalid(String),
}

/// Application configuration loaded from frida-config.toml
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Process-wide settings
    pub general: GeneralConfig,
    /// Arrivals feed configuration
    pub transit: TransitConfig,
    /// Display panel configuration
    pub display: DisplayConfig,
    /// Speech announcement configuration
    pub audio: AudioConfig,
    /// Push button configuration
    pub input: InputConfig,
}

/// Process-wide settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Run without real hardware: console display, stdin buttons, demo data
    pub dev_mode: bool,
    /// How long loops get to exit on shutdown before teardown proceeds anyway
    pub shutdown_grace_secs: u64,
    /// Log file written alongside stderr; empty disables it
    pub log_file: String,
}

/// Arrivals feed configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransitConfig {
    /// Feed URL; empty means "not configured"
    pub url: String,
    /// Optional bearer token sent with every request
    pub api_key: Option<String>,
    /// Optional stop identifier passed as the `stop` query parameter
    pub stop_id: Option<String>,
    /// Seconds between fetches; also the retry interval after a failure
    pub refresh_interval_secs: u64,
    /// Upper bound for a single fetch
    pub timeout_secs: u64,
    /// Keep at most this many arrivals from each response
    pub max_arrivals: usize,
}

/// Display panel configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Panel model: `epd4in2b_v2` or `console`
    pub model: String,
    /// Rotation in degrees (0, 90, 180 or 270)
    pub rotation: u16,
    /// Seconds between scheduled redraws. E-ink panels wear out with refreshes,
    /// so this is normally much coarser than the fetch interval.
    pub refresh_interval_secs: u64,
    /// Upper bound for a single display call (a full e-ink refresh takes ~15s)
    pub timeout_secs: u64,
    /// Clear the panel during teardown before putting it to sleep
    pub clear_on_exit: bool,
    /// Placeholder shown before any arrivals have been fetched
    pub no_data_message: String,
    /// GPIO wiring of the panel
    pub hardware: DisplayHardwareConfig,
}

/// GPIO and SPI wiring of the e-ink panel (BCM numbering)
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DisplayHardwareConfig {
    pub dc_pin: u8,
    pub rst_pin: u8,
    pub busy_pin: u8,
    pub spi_device: String,
}

/// Speech announcement configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AudioConfig {
    pub enabled: bool,
    /// Text-to-speech program; the phrase is passed as its last argument
    pub command: String,
    /// Extra arguments placed before the phrase
    pub args: Vec<String>,
    /// Phrase template with `{route}`, `{destination}` and `{minutes}` placeholders
    pub phrase_template: String,
    /// Phrase spoken when there is nothing to announce
    pub no_data_phrase: String,
    /// Upper bound for one announcement
    pub timeout_secs: u64,
}

/// Push button configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct InputConfig {
    pub enabled: bool,
    /// BCM pin of the "announce" button
    pub announce_pin: u8,
    /// BCM pin of the "next arrival" button
    pub cycle_pin: u8,
    /// Presses closer together than this are treated as contact bounce
    pub debounce_ms: u64,
    /// Button events buffered before new presses are dropped
    pub queue_capacity: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        GeneralConfig {
            dev_mode: false,
            shutdown_grace_secs: 5,
            log_file: "logs/frida-freq.log".to_string(),
        }
    }
}

impl Default for TransitConfig {
    fn default() -> Self {
        TransitConfig {
            url: String::new(),
            api_key: None,
            stop_id: None,
            refresh_interval_secs: 60,
            timeout_secs: 10,
            max_arrivals: 8,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        DisplayConfig {
            model: "epd4in2b_v2".to_string(),
            rotation: 0,
            refresh_interval_secs: 300,
            timeout_secs: 45,
            clear_on_exit: true,
            no_data_message: "No arrival data".to_string(),
            hardware: DisplayHardwareConfig::default(),
        }
    }
}

impl Default for DisplayHardwareConfig {
    fn default() -> Self {
        // Waveshare e-Paper HAT wiring
        DisplayHardwareConfig {
            dc_pin: 25,
            rst_pin: 17,
            busy_pin: 24,
            spi_device: "/dev/spidev0.0".to_string(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        AudioConfig {
            enabled: true,
            command: "espeak".to_string(),
            args: Vec::new(),
            phrase_template: "{route} to {destination} in {minutes}".to_string(),
            no_data_phrase: "No arrival data available".to_string(),
            timeout_secs: 15,
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        InputConfig {
            enabled: true,
            announce_pin: 5,
            cycle_pin: 6,
            debounce_ms: 200,
            queue_capacity: 8,
        }
    }
}

impl Config {
    /// Load configuration from specified path.
    ///
    /// A missing file falls back to the default configuration. A file that exists
    /// but does not parse or validate is an error: running with silently ignored
    /// settings on a headless device is worse than refusing to start.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = match fs::read_to_string(path) {
            Ok(contents) => {
                let config = toml::from_str::<Config>(&contents)?;
                info!(path = %path.display(), "loaded configuration");
                config
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no config file found, using defaults");
                Self::default()
            }
            Err(e) => return Err(e.into()),
        };
        config.validate()?;
        Ok(config)
    }

    /// Apply `FRIDA_*` environment overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup (the process environment in production).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("FRIDA_TRANSIT_URL") {
            self.transit.url = url;
        }
        if let Some(key) = lookup("FRIDA_API_KEY").filter(|k| !k.is_empty()) {
            self.transit.api_key = Some(key);
        }
        if let Some(flag) = lookup("FRIDA_DEV_MODE") {
            self.general.dev_mode = matches!(flag.trim(), "1" | "true" | "yes" | "on");
        }
    }

    /// Reject values that would make a loop spin or a channel unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("transit.refresh_interval_secs", self.transit.refresh_interval_secs),
            ("transit.timeout_secs", self.transit.timeout_secs),
            ("display.refresh_interval_secs", self.display.refresh_interval_secs),
            ("display.timeout_secs", self.display.timeout_secs),
            ("audio.timeout_secs", self.audio.timeout_secs),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be greater than 0")));
            }
        }
        if self.input.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "input.queue_capacity must be greater than 0".to_string(),
            ));
        }
        if self.display.rotation % 90 != 0 || self.display.rotation >= 360 {
            return Err(ConfigError::Invalid(format!(
                "display.rotation must be 0, 90, 180 or 270 (got {})",
                self.display.rotation
            )));
        }
        Ok(())
    }

    pub fn fetch_interval(&self) -> Duration {
        Duration::from_secs(self.transit.refresh_interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.transit.timeout_secs)
    }

    pub fn render_interval(&self) -> Duration {
        Duration::from_secs(self.display.refresh_interval_secs)
    }

    pub fn display_timeout(&self) -> Duration {
        Duration::from_secs(self.display.timeout_secs)
    }

    pub fn announce_timeout(&self) -> Duration {
        Duration::from_secs(self.audio.timeout_secs)
    }

    /// Where to persist logs, if anywhere.
    pub fn log_file(&self) -> Option<&Path> {
        let path = self.general.log_file.trim();
        (!path.is_empty()).then(|| Path::new(path))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.general.shutdown_grace_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(!config.general.dev_mode);
        assert_eq!(config.transit.refresh_interval_secs, 60);
        assert_eq!(config.display.refresh_interval_secs, 300);
        assert_eq!(config.display.model, "epd4in2b_v2");
        assert_eq!(config.input.queue_capacity, 8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_roundtrip() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(config.display.model, parsed.display.model);
        assert_eq!(config.audio.phrase_template, parsed.audio.phrase_template);
    }

    #[test]
    fn test_load_nonexistent_file() {
        let config = Config::load_from_path("/nonexistent/path").unwrap();
        // Should fallback to default
        assert_eq!(config.transit.refresh_interval_secs, 60);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let file = NamedTempFile::new().unwrap();
        fs::write(
            file.path(),
            r#"
[general]
dev_mode = true

[display]
rotation = 180
refresh_interval_secs = 600
"#,
        )
        .unwrap();

        let config = Config::load_from_path(file.path()).unwrap();
        assert!(config.general.dev_mode);
        assert_eq!(config.display.rotation, 180);
        assert_eq!(config.render_interval(), Duration::from_secs(600));
        assert_eq!(config.display.hardware.busy_pin, 24);
        assert_eq!(config.fetch_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let file = NamedTempFile::new().unwrap();
        fs::write(file.path(), "[transit\nurl = ").unwrap();
        assert!(matches!(
            Config::load_from_path(file.path()),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_validation_rejects_zero_interval_and_bad_rotation() {
        let mut config = Config::default();
        config.transit.refresh_interval_secs = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.display.rotation = 45;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.input.queue_capacity = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("FRIDA_TRANSIT_URL", "https://example.test/arrivals"),
            ("FRIDA_API_KEY", "secret"),
            ("FRIDA_DEV_MODE", "true"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.transit.url, "https://example.test/arrivals");
        assert_eq!(config.transit.api_key.as_deref(), Some("secret"));
        assert!(config.general.dev_mode);
    }

    #[test]
    fn test_empty_api_key_override_is_ignored() {
        let mut config = Config::default();
        config.transit.api_key = Some("from-file".to_string());
        config.apply_overrides(|key| (key == "FRIDA_API_KEY").then(String::new));
        assert_eq!(config.transit.api_key.as_deref(), Some("from-file"));
    }
}
