//! Configuration loading using Figment.
//!
//! Configuration is loaded from:
//! 1. `config/tether.toml` (base configuration, optional)
//! 2. Environment variables prefixed with `TETHER_`, nested keys split on `__`
//!
//! Every field has a default, so an empty file (or no file) yields a working
//! configuration.
//!
//! # Example
//! ```no_run
//! use rust_tether::config::TetherConfig;
//!
//! let config = TetherConfig::load()?;
//! config.validate()?;
//! println!("Storage root: {}", config.storage.root.display());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Override from the environment:
//! `TETHER_TIMING__EVENT_WAIT=2s TETHER_APPLICATION__LOG_LEVEL=debug tether monitor`

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tether_core::{RetryPolicy, TransportDescriptor};

/// Config file read by [`TetherConfig::load`].
pub const DEFAULT_CONFIG_PATH: &str = "config/tether.toml";
/// Environment override prefix; nested keys are split on `__`.
pub const ENV_PREFIX: &str = "TETHER_";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TetherConfig {
    /// Name and logging
    pub application: ApplicationConfig,
    /// Capture output
    pub storage: StorageConfig,
    /// Driver location and transport
    pub driver: DriverConfig,
    /// Loop cadences
    pub timing: TimingConfig,
    /// Retry policies
    pub retry: RetryConfig,
    /// Live view widgets
    pub live_view: LiveViewConfig,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line, colored
    #[default]
    Pretty,
    /// One line per event
    Compact,
    /// Newline-delimited JSON
    Json,
}

/// Application name and logging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// trace, debug, info, warn or error
    pub log_level: String,
    /// Log output format
    pub log_format: LogFormat,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "rust-tether".to_string(),
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

/// Where captured media is written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for captured files; created on first save
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("captures"),
        }
    }
}

/// Driver location and camera transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Directory holding the driver's camera and port plugins.
    pub search_path: PathBuf,
    /// `auto`, `usb-fd:<n>` or a driver port string.
    pub transport: TransportDescriptor,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            search_path: PathBuf::from("/usr/lib/tether/drivers"),
            transport: TransportDescriptor::Auto,
        }
    }
}

/// Loop cadences. Durations use humantime syntax (`5s`, `100ms`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Timeout passed to each wait-for-event call.
    #[serde(with = "humantime_serde")]
    pub event_wait: Duration,
    /// Bounded stop-signal wait at the end of each monitor iteration.
    #[serde(with = "humantime_serde")]
    pub event_poll: Duration,
    /// Sleep between preview frames (~24 fps).
    #[serde(with = "humantime_serde")]
    pub frame_interval: Duration,
    /// Sleep after a failed driver call inside a background loop.
    #[serde(with = "humantime_serde")]
    pub transient_backoff: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            event_wait: Duration::from_secs(5),
            event_poll: Duration::from_millis(100),
            frame_interval: Duration::from_millis(42),
            transient_backoff: Duration::from_millis(500),
        }
    }
}

/// One fixed-delay retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Sleep between attempts
    #[serde(with = "humantime_serde")]
    pub backoff: Duration,
}

impl RetrySettings {
    /// `max_attempts` calls, `backoff` apart.
    pub const fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// As a [`RetryPolicy`].
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, self.backoff)
    }
}

/// Retry policies per call site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Handle create + init during open.
    pub init: RetrySettings,
    /// Root config fetch; only busy is retried.
    pub config_fetch: RetrySettings,
    /// File download after a file-added event.
    pub event_fetch: RetrySettings,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            init: RetrySettings::new(3, Duration::from_millis(500)),
            config_fetch: RetrySettings::new(5, Duration::from_millis(500)),
            event_fetch: RetrySettings::new(5, Duration::from_millis(300)),
        }
    }
}

/// Widgets touched when live view starts and stops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveViewConfig {
    /// Toggle switched on while streaming
    pub control_mode_widget: String,
    /// Preview size widget
    pub size_widget: String,
    /// Preview size set on start
    pub size: String,
}

impl Default for LiveViewConfig {
    fn default() -> Self {
        Self {
            control_mode_widget: "controlmode".to_string(),
            size_widget: "liveviewsize".to_string(),
            size: "XGA".to_string(),
        }
    }
}

const VALID_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl TetherConfig {
    /// Load configuration from `config/tether.toml` and environment variables.
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path. A missing file is not
    /// an error; defaults and environment overrides still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        if !VALID_LEVELS.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                VALID_LEVELS.join(", ")
            ));
        }

        if self.storage.root.as_os_str().is_empty() {
            return Err("storage.root must not be empty".to_string());
        }

        for (name, settings) in [
            ("init", &self.retry.init),
            ("config_fetch", &self.retry.config_fetch),
            ("event_fetch", &self.retry.event_fetch),
        ] {
            if settings.max_attempts == 0 {
                return Err(format!("retry.{}.max_attempts must be at least 1", name));
            }
        }

        if self.timing.frame_interval.is_zero() {
            return Err("timing.frame_interval must be non-zero".to_string());
        }
        if self.timing.event_wait.is_zero() {
            return Err("timing.event_wait must be non-zero".to_string());
        }
        if self.timing.event_poll.is_zero() {
            return Err("timing.event_poll must be non-zero".to_string());
        }

        if self.live_view.control_mode_widget.is_empty() || self.live_view.size_widget.is_empty() {
            return Err("live_view widget names must not be empty".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = TetherConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.timing.event_wait, Duration::from_secs(5));
        assert_eq!(config.timing.frame_interval, Duration::from_millis(42));
        assert_eq!(config.retry.init.policy(), RetryPolicy::new(3, Duration::from_millis(500)));
        assert_eq!(config.retry.event_fetch.max_attempts, 5);
        assert_eq!(config.live_view.size, "XGA");
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut config = TetherConfig::default();
        config.application.log_level = "verbose".to_string();
        assert!(config.validate().unwrap_err().contains("log_level"));

        let mut config = TetherConfig::default();
        config.retry.config_fetch.max_attempts = 0;
        assert!(config.validate().unwrap_err().contains("config_fetch"));

        let mut config = TetherConfig::default();
        config.timing.frame_interval = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn load_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[application]
log_level = "debug"
log_format = "json"

[storage]
root = "/tmp/shots"

[driver]
transport = "usb-fd:17"

[timing]
event_wait = "2s"
frame_interval = "40ms"

[retry.event_fetch]
max_attempts = 7
backoff = "150ms"
"#
        )
        .unwrap();

        let config = TetherConfig::load_from(file.path()).unwrap();
        assert_eq!(config.application.log_level, "debug");
        assert_eq!(config.application.log_format, LogFormat::Json);
        assert_eq!(config.storage.root, PathBuf::from("/tmp/shots"));
        assert_eq!(config.driver.transport, TransportDescriptor::UsbFd(17));
        assert_eq!(config.timing.event_wait, Duration::from_secs(2));
        assert_eq!(config.timing.frame_interval, Duration::from_millis(40));
        // untouched fields keep their defaults
        assert_eq!(config.timing.event_poll, Duration::from_millis(100));
        assert_eq!(config.retry.event_fetch, RetrySettings::new(7, Duration::from_millis(150)));
        assert_eq!(config.retry.init.max_attempts, 3);
    }

    #[test]
    #[serial]
    fn missing_file_yields_defaults() {
        let config = TetherConfig::load_from("/nonexistent/tether.toml").unwrap();
        assert_eq!(config, TetherConfig::default());
    }

    #[test]
    #[serial]
    fn environment_overrides_file() {
        std::env::set_var("TETHER_STORAGE__ROOT", "/var/tether");
        std::env::set_var("TETHER_LIVE_VIEW__SIZE", "VGA");
        let result = TetherConfig::load_from("/nonexistent/tether.toml");
        std::env::remove_var("TETHER_STORAGE__ROOT");
        std::env::remove_var("TETHER_LIVE_VIEW__SIZE");

        let config = result.unwrap();
        assert_eq!(config.storage.root, PathBuf::from("/var/tether"));
        assert_eq!(config.live_view.size, "VGA");
    }
}
