//! Configuration structures for pollwatch.
//!
//! - [`WatchConfig`] - Poll loop settings (interval, channel capacity, chmod detection)
//! - [`Config`] - Root configuration: watch settings plus the initial paths
//!
//! Both types implement [`Default`] and deserialize with `#[serde(default)]`,
//! so a configuration file only needs to name the fields it changes.

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Configuration for the polling watcher.
///
/// # Examples
///
/// ```
/// use pw_core::WatchConfig;
/// use std::time::Duration;
///
/// let config = WatchConfig::default();
/// assert_eq!(config.interval(), Duration::from_millis(100));
/// assert_eq!(config.channel_capacity, 1);
/// assert!(!config.detect_chmod);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Time between two scans, in milliseconds.
    pub interval_ms: u64,

    /// Capacity of the event and error channels.
    ///
    /// The default of 1 makes each send a handoff to the consumer: the poll
    /// loop cannot run ahead of a slow reader by more than one item.
    pub channel_capacity: usize,

    /// Report permission-only changes as `CHMOD` events.
    ///
    /// Off by default, in which case a change of permission bits alone
    /// produces no event.
    pub detect_chmod: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            interval_ms: 100,
            channel_capacity: 1,
            detect_chmod: false,
        }
    }
}

impl WatchConfig {
    /// Returns the poll interval as a [`Duration`].
    #[inline]
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Checks that every option holds a usable value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOption`] if `interval_ms` or
    /// `channel_capacity` is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_ms == 0 {
            return Err(ConfigError::InvalidOption {
                option: "interval_ms".to_owned(),
                reason: "must be greater than zero".to_owned(),
            });
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::InvalidOption {
                option: "channel_capacity".to_owned(),
                reason: "must be greater than zero".to_owned(),
            });
        }
        Ok(())
    }
}

/// Root configuration for pollwatch.
///
/// # Examples
///
/// ```
/// use pw_core::Config;
///
/// let config = Config::from_json_str(r#"{"paths": ["/var/log"], "watch": {"interval_ms": 500}}"#)?;
/// assert_eq!(config.paths.len(), 1);
/// assert_eq!(config.watch.interval_ms, 500);
/// assert_eq!(config.watch.channel_capacity, 1);
/// # Ok::<(), pw_core::ConfigError>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Poll loop settings.
    pub watch: WatchConfig,

    /// Paths to register as watch targets on startup.
    pub paths: Vec<Utf8PathBuf>,
}

impl Config {
    /// Parses and validates a configuration from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed JSON, or
    /// [`ConfigError::InvalidOption`] if validation fails.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.watch.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingFile`] if `path` does not exist,
    /// [`ConfigError::Io`] if it cannot be read, and the errors of
    /// [`Config::from_json_str`] otherwise.
    pub fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path.as_std_path()) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::MissingFile(path.to_owned()));
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };
        Self::from_json_str(&contents)
    }
}
