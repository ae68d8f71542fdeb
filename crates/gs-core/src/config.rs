//! Configuration structures for gs-hotload.
//!
//! This module provides configuration types for every stage of the import
//! pipeline:
//!
//! - [`WatchConfig`] - Watch directory, tracked file names, startup behaviour
//! - [`StabilityConfig`] - Size polling interval, streak threshold, timeout
//! - [`ImportConfig`] - Converter options and import parallelism
//! - [`StoreConfig`] - Durable buffer storage location
//! - [`Config`] - Root configuration combining all settings
//!
//! All configuration types implement [`Default`] and deserialize with
//! `#[serde(default)]`, so a partial JSON file is enough.

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use smallvec::{SmallVec, smallvec};

use crate::error::ConfigError;

/// Configuration for the filesystem watcher.
///
/// # Examples
///
/// ```
/// use gs_core::WatchConfig;
///
/// let config = WatchConfig::default();
/// assert_eq!(config.tracked_names.as_slice(), ["output.ply"]);
/// assert!(config.process_existing_on_start);
/// assert!(!config.recursive);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Directory to watch for the interchange file.
    pub watch_dir: Utf8PathBuf,

    /// File names that trigger an import, compared case-insensitively.
    ///
    /// Anything else in the directory (sample files, intermediates) is ignored.
    pub tracked_names: SmallVec<[String; 2]>,

    /// Whether files already present when watching starts are imported.
    pub process_existing_on_start: bool,

    /// Whether to watch subdirectories recursively.
    pub recursive: bool,

    /// Capacity of the bounded channel between the observer thread and
    /// the pipeline driver.
    pub event_capacity: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            watch_dir: Utf8PathBuf::from("."),
            tracked_names: smallvec!["output.ply".to_owned()],
            process_existing_on_start: true,
            recursive: false,
            event_capacity: 100,
        }
    }
}

/// Configuration for the stability detector.
///
/// A file is considered completely written once `threshold` consecutive
/// polls, `poll_interval_ms` apart, observe the same non-zero size.
///
/// # Examples
///
/// ```
/// use gs_core::StabilityConfig;
/// use std::time::Duration;
///
/// let config = StabilityConfig::default();
/// assert_eq!(config.poll_interval(), Duration::from_millis(250));
/// assert_eq!(config.threshold, 4);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilityConfig {
    /// Interval between size polls, in milliseconds.
    pub poll_interval_ms: u64,

    /// Consecutive equal, non-zero size readings required.
    pub threshold: u32,

    /// Upper bound on the total wait, in milliseconds.
    pub timeout_ms: u64,
}

impl StabilityConfig {
    /// Returns the poll interval as a [`Duration`].
    #[inline]
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Returns the stability timeout as a [`Duration`].
    #[inline]
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 250,
            threshold: 4,
            timeout_ms: 60_000,
        }
    }
}

/// Configuration for the import queue and converter calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Whether the converter should also import auxiliary metadata such as
    /// the camera list.
    pub include_aux_metadata: bool,

    /// Maximum number of distinct paths converted at the same time.
    ///
    /// A path is never converted twice concurrently regardless of this value.
    pub max_parallel_imports: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            include_aux_metadata: false,
            max_parallel_imports: 1,
        }
    }
}

/// Configuration for durable buffer storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Root directory under which each asset gets its own namespace.
    pub root: Utf8PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: Utf8PathBuf::from("Resources"),
        }
    }
}

/// Root configuration for gs-hotload.
///
/// # Examples
///
/// ```
/// use gs_core::Config;
///
/// let config = Config::default();
/// assert!(config.validate().is_ok());
///
/// let json = serde_json::to_string_pretty(&config).unwrap();
/// let parsed: Config = serde_json::from_str(&json).unwrap();
/// assert_eq!(config, parsed);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Filesystem watcher configuration.
    pub watch: WatchConfig,

    /// Stability detector configuration.
    pub stability: StabilityConfig,

    /// Import queue configuration.
    pub import: ImportConfig,

    /// Buffer storage configuration.
    pub store: StoreConfig,
}

impl Config {
    /// Loads a configuration from a JSON file.
    ///
    /// Missing fields fall back to their defaults. The result is not
    /// validated; call [`Config::validate`] once all overrides are applied.
    pub fn from_file(path: &Utf8Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Checks option values that would make the pipeline misbehave.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.watch.tracked_names.is_empty() {
            return Err(ConfigError::invalid_option(
                "watch.tracked_names",
                "at least one file name is required",
            ));
        }
        for name in &self.watch.tracked_names {
            if name.is_empty() || name.contains(['/', '\\']) {
                return Err(ConfigError::InvalidPath {
                    path: Utf8PathBuf::from(name),
                    reason: "tracked names must be bare file names".to_owned(),
                });
            }
        }
        if self.watch.event_capacity == 0 {
            return Err(ConfigError::invalid_option(
                "watch.event_capacity",
                "must be positive",
            ));
        }
        if self.stability.poll_interval_ms == 0 {
            return Err(ConfigError::invalid_option(
                "stability.poll_interval_ms",
                "must be positive",
            ));
        }
        if self.stability.threshold == 0 {
            return Err(ConfigError::invalid_option(
                "stability.threshold",
                "must be at least 1",
            ));
        }
        if self.stability.timeout_ms == 0 {
            return Err(ConfigError::invalid_option(
                "stability.timeout_ms",
                "must be positive",
            ));
        }
        if self.import.max_parallel_imports == 0 {
            return Err(ConfigError::invalid_option(
                "import.max_parallel_imports",
                "must be positive",
            ));
        }
        Ok(())
    }
}
