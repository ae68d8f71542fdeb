//! Error types for the gs-core crate.
//!
//! This module provides [`ConfigError`] for configuration loading and
//! validation, and [`ConvertError`] for failures reported by a
//! [`Converter`](crate::Converter).

use camino::Utf8PathBuf;

/// Errors that can occur during configuration loading and validation.
///
/// # Examples
///
/// ```
/// use gs_core::ConfigError;
///
/// let error = ConfigError::invalid_option("stability.threshold", "must be at least 1");
/// assert!(error.to_string().contains("stability.threshold"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The provided path is invalid or malformed.
    #[error("invalid path '{path}': {reason}")]
    InvalidPath {
        /// The invalid path.
        path: Utf8PathBuf,
        /// Explanation of why the path is invalid.
        reason: String,
    },

    /// A configuration option has an invalid value.
    #[error("invalid configuration option '{option}': {reason}")]
    InvalidOption {
        /// The name of the invalid option.
        option: String,
        /// Explanation of why the option is invalid.
        reason: String,
    },

    /// An I/O error occurred while reading configuration.
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ConfigError {
    /// Creates a new [`ConfigError::InvalidOption`] error.
    #[inline]
    pub fn invalid_option(option: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidOption {
            option: option.into(),
            reason: reason.into(),
        }
    }
}

/// Errors reported across the converter boundary.
///
/// The pipeline treats every variant the same way (the job fails with a
/// conversion error); the variants exist so the log line says what went wrong.
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    /// The input file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// The file that couldn't be read.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The input file was read but its contents are not usable.
    #[error("malformed input {path}: {reason}")]
    Malformed {
        /// The offending file.
        path: Utf8PathBuf,
        /// What was wrong with it.
        reason: String,
    },

    /// Auxiliary metadata (e.g. the camera list) could not be imported.
    #[error("failed to import auxiliary metadata {path}: {reason}")]
    AuxMetadata {
        /// The auxiliary file.
        path: Utf8PathBuf,
        /// What was wrong with it.
        reason: String,
    },

    /// The converter failed for a reason of its own.
    #[error("conversion failed: {0}")]
    Failed(String),
}

impl ConvertError {
    /// Creates a new [`ConvertError::Read`] error.
    #[inline]
    pub fn read(path: impl Into<Utf8PathBuf>, source: std::io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }

    /// Creates a new [`ConvertError::Malformed`] error.
    #[inline]
    pub fn malformed(path: impl Into<Utf8PathBuf>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates a new [`ConvertError::Failed`] error.
    #[inline]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Returns the file path associated with this error, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Utf8PathBuf> {
        match self {
            Self::Read { path, .. }
            | Self::Malformed { path, .. }
            | Self::AuxMetadata { path, .. } => Some(path),
            Self::Failed(_) => None,
        }
    }
}
