//! Error types for the gs-pipeline crate.
//!
//! # Error Taxonomy
//!
//! | Error | Scope | Effect |
//! |-------|-------|--------|
//! | [`PipelineError::WatchSetup`] | pipeline | logged, pipeline does not start |
//! | [`JobError::StabilityTimeout`] | job | job dropped, watching continues |
//! | [`JobError::Conversion`] | job | job dropped with path and cause logged |
//! | [`JobError::Persistence`] | job | job dropped, no partial buffers exposed |
//! | [`JobError::ActivationTargetMissing`] | job | asset retained but not shown |
//!
//! No job-scoped error is retried. A later filesystem event for the same
//! path creates a fresh job.

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use gs_core::{BufferKind, ConfigError, ConvertError, FailureReason};
use gs_watcher::WatchError;

/// Errors raised by the [`AssetStore`](crate::AssetStore).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The asset name cannot be used as a storage namespace.
    #[error("invalid asset name '{name}': {reason}")]
    InvalidName {
        /// The rejected name.
        name: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// A buffer or the manifest could not be written.
    #[error("failed to write {path}: {source}")]
    Write {
        /// The file being written.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A buffer or the manifest could not be read back.
    #[error("failed to read {path}: {source}")]
    Read {
        /// The file being read.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The manifest exists but cannot be parsed or serialized.
    #[error("invalid manifest {path}: {source}")]
    Manifest {
        /// The manifest file.
        path: Utf8PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// A reloaded buffer does not have the length the manifest records.
    #[error("{kind} buffer {path} has {actual} bytes, manifest records {expected}")]
    LengthMismatch {
        /// The buffer file.
        path: Utf8PathBuf,
        /// Which buffer.
        kind: BufferKind,
        /// Length recorded in the manifest.
        expected: u64,
        /// Length found on disk.
        actual: u64,
    },
}

impl StoreError {
    /// Creates a new [`StoreError::Write`] error.
    #[inline]
    pub fn write(path: impl Into<Utf8PathBuf>, source: std::io::Error) -> Self {
        Self::Write {
            path: path.into(),
            source,
        }
    }

    /// Creates a new [`StoreError::Read`] error.
    #[inline]
    pub fn read(path: impl Into<Utf8PathBuf>, source: std::io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }

    /// Returns `true` if the error means the asset is simply not stored.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Read { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }

    /// Returns the file path associated with this error, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Utf8PathBuf> {
        match self {
            Self::Write { path, .. }
            | Self::Read { path, .. }
            | Self::Manifest { path, .. }
            | Self::LengthMismatch { path, .. } => Some(path),
            Self::InvalidName { .. } => None,
        }
    }
}

/// A job-scoped failure.
///
/// Every variant terminates only its own job; the pipeline keeps watching.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// The file kept changing (or stayed empty) for the whole timeout.
    #[error("{path} did not stabilize within {}ms", waited.as_millis())]
    StabilityTimeout {
        /// The watched file.
        path: Utf8PathBuf,
        /// How long the detector polled.
        waited: Duration,
    },

    /// The converter returned an error or panicked.
    #[error("converting {path} failed: {source}")]
    Conversion {
        /// The input file.
        path: Utf8PathBuf,
        /// What the converter reported.
        #[source]
        source: ConvertError,
    },

    /// The buffers could not be written or reloaded.
    #[error("persisting {path} failed: {source}")]
    Persistence {
        /// The input file.
        path: Utf8PathBuf,
        /// What the store reported.
        #[source]
        source: StoreError,
    },

    /// No render target is wired up; the asset is retained but not shown.
    #[error("no render target for {path}; asset retained but not shown")]
    ActivationTargetMissing {
        /// The input file.
        path: Utf8PathBuf,
    },
}

impl JobError {
    /// Returns the failure category recorded on the job.
    ///
    /// `ActivationTargetMissing` is not a failure: the job completes
    /// unapplied, so it has no reason.
    #[must_use]
    pub const fn reason(&self) -> Option<FailureReason> {
        match self {
            Self::StabilityTimeout { .. } => Some(FailureReason::StabilityTimeout),
            Self::Conversion { .. } => Some(FailureReason::ConversionError),
            Self::Persistence { .. } => Some(FailureReason::PersistenceError),
            Self::ActivationTargetMissing { .. } => None,
        }
    }

    /// Returns the pipeline stage the job was in.
    #[must_use]
    pub const fn stage(&self) -> &'static str {
        match self {
            Self::StabilityTimeout { .. } => "stabilizing",
            Self::Conversion { .. } => "converting",
            Self::Persistence { .. } => "persisting",
            Self::ActivationTargetMissing { .. } => "activating",
        }
    }

    /// Returns the input path the job was importing.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        match self {
            Self::StabilityTimeout { path, .. }
            | Self::Conversion { path, .. }
            | Self::Persistence { path, .. }
            | Self::ActivationTargetMissing { path } => path,
        }
    }

    /// Job errors never stop the pipeline.
    #[inline]
    #[must_use]
    #[allow(clippy::unused_self)] // Kept for parity with the other error types
    pub const fn is_recoverable(&self) -> bool {
        true
    }

    /// Logs the error once, at the level its category calls for.
    pub fn log(&self) {
        match self {
            Self::StabilityTimeout { .. } | Self::ActivationTargetMissing { .. } => {
                tracing::warn!(
                    path = %self.path(),
                    stage = self.stage(),
                    error = %self,
                    "Import job did not complete"
                );
            }
            Self::Conversion { .. } | Self::Persistence { .. } => {
                tracing::error!(
                    path = %self.path(),
                    stage = self.stage(),
                    error = %self,
                    "Import job failed"
                );
            }
        }
    }
}

/// Errors that prevent the pipeline from starting.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The watch directory could not be observed.
    #[error("watch setup failed: {0}")]
    WatchSetup(#[from] WatchError),

    /// The configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A required collaborator was not supplied to the builder.
    #[error("pipeline is missing a {0}")]
    MissingComponent(&'static str),
}
