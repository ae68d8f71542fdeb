//! Error types for the gs-watcher crate.
//!
//! Every [`WatchError`] returned from [`FileWatcher::new`] is a setup
//! failure: the pipeline does not start and no jobs are ever produced.
//! Errors raised after setup are logged by the observer thread and skipped.
//!
//! [`FileWatcher::new`]: crate::FileWatcher::new

use camino::Utf8PathBuf;

/// Errors that can occur while setting up or running the filesystem observer.
///
/// # Error Recovery Strategy
///
/// - **Notify errors** ([`WatchError::Notify`]): Fatal - the OS watch could not be registered
/// - **Path not found** ([`WatchError::PathNotFound`]): Fatal - the watch directory must exist
/// - **Not a directory** ([`WatchError::NotADirectory`]): Fatal - only directories are watched
/// - **Channel closed** ([`WatchError::ChannelClosed`]): Fatal - the consumer is gone
/// - **Non-UTF-8 path** ([`WatchError::NonUtf8Path`]): Recoverable - skip and continue
/// - **Walk errors** ([`WatchError::Walk`]): Recoverable - startup enumeration entry skipped
/// - **I/O errors** ([`WatchError::Io`]): Fatal - propagate immediately
///
/// # Examples
///
/// ```
/// use gs_watcher::WatchError;
///
/// fn handle_error(err: &WatchError) {
///     if err.is_fatal() {
///         eprintln!("watcher cannot start: {err}");
///     } else {
///         eprintln!("skipping: {err}");
///     }
/// }
/// ```
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// Failed to initialize or register the notify watcher.
    #[error("notify watcher error: {0}")]
    Notify(#[from] notify::Error),

    /// The watch directory does not exist.
    #[error("watch directory does not exist: {0}")]
    PathNotFound(Utf8PathBuf),

    /// The watch path exists but is not a directory.
    #[error("watch path is not a directory: {0}")]
    NotADirectory(Utf8PathBuf),

    /// The event channel was closed unexpectedly.
    #[error("event channel closed unexpectedly")]
    ChannelClosed,

    /// A path is not valid UTF-8.
    #[error("path is not valid UTF-8: {}", _0.display())]
    NonUtf8Path(std::path::PathBuf),

    /// Enumerating files already present in the watch directory failed.
    #[error("failed to enumerate watch directory: {0}")]
    Walk(#[from] ignore::Error),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl WatchError {
    /// Creates a new [`WatchError::PathNotFound`] error.
    #[inline]
    pub fn path_not_found(path: impl Into<Utf8PathBuf>) -> Self {
        Self::PathNotFound(path.into())
    }

    /// Creates a new [`WatchError::NotADirectory`] error.
    #[inline]
    pub fn not_a_directory(path: impl Into<Utf8PathBuf>) -> Self {
        Self::NotADirectory(path.into())
    }

    /// Creates a new [`WatchError::NonUtf8Path`] error.
    #[inline]
    pub fn non_utf8_path(path: impl Into<std::path::PathBuf>) -> Self {
        Self::NonUtf8Path(path.into())
    }

    /// Returns `true` if this error is recoverable (watching can continue).
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::NonUtf8Path(_) | Self::Walk(_))
    }

    /// Returns `true` if this error is fatal (watching should stop).
    #[inline]
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !self.is_recoverable()
    }

    /// Returns the file path associated with this error, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Utf8PathBuf> {
        match self {
            Self::PathNotFound(path) | Self::NotADirectory(path) => Some(path),
            Self::Notify(_)
            | Self::ChannelClosed
            | Self::NonUtf8Path(_)
            | Self::Walk(_)
            | Self::Io(_) => None,
        }
    }
}
