//! Event types for filesystem notifications.
//!
//! # Event Flow
//!
//! ```text
//! notify::Event (observer thread)
//!        │
//!        ▼
//!  WatchEventKind::classify   (drops removes, accesses, rename sources)
//!        │
//!        ▼
//!   WatchEvent created
//!        │
//!        ▼
//!   Sent via channel to the pipeline driver
//! ```

use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};
use notify::EventKind;
use notify::event::{ModifyKind, RenameMode};
use serde::{Deserialize, Serialize};

/// What happened to a watched path.
///
/// Removals are not represented: a vanished file cannot be imported, and the
/// stability detector already treats a missing file as "not ready yet".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchEventKind {
    /// The file was created.
    Created,
    /// The file's contents or metadata changed.
    Changed,
    /// The file was moved into place under this name.
    Renamed,
}

impl WatchEventKind {
    /// Maps a notify event kind onto a [`WatchEventKind`].
    ///
    /// Returns `None` for kinds the pipeline never acts on (removals,
    /// accesses, the source half of a rename).
    ///
    /// # Examples
    ///
    /// ```
    /// use gs_watcher::WatchEventKind;
    /// use notify::EventKind;
    /// use notify::event::{CreateKind, RemoveKind};
    ///
    /// assert_eq!(
    ///     WatchEventKind::classify(&EventKind::Create(CreateKind::File)),
    ///     Some(WatchEventKind::Created),
    /// );
    /// assert_eq!(WatchEventKind::classify(&EventKind::Remove(RemoveKind::File)), None);
    /// ```
    #[must_use]
    pub const fn classify(kind: &EventKind) -> Option<Self> {
        match kind {
            EventKind::Create(_) => Some(Self::Created),
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => None,
            EventKind::Modify(ModifyKind::Name(_)) => Some(Self::Renamed),
            EventKind::Modify(_) => Some(Self::Changed),
            _ => None,
        }
    }

    /// Returns a short label for logs.
    #[inline]
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Changed => "changed",
            Self::Renamed => "renamed",
        }
    }
}

impl std::fmt::Display for WatchEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A filesystem event with a UTF-8 path guarantee.
///
/// Ephemeral: produced by the observer thread and consumed immediately by
/// the pipeline driver.
///
/// # Examples
///
/// ```
/// use gs_watcher::{WatchEvent, WatchEventKind};
/// use camino::Utf8PathBuf;
///
/// let event = WatchEvent::new(Utf8PathBuf::from("Auto/output.ply"), WatchEventKind::Created);
/// assert_eq!(event.file_name(), Some("output.ply"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    /// The path of the file the event concerns.
    pub path: Utf8PathBuf,

    /// What happened.
    pub kind: WatchEventKind,

    /// When the observer saw the event.
    ///
    /// Monotonic, suitable for measuring elapsed time but not for display.
    pub observed_at: Instant,
}

impl WatchEvent {
    /// Creates a new event observed now.
    #[inline]
    #[must_use]
    pub fn new(path: Utf8PathBuf, kind: WatchEventKind) -> Self {
        Self {
            path,
            kind,
            observed_at: Instant::now(),
        }
    }

    /// Creates a new event with a specific timestamp.
    ///
    /// Useful for testing or when reconstructing events.
    #[inline]
    #[must_use]
    pub const fn with_timestamp(path: Utf8PathBuf, kind: WatchEventKind, observed_at: Instant) -> Self {
        Self {
            path,
            kind,
            observed_at,
        }
    }

    /// Returns the final path component, if any.
    #[inline]
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name()
    }

    /// Returns the path as a borrowed [`Utf8Path`].
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, DataChange, MetadataKind, RemoveKind};

    #[test]
    fn test_classify_create_and_modify() {
        assert_eq!(
            WatchEventKind::classify(&EventKind::Create(CreateKind::Any)),
            Some(WatchEventKind::Created)
        );
        assert_eq!(
            WatchEventKind::classify(&EventKind::Modify(ModifyKind::Data(DataChange::Content))),
            Some(WatchEventKind::Changed)
        );
        assert_eq!(
            WatchEventKind::classify(&EventKind::Modify(ModifyKind::Metadata(
                MetadataKind::WriteTime
            ))),
            Some(WatchEventKind::Changed)
        );
    }

    #[test]
    fn test_classify_renames() {
        assert_eq!(
            WatchEventKind::classify(&EventKind::Modify(ModifyKind::Name(RenameMode::To))),
            Some(WatchEventKind::Renamed)
        );
        assert_eq!(
            WatchEventKind::classify(&EventKind::Modify(ModifyKind::Name(RenameMode::Both))),
            Some(WatchEventKind::Renamed)
        );
        assert_eq!(
            WatchEventKind::classify(&EventKind::Modify(ModifyKind::Name(RenameMode::From))),
            None
        );
    }

    #[test]
    fn test_classify_ignored_kinds() {
        assert_eq!(WatchEventKind::classify(&EventKind::Remove(RemoveKind::File)), None);
        assert_eq!(WatchEventKind::classify(&EventKind::Access(AccessKind::Any)), None);
        assert_eq!(WatchEventKind::classify(&EventKind::Any), None);
    }

    #[test]
    fn test_event_file_name() {
        let event = WatchEvent::new(Utf8PathBuf::from("/w/Auto/OUTPUT.PLY"), WatchEventKind::Changed);
        assert_eq!(event.file_name(), Some("OUTPUT.PLY"));
        assert_eq!(event.path().as_str(), "/w/Auto/OUTPUT.PLY");
    }

    #[test]
    fn test_event_with_timestamp() {
        let now = Instant::now();
        let event = WatchEvent::with_timestamp(
            Utf8PathBuf::from("output.ply"),
            WatchEventKind::Created,
            now,
        );
        assert_eq!(event.observed_at, now);
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(WatchEventKind::Renamed.to_string(), "renamed");
    }
}
