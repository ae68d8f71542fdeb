//! File filtering for watch events.
//!
//! Two layers of filtering exist:
//!
//! - A **source filter** runs on the observer thread before events are
//!   sent, cutting channel traffic. The CLI passes the tracked names here;
//!   [`ExtensionFilter`] is a coarser choice for embedders.
//! - The **path filter** ([`TrackedNameFilter`]) runs in the pipeline driver
//!   on every event, whatever its origin, and decides whether the event
//!   concerns a tracked input file at all.
//!
//! # Examples
//!
//! ```
//! use gs_watcher::{FileFilter, TrackedNameFilter};
//! use camino::Utf8Path;
//!
//! let filter = TrackedNameFilter::new(["output.ply"]);
//!
//! assert!(filter.should_process(Utf8Path::new("Auto/output.ply")));
//! assert!(filter.should_process(Utf8Path::new("Auto/Output.PLY")));
//! assert!(!filter.should_process(Utf8Path::new("Auto/sample.ply")));
//! ```

use camino::Utf8Path;
use smallvec::SmallVec;

use crate::events::WatchEvent;

/// A filter for determining which paths to process.
///
/// # Thread Safety
///
/// Filters must be [`Send`] and [`Sync`] because they are used from the
/// blocking observer thread. They must also be `'static` to be moved into
/// the spawned task.
///
/// # Examples
///
/// ```
/// use gs_watcher::FileFilter;
/// use camino::Utf8Path;
///
/// struct NoTempFiles;
///
/// impl FileFilter for NoTempFiles {
///     fn should_process(&self, path: &Utf8Path) -> bool {
///         path.extension() != Some("tmp")
///     }
/// }
/// ```
pub trait FileFilter: Send + Sync + 'static {
    /// Returns `true` if events for `path` should be processed.
    fn should_process(&self, path: &Utf8Path) -> bool;
}

#[cfg(test)]
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct AcceptAllFilter;

#[cfg(test)]
impl FileFilter for AcceptAllFilter {
    #[inline]
    fn should_process(&self, _path: &Utf8Path) -> bool {
        true
    }
}

/// Accepts files whose extension is one of a fixed set, ignoring case.
///
/// # Examples
///
/// ```
/// use gs_watcher::{FileFilter, ExtensionFilter};
/// use camino::Utf8Path;
///
/// let filter = ExtensionFilter::new(&["ply"]);
/// assert!(filter.should_process(Utf8Path::new("Auto/output.ply")));
/// assert!(filter.should_process(Utf8Path::new("Auto/OUTPUT.PLY")));
/// assert!(!filter.should_process(Utf8Path::new("Auto/cameras.json")));
/// ```
#[derive(Debug, Clone)]
pub struct ExtensionFilter {
    extensions: SmallVec<[String; 4]>,
}

impl ExtensionFilter {
    /// Creates a new extension filter.
    ///
    /// # Arguments
    ///
    /// * `extensions` - The extensions to accept (without the leading dot)
    #[must_use]
    pub fn new(extensions: &[&str]) -> Self {
        Self {
            extensions: extensions.iter().map(|s| s.to_ascii_lowercase()).collect(),
        }
    }
}

impl FileFilter for ExtensionFilter {
    fn should_process(&self, path: &Utf8Path) -> bool {
        path.extension()
            .is_some_and(|ext| self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
    }
}

/// The path filter: accepts only the configured tracked file names.
///
/// Names are compared case-insensitively against the final path component;
/// anything else (partial writes, sample files, intermediates) is ignored
/// with no side effect.
#[derive(Debug, Clone)]
pub struct TrackedNameFilter {
    names: SmallVec<[String; 2]>,
}

impl TrackedNameFilter {
    /// Creates a filter tracking the given file names.
    #[must_use]
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            names: names
                .into_iter()
                .map(|n| n.as_ref().to_lowercase())
                .collect(),
        }
    }

    /// Returns `true` if `event` concerns a tracked file.
    #[inline]
    #[must_use]
    pub fn accepts(&self, event: &WatchEvent) -> bool {
        self.should_process(&event.path)
    }

    /// Returns the tracked names, lowercased.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

impl FileFilter for TrackedNameFilter {
    fn should_process(&self, path: &Utf8Path) -> bool {
        path.file_name().is_some_and(|name| {
            let name = name.to_lowercase();
            self.names.iter().any(|n| *n == name)
        })
    }
}

impl<F: FileFilter + ?Sized> FileFilter for Box<F> {
    fn should_process(&self, path: &Utf8Path) -> bool {
        (**self).should_process(path)
    }
}

impl<F: FileFilter + ?Sized> FileFilter for std::sync::Arc<F> {
    fn should_process(&self, path: &Utf8Path) -> bool {
        (**self).should_process(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::WatchEventKind;
    use camino::Utf8PathBuf;

    #[test]
    fn test_accept_all_filter() {
        assert!(AcceptAllFilter.should_process(Utf8Path::new("anything.txt")));
        assert!(AcceptAllFilter.should_process(Utf8Path::new("")));
    }

    #[test]
    fn test_extension_filter_ignores_case() {
        let filter = ExtensionFilter::new(&["PLY"]);
        assert!(filter.should_process(Utf8Path::new("a/output.ply")));
        assert!(filter.should_process(Utf8Path::new("a/output.Ply")));
        assert!(!filter.should_process(Utf8Path::new("a/output.ply.tmp")));
        assert!(!filter.should_process(Utf8Path::new("a/Makefile")));
    }

    #[test]
    fn test_tracked_name_ignores_other_files() {
        let filter = TrackedNameFilter::new(["output.ply"]);
        for kind in [
            WatchEventKind::Created,
            WatchEventKind::Changed,
            WatchEventKind::Renamed,
        ] {
            let sample = WatchEvent::new(Utf8PathBuf::from("/w/sample.ply"), kind);
            let output = WatchEvent::new(Utf8PathBuf::from("/w/output.ply"), kind);
            assert!(!filter.accepts(&sample), "sample.ply accepted for {kind}");
            assert!(filter.accepts(&output), "output.ply rejected for {kind}");
        }
    }

    #[test]
    fn test_tracked_name_is_exact_match() {
        let filter = TrackedNameFilter::new(["Output.ply"]);
        assert!(filter.should_process(Utf8Path::new("OUTPUT.PLY")));
        assert!(!filter.should_process(Utf8Path::new("output.ply.part")));
        assert!(!filter.should_process(Utf8Path::new("my_output.ply")));
        assert!(!filter.should_process(Utf8Path::new("/")));
        assert_eq!(filter.names(), ["output.ply"]);
    }

    #[test]
    fn test_tracked_name_multiple_names() {
        let filter = TrackedNameFilter::new(vec!["a.ply".to_owned(), "b.ply".to_owned()]);
        assert!(filter.should_process(Utf8Path::new("x/a.ply")));
        assert!(filter.should_process(Utf8Path::new("x/B.ply")));
        assert!(!filter.should_process(Utf8Path::new("x/c.ply")));
    }

    #[test]
    fn test_boxed_and_arc_filters() {
        let boxed: Box<dyn FileFilter> = Box::new(ExtensionFilter::new(&["ply"]));
        assert!(boxed.should_process(Utf8Path::new("output.ply")));
        let shared = std::sync::Arc::new(TrackedNameFilter::new(["output.ply"]));
        assert!(shared.should_process(Utf8Path::new("output.ply")));
    }
}
