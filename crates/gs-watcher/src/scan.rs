//! Enumeration of files already present when watching starts.
//!
//! Notifications only report changes made after the watch is registered, so
//! a tracked file that was fully written before startup would otherwise be
//! missed. The watcher enumerates the directory once, right after
//! registering, and feeds every match through the same channel as a
//! [`WatchEventKind::Created`](crate::WatchEventKind::Created) event.

use camino::{Utf8Path, Utf8PathBuf};
use ignore::WalkBuilder;

use crate::error::WatchError;
use crate::filter::FileFilter;

/// Lists files under `root` that pass `filter`.
///
/// Only direct children are listed unless `recursive` is set. Ignore files
/// and hidden-file rules are not applied: a producer writing into a
/// gitignored output directory must still be seen. Entries that cannot be
/// read or whose path is not UTF-8 are skipped with a warning.
///
/// # Errors
///
/// Returns [`WatchError::PathNotFound`] if `root` does not exist.
pub fn existing_files<F: FileFilter + ?Sized>(
    root: &Utf8Path,
    recursive: bool,
    filter: &F,
) -> Result<Vec<Utf8PathBuf>, WatchError> {
    if !root.exists() {
        return Err(WatchError::path_not_found(root));
    }

    let walker = WalkBuilder::new(root)
        .standard_filters(false)
        .follow_links(false)
        .max_depth(if recursive { None } else { Some(1) })
        .sort_by_file_name(|a, b| a.cmp(b))
        .build();

    let mut paths = Vec::new();
    for result in walker {
        let entry = match result {
            Ok(entry) => entry,
            Err(e) => {
                let err = WatchError::from(e);
                tracing::warn!(error = %err, "Skipping unreadable entry during startup enumeration");
                continue;
            }
        };

        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }

        let Some(path) = Utf8Path::from_path(entry.path()) else {
            let err = WatchError::non_utf8_path(entry.path());
            tracing::warn!(error = %err, "Skipping entry during startup enumeration");
            continue;
        };

        if filter.should_process(path) {
            paths.push(path.to_owned());
        }
    }

    tracing::debug!(root = %root, found = paths.len(), "Enumerated existing files");
    Ok(paths)
}
