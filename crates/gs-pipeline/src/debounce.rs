//! Per-path job registry.
//!
//! The registry is the debouncer: at most one job exists per path, and
//! events for a path with a job in flight are coalesced into it.
//!
//! ```text
//! event(P) ──► registry ──┬─► no entry for P   ─► Admitted(JobGuard)  ─► ImportQueue
//!                         └─► entry for P       ─► Coalesced (last_seen refreshed;
//!                                                   re-arm flagged if committed)
//! ```
//!
//! Events that arrive while the job is still stabilizing are absorbed by
//! the ongoing size polling. Events that arrive after the job committed to
//! conversion cannot be absorbed, so the entry is flagged and
//! [`JobGuard::finish`] hands back a fresh guard for one more job.

use std::sync::Arc;
use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};
use gs_watcher::WatchEvent;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

#[derive(Debug, Clone, Copy)]
struct Entry {
    last_seen: Instant,
    committed: bool,
    rearm: bool,
}

impl Entry {
    const fn new(seen: Instant) -> Self {
        Self {
            last_seen: seen,
            committed: false,
            rearm: false,
        }
    }
}

/// Result of offering an event to the registry.
#[derive(Debug)]
pub enum Admission {
    /// No job existed for the path; the caller must run one.
    Admitted(JobGuard),
    /// A job for the path is already pending or in flight.
    Coalesced {
        /// Whether the in-flight job will be followed by a fresh one.
        rearmed: bool,
    },
}

/// Tracks which paths have a job pending or in flight.
///
/// Cheap to clone; clones share the same table.
#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<Mutex<FxHashMap<Utf8PathBuf, Entry>>>,
}

impl JobRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Offers an event to the registry.
    ///
    /// # Examples
    ///
    /// ```
    /// use gs_pipeline::{Admission, JobRegistry};
    /// use gs_watcher::{WatchEvent, WatchEventKind};
    /// use camino::Utf8PathBuf;
    ///
    /// let registry = JobRegistry::new();
    /// let created = WatchEvent::new(Utf8PathBuf::from("/w/output.ply"), WatchEventKind::Created);
    /// let changed = WatchEvent::new(Utf8PathBuf::from("/w/output.ply"), WatchEventKind::Changed);
    ///
    /// let Admission::Admitted(guard) = registry.admit(&created) else { unreachable!() };
    /// assert!(matches!(registry.admit(&changed), Admission::Coalesced { rearmed: false }));
    /// drop(guard);
    /// assert!(registry.is_empty());
    /// ```
    pub fn admit(&self, event: &WatchEvent) -> Admission {
        let mut jobs = self.jobs.lock();
        if let Some(entry) = jobs.get_mut(&event.path) {
            entry.last_seen = event.observed_at;
            if entry.committed {
                entry.rearm = true;
            }
            return Admission::Coalesced {
                rearmed: entry.rearm,
            };
        }
        jobs.insert(event.path.clone(), Entry::new(event.observed_at));
        Admission::Admitted(JobGuard {
            registry: self.clone(),
            path: event.path.clone(),
            released: false,
        })
    }

    /// Returns `true` if a job for `path` is pending or in flight.
    #[must_use]
    pub fn contains(&self, path: &Utf8Path) -> bool {
        self.jobs.lock().contains_key(path)
    }

    /// When the most recent event for `path` was observed.
    #[must_use]
    pub fn last_seen(&self, path: &Utf8Path) -> Option<Instant> {
        self.jobs.lock().get(path).map(|e| e.last_seen)
    }

    /// Returns `true` if the job for `path` has committed to conversion.
    #[must_use]
    pub fn is_committed(&self, path: &Utf8Path) -> bool {
        self.jobs.lock().get(path).is_some_and(|e| e.committed)
    }

    /// Number of paths with a job pending or in flight.
    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    /// Returns `true` if no job is pending or in flight.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }
}

/// Exclusive claim on a path; held by exactly one job.
///
/// Dropping the guard releases the path.
#[derive(Debug)]
pub struct JobGuard {
    registry: JobRegistry,
    path: Utf8PathBuf,
    released: bool,
}

impl JobGuard {
    /// The claimed path.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Records that the job passed `Stable`; later events re-arm the path.
    pub fn mark_committed(&self) {
        if let Some(entry) = self.registry.jobs.lock().get_mut(&self.path) {
            entry.committed = true;
        }
    }

    /// Ends the job.
    ///
    /// Returns a guard for a fresh job if an event arrived after the job
    /// committed; otherwise the path is released.
    #[must_use]
    pub fn finish(mut self) -> Option<Self> {
        self.released = true;
        let mut jobs = self.registry.jobs.lock();
        let rearm = jobs.get(&self.path).is_some_and(|e| e.rearm);
        if rearm {
            if let Some(entry) = jobs.get_mut(&self.path) {
                *entry = Entry::new(entry.last_seen);
            }
            Some(Self {
                registry: self.registry.clone(),
                path: self.path.clone(),
                released: false,
            })
        } else {
            jobs.remove(&self.path);
            None
        }
    }
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        if !self.released {
            self.registry.jobs.lock().remove(&self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gs_watcher::WatchEventKind;

    fn event(path: &str, kind: WatchEventKind) -> WatchEvent {
        WatchEvent::new(Utf8PathBuf::from(path), kind)
    }

    fn admitted(admission: Admission) -> JobGuard {
        match admission {
            Admission::Admitted(guard) => guard,
            Admission::Coalesced { .. } => panic!("expected admission"),
        }
    }

    #[test]
    fn test_burst_creates_one_job() {
        let registry = JobRegistry::new();
        let guard = admitted(registry.admit(&event("/w/output.ply", WatchEventKind::Created)));

        for kind in [WatchEventKind::Changed, WatchEventKind::Changed, WatchEventKind::Renamed] {
            assert!(matches!(
                registry.admit(&event("/w/output.ply", kind)),
                Admission::Coalesced { rearmed: false }
            ));
        }
        assert_eq!(registry.len(), 1);

        assert!(guard.finish().is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_distinct_paths_are_independent() {
        let registry = JobRegistry::new();
        let _a = admitted(registry.admit(&event("/w/a.ply", WatchEventKind::Created)));
        let _b = admitted(registry.admit(&event("/w/b.ply", WatchEventKind::Created)));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_coalesce_refreshes_last_seen() {
        let registry = JobRegistry::new();
        let first = event("/w/output.ply", WatchEventKind::Created);
        let _guard = admitted(registry.admit(&first));

        let later = WatchEvent::with_timestamp(
            Utf8PathBuf::from("/w/output.ply"),
            WatchEventKind::Changed,
            first.observed_at + std::time::Duration::from_millis(40),
        );
        let _ = registry.admit(&later);
        assert_eq!(
            registry.last_seen(Utf8Path::new("/w/output.ply")),
            Some(later.observed_at)
        );
    }

    #[test]
    fn test_event_after_commit_rearms() {
        let registry = JobRegistry::new();
        let guard = admitted(registry.admit(&event("/w/output.ply", WatchEventKind::Created)));
        guard.mark_committed();
        assert!(registry.is_committed(Utf8Path::new("/w/output.ply")));

        assert!(matches!(
            registry.admit(&event("/w/output.ply", WatchEventKind::Changed)),
            Admission::Coalesced { rearmed: true }
        ));

        let next = guard.finish().expect("re-armed guard");
        assert_eq!(next.path(), Utf8Path::new("/w/output.ply"));
        assert!(!registry.is_committed(next.path()));
        assert_eq!(registry.len(), 1);

        assert!(next.finish().is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_drop_releases_path() {
        let registry = JobRegistry::new();
        let guard = admitted(registry.admit(&event("/w/output.ply", WatchEventKind::Created)));
        drop(guard);
        assert!(!registry.contains(Utf8Path::new("/w/output.ply")));
        assert!(matches!(
            registry.admit(&event("/w/output.ply", WatchEventKind::Changed)),
            Admission::Admitted(_)
        ));
    }
}
