//! Pipeline statistics with atomic counters.
//!
//! [`PipelineStats`] is shared by the driver and every job; [`StatsSnapshot`]
//! is the serializable point-in-time view printed on shutdown.
//!
//! # Thread Safety
//!
//! All counters use [`AtomicU64`] with [`Relaxed`](std::sync::atomic::Ordering::Relaxed)
//! ordering. The numbers are informational and don't need to be consistent
//! with each other at any instant.
//!
//! # Examples
//!
//! ```
//! use gs_pipeline::PipelineStats;
//! use gs_core::JobOutcome;
//!
//! let stats = PipelineStats::new();
//! stats.increment_events_seen();
//! stats.increment_jobs_admitted();
//! stats.record_outcome(&JobOutcome::Activated { generation: 1 });
//!
//! let snapshot = stats.snapshot();
//! assert_eq!(snapshot.activations, 1);
//! assert_eq!(snapshot.completed(), 1);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use gs_core::{FailureReason, JobOutcome};
use serde::{Deserialize, Serialize};

/// Atomic counters for the import pipeline.
#[derive(Debug, Default)]
pub struct PipelineStats {
    /// Events received from the watcher.
    events_seen: AtomicU64,
    /// Events rejected by the tracked-name filter.
    events_ignored: AtomicU64,
    /// Events that created a job.
    jobs_admitted: AtomicU64,
    /// Events folded into an existing job.
    jobs_coalesced: AtomicU64,
    /// Fresh jobs started because of a trailing event.
    jobs_rearmed: AtomicU64,
    activations: AtomicU64,
    unapplied: AtomicU64,
    stability_timeouts: AtomicU64,
    conversion_errors: AtomicU64,
    persistence_errors: AtomicU64,
    /// Jobs dropped by shutdown before committing.
    abandoned: AtomicU64,
}

impl PipelineStats {
    /// Creates a new [`PipelineStats`] with all counters at zero.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments the events-seen counter.
    #[inline]
    pub fn increment_events_seen(&self) {
        self.events_seen.fetch_add(1, Ordering::Relaxed);
    }

    /// Increments the ignored-events counter.
    #[inline]
    pub fn increment_events_ignored(&self) {
        self.events_ignored.fetch_add(1, Ordering::Relaxed);
    }

    /// Increments the admitted-jobs counter.
    #[inline]
    pub fn increment_jobs_admitted(&self) {
        self.jobs_admitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Increments the coalesced-events counter.
    #[inline]
    pub fn increment_jobs_coalesced(&self) {
        self.jobs_coalesced.fetch_add(1, Ordering::Relaxed);
    }

    /// Increments the re-armed-jobs counter.
    #[inline]
    pub fn increment_jobs_rearmed(&self) {
        self.jobs_rearmed.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a terminal job under its outcome.
    pub fn record_outcome(&self, outcome: &JobOutcome) {
        let counter = match outcome {
            JobOutcome::Activated { .. } => &self.activations,
            JobOutcome::Unapplied => &self.unapplied,
            JobOutcome::Failed { reason, .. } => match reason {
                FailureReason::StabilityTimeout => &self.stability_timeouts,
                FailureReason::ConversionError => &self.conversion_errors,
                FailureReason::PersistenceError => &self.persistence_errors,
            },
            JobOutcome::Abandoned => &self.abandoned,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a point-in-time snapshot of all counters.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            events_seen: self.events_seen.load(Ordering::Relaxed),
            events_ignored: self.events_ignored.load(Ordering::Relaxed),
            jobs_admitted: self.jobs_admitted.load(Ordering::Relaxed),
            jobs_coalesced: self.jobs_coalesced.load(Ordering::Relaxed),
            jobs_rearmed: self.jobs_rearmed.load(Ordering::Relaxed),
            activations: self.activations.load(Ordering::Relaxed),
            unapplied: self.unapplied.load(Ordering::Relaxed),
            stability_timeouts: self.stability_timeouts.load(Ordering::Relaxed),
            conversion_errors: self.conversion_errors.load(Ordering::Relaxed),
            persistence_errors: self.persistence_errors.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of pipeline statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Events received from the watcher.
    pub events_seen: u64,
    /// Events rejected by the tracked-name filter.
    pub events_ignored: u64,
    /// Events that created a job.
    pub jobs_admitted: u64,
    /// Events folded into an existing job.
    pub jobs_coalesced: u64,
    /// Fresh jobs started because of a trailing event.
    pub jobs_rearmed: u64,
    /// Jobs whose asset was published.
    pub activations: u64,
    /// Jobs whose asset was retained without a render target.
    pub unapplied: u64,
    /// Jobs that failed with a stability timeout.
    pub stability_timeouts: u64,
    /// Jobs that failed in the converter.
    pub conversion_errors: u64,
    /// Jobs that failed to persist.
    pub persistence_errors: u64,
    /// Jobs dropped by shutdown.
    pub abandoned: u64,
}

impl StatsSnapshot {
    /// Jobs that produced an asset, shown or not.
    #[must_use]
    pub const fn completed(&self) -> u64 {
        self.activations + self.unapplied
    }

    /// Jobs that failed, for any reason.
    #[must_use]
    pub const fn failed(&self) -> u64 {
        self.stability_timeouts + self.conversion_errors + self.persistence_errors
    }

    /// Jobs that reached a terminal state.
    #[must_use]
    pub const fn finished(&self) -> u64 {
        self.completed() + self.failed() + self.abandoned
    }
}
