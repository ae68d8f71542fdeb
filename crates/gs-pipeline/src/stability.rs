//! Stability detector.
//!
//! Confirms a file has finished being written before anything reads it.
//! The detector polls the file size every `poll_interval` and counts
//! consecutive equal, non-zero readings:
//!
//! ```text
//! poll ──► size == previous && size > 0 ──► streak += 1 ──► streak >= K ──► Stable
//!     └──► changed / zero / unreadable  ──► streak = 0
//! elapsed >= timeout ──► Failed(StabilityTimeout)
//! ```
//!
//! A file that disappears mid-write reads as a reset, not an error; only the
//! timeout ends the wait. Waits between polls are async sleeps, so a job that
//! is stabilizing never blocks the runtime.

use std::fmt;
use std::fs::File;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use camino::Utf8Path;
use gs_core::{FailureReason, ImportJob, JobState, StabilityConfig};
use tokio::time::Instant;

use crate::error::JobError;

/// Reads the current size of a file.
///
/// Implemented for closures so tests can script size sequences.
pub trait SizeProbe: Send + Sync + 'static {
    /// Returns the size of `path` in bytes.
    ///
    /// # Errors
    ///
    /// Any error is treated as a transient failure and resets the streak.
    fn size(&self, path: &Utf8Path) -> io::Result<u64>;
}

impl<F> SizeProbe for F
where
    F: Fn(&Utf8Path) -> io::Result<u64> + Send + Sync + 'static,
{
    fn size(&self, path: &Utf8Path) -> io::Result<u64> {
        self(path)
    }
}

/// Probe backed by the filesystem.
///
/// Opens the file before reading its metadata so that a file locked by its
/// writer reads as a failure rather than as a size.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsSizeProbe;

impl SizeProbe for FsSizeProbe {
    fn size(&self, path: &Utf8Path) -> io::Result<u64> {
        let file = File::open(path)?;
        Ok(file.metadata()?.len())
    }
}

/// Polls a job's file until its size holds steady.
#[derive(Clone)]
pub struct StabilityDetector {
    probe: Arc<dyn SizeProbe>,
    interval: Duration,
    threshold: u32,
    timeout: Duration,
}

impl fmt::Debug for StabilityDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StabilityDetector")
            .field("interval", &self.interval)
            .field("threshold", &self.threshold)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl StabilityDetector {
    /// Creates a detector from configuration and a size probe.
    pub fn new<P: SizeProbe>(config: &StabilityConfig, probe: P) -> Self {
        Self {
            probe: Arc::new(probe),
            interval: config.poll_interval(),
            threshold: config.threshold,
            timeout: config.timeout(),
        }
    }

    /// Creates a detector reading sizes from the filesystem.
    pub fn from_config(config: &StabilityConfig) -> Self {
        Self::new(config, FsSizeProbe)
    }

    /// Interval between polls.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Maximum time a job may spend stabilizing.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Applies one size reading to `job`.
    ///
    /// `None` stands for a failed read. Returns `true` once the streak has
    /// reached the threshold.
    pub fn observe(&self, job: &mut ImportJob, size: Option<u64>) -> bool {
        match size {
            Some(size) if size > 0 && job.last_observed_size == Some(size) => {
                job.stable_streak = job.stable_streak.saturating_add(1);
            }
            _ => job.stable_streak = 0,
        }
        job.last_observed_size = size;
        job.stable_streak >= self.threshold
    }

    /// Polls the job's file until it is stable or the timeout elapses.
    ///
    /// On success the job is left in [`JobState::Stable`]; on timeout it is
    /// moved to `Failed(StabilityTimeout)`.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::StabilityTimeout`] if the size never held steady.
    pub async fn wait_until_stable(&self, job: &mut ImportJob) -> Result<(), JobError> {
        let started = Instant::now();
        let deadline = started + self.timeout;

        loop {
            job.advance(JobState::Stabilizing);

            let size = match self.probe.size(job.path()) {
                Ok(size) => Some(size),
                Err(e) => {
                    tracing::trace!(path = %job.path(), error = %e, "Size probe failed; resetting streak");
                    None
                }
            };

            if self.observe(job, size) {
                job.advance(JobState::Stable);
                tracing::debug!(
                    path = %job.path(),
                    size = ?job.last_observed_size,
                    waited_ms = started.elapsed().as_millis(),
                    "File is stable"
                );
                return Ok(());
            }

            let now = Instant::now();
            if now >= deadline {
                job.advance(JobState::Failed(FailureReason::StabilityTimeout));
                return Err(JobError::StabilityTimeout {
                    path: job.path.clone(),
                    waited: now - started,
                });
            }

            tokio::time::sleep(self.interval.min(deadline - now)).await;
        }
    }
}
