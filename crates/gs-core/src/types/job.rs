//! Import job state machine and outcomes.
//!
//! ```text
//! Discovered ─► Stabilizing ─► Stable ─► Converting ─► Persisting ─► Activating ─► Completed
//!                   │  ▲
//!                   └──┘ size changed
//!
//! any non-terminal state ─► Failed(reason)
//! ```

use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

/// Why a job failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The file never stopped changing within the stability timeout.
    StabilityTimeout,
    /// The converter reported an error or panicked.
    ConversionError,
    /// One of the buffers could not be written or reloaded.
    PersistenceError,
}

impl FailureReason {
    /// Returns a human-readable label.
    #[inline]
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::StabilityTimeout => "stability timeout",
            Self::ConversionError => "conversion error",
            Self::PersistenceError => "persistence error",
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// State of an [`ImportJob`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// An event was accepted; nothing has been polled yet.
    Discovered,
    /// Polling the file size.
    Stabilizing,
    /// The size held steady for the configured number of polls.
    Stable,
    /// The converter is running.
    Converting,
    /// Buffers are being written and reloaded.
    Persisting,
    /// Waiting for the owning context to publish the asset.
    Activating,
    /// The job finished; the asset was activated or retained.
    Completed,
    /// The job ended with a failure.
    Failed(FailureReason),
}

impl JobState {
    /// Returns `true` for `Completed` and `Failed`.
    #[inline]
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed(_))
    }

    /// Returns `true` for in-progress states that are waiting on a timer or a stage.
    #[inline]
    #[must_use]
    pub const fn is_timed(self) -> bool {
        !matches!(self, Self::Discovered | Self::Completed | Self::Failed(_))
    }

    /// Returns `true` once the job has been admitted to conversion.
    ///
    /// Jobs past this point are not aborted by shutdown.
    #[inline]
    #[must_use]
    pub const fn is_committed(self) -> bool {
        matches!(
            self,
            Self::Converting | Self::Persisting | Self::Activating | Self::Completed
        )
    }

    /// Returns `true` if `next` is a legal successor of `self`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Completed | Self::Failed(_), _) => false,
            (_, Self::Failed(_))
            | (Self::Discovered | Self::Stabilizing, Self::Stabilizing)
            | (Self::Stabilizing, Self::Stable)
            | (Self::Stable, Self::Converting)
            | (Self::Converting, Self::Persisting)
            | (Self::Persisting, Self::Activating)
            | (Self::Activating, Self::Completed) => true,
            _ => false,
        }
    }

    /// Returns a short label for logs.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::Stabilizing => "stabilizing",
            Self::Stable => "stable",
            Self::Converting => "converting",
            Self::Persisting => "persisting",
            Self::Activating => "activating",
            Self::Completed => "completed",
            Self::Failed(_) => "failed",
        }
    }
}

/// One import attempt for one path.
///
/// Owned by the import queue while in flight and dropped once terminal.
#[derive(Debug, Clone)]
pub struct ImportJob {
    /// The interchange file being imported.
    pub path: Utf8PathBuf,
    /// Current state.
    pub state: JobState,
    /// Consecutive equal, non-zero size readings.
    pub stable_streak: u32,
    /// Size seen by the previous poll; `None` before the first poll or
    /// after a failed read.
    pub last_observed_size: Option<u64>,
    /// When the job was created.
    pub attempt_started_at: Instant,
    /// Set when the job fails.
    pub failure_reason: Option<FailureReason>,
}

impl ImportJob {
    /// Creates a job in the `Discovered` state.
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: JobState::Discovered,
            stable_streak: 0,
            last_observed_size: None,
            attempt_started_at: Instant::now(),
            failure_reason: None,
        }
    }

    /// Returns the path as a borrowed [`Utf8Path`].
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Moves the job to `next`.
    ///
    /// Returns `false` and leaves the job untouched if the transition is not
    /// allowed by the state machine.
    pub fn advance(&mut self, next: JobState) -> bool {
        if !self.state.can_transition_to(next) {
            return false;
        }
        if let JobState::Failed(reason) = next {
            self.failure_reason = Some(reason);
        }
        self.state = next;
        true
    }

    /// Time since the job was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.attempt_started_at.elapsed()
    }
}

/// Terminal outcome of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobOutcome {
    /// The asset was published to the active slot.
    Activated {
        /// Slot generation after publication.
        generation: u64,
    },
    /// The asset was produced and persisted but no render target was
    /// available; it is retained, not shown.
    Unapplied,
    /// The job failed.
    Failed {
        /// Failure category.
        reason: FailureReason,
        /// Rendered cause.
        cause: String,
    },
    /// The pipeline shut down before the job could finish.
    Abandoned,
}

impl JobOutcome {
    /// Returns `true` if the asset reached the active slot.
    #[inline]
    #[must_use]
    pub const fn is_activated(&self) -> bool {
        matches!(self, Self::Activated { .. })
    }

    /// Returns the failure reason, if the job failed.
    #[inline]
    #[must_use]
    pub const fn failure_reason(&self) -> Option<FailureReason> {
        match self {
            Self::Failed { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}

/// Report emitted once per terminal job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobReport {
    /// The imported path.
    pub path: Utf8PathBuf,
    /// How the job ended.
    pub outcome: JobOutcome,
    /// Wall time from discovery to the terminal state.
    pub elapsed: Duration,
}
