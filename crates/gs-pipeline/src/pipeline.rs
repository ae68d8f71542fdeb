//! The pipeline driver.
//!
//! [`Pipeline`] ties the stages together. It owns the tracked-name filter,
//! the job registry and the import queue, and consumes [`WatchEvent`]s:
//!
//! ```text
//! FileWatcher ──► Pipeline::run ──► handle_event ──► TrackedNameFilter
//!                                                      │ accepted
//!                                                      ▼
//!                                                  JobRegistry ──► ImportQueue::submit
//! ```
//!
//! Shutdown is driven by a [`CancellationToken`]: the driver stops reading
//! events, stabilizing jobs are abandoned, and committed jobs are awaited.

use std::sync::Arc;

use gs_core::{Config, Converter, JobReport};
use gs_watcher::{FileFilter, FileWatcher, TrackedNameFilter, WatchEvent};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use crate::activate::ActivationSender;
use crate::debounce::{Admission, JobRegistry};
use crate::error::PipelineError;
use crate::persist::AssetStore;
use crate::queue::ImportQueue;
use crate::stability::{SizeProbe, StabilityDetector};
use crate::stats::StatsSnapshot;

/// What the driver did with one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventDisposition {
    /// The path is not tracked, or the pipeline is shutting down.
    Ignored,
    /// A new job was started.
    Admitted,
    /// The event was folded into the path's existing job.
    Coalesced {
        /// Whether a fresh job will follow the current one.
        rearmed: bool,
    },
}

/// Assembles a [`Pipeline`].
///
/// # Examples
///
/// ```
/// use gs_core::Config;
/// use gs_pipeline::{activation_channel, PipelineBuilder};
/// use gs_ply::PlyConverter;
///
/// let (sender, _queue) = activation_channel(4);
/// let pipeline = PipelineBuilder::new(Config::default())
///     .converter(PlyConverter::new())
///     .activations(sender)
///     .build()?;
/// # Ok::<(), gs_pipeline::PipelineError>(())
/// ```
#[must_use]
pub struct PipelineBuilder {
    config: Config,
    converter: Option<Arc<dyn Converter>>,
    activations: Option<ActivationSender>,
    detector: Option<StabilityDetector>,
    cancel: Option<CancellationToken>,
}

impl PipelineBuilder {
    /// Starts a builder from configuration.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            converter: None,
            activations: None,
            detector: None,
            cancel: None,
        }
    }

    /// Sets the converter. Required.
    pub fn converter<C: Converter>(mut self, converter: C) -> Self {
        self.converter = Some(Arc::new(converter));
        self
    }

    /// Sets the hand-off to the render context. Required.
    pub fn activations(mut self, sender: ActivationSender) -> Self {
        self.activations = Some(sender);
        self
    }

    /// Replaces the filesystem size probe used by the stability detector.
    pub fn size_probe<P: SizeProbe>(mut self, probe: P) -> Self {
        self.detector = Some(StabilityDetector::new(&self.config.stability, probe));
        self
    }

    /// Uses `token` for shutdown instead of a fresh one.
    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Validates the configuration and builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] for invalid configuration and
    /// [`PipelineError::MissingComponent`] if a required part was not set.
    pub fn build(self) -> Result<Pipeline, PipelineError> {
        self.config.validate()?;
        let converter = self
            .converter
            .ok_or(PipelineError::MissingComponent("converter"))?;
        let activations = self
            .activations
            .ok_or(PipelineError::MissingComponent("activation sender"))?;
        let detector = self
            .detector
            .unwrap_or_else(|| StabilityDetector::from_config(&self.config.stability));
        let cancel = self.cancel.unwrap_or_default();

        let queue = ImportQueue::new(
            detector,
            converter,
            AssetStore::from_config(&self.config.store),
            activations,
            &self.config.import,
            cancel.clone(),
        );

        Ok(Pipeline {
            tracked: TrackedNameFilter::new(&self.config.watch.tracked_names),
            registry: JobRegistry::new(),
            queue,
            cancel,
            config: self.config,
        })
    }
}

/// The running import pipeline.
#[derive(Debug)]
pub struct Pipeline {
    config: Config,
    tracked: TrackedNameFilter,
    registry: JobRegistry,
    queue: ImportQueue,
    cancel: CancellationToken,
}

impl Pipeline {
    /// The validated configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Starts watching the configured directory.
    ///
    /// `filter` is the coarse source filter applied on the observer thread;
    /// the tracked-name filter is applied later by [`handle_event`](Self::handle_event).
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::WatchSetup`] if the directory is missing,
    /// is not a directory, or cannot be observed. No job is ever produced
    /// in that case.
    pub async fn watch<F: FileFilter>(&self, filter: F) -> Result<FileWatcher, PipelineError> {
        match FileWatcher::new(&self.config.watch, filter).await {
            Ok(watcher) => {
                tracing::info!(
                    dir = %watcher.watch_path(),
                    tracked = ?self.tracked.names(),
                    "Watching for interchange files"
                );
                Ok(watcher)
            }
            Err(e) => {
                tracing::error!(
                    dir = %self.config.watch.watch_dir,
                    error = %e,
                    "Watch setup failed; pipeline not started"
                );
                Err(e.into())
            }
        }
    }

    /// Routes one event through the path filter and the job registry.
    pub fn handle_event(&self, event: &WatchEvent) -> EventDisposition {
        let stats = self.queue.stats();
        stats.increment_events_seen();

        if self.cancel.is_cancelled() || !self.tracked.accepts(event) {
            stats.increment_events_ignored();
            tracing::trace!(path = %event.path, kind = %event.kind, "Ignoring event");
            return EventDisposition::Ignored;
        }

        match self.registry.admit(event) {
            Admission::Admitted(guard) => {
                stats.increment_jobs_admitted();
                tracing::debug!(path = %event.path, kind = %event.kind, "Admitted import job");
                self.queue.submit(guard);
                EventDisposition::Admitted
            }
            Admission::Coalesced { rearmed } => {
                stats.increment_jobs_coalesced();
                tracing::trace!(path = %event.path, kind = %event.kind, rearmed, "Coalesced event");
                EventDisposition::Coalesced { rearmed }
            }
        }
    }

    /// Consumes events until cancelled or until the channel closes, then
    /// shuts down.
    pub async fn run(&self, events: &mut mpsc::Receiver<WatchEvent>) {
        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => {
                        self.handle_event(&event);
                    }
                    None => {
                        tracing::info!("Event channel closed");
                        break;
                    }
                },
            }
        }
        self.finish().await;
    }

    /// Cancels the pipeline and waits for committed jobs to finish.
    ///
    /// Jobs still stabilizing end as `Abandoned`.
    pub async fn finish(&self) {
        self.cancel.cancel();
        let in_flight = self.queue.in_flight();
        if in_flight > 0 {
            tracing::info!(in_flight, "Waiting for import jobs to finish");
        }
        self.queue.close_and_wait().await;
        tracing::info!(stats = ?self.stats(), "Pipeline stopped");
    }

    /// Subscribes to job reports.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<JobReport> {
        self.queue.subscribe()
    }

    /// A snapshot of the pipeline statistics.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.queue.stats().snapshot()
    }

    /// A handle on the shutdown token.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Number of paths with a job pending or in flight.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.registry.len()
    }
}
