//! Import queue.
//!
//! Runs admitted jobs through the rest of the pipeline:
//!
//! ```text
//! JobGuard ─► stabilize ─► [permit] ─► convert ─► persist ─► activate ─► JobReport
//!               │ (blocking pool)  (blocking pool)  (owning context)
//!               └─ cancelled ─► Abandoned
//! ```
//!
//! Each job is a task on a [`TaskTracker`] so shutdown can wait for jobs
//! that are past `Stable`. Shutdown only interrupts the stability wait;
//! once a job has committed it runs to completion.
//!
//! Converters and the store do blocking work, so both run on tokio's
//! blocking pool. A semaphore bounds how many jobs convert at once
//! (`import.max_parallel_imports`).

use std::fmt;
use std::io;
use std::sync::Arc;

use gs_core::{
    Asset, ConvertError, Converter, ImportConfig, ImportJob, JobOutcome, JobReport, JobState,
};
use tokio::sync::{Semaphore, broadcast};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::Instrument;

use crate::activate::ActivationSender;
use crate::debounce::JobGuard;
use crate::error::{JobError, StoreError};
use crate::persist::AssetStore;
use crate::stability::StabilityDetector;
use crate::stats::PipelineStats;

/// Number of reports buffered for slow subscribers.
const REPORT_CAPACITY: usize = 64;

/// Runs import jobs on the tokio runtime.
///
/// Cheap to clone; clones share the same tasks and channels.
#[derive(Clone)]
pub struct ImportQueue {
    inner: Arc<Inner>,
}

struct Inner {
    detector: StabilityDetector,
    converter: Arc<dyn Converter>,
    store: AssetStore,
    activations: ActivationSender,
    permits: Semaphore,
    include_aux_metadata: bool,
    reports: broadcast::Sender<JobReport>,
    stats: Arc<PipelineStats>,
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl fmt::Debug for ImportQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportQueue")
            .field("detector", &self.inner.detector)
            .field("store", &self.inner.store)
            .field("in_flight", &self.inner.tracker.len())
            .field("cancelled", &self.inner.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl ImportQueue {
    /// Creates a queue.
    ///
    /// Cancelling `cancel` abandons jobs that have not yet committed.
    pub fn new(
        detector: StabilityDetector,
        converter: Arc<dyn Converter>,
        store: AssetStore,
        activations: ActivationSender,
        config: &ImportConfig,
        cancel: CancellationToken,
    ) -> Self {
        let (reports, _) = broadcast::channel(REPORT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                detector,
                converter,
                store,
                activations,
                permits: Semaphore::new(config.max_parallel_imports.max(1)),
                include_aux_metadata: config.include_aux_metadata,
                reports,
                stats: Arc::new(PipelineStats::new()),
                tracker: TaskTracker::new(),
                cancel,
            }),
        }
    }

    /// Starts the job owned by `guard`.
    ///
    /// When the job ends and the registry re-armed the path, a fresh job for
    /// the same path runs in the same task, unless the queue was cancelled.
    pub fn submit(&self, guard: JobGuard) {
        let inner = Arc::clone(&self.inner);
        let span = tracing::info_span!("import", path = %guard.path());
        self.inner.tracker.spawn(
            async move {
                let mut guard = guard;
                loop {
                    let report = inner.run_job(&guard).await;
                    let next = guard.finish();

                    inner.stats.record_outcome(&report.outcome);
                    tracing::debug!(
                        outcome = ?report.outcome,
                        elapsed_ms = report.elapsed.as_millis(),
                        "Import job finished"
                    );
                    // No subscribers is fine.
                    let _ = inner.reports.send(report);

                    match next {
                        Some(next) if !inner.cancel.is_cancelled() => {
                            inner.stats.increment_jobs_rearmed();
                            tracing::debug!("Path changed during import; running again");
                            guard = next;
                        }
                        _ => break,
                    }
                }
            }
            .instrument(span),
        );
    }

    /// Subscribes to job reports.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<JobReport> {
        self.inner.reports.subscribe()
    }

    /// Shared statistics.
    #[must_use]
    pub fn stats(&self) -> &Arc<PipelineStats> {
        &self.inner.stats
    }

    /// Number of job tasks still running.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.inner.tracker.len()
    }

    /// The token that abandons uncommitted jobs.
    #[must_use]
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.inner.cancel
    }

    /// Waits for every submitted job to end.
    ///
    /// Does not cancel; callers cancel first to abandon stabilizing jobs.
    pub async fn close_and_wait(&self) {
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
    }
}

impl Inner {
    async fn run_job(&self, guard: &JobGuard) -> JobReport {
        let mut job = ImportJob::new(guard.path());

        let outcome = match self.import(&mut job, guard).await {
            Ok(outcome) => outcome,
            Err(err) => {
                err.log();
                match err.reason() {
                    Some(reason) => {
                        job.advance(JobState::Failed(reason));
                        JobOutcome::Failed {
                            reason,
                            cause: err.to_string(),
                        }
                    }
                    None => JobOutcome::Unapplied,
                }
            }
        };

        JobReport {
            path: job.path.clone(),
            outcome,
            elapsed: job.elapsed(),
        }
    }

    async fn import(&self, job: &mut ImportJob, guard: &JobGuard) -> Result<JobOutcome, JobError> {
        let stabilized = tokio::select! {
            biased;
            () = self.cancel.cancelled() => None,
            result = self.detector.wait_until_stable(job) => Some(result),
        };
        let Some(result) = stabilized else {
            tracing::debug!(state = job.state.label(), "Shutting down; abandoning job");
            return Ok(JobOutcome::Abandoned);
        };
        result?;

        // From here on the job runs to completion, even through shutdown.
        guard.mark_committed();
        let Ok(_permit) = self.permits.acquire().await else {
            return Ok(JobOutcome::Abandoned);
        };

        job.advance(JobState::Converting);
        let asset = self.convert(job).await?;

        job.advance(JobState::Persisting);
        let store = self.store.clone();
        let path = job.path.clone();
        let asset = tokio::task::spawn_blocking(move || store.persist(asset))
            .await
            .unwrap_or_else(|e| Err(StoreError::write(path, io::Error::other(e.to_string()))))
            .map_err(|source| JobError::Persistence {
                path: job.path.clone(),
                source,
            })?;

        job.advance(JobState::Activating);
        match self.activations.activate(job.path(), asset).await {
            Some(outcome) => {
                job.advance(JobState::Completed);
                Ok(outcome.into())
            }
            None => {
                tracing::warn!("Render context is gone; asset persisted but not activated");
                Ok(JobOutcome::Abandoned)
            }
        }
    }

    async fn convert(&self, job: &ImportJob) -> Result<Asset, JobError> {
        let name = job.path().file_stem().unwrap_or("asset").to_owned();
        let converter = Arc::clone(&self.converter);
        let path = job.path.clone();
        let include_aux = self.include_aux_metadata;

        tokio::task::spawn_blocking(move || converter.convert(&name, &path, include_aux))
            .await
            .unwrap_or_else(|e| Err(ConvertError::failed(format!("converter panicked: {e}"))))
            .map_err(|source| JobError::Conversion {
                path: job.path.clone(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activate::{Activator, ActiveAssetSlot, activation_channel};
    use crate::debounce::{Admission, JobRegistry};
    use crate::testing::ScriptedConverter;
    use camino::{Utf8Path, Utf8PathBuf};
    use gs_core::{FailureReason, StabilityConfig};
    use gs_watcher::{WatchEvent, WatchEventKind};
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn detector() -> StabilityDetector {
        let config = StabilityConfig {
            poll_interval_ms: 10,
            threshold: 2,
            timeout_ms: 2000,
        };
        StabilityDetector::new(&config, |_: &Utf8Path| Ok(256))
    }

    fn queue_with(converter: ScriptedConverter, store: AssetStore) -> (ImportQueue, Arc<ActiveAssetSlot>) {
        queue_with_config(converter, store, &ImportConfig::default())
    }

    fn queue_with_config(
        converter: ScriptedConverter,
        store: AssetStore,
        config: &ImportConfig,
    ) -> (ImportQueue, Arc<ActiveAssetSlot>) {
        let slot = Arc::new(ActiveAssetSlot::new());
        let (sender, activations) = activation_channel(4);
        let activator = Activator::with_target(Arc::clone(&slot), |_: Arc<Asset>| {});
        tokio::spawn(activations.run(activator));

        let queue = ImportQueue::new(
            detector(),
            Arc::new(converter),
            store,
            sender,
            config,
            CancellationToken::new(),
        );
        (queue, slot)
    }

    fn admit(registry: &JobRegistry) -> JobGuard {
        admit_path(registry, "/w/output.ply")
    }

    fn admit_path(registry: &JobRegistry, path: &str) -> JobGuard {
        let event = WatchEvent::new(Utf8PathBuf::from(path), WatchEventKind::Created);
        match registry.admit(&event) {
            Admission::Admitted(guard) => guard,
            Admission::Coalesced { .. } => panic!("path already claimed"),
        }
    }

    async fn next_report(rx: &mut broadcast::Receiver<JobReport>) -> JobReport {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("report in time")
            .expect("report channel open")
    }

    #[tokio::test]
    async fn test_successful_job_activates() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = AssetStore::new(Utf8Path::from_path(dir.path()).expect("utf-8"));
        let converter = ScriptedConverter::succeeding();
        let calls = converter.calls();
        let (queue, slot) = queue_with(converter, store.clone());
        let mut reports = queue.subscribe();
        let registry = JobRegistry::new();

        queue.submit(admit(&registry));
        let report = next_report(&mut reports).await;

        assert_eq!(report.outcome, JobOutcome::Activated { generation: 1 });
        assert_eq!(report.path, Utf8PathBuf::from("/w/output.ply"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(slot.asset().map(|a| a.name().to_owned()).as_deref(), Some("output"));
        assert!(store.exists("output"));

        queue.close_and_wait().await;
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_conversion_failure_is_reported() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = AssetStore::new(Utf8Path::from_path(dir.path()).expect("utf-8"));
        let (queue, slot) = queue_with(ScriptedConverter::failing_first(1), store.clone());
        let mut reports = queue.subscribe();
        let registry = JobRegistry::new();

        queue.submit(admit(&registry));
        let report = next_report(&mut reports).await;

        let JobOutcome::Failed { reason, cause } = report.outcome else {
            panic!("expected failure, got {:?}", report.outcome);
        };
        assert_eq!(reason, FailureReason::ConversionError);
        insta::assert_snapshot!(cause, @"converting /w/output.ply failed: conversion failed: scripted failure");
        assert_eq!(slot.generation(), 0);
        assert!(!store.exists("output"));
        assert_eq!(queue.stats().snapshot().conversion_errors, 1);
    }

    #[tokio::test]
    async fn test_persistence_failure_is_reported() {
        let dir = tempfile::tempdir().expect("temp dir");
        // The store root is a file, so no namespace can be created under it.
        let root = dir.path().join("not-a-dir");
        std::fs::write(&root, b"").expect("write");
        let store = AssetStore::new(Utf8Path::from_path(&root).expect("utf-8"));
        let (queue, slot) = queue_with(ScriptedConverter::succeeding(), store);
        let mut reports = queue.subscribe();
        let registry = JobRegistry::new();

        queue.submit(admit(&registry));
        let report = next_report(&mut reports).await;

        assert_eq!(
            report.outcome.failure_reason(),
            Some(FailureReason::PersistenceError)
        );
        assert_eq!(slot.generation(), 0);
    }

    #[tokio::test]
    async fn test_cancel_abandons_stabilizing_job() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = AssetStore::new(Utf8Path::from_path(dir.path()).expect("utf-8"));
        let converter = ScriptedConverter::succeeding();
        let calls = converter.calls();
        let (queue, slot) = queue_with(converter, store);
        let mut reports = queue.subscribe();
        let registry = JobRegistry::new();

        queue.cancel_token().cancel();
        queue.submit(admit(&registry));
        let report = next_report(&mut reports).await;

        assert_eq!(report.outcome, JobOutcome::Abandoned);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(slot.generation(), 0);
        queue.close_and_wait().await;
        assert_eq!(queue.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_converter_panic_is_a_conversion_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = AssetStore::new(Utf8Path::from_path(dir.path()).expect("utf-8"));
        let converter = ScriptedConverter::panicking_first(1);
        let calls = converter.calls();
        let (queue, slot) = queue_with(converter, store.clone());
        let mut reports = queue.subscribe();
        let registry = JobRegistry::new();

        queue.submit(admit(&registry));
        let report = next_report(&mut reports).await;

        let JobOutcome::Failed { reason, cause } = report.outcome else {
            panic!("expected failure, got {:?}", report.outcome);
        };
        assert_eq!(reason, FailureReason::ConversionError);
        assert!(cause.contains("converter panicked"), "{cause}");
        assert_eq!(slot.generation(), 0);
        assert!(!store.exists("output"));

        // The path is released and the next write imports normally.
        queue.submit(admit(&registry));
        let report = next_report(&mut reports).await;
        assert_eq!(report.outcome, JobOutcome::Activated { generation: 1 });
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(queue.stats().snapshot().conversion_errors, 1);
    }

    #[tokio::test]
    async fn test_gone_render_context_abandons_after_persisting() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = AssetStore::new(Utf8Path::from_path(dir.path()).expect("utf-8"));
        let (sender, activations) = activation_channel(4);
        drop(activations);
        let queue = ImportQueue::new(
            detector(),
            Arc::new(ScriptedConverter::succeeding()),
            store.clone(),
            sender,
            &ImportConfig::default(),
            CancellationToken::new(),
        );
        let mut reports = queue.subscribe();
        let registry = JobRegistry::new();

        queue.submit(admit(&registry));
        let report = next_report(&mut reports).await;

        assert_eq!(report.outcome, JobOutcome::Abandoned);
        assert!(store.exists("output"));
        queue.close_and_wait().await;
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_same_named_paths_persist_in_turn() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = AssetStore::new(Utf8Path::from_path(dir.path()).expect("utf-8"));
        let (entered_tx, mut entered) = tokio::sync::mpsc::unbounded_channel();
        let (converter, release) = ScriptedConverter::gated(entered_tx);
        let config = ImportConfig {
            max_parallel_imports: 2,
            ..ImportConfig::default()
        };
        let (queue, slot) = queue_with_config(converter, store.clone(), &config);
        let mut reports = queue.subscribe();
        let registry = JobRegistry::new();

        queue.submit(admit_path(&registry, "/w/a/output.ply"));
        queue.submit(admit_path(&registry, "/w/b/output.ply"));
        // Both jobs are converting at once before either persists.
        entered.recv().await.expect("first converter call");
        entered.recv().await.expect("second converter call");
        release.send(()).expect("release first");
        release.send(()).expect("release second");

        let mut generations = vec![
            next_report(&mut reports).await.outcome,
            next_report(&mut reports).await.outcome,
        ];
        generations.sort_by_key(|outcome| match outcome {
            JobOutcome::Activated { generation } => *generation,
            other => panic!("expected activation, got {other:?}"),
        });
        assert_eq!(
            generations,
            [
                JobOutcome::Activated { generation: 1 },
                JobOutcome::Activated { generation: 2 },
            ]
        );
        assert_eq!(slot.generation(), 2);
        assert_eq!(store.load("output").expect("loads").splat_count(), 2);
        queue.close_and_wait().await;
    }
}
