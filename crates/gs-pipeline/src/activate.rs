//! Asset activation.
//!
//! The renderer reads the current asset from an [`ActiveAssetSlot`]. The
//! slot is an [`ArcSwap`] so readers on any thread get a consistent
//! `(asset, generation)` pair without taking a lock, and a publish is a
//! single pointer swap.
//!
//! Activation must happen on the context that owns the render target. Jobs
//! run on the tokio runtime, so they never touch the target directly:
//!
//! ```text
//! job (runtime) ── ActivationSender::activate ──► mpsc ──► ActivationQueue
//!                                                             │ drain() each frame
//!                                                             ▼ or run()
//!                         oneshot reply ◄── outcome ◄──── Activator (owning context)
//!                                                             │ inject, then publish
//!                                                             ▼
//!                                                   RenderTarget + ActiveAssetSlot
//! ```

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use camino::{Utf8Path, Utf8PathBuf};
use gs_core::{Asset, JobOutcome};
use tokio::sync::{mpsc, oneshot};

use crate::error::JobError;

/// The renderer-side consumer of activated assets.
///
/// Called only from the context that owns the [`ActivationQueue`].
pub trait RenderTarget: Send + Sync + 'static {
    /// Swaps `asset` in as the displayed asset.
    fn inject(&self, asset: Arc<Asset>);
}

impl<F> RenderTarget for F
where
    F: Fn(Arc<Asset>) + Send + Sync + 'static,
{
    fn inject(&self, asset: Arc<Asset>) {
        self(asset);
    }
}

/// A consistent view of the slot.
#[derive(Debug, Clone, Default)]
pub struct SlotValue {
    /// The active asset, if any has been published.
    pub asset: Option<Arc<Asset>>,
    /// Number of successful activations so far.
    pub generation: u64,
}

/// Holds the asset currently shown by the renderer.
///
/// `generation` increases by one with every publish and never decreases.
#[derive(Debug, Default)]
pub struct ActiveAssetSlot {
    value: ArcSwap<SlotValue>,
}

impl ActiveAssetSlot {
    /// Creates an empty slot at generation 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current asset and generation together.
    #[must_use]
    pub fn load(&self) -> Arc<SlotValue> {
        self.value.load_full()
    }

    /// Returns the current generation.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.value.load().generation
    }

    /// Returns the current asset.
    #[must_use]
    pub fn asset(&self) -> Option<Arc<Asset>> {
        self.value.load().asset.as_ref().map(Arc::clone)
    }

    /// Replaces the active asset and returns the new generation.
    pub fn publish(&self, asset: Arc<Asset>) -> u64 {
        let previous = self.value.rcu(|current| SlotValue {
            asset: Some(Arc::clone(&asset)),
            generation: current.generation + 1,
        });
        previous.generation + 1
    }
}

/// Result of one activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationOutcome {
    /// The asset was injected and published.
    Activated {
        /// Slot generation after the publish.
        generation: u64,
    },
    /// No render target; the asset was retained and the slot left as is.
    Unapplied,
}

impl From<ActivationOutcome> for JobOutcome {
    fn from(outcome: ActivationOutcome) -> Self {
        match outcome {
            ActivationOutcome::Activated { generation } => Self::Activated { generation },
            ActivationOutcome::Unapplied => Self::Unapplied,
        }
    }
}

/// Performs activations on the owning context.
pub struct Activator {
    slot: Arc<ActiveAssetSlot>,
    target: Option<Arc<dyn RenderTarget>>,
    retained: Option<Arc<Asset>>,
}

impl fmt::Debug for Activator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Activator")
            .field("generation", &self.slot.generation())
            .field("has_target", &self.target.is_some())
            .field("retained", &self.retained.as_ref().map(|a| a.name().to_owned()))
            .finish()
    }
}

impl Activator {
    /// Creates an activator without a render target.
    #[must_use]
    pub const fn new(slot: Arc<ActiveAssetSlot>) -> Self {
        Self {
            slot,
            target: None,
            retained: None,
        }
    }

    /// Creates an activator that injects into `target`.
    pub fn with_target<T: RenderTarget>(slot: Arc<ActiveAssetSlot>, target: T) -> Self {
        Self {
            slot,
            target: Some(Arc::new(target)),
            retained: None,
        }
    }

    /// Wires up (or replaces) the render target.
    ///
    /// A retained asset is not injected automatically; the next activation
    /// supersedes it.
    pub fn set_target<T: RenderTarget>(&mut self, target: T) {
        self.target = Some(Arc::new(target));
    }

    /// The slot this activator publishes to.
    #[must_use]
    pub const fn slot(&self) -> &Arc<ActiveAssetSlot> {
        &self.slot
    }

    /// The most recent asset that could not be shown for lack of a target.
    #[must_use]
    pub const fn retained(&self) -> Option<&Arc<Asset>> {
        self.retained.as_ref()
    }

    /// Injects `asset` into the render target, then publishes it.
    ///
    /// Without a target the asset is retained, a warning is logged and the
    /// slot is not touched.
    pub fn activate(&mut self, source: &Utf8Path, asset: Asset) -> ActivationOutcome {
        let asset = Arc::new(asset);
        let Some(target) = &self.target else {
            JobError::ActivationTargetMissing {
                path: source.to_owned(),
            }
            .log();
            self.retained = Some(asset);
            return ActivationOutcome::Unapplied;
        };

        target.inject(Arc::clone(&asset));
        let generation = self.slot.publish(Arc::clone(&asset));
        self.retained = None;
        tracing::info!(
            path = %source,
            name = asset.name(),
            splats = asset.splat_count(),
            generation,
            "Activated asset"
        );
        ActivationOutcome::Activated { generation }
    }
}

#[derive(Debug)]
struct ActivationRequest {
    source: Utf8PathBuf,
    asset: Asset,
    reply: oneshot::Sender<ActivationOutcome>,
}

/// Creates the hand-off between import jobs and the owning context.
///
/// # Examples
///
/// ```
/// use gs_pipeline::{activation_channel, ActiveAssetSlot, Activator};
/// use std::sync::Arc;
///
/// let (sender, mut queue) = activation_channel(4);
/// let mut activator = Activator::new(Arc::new(ActiveAssetSlot::new()));
///
/// // Once per frame on the owning context:
/// assert_eq!(queue.drain(&mut activator), 0);
/// # drop(sender);
/// ```
#[must_use]
pub fn activation_channel(capacity: usize) -> (ActivationSender, ActivationQueue) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (ActivationSender { tx }, ActivationQueue { rx })
}

/// Job-side handle for requesting activations.
#[derive(Debug, Clone)]
pub struct ActivationSender {
    tx: mpsc::Sender<ActivationRequest>,
}

impl ActivationSender {
    /// Asks the owning context to activate `asset` and waits for the result.
    ///
    /// Returns `None` if the owning context is gone.
    pub async fn activate(&self, source: &Utf8Path, asset: Asset) -> Option<ActivationOutcome> {
        let (reply, outcome) = oneshot::channel();
        let request = ActivationRequest {
            source: source.to_owned(),
            asset,
            reply,
        };
        self.tx.send(request).await.ok()?;
        outcome.await.ok()
    }

    /// Returns `true` if the owning context has dropped its queue.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Owning-context end of the hand-off.
#[derive(Debug)]
pub struct ActivationQueue {
    rx: mpsc::Receiver<ActivationRequest>,
}

impl ActivationQueue {
    /// Performs every pending activation without waiting.
    ///
    /// Intended to be called once per frame. Returns how many ran.
    pub fn drain(&mut self, activator: &mut Activator) -> usize {
        let mut handled = 0;
        while let Ok(request) = self.rx.try_recv() {
            Self::handle(activator, request);
            handled += 1;
        }
        handled
    }

    /// Waits for the next request and performs it.
    ///
    /// Returns `None` once every sender is gone.
    pub async fn activate_next(&mut self, activator: &mut Activator) -> Option<ActivationOutcome> {
        let request = self.rx.recv().await?;
        Some(Self::handle(activator, request))
    }

    /// Performs activations until every sender is gone, then returns the
    /// activator.
    pub async fn run(mut self, mut activator: Activator) -> Activator {
        while self.activate_next(&mut activator).await.is_some() {}
        activator
    }

    /// Stops accepting requests; pending ones can still be drained.
    pub fn close(&mut self) {
        self.rx.close();
    }

    fn handle(activator: &mut Activator, request: ActivationRequest) -> ActivationOutcome {
        let outcome = activator.activate(&request.source, request.asset);
        // The job may have been dropped; the activation still stands.
        let _ = request.reply.send(outcome);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_asset;
    use parking_lot::Mutex;

    fn recording_target() -> (Arc<Mutex<Vec<String>>>, impl RenderTarget) {
        let shown = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&shown);
        let target = move |asset: Arc<Asset>| sink.lock().push(asset.name().to_owned());
        (shown, target)
    }

    #[test]
    fn test_generation_increases_by_one() {
        let slot = ActiveAssetSlot::new();
        assert_eq!(slot.generation(), 0);
        assert!(slot.asset().is_none());

        for expected in 1..=3 {
            let generation = slot.publish(Arc::new(sample_asset("output")));
            assert_eq!(generation, expected);
        }
        assert_eq!(slot.generation(), 3);
    }

    #[test]
    fn test_readers_see_consistent_pairs() {
        let slot = Arc::new(ActiveAssetSlot::new());

        std::thread::scope(|scope| {
            for _ in 0..4 {
                let slot = Arc::clone(&slot);
                scope.spawn(move || {
                    let mut last = 0;
                    for _ in 0..2000 {
                        let value = slot.load();
                        assert!(value.generation >= last, "generation went backwards");
                        last = value.generation;
                        if let Some(asset) = &value.asset {
                            assert_eq!(asset.name(), format!("gen-{}", value.generation));
                        }
                    }
                });
            }

            for n in 1..=200u64 {
                let generation = slot.publish(Arc::new(sample_asset(&format!("gen-{n}"))));
                assert_eq!(generation, n);
            }
        });
    }

    #[test]
    fn test_inject_then_publish() {
        let slot = Arc::new(ActiveAssetSlot::new());
        let (shown, target) = recording_target();
        let mut activator = Activator::with_target(Arc::clone(&slot), target);

        let outcome = activator.activate(Utf8Path::new("/w/output.ply"), sample_asset("output"));

        assert_eq!(outcome, ActivationOutcome::Activated { generation: 1 });
        assert_eq!(*shown.lock(), ["output"]);
        assert_eq!(slot.asset().map(|a| a.name().to_owned()).as_deref(), Some("output"));
        assert!(activator.retained().is_none());
    }

    #[test]
    fn test_missing_target_leaves_slot_untouched() {
        let slot = Arc::new(ActiveAssetSlot::new());
        let mut activator = Activator::new(Arc::clone(&slot));

        let outcome = activator.activate(Utf8Path::new("/w/output.ply"), sample_asset("output"));

        assert_eq!(outcome, ActivationOutcome::Unapplied);
        assert_eq!(slot.generation(), 0);
        assert!(slot.asset().is_none());
        assert_eq!(activator.retained().map(|a| a.name()), Some("output"));
        assert_eq!(JobOutcome::from(outcome), JobOutcome::Unapplied);
    }

    #[tokio::test]
    async fn test_sender_round_trip_through_run() {
        let slot = Arc::new(ActiveAssetSlot::new());
        let (_shown, target) = recording_target();
        let (sender, queue) = activation_channel(2);
        let owner = tokio::spawn(queue.run(Activator::with_target(Arc::clone(&slot), target)));

        let first = sender.activate(Utf8Path::new("/w/output.ply"), sample_asset("output")).await;
        let second = sender.activate(Utf8Path::new("/w/output.ply"), sample_asset("output")).await;
        assert_eq!(first, Some(ActivationOutcome::Activated { generation: 1 }));
        assert_eq!(second, Some(ActivationOutcome::Activated { generation: 2 }));

        drop(sender);
        let activator = owner.await.expect("owner task");
        assert_eq!(activator.slot().generation(), 2);
    }

    #[tokio::test]
    async fn test_drain_runs_pending_requests() {
        let slot = Arc::new(ActiveAssetSlot::new());
        let (shown, target) = recording_target();
        let mut activator = Activator::with_target(Arc::clone(&slot), target);
        let (sender, mut queue) = activation_channel(4);

        let jobs: Vec<_> = ["a", "b"]
            .into_iter()
            .map(|name| {
                let sender = sender.clone();
                tokio::spawn(async move {
                    sender.activate(Utf8Path::new("/w/output.ply"), sample_asset(name)).await
                })
            })
            .collect();

        let mut handled = 0;
        while handled < 2 {
            tokio::task::yield_now().await;
            handled += queue.drain(&mut activator);
        }

        for job in jobs {
            assert!(matches!(
                job.await.expect("job task"),
                Some(ActivationOutcome::Activated { .. })
            ));
        }
        assert_eq!(shown.lock().len(), 2);
        assert_eq!(slot.generation(), 2);
    }

    #[tokio::test]
    async fn test_closed_queue_yields_none() {
        let (sender, queue) = activation_channel(1);
        drop(queue);
        assert!(sender.is_closed());
        assert_eq!(
            sender.activate(Utf8Path::new("/w/output.ply"), sample_asset("output")).await,
            None
        );
    }
}
