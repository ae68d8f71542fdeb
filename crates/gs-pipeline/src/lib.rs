//! Hot-reload import pipeline for gs-hotload.
//!
//! Turns filesystem events for the interchange file into a new active asset
//! in the renderer, without a restart:
//!
//! ```text
//! WatchEvent
//!   │
//!   ▼
//! Path filter ──(other names)──► ignored
//!   │
//!   ▼
//! JobRegistry ──(job exists)──► coalesced
//!   │ JobGuard
//!   ▼
//! ImportQueue task
//!   ├─ StabilityDetector   poll size until K equal non-zero reads
//!   ├─ Converter           blocking pool, exactly once per job
//!   ├─ AssetStore          write *.tmp, rename, reload
//!   └─ ActivationSender ─► ActivationQueue (owning context)
//!                            └─ Activator: inject, publish to ActiveAssetSlot
//!   │
//!   ▼
//! JobReport (broadcast) + PipelineStats
//! ```
//!
//! # Guarantees
//!
//! - At most one job per path is in flight; a burst of events for the same
//!   path produces one conversion.
//! - The renderer never sees a half-written asset: persistence and reload
//!   complete before activation, and activation happens on the context that
//!   owns the render target.
//! - The slot generation increases by one per activation and never
//!   decreases. Failed jobs never touch the slot.
//! - Job failures are logged with path, stage and cause and never stop the
//!   pipeline. Only a watch setup failure prevents it from starting.
//!
//! # Usage
//!
//! ```no_run
//! use gs_core::Config;
//! use gs_pipeline::{activation_channel, ActiveAssetSlot, Activator, PipelineBuilder};
//! use gs_ply::PlyConverter;
//! use gs_watcher::ExtensionFilter;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), gs_pipeline::PipelineError> {
//! let (sender, mut queue) = activation_channel(4);
//! let pipeline = PipelineBuilder::new(Config::default())
//!     .converter(PlyConverter::new())
//!     .activations(sender)
//!     .build()?;
//!
//! let mut watcher = pipeline.watch(ExtensionFilter::new(&["ply"])).await?;
//! let driver = async { pipeline.run(watcher.events()).await };
//!
//! // On the render context, once per frame:
//! let mut activator = Activator::new(Arc::new(ActiveAssetSlot::new()));
//! queue.drain(&mut activator);
//! # driver.await;
//! # Ok(())
//! # }
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod activate;
pub mod debounce;
pub mod error;
pub mod persist;
pub mod pipeline;
pub mod queue;
pub mod stability;
pub mod stats;

#[cfg(test)]
pub(crate) mod testing;

// Re-export error types
pub use error::{JobError, PipelineError, StoreError};

// Re-export stage types
pub use activate::{
    ActivationOutcome, ActivationQueue, ActivationSender, Activator, ActiveAssetSlot,
    RenderTarget, SlotValue, activation_channel,
};
pub use debounce::{Admission, JobGuard, JobRegistry};
pub use persist::{AssetStore, BufferLengths, MANIFEST_FILE_NAME, Manifest};
pub use queue::ImportQueue;
pub use stability::{FsSizeProbe, SizeProbe, StabilityDetector};

// Re-export driver types
pub use pipeline::{EventDisposition, Pipeline, PipelineBuilder};
pub use stats::{PipelineStats, StatsSnapshot};
