//! Filesystem observer for gs-hotload.
//!
//! This crate detects changes to the interchange file via the `notify`
//! crate and streams them as typed [`WatchEvent`]s into an async tokio
//! context, where the import pipeline consumes them.
//!
//! # Overview
//!
//! - Register an OS watch on the configured directory (failure here is the
//!   only error that prevents the pipeline from starting)
//! - Classify raw notifications into `created`, `changed` and `renamed`
//! - Filter at the source to cut channel traffic (e.g. only `*.ply`)
//! - Replay files already present at startup as `created` events
//! - Provide the path filter ([`TrackedNameFilter`]) the pipeline applies
//!   to every event
//!
//! No debouncing happens here: every accepted notification is forwarded and
//! the pipeline's job registry coalesces bursts per path.
//!
//! # Crate Dependencies
//!
//! ```text
//! gs-cli ──► gs-pipeline ──► gs-watcher ──► gs-core
//!        └─► gs-ply ────────────────────────►
//! ```
//!
//! # Usage
//!
//! ## Using with `tokio::select!`
//!
//! ```no_run
//! use gs_watcher::{ExtensionFilter, FileWatcher, TrackedNameFilter};
//! use gs_core::WatchConfig;
//! use tokio::time::{interval, Duration};
//!
//! # async fn example() -> Result<(), gs_watcher::WatchError> {
//! let config = WatchConfig::default();
//! let tracked = TrackedNameFilter::new(&config.tracked_names);
//! let mut watcher = FileWatcher::new(&config, ExtensionFilter::new(&["ply"])).await?;
//!
//! let mut frame = interval(Duration::from_millis(16));
//!
//! loop {
//!     tokio::select! {
//!         Some(event) = watcher.recv() => {
//!             if tracked.accepts(&event) {
//!                 println!("import {}", event.path);
//!             }
//!         }
//!         _ = frame.tick() => {
//!             // Per-frame work
//!         }
//!     }
//! }
//! # }
//! ```
//!
//! # Error Handling
//!
//! ```
//! use gs_watcher::WatchError;
//!
//! fn handle_watch_error(err: WatchError) {
//!     if err.is_fatal() {
//!         eprintln!("Fatal watcher error: {}", err);
//!     } else {
//!         eprintln!("Warning: {}", err);
//!     }
//! }
//! ```
//!
//! # Performance Considerations
//!
//! - **Filtering at Source**: Events are filtered on the observer thread
//!   before being sent, so unrelated files never reach the pipeline.
//!
//! - **Bounded Channel**: The event channel capacity comes from
//!   `watch.event_capacity`; a slow consumer applies backpressure to the
//!   observer thread instead of growing memory.
//!
//! - **UTF-8 Paths**: Paths are validated as UTF-8 once, on the observer
//!   thread; non-UTF-8 paths are logged and skipped.

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod error;
pub mod events;
pub mod filter;
pub mod scan;
pub mod watcher;

// Re-export error types
pub use error::WatchError;

// Re-export event types
pub use events::{WatchEvent, WatchEventKind};

// Re-export filter types
pub use filter::{ExtensionFilter, FileFilter, TrackedNameFilter};

// Re-export watcher types
pub use watcher::FileWatcher;
