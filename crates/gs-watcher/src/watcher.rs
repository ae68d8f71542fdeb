//! Filesystem observer with async event streaming.
//!
//! This module provides the [`FileWatcher`] type that bridges the synchronous
//! `notify` watcher to the async tokio runtime.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                   Observer thread (notify)                      │
//! │  ┌───────────────────┐    ┌───────────────┐    ┌────────────┐  │
//! │  │ RecommendedWatcher │ -> │ classify kind │ -> │ source     │  │
//! │  │                    │    │               │    │ filter     │  │
//! │  └───────────────────┘    └───────────────┘    └─────┬──────┘  │
//! └──────────────────────────────────────────────────────│─────────┘
//!                                                        │ blocking_send
//! ┌──────────────────────────────────────────────────┐   │
//! │ Blocking task (spawn_blocking)                    │   │
//! │  startup enumeration ── blocking_send ────────────┼───┤
//! │  owns the watcher until shutdown                  │   │
//! └──────────────────────────────────────────────────┘   ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Async Runtime (tokio)                        │
//! │  ┌──────────────────┐    ┌────────────────┐                     │
//! │  │ FileWatcher      │    │ mpsc::Receiver │ -> pipeline driver  │
//! │  │ (shutdown ctrl)  │    │ (WatchEvent)   │                     │
//! │  └──────────────────┘    └────────────────┘                     │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The OS watch is registered before [`FileWatcher::new`] returns, so setup
//! failures surface to the caller instead of dying on a background thread.
//!
//! # Usage
//!
//! ```no_run
//! use gs_watcher::{ExtensionFilter, FileWatcher};
//! use gs_core::WatchConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = WatchConfig::default();
//!     let mut watcher = FileWatcher::new(&config, ExtensionFilter::new(&["ply"])).await?;
//!
//!     while let Some(event) = watcher.recv().await {
//!         println!("{} {}", event.kind, event.path);
//!     }
//!
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use gs_core::WatchConfig;

use crate::error::WatchError;
use crate::events::{WatchEvent, WatchEventKind};
use crate::filter::FileFilter;
use crate::scan;

/// A filesystem observer that streams [`WatchEvent`]s to an async context.
///
/// # Lifecycle
///
/// 1. **Creation**: `FileWatcher::new()` validates the directory, registers
///    the OS watch and spawns a blocking task that owns it. If configured,
///    files already present are enumerated and sent as `created` events.
///
/// 2. **Event Reception**: Use `recv()`, `try_recv()` or `events()`.
///    Events have already passed the source filter.
///
/// 3. **Shutdown**: Call `shutdown()` for graceful shutdown, or simply drop
///    the watcher. Either releases the OS watch; the event channel closes
///    once buffered events are drained.
pub struct FileWatcher {
    /// Shutdown signal sender.
    ///
    /// Set to `None` after shutdown is initiated.
    shutdown_tx: Option<oneshot::Sender<()>>,

    /// Handle to the blocking task owning the notify watcher.
    task_handle: Option<JoinHandle<()>>,

    /// Event receiver for async consumption.
    event_rx: mpsc::Receiver<WatchEvent>,

    /// The canonical directory being watched.
    watch_path: Utf8PathBuf,
}

impl std::fmt::Debug for FileWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileWatcher")
            .field("watch_path", &self.watch_path)
            .field("is_running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl FileWatcher {
    /// Starts watching `config.watch_dir`.
    ///
    /// # Arguments
    ///
    /// * `config` - Watch directory, recursion, startup enumeration, channel capacity
    /// * `filter` - Source filter applied on the observer thread
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::PathNotFound`] if the directory doesn't exist,
    /// [`WatchError::NotADirectory`] if it is a file, and
    /// [`WatchError::Notify`] if the OS watch cannot be registered.
    #[allow(clippy::unused_async)] // Async for API consistency with shutdown()
    pub async fn new<F: FileFilter>(config: &WatchConfig, filter: F) -> Result<Self, WatchError> {
        let path = config.watch_dir.as_path();
        if !path.exists() {
            return Err(WatchError::path_not_found(path));
        }
        if !path.is_dir() {
            return Err(WatchError::not_a_directory(path));
        }

        let watch_path = path.canonicalize_utf8().map_err(WatchError::Io)?;

        let (event_tx, event_rx) = mpsc::channel(config.event_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let filter = Arc::new(filter);

        let callback_tx = event_tx.clone();
        let callback_filter = Arc::clone(&filter);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            forward_notify_event(res, &callback_tx, &*callback_filter);
        })?;

        let mode = if config.recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        watcher.watch(watch_path.as_std_path(), mode)?;

        tracing::info!(path = %watch_path, recursive = config.recursive, "File watcher started");

        let startup = config.process_existing_on_start.then(|| StartupScan {
            root: watch_path.clone(),
            recursive: config.recursive,
            filter,
            event_tx,
        });

        let task_handle =
            tokio::task::spawn_blocking(move || run_watcher_loop(watcher, startup, shutdown_rx));

        Ok(Self {
            shutdown_tx: Some(shutdown_tx),
            task_handle: Some(task_handle),
            event_rx,
            watch_path,
        })
    }

    /// Receives the next event.
    ///
    /// Returns `None` once the watcher has shut down and all buffered
    /// events were received.
    pub async fn recv(&mut self) -> Option<WatchEvent> {
        self.event_rx.recv().await
    }

    /// Tries to receive an event without waiting.
    pub fn try_recv(&mut self) -> Result<WatchEvent, mpsc::error::TryRecvError> {
        self.event_rx.try_recv()
    }

    /// Returns a mutable reference to the event receiver.
    ///
    /// This is what the pipeline driver consumes, typically inside
    /// `tokio::select!`.
    pub fn events(&mut self) -> &mut mpsc::Receiver<WatchEvent> {
        &mut self.event_rx
    }

    /// Returns the canonical path being watched.
    #[must_use]
    pub fn watch_path(&self) -> &Utf8Path {
        &self.watch_path
    }

    /// Returns `true` if the observer is still registered.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shutdown_tx.is_some() && self.task_handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Releases the OS watch and waits for the observer task to finish.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::ChannelClosed`] if the observer task panicked.
    pub async fn shutdown(mut self) -> Result<(), WatchError> {
        if let Some(tx) = self.shutdown_tx.take() {
            // Ignore error if the task already exited
            let _ = tx.send(());
        }

        if let Some(handle) = self.task_handle.take() {
            handle.await.map_err(|_join_error| WatchError::ChannelClosed)?;
        }

        Ok(())
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Startup enumeration handed to the blocking task.
struct StartupScan<F> {
    root: Utf8PathBuf,
    recursive: bool,
    filter: Arc<F>,
    event_tx: mpsc::Sender<WatchEvent>,
}

/// Owns the notify watcher until shutdown, after optionally replaying files
/// that already exist.
#[allow(clippy::needless_pass_by_value)] // Watcher must be owned for the blocking task lifetime
fn run_watcher_loop<F: FileFilter>(
    watcher: RecommendedWatcher,
    startup: Option<StartupScan<F>>,
    shutdown_rx: oneshot::Receiver<()>,
) {
    if let Some(scan) = startup {
        match scan::existing_files(&scan.root, scan.recursive, &*scan.filter) {
            Ok(paths) => {
                for path in paths {
                    tracing::debug!(path = %path, "Replaying existing file");
                    let event = WatchEvent::new(path, WatchEventKind::Created);
                    if scan.event_tx.blocking_send(event).is_err() {
                        tracing::debug!("Event channel closed during startup enumeration");
                        break;
                    }
                }
            }
            Err(error) => {
                tracing::warn!(error = %error, root = %scan.root, "Startup enumeration failed");
            }
        }
    }

    // Block until shutdown; `blocking_recv` since we're in a sync context
    let _ = shutdown_rx.blocking_recv();

    drop(watcher);
    tracing::info!("File watcher stopped");
}

/// Converts one notify callback into zero or more [`WatchEvent`]s.
fn forward_notify_event<F: FileFilter + ?Sized>(
    res: notify::Result<notify::Event>,
    tx: &mpsc::Sender<WatchEvent>,
    filter: &F,
) {
    let event = match res {
        Ok(event) => event,
        Err(error) => {
            tracing::warn!(error = %error, "Notify error");
            return;
        }
    };

    let Some(kind) = WatchEventKind::classify(&event.kind) else {
        tracing::trace!(kind = ?event.kind, "Ignoring notify event kind");
        return;
    };

    // Both-sided renames list `[from, to]`; only the destination matters.
    let skip = if matches!(
        event.kind,
        EventKind::Modify(ModifyKind::Name(RenameMode::Both))
    ) {
        event.paths.len().saturating_sub(1)
    } else {
        0
    };

    for path in event.paths.into_iter().skip(skip) {
        let path = match Utf8PathBuf::try_from(path) {
            Ok(p) => p,
            Err(e) => {
                let err = WatchError::non_utf8_path(e.into_path_buf());
                tracing::warn!(error = %err, "Skipping file event");
                continue;
            }
        };

        if !filter.should_process(&path) {
            tracing::trace!(path = %path, "Filtered out file event");
            continue;
        }

        if tx.blocking_send(WatchEvent::new(path, kind)).is_err() {
            tracing::debug!("Event channel closed, dropping file event");
            break;
        }
    }
}
