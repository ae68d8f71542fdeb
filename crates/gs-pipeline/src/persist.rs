//! Durable buffer storage.
//!
//! Each asset owns a namespace directory under the store root:
//!
//! ```text
//! <root>/<name>/chunk.bytes
//!               pos.bytes
//!               other.bytes
//!               color.bytes
//!               sh.bytes
//!               asset.json      (manifest, written last)
//! ```
//!
//! Every file is written to `*.tmp` and renamed into place. Before the first
//! buffer is renamed the old manifest is removed, and the new one is renamed
//! in last, so a namespace either has a manifest that matches all five
//! buffers or has none. A commit interrupted halfway loses the previous
//! asset on disk (a cold load reports it as missing) but never pairs a
//! manifest with another write's buffers.
//!
//! Writes and loads for the same name are serialized inside the store, so
//! two inputs that map to one name (`a/output.ply` and `b/output.ply` under
//! a recursive watch) take turns rather than interleave.
//!
//! [`AssetStore::persist`] writes an asset, reloads it through the same
//! path a cold start takes ([`AssetStore::load`]) and returns the reloaded
//! asset, so the activated asset is always the one on disk.

use std::fs;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use gs_core::{Asset, AssetBuffers, AssetHeader, Buffer, BufferKind, StoreConfig};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// File name of the per-asset manifest.
pub const MANIFEST_FILE_NAME: &str = "asset.json";

const BUFFER_EXTENSION: &str = "bytes";

/// Byte length of each buffer, as recorded in the manifest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferLengths {
    /// Chunk metadata.
    pub chunk: u64,
    /// Positions.
    pub pos: u64,
    /// Rotation and scale.
    pub other: u64,
    /// Colour and opacity.
    pub color: u64,
    /// Spherical harmonics.
    pub sh: u64,
}

impl BufferLengths {
    /// Records the lengths of `buffers`.
    #[must_use]
    pub fn of(buffers: &AssetBuffers) -> Self {
        let len = |kind| buffers.get(kind).len() as u64;
        Self {
            chunk: len(BufferKind::Chunk),
            pos: len(BufferKind::Position),
            other: len(BufferKind::Other),
            color: len(BufferKind::Color),
            sh: len(BufferKind::SphericalHarmonics),
        }
    }

    /// Length recorded for `kind`.
    #[must_use]
    pub const fn get(&self, kind: BufferKind) -> u64 {
        match kind {
            BufferKind::Chunk => self.chunk,
            BufferKind::Position => self.pos,
            BufferKind::Other => self.other,
            BufferKind::Color => self.color,
            BufferKind::SphericalHarmonics => self.sh,
        }
    }
}

/// Contents of `asset.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Derived fields of the asset.
    pub header: AssetHeader,
    /// Expected buffer lengths.
    pub lengths: BufferLengths,
}

/// One lock per asset name, shared by every clone of a store.
type NameLocks = Arc<Mutex<FxHashMap<String, Arc<Mutex<()>>>>>;

/// Stores assets as five buffer files plus a manifest.
///
/// Clones share the per-name locks, so a clone handed to a blocking task
/// still serializes with the original.
#[derive(Debug, Clone)]
pub struct AssetStore {
    root: Utf8PathBuf,
    locks: NameLocks,
}

impl AssetStore {
    /// Creates a store rooted at `root`.
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: NameLocks::default(),
        }
    }

    /// Creates a store from configuration.
    #[must_use]
    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(config.root.clone())
    }

    /// The store root.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Returns the namespace directory for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidName`] if `name` is empty, is `.` or
    /// `..`, or contains a path separator.
    pub fn namespace(&self, name: &str) -> Result<Utf8PathBuf, StoreError> {
        let reason = if name.is_empty() {
            Some("name is empty")
        } else if name == "." || name == ".." {
            Some("name refers to a directory")
        } else if name.contains(['/', '\\']) {
            Some("name contains a path separator")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(StoreError::InvalidName {
                name: name.to_owned(),
                reason,
            }),
            None => Ok(self.root.join(name)),
        }
    }

    /// Path of the buffer file of `kind` for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidName`] for an unusable name.
    pub fn buffer_path(&self, name: &str, kind: BufferKind) -> Result<Utf8PathBuf, StoreError> {
        let mut path = self.namespace(name)?.join(kind.file_stem());
        path.set_extension(BUFFER_EXTENSION);
        Ok(path)
    }

    /// Path of the manifest for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidName`] for an unusable name.
    pub fn manifest_path(&self, name: &str) -> Result<Utf8PathBuf, StoreError> {
        Ok(self.namespace(name)?.join(MANIFEST_FILE_NAME))
    }

    /// Returns `true` if a manifest exists for `name`.
    #[must_use]
    pub fn exists(&self, name: &str) -> bool {
        self.manifest_path(name).is_ok_and(|p| p.is_file())
    }

    fn name_lock(&self, name: &str) -> Arc<Mutex<()>> {
        Arc::clone(self.locks.lock().entry(name.to_owned()).or_default())
    }

    /// Writes all five buffers, then the manifest.
    ///
    /// On failure, temporary files are removed. A failure while staging
    /// leaves the previous asset intact; a failure while renaming leaves the
    /// namespace without a manifest.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the namespace cannot be created or any
    /// file cannot be written or renamed.
    pub fn write(&self, asset: &Asset) -> Result<(), StoreError> {
        let lock = self.name_lock(asset.name());
        let _held = lock.lock();
        self.write_locked(asset)
    }

    fn write_locked(&self, asset: &Asset) -> Result<(), StoreError> {
        let dir = self.namespace(asset.name())?;
        fs::create_dir_all(&dir).map_err(|e| StoreError::write(&dir, e))?;

        let mut staged = Vec::with_capacity(BufferKind::ALL.len() + 1);
        let result = self.stage_and_commit(asset, &mut staged);
        if result.is_err() {
            for (tmp, _) in &staged {
                let _ = fs::remove_file(tmp);
            }
        }
        result
    }

    fn stage_and_commit(
        &self,
        asset: &Asset,
        staged: &mut Vec<(Utf8PathBuf, Utf8PathBuf)>,
    ) -> Result<(), StoreError> {
        for (kind, buffer) in asset.buffers.iter() {
            let target = self.buffer_path(asset.name(), kind)?;
            staged.push(stage(&target, buffer)?);
        }

        let manifest = Manifest {
            header: asset.header.clone(),
            lengths: BufferLengths::of(&asset.buffers),
        };
        let manifest_path = self.manifest_path(asset.name())?;
        let json = serde_json::to_vec_pretty(&manifest).map_err(|source| StoreError::Manifest {
            path: manifest_path.clone(),
            source,
        })?;
        staged.push(stage(&manifest_path, &json)?);

        match fs::remove_file(&manifest_path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(StoreError::write(&manifest_path, e)),
        }
        // The manifest was staged last, so it is renamed last.
        for (tmp, target) in &*staged {
            fs::rename(tmp, target).map_err(|e| StoreError::write(target, e))?;
        }
        staged.clear();

        tracing::debug!(
            name = asset.name(),
            bytes = asset.buffers.total_len(),
            "Persisted asset buffers"
        );
        Ok(())
    }

    /// Loads a stored asset.
    ///
    /// This is both the reload step after [`write`](Self::write) and the
    /// cold-start path. Every buffer length is checked against the manifest.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Read`] if a file is missing or unreadable,
    /// [`StoreError::Manifest`] if the manifest cannot be parsed, and
    /// [`StoreError::LengthMismatch`] if a buffer was truncated.
    pub fn load(&self, name: &str) -> Result<Asset, StoreError> {
        let lock = self.name_lock(name);
        let _held = lock.lock();
        self.load_locked(name)
    }

    fn load_locked(&self, name: &str) -> Result<Asset, StoreError> {
        let manifest_path = self.manifest_path(name)?;
        let raw = fs::read(&manifest_path).map_err(|e| StoreError::read(&manifest_path, e))?;
        let manifest: Manifest =
            serde_json::from_slice(&raw).map_err(|source| StoreError::Manifest {
                path: manifest_path.clone(),
                source,
            })?;

        let mut buffers = AssetBuffers::default();
        for kind in BufferKind::ALL {
            let path = self.buffer_path(name, kind)?;
            let bytes = fs::read(&path).map_err(|e| StoreError::read(&path, e))?;
            let expected = manifest.lengths.get(kind);
            let actual = bytes.len() as u64;
            if actual != expected {
                return Err(StoreError::LengthMismatch {
                    path,
                    kind,
                    expected,
                    actual,
                });
            }
            let buffer: Buffer = Arc::from(bytes);
            buffers.set(kind, buffer);
        }

        Ok(Asset::new(manifest.header, buffers))
    }

    /// Writes `asset`, reloads it and re-initializes its derived fields from
    /// the stored manifest.
    ///
    /// The returned asset's buffers are the ones read back from disk.
    ///
    /// # Errors
    ///
    /// Returns the first [`StoreError`] from writing or reloading.
    pub fn persist(&self, mut asset: Asset) -> Result<Asset, StoreError> {
        let lock = self.name_lock(asset.name());
        let _held = lock.lock();
        self.write_locked(&asset)?;
        let reloaded = self.load_locked(asset.name())?;
        asset.buffers = reloaded.buffers;
        asset.reinitialize(reloaded.header);
        Ok(asset)
    }
}

/// Writes `bytes` next to `target` and returns `(tmp, target)`.
fn stage(target: &Utf8Path, bytes: &[u8]) -> Result<(Utf8PathBuf, Utf8PathBuf), StoreError> {
    let tmp = tmp_path(target);
    fs::write(&tmp, bytes).map_err(|e| StoreError::write(&tmp, e))?;
    Ok((tmp, target.to_owned()))
}

fn tmp_path(target: &Utf8Path) -> Utf8PathBuf {
    let mut name = target.file_name().unwrap_or_default().to_owned();
    name.push_str(".tmp");
    target.with_file_name(name)
}
