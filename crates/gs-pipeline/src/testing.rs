//! Fixtures shared by the pipeline tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;

use camino::Utf8Path;
use gs_core::{
    Asset, AssetBuffers, AssetHeader, Bounds, BufferKind, ColorFormat, ConvertError, Converter,
    ShFormat, VectorFormat,
};
use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedSender;

/// A small asset with distinct, non-empty buffers.
pub(crate) fn sample_asset(name: &str) -> Asset {
    let header = AssetHeader {
        name: name.to_owned(),
        splat_count: 2,
        position_format: VectorFormat::Float32,
        scale_format: VectorFormat::Float32,
        color_format: ColorFormat::Float32x4,
        sh_format: ShFormat::Float32,
        bounds: Bounds {
            min: [-1.0, 0.0, 2.0],
            max: [1.0, 3.5, 4.0],
        },
        cameras: Vec::new(),
    };
    let mut buffers = AssetBuffers::default();
    buffers.set(BufferKind::Position, Arc::from(vec![1u8; 24]));
    buffers.set(BufferKind::Other, Arc::from(vec![2u8; 56]));
    buffers.set(BufferKind::Color, Arc::from(vec![3u8; 32]));
    buffers.set(BufferKind::SphericalHarmonics, Arc::from(vec![4u8; 8]));
    Asset::new(header, buffers)
}

/// Holds each conversion until the test releases it.
struct Gate {
    entered: UnboundedSender<()>,
    release: Mutex<mpsc::Receiver<()>>,
}

/// Converter that fails (or panics on) its first calls and then succeeds.
pub(crate) struct ScriptedConverter {
    calls: Arc<AtomicUsize>,
    failures: usize,
    panics: bool,
    gate: Option<Gate>,
}

impl ScriptedConverter {
    pub(crate) fn succeeding() -> Self {
        Self::failing_first(0)
    }

    pub(crate) fn failing_first(failures: usize) -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            failures,
            panics: false,
            gate: None,
        }
    }

    /// Panics instead of returning an error on the first `calls` calls.
    pub(crate) fn panicking_first(calls: usize) -> Self {
        Self {
            panics: true,
            ..Self::failing_first(calls)
        }
    }

    /// Blocks every call until a value is sent on the returned sender; each
    /// entry into `convert` is signalled on `entered`.
    pub(crate) fn gated(entered: UnboundedSender<()>) -> (Self, mpsc::Sender<()>) {
        let (release_tx, release_rx) = mpsc::channel();
        let converter = Self {
            gate: Some(Gate {
                entered,
                release: Mutex::new(release_rx),
            }),
            ..Self::succeeding()
        };
        (converter, release_tx)
    }

    /// Shared call counter.
    pub(crate) fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl Converter for ScriptedConverter {
    fn convert(
        &self,
        name: &str,
        _path: &Utf8Path,
        _include_aux_metadata: bool,
    ) -> Result<Asset, ConvertError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            let _ = gate.entered.send(());
            let _ = gate.release.lock().recv();
        }
        if call < self.failures {
            if self.panics {
                panic!("scripted panic");
            }
            return Err(ConvertError::failed("scripted failure"));
        }
        Ok(sample_asset(name))
    }
}
