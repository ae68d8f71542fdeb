//! The renderer-ready splat asset.
//!
//! An [`Asset`] is an [`AssetHeader`] (counts, formats, bounds, cameras)
//! plus five immutable byte buffers ([`AssetBuffers`]). Buffers are shared
//! as [`Buffer`] (`Arc<[u8]>`), so handing an asset to the renderer never
//! copies buffer contents.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// An immutable, fixed-size byte sequence.
pub type Buffer = Arc<[u8]>;

/// The five buffer kinds making up an asset.
///
/// Each kind has a fixed file stem used by durable storage.
///
/// # Examples
///
/// ```
/// use gs_core::BufferKind;
///
/// assert_eq!(BufferKind::Position.file_stem(), "pos");
/// assert_eq!(BufferKind::ALL.len(), 5);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferKind {
    /// Per-chunk metadata (quantization ranges).
    Chunk,
    /// Splat positions.
    Position,
    /// Other per-splat attributes (rotation, scale).
    Other,
    /// Colour and opacity.
    Color,
    /// Spherical-harmonics coefficients.
    SphericalHarmonics,
}

impl BufferKind {
    /// All buffer kinds, in storage order.
    pub const ALL: [Self; 5] = [
        Self::Chunk,
        Self::Position,
        Self::Other,
        Self::Color,
        Self::SphericalHarmonics,
    ];

    /// Returns the fixed file stem for this buffer.
    #[inline]
    #[must_use]
    pub const fn file_stem(self) -> &'static str {
        match self {
            Self::Chunk => "chunk",
            Self::Position => "pos",
            Self::Other => "other",
            Self::Color => "color",
            Self::SphericalHarmonics => "sh",
        }
    }
}

impl std::fmt::Display for BufferKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.file_stem())
    }
}

/// Storage format of position and scale vectors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorFormat {
    /// Three 32-bit floats.
    #[default]
    Float32,
    /// Three 16-bit normalized integers.
    Norm16,
    /// 11-10-11 bit normalized, packed into 32 bits.
    Norm11,
    /// 6-5-5 bit normalized, packed into 16 bits.
    Norm6,
}

/// Storage format of colour and opacity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorFormat {
    /// Four 32-bit floats.
    #[default]
    Float32x4,
    /// Four 16-bit floats.
    Float16x4,
    /// Four 8-bit normalized integers.
    Norm8x4,
    /// BC7 block compression.
    Bc7,
}

/// Storage format of spherical-harmonics coefficients.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShFormat {
    /// 32-bit floats.
    #[default]
    Float32,
    /// 16-bit floats.
    Float16,
    /// 11-10-11 bit normalized.
    Norm11,
    /// 6-5-5 bit normalized.
    Norm6,
    /// Palette-clustered, 65536 entries.
    Cluster64k,
    /// Palette-clustered, 32768 entries.
    Cluster32k,
    /// Palette-clustered, 16384 entries.
    Cluster16k,
    /// Palette-clustered, 8192 entries.
    Cluster8k,
    /// Palette-clustered, 4096 entries.
    Cluster4k,
}

/// Axis-aligned bounding box of all splat positions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    /// Minimum corner.
    pub min: [f32; 3],
    /// Maximum corner.
    pub max: [f32; 3],
}

impl Bounds {
    /// Returns an inverted box that any point will expand.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            min: [f32::INFINITY; 3],
            max: [f32::NEG_INFINITY; 3],
        }
    }

    /// Grows the box to contain `point`.
    pub fn include(&mut self, point: [f32; 3]) {
        for axis in 0..3 {
            self.min[axis] = self.min[axis].min(point[axis]);
            self.max[axis] = self.max[axis].max(point[axis]);
        }
    }

    /// Returns the union of two boxes.
    #[must_use]
    pub fn union(mut self, other: Self) -> Self {
        self.include(other.min);
        self.include(other.max);
        self
    }

    /// Returns `true` if the box contains at least one point.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        (0..3).all(|axis| self.min[axis] <= self.max[axis])
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self {
            min: [0.0; 3],
            max: [0.0; 3],
        }
    }
}

/// One capture camera imported from auxiliary metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraInfo {
    /// Camera index.
    pub id: u32,
    /// Source image name.
    #[serde(rename = "img_name")]
    pub name: String,
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// World-space position.
    pub position: [f32; 3],
    /// Row-major rotation matrix.
    pub rotation: [[f32; 3]; 3],
    /// Horizontal focal length in pixels.
    pub fx: f32,
    /// Vertical focal length in pixels.
    pub fy: f32,
}

/// Derived fields of an asset: everything except the buffers themselves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetHeader {
    /// Display name (the input file stem).
    pub name: String,
    /// Number of splats.
    pub splat_count: u64,
    /// Position storage format.
    pub position_format: VectorFormat,
    /// Scale storage format.
    pub scale_format: VectorFormat,
    /// Colour storage format.
    pub color_format: ColorFormat,
    /// Spherical-harmonics storage format.
    pub sh_format: ShFormat,
    /// Bounds of all splat positions.
    pub bounds: Bounds,
    /// Capture cameras; empty when auxiliary metadata was not imported.
    #[serde(default)]
    pub cameras: Vec<CameraInfo>,
}

/// The five buffers of an asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetBuffers {
    /// Chunk metadata.
    pub chunk: Buffer,
    /// Positions.
    pub position: Buffer,
    /// Rotation and scale.
    pub other: Buffer,
    /// Colour and opacity.
    pub color: Buffer,
    /// Spherical harmonics.
    pub sh: Buffer,
}

impl AssetBuffers {
    /// Returns the buffer of the given kind.
    #[must_use]
    pub fn get(&self, kind: BufferKind) -> &Buffer {
        match kind {
            BufferKind::Chunk => &self.chunk,
            BufferKind::Position => &self.position,
            BufferKind::Other => &self.other,
            BufferKind::Color => &self.color,
            BufferKind::SphericalHarmonics => &self.sh,
        }
    }

    /// Replaces the buffer of the given kind.
    pub fn set(&mut self, kind: BufferKind, buffer: Buffer) {
        let slot = match kind {
            BufferKind::Chunk => &mut self.chunk,
            BufferKind::Position => &mut self.position,
            BufferKind::Other => &mut self.other,
            BufferKind::Color => &mut self.color,
            BufferKind::SphericalHarmonics => &mut self.sh,
        };
        *slot = buffer;
    }

    /// Iterates over `(kind, buffer)` pairs in storage order.
    pub fn iter(&self) -> impl Iterator<Item = (BufferKind, &Buffer)> {
        BufferKind::ALL.into_iter().map(move |kind| (kind, self.get(kind)))
    }

    /// Total size of all buffers in bytes.
    #[must_use]
    pub fn total_len(&self) -> usize {
        self.iter().map(|(_, buffer)| buffer.len()).sum()
    }
}

impl Default for AssetBuffers {
    fn default() -> Self {
        let empty: Buffer = Arc::from(Vec::new());
        Self {
            chunk: Arc::clone(&empty),
            position: Arc::clone(&empty),
            other: Arc::clone(&empty),
            color: Arc::clone(&empty),
            sh: empty,
        }
    }
}

/// A renderer-ready splat asset.
///
/// # Examples
///
/// ```
/// use gs_core::{Asset, AssetBuffers, AssetHeader, Bounds, BufferKind};
/// use gs_core::{ColorFormat, ShFormat, VectorFormat};
/// use std::sync::Arc;
///
/// let header = AssetHeader {
///     name: "output".to_owned(),
///     splat_count: 1,
///     position_format: VectorFormat::Float32,
///     scale_format: VectorFormat::Float32,
///     color_format: ColorFormat::Float32x4,
///     sh_format: ShFormat::Float32,
///     bounds: Bounds::default(),
///     cameras: Vec::new(),
/// };
/// let mut asset = Asset::new(header, AssetBuffers::default());
/// asset.buffers.set(BufferKind::Position, Arc::from(vec![0u8; 12]));
/// assert_eq!(asset.buffers.total_len(), 12);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Asset {
    /// Counts, formats, bounds and cameras.
    pub header: AssetHeader,
    /// The five typed buffers.
    pub buffers: AssetBuffers,
}

impl Asset {
    /// Creates an asset from its header and buffers.
    #[must_use]
    pub const fn new(header: AssetHeader, buffers: AssetBuffers) -> Self {
        Self { header, buffers }
    }

    /// Returns the display name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.header.name
    }

    /// Returns the number of splats.
    #[inline]
    #[must_use]
    pub const fn splat_count(&self) -> u64 {
        self.header.splat_count
    }

    /// Replaces the derived fields with `header`, keeping the buffers.
    pub fn reinitialize(&mut self, header: AssetHeader) {
        self.header = header;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_kind_stems_are_unique() {
        let mut stems: Vec<_> = BufferKind::ALL.iter().map(|k| k.file_stem()).collect();
        stems.sort_unstable();
        stems.dedup();
        assert_eq!(stems.len(), 5);
    }

    #[test]
    fn test_bounds_include() {
        let mut bounds = Bounds::empty();
        assert!(!bounds.is_valid());

        bounds.include([1.0, -2.0, 3.0]);
        bounds.include([-1.0, 4.0, 0.5]);

        assert!(bounds.is_valid());
        assert_eq!(bounds.min, [-1.0, -2.0, 0.5]);
        assert_eq!(bounds.max, [1.0, 4.0, 3.0]);
    }

    #[test]
    fn test_bounds_union() {
        let a = Bounds {
            min: [0.0; 3],
            max: [1.0; 3],
        };
        let b = Bounds {
            min: [-1.0; 3],
            max: [0.5; 3],
        };
        let u = a.union(b);
        assert_eq!(u.min, [-1.0; 3]);
        assert_eq!(u.max, [1.0; 3]);
    }

    #[test]
    fn test_asset_buffers_set_and_get() {
        let mut buffers = AssetBuffers::default();
        buffers.set(BufferKind::Color, Arc::from(vec![1u8, 2, 3, 4]));

        assert_eq!(&**buffers.get(BufferKind::Color), &[1, 2, 3, 4]);
        assert!(buffers.get(BufferKind::Chunk).is_empty());
        assert_eq!(buffers.total_len(), 4);
    }

    #[test]
    fn test_asset_buffers_iter_order() {
        let buffers = AssetBuffers::default();
        let kinds: Vec<_> = buffers.iter().map(|(kind, _)| kind).collect();
        assert_eq!(kinds, BufferKind::ALL);
    }

    #[test]
    fn test_camera_info_deserializes_cameras_json_entry() {
        let json = r#"{
            "id": 0, "img_name": "00001", "width": 1920, "height": 1080,
            "position": [0.0, 1.0, 2.0],
            "rotation": [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            "fy": 1100.5, "fx": 1100.0
        }"#;
        let camera: CameraInfo = serde_json::from_str(json).expect("valid camera");
        assert_eq!(camera.name, "00001");
        assert_eq!(camera.width, 1920);
        assert_eq!(camera.position, [0.0, 1.0, 2.0]);
    }
}
