//! The reference [`Converter`] for PLY splat files.
//!
//! Buffers are laid out as tightly packed float32 records in the byte order
//! of the host renderer (little-endian):
//!
//! | buffer  | per splat                                   |
//! |---------|---------------------------------------------|
//! | `pos`   | `x y z`                                     |
//! | `other` | `rot_0..rot_3 scale_0..scale_2`             |
//! | `color` | `f_dc_0 f_dc_1 f_dc_2 opacity`              |
//! | `sh`    | `f_rest_*` in index order (may be empty)    |
//! | `chunk` | empty; float32 data needs no chunk ranges   |

use std::sync::Arc;

use camino::Utf8Path;
use gs_core::{
    Asset, AssetBuffers, AssetHeader, Bounds, Buffer, CameraInfo, ColorFormat, ConvertError,
    Converter, ShFormat, VectorFormat,
};
use rayon::prelude::*;

use crate::error::PlyError;
use crate::header::{PlyFormat, PlyHeader, Property};

/// Default name of the auxiliary camera list stored next to the input.
pub const CAMERAS_FILE_NAME: &str = "cameras.json";

const POSITION: [&str; 3] = ["x", "y", "z"];
const OTHER: [&str; 7] = [
    "rot_0", "rot_1", "rot_2", "rot_3", "scale_0", "scale_1", "scale_2",
];
const COLOR: [&str; 4] = ["f_dc_0", "f_dc_1", "f_dc_2", "opacity"];

/// Converts binary PLY splat files into uncompressed float32 assets.
///
/// # Examples
///
/// ```no_run
/// use gs_core::Converter;
/// use gs_ply::PlyConverter;
/// use camino::Utf8Path;
///
/// let converter = PlyConverter::new();
/// let asset = converter.convert("output", Utf8Path::new("Auto/output.ply"), false)?;
/// println!("{} splats", asset.splat_count());
/// # Ok::<(), gs_core::ConvertError>(())
/// ```
#[derive(Debug, Clone)]
pub struct PlyConverter {
    cameras_file_name: String,
}

impl PlyConverter {
    /// Creates a converter that looks for `cameras.json` next to the input.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cameras_file_name: CAMERAS_FILE_NAME.to_owned(),
        }
    }

    /// Overrides the auxiliary camera file name.
    #[must_use]
    pub fn with_cameras_file(mut self, name: impl Into<String>) -> Self {
        self.cameras_file_name = name.into();
        self
    }

    /// Decodes an in-memory PLY file.
    pub fn decode(&self, name: &str, bytes: &[u8]) -> Result<Asset, PlyError> {
        let header = PlyHeader::parse(bytes)?;
        let body = &bytes[header.data_offset..];
        let body_len = header.body_len().ok_or_else(|| too_many(&header))?;
        if body.len() < body_len {
            return Err(PlyError::Truncated {
                expected: body_len,
                actual: body.len(),
            });
        }
        let body = &body[..body_len];

        let position = required(&header, &POSITION)?;
        let other = required(&header, &OTHER)?;
        let color = required(&header, &COLOR)?;
        let sh = header.sh_rest();

        let bounds = if header.vertex_count == 0 {
            Bounds::default()
        } else {
            body.par_chunks_exact(header.stride)
                .map(|vertex| {
                    [
                        position[0].read(vertex, header.format),
                        position[1].read(vertex, header.format),
                        position[2].read(vertex, header.format),
                    ]
                })
                .fold(Bounds::empty, |mut bounds, point| {
                    bounds.include(point);
                    bounds
                })
                .reduce(Bounds::empty, Bounds::union)
        };

        let buffers = AssetBuffers {
            chunk: Arc::from(Vec::new()),
            position: pack(body, &header, &position)?,
            other: pack(body, &header, &other)?,
            color: pack(body, &header, &color)?,
            sh: pack(body, &header, &sh)?,
        };

        let header = AssetHeader {
            name: name.to_owned(),
            splat_count: header.vertex_count as u64,
            position_format: VectorFormat::Float32,
            scale_format: VectorFormat::Float32,
            color_format: ColorFormat::Float32x4,
            sh_format: ShFormat::Float32,
            bounds,
            cameras: Vec::new(),
        };

        Ok(Asset::new(header, buffers))
    }

    fn load_cameras(&self, input: &Utf8Path) -> Result<Vec<CameraInfo>, ConvertError> {
        let path = input.with_file_name(&self.cameras_file_name);
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path, "Camera list requested but not present");
                return Ok(Vec::new());
            }
            Err(e) => return Err(ConvertError::read(path, e)),
        };
        serde_json::from_str(&contents).map_err(|e| ConvertError::AuxMetadata {
            path,
            reason: e.to_string(),
        })
    }
}

impl Default for PlyConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl Converter for PlyConverter {
    fn convert(
        &self,
        name: &str,
        path: &Utf8Path,
        include_aux_metadata: bool,
    ) -> Result<Asset, ConvertError> {
        let bytes = std::fs::read(path).map_err(|e| ConvertError::read(path, e))?;
        let mut asset = self.decode(name, &bytes).map_err(|e| e.at(path))?;
        if include_aux_metadata {
            asset.header.cameras = self.load_cameras(path)?;
        }
        tracing::debug!(
            path = %path,
            splats = asset.splat_count(),
            bytes = asset.buffers.total_len(),
            cameras = asset.header.cameras.len(),
            "Decoded PLY"
        );
        Ok(asset)
    }
}

fn required<'h, const N: usize>(
    header: &'h PlyHeader,
    names: &[&str; N],
) -> Result<[&'h Property; N], PlyError> {
    let mut found = Vec::with_capacity(N);
    for name in names {
        found.push(header.require(name)?);
    }
    found
        .try_into()
        .map_err(|_| PlyError::Unsupported("property lookup mismatch".to_owned()))
}

/// Packs the given properties of every vertex as little-endian `f32`s.
fn pack(body: &[u8], header: &PlyHeader, properties: &[&Property]) -> Result<Buffer, PlyError> {
    let record = properties.len() * 4;
    if record == 0 {
        return Ok(Arc::from(Vec::new()));
    }
    let format: PlyFormat = header.format;
    let len = header
        .vertex_count
        .checked_mul(record)
        .ok_or_else(|| too_many(header))?;
    let mut out = vec![0u8; len];
    out.par_chunks_exact_mut(record)
        .zip(body.par_chunks_exact(header.stride))
        .for_each(|(dst, vertex)| {
            for (slot, property) in dst.chunks_exact_mut(4).zip(properties) {
                slot.copy_from_slice(&property.read(vertex, format).to_le_bytes());
            }
        });
    Ok(Arc::from(out))
}

fn too_many(header: &PlyHeader) -> PlyError {
    PlyError::Unsupported(format!("vertex count {} is too large", header.vertex_count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gs_core::BufferKind;

    const PROPS: [&str; 17] = [
        "x", "y", "z", "f_dc_0", "f_dc_1", "f_dc_2", "f_rest_0", "f_rest_1", "opacity",
        "scale_0", "scale_1", "scale_2", "rot_0", "rot_1", "rot_2", "rot_3", "nx",
    ];

    /// Builds a little-endian splat PLY where property `p` of vertex `v`
    /// has the value `v * 100 + p`.
    fn splat_ply(vertices: usize) -> Vec<u8> {
        let mut text = format!("ply\nformat binary_little_endian 1.0\nelement vertex {vertices}\n");
        for name in PROPS {
            text.push_str(&format!("property float {name}\n"));
        }
        text.push_str("end_header\n");
        let mut bytes = text.into_bytes();
        for v in 0..vertices {
            for p in 0..PROPS.len() {
                bytes.extend_from_slice(&((v * 100 + p) as f32).to_le_bytes());
            }
        }
        bytes
    }

    fn floats(buffer: &[u8]) -> Vec<f32> {
        buffer
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    #[test]
    fn test_decode_buffers_layout() {
        let asset = PlyConverter::new()
            .decode("output", &splat_ply(2))
            .expect("decodes");

        assert_eq!(asset.name(), "output");
        assert_eq!(asset.splat_count(), 2);
        assert_eq!(floats(&asset.buffers.position), [0.0, 1.0, 2.0, 100.0, 101.0, 102.0]);
        assert_eq!(
            floats(&asset.buffers.color),
            [3.0, 4.0, 5.0, 8.0, 103.0, 104.0, 105.0, 108.0]
        );
        assert_eq!(floats(&asset.buffers.sh), [6.0, 7.0, 106.0, 107.0]);
        assert_eq!(floats(&asset.buffers.other)[..7], [12.0, 13.0, 14.0, 15.0, 9.0, 10.0, 11.0]);
        assert!(asset.buffers.get(BufferKind::Chunk).is_empty());
    }

    #[test]
    fn test_decode_bounds() {
        let asset = PlyConverter::new()
            .decode("output", &splat_ply(3))
            .expect("decodes");
        assert_eq!(asset.header.bounds.min, [0.0, 1.0, 2.0]);
        assert_eq!(asset.header.bounds.max, [200.0, 201.0, 202.0]);
    }

    #[test]
    fn test_decode_empty_cloud() {
        let asset = PlyConverter::new()
            .decode("output", &splat_ply(0))
            .expect("decodes");
        assert_eq!(asset.splat_count(), 0);
        assert_eq!(asset.buffers.total_len(), 0);
        assert_eq!(asset.header.bounds, Bounds::default());
    }

    #[test]
    fn test_decode_truncated_body() {
        let mut bytes = splat_ply(2);
        bytes.truncate(bytes.len() - 10);
        assert!(matches!(
            PlyConverter::new().decode("output", &bytes),
            Err(PlyError::Truncated { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_overflowing_vertex_count() {
        let mut text = String::from(
            "ply\nformat binary_little_endian 1.0\nelement vertex 4611686018427387904\n",
        );
        for name in PROPS {
            text.push_str(&format!("property float {name}\n"));
        }
        text.push_str("end_header\n");

        assert!(matches!(
            PlyConverter::new().decode("output", text.as_bytes()),
            Err(PlyError::Unsupported(reason)) if reason.contains("too large")
        ));
    }

    #[test]
    fn test_decode_missing_opacity() {
        let bytes = b"ply\nformat binary_little_endian 1.0\nelement vertex 0\n\
            property float x\nproperty float y\nproperty float z\nend_header\n";
        assert!(matches!(
            PlyConverter::new().decode("output", bytes),
            Err(PlyError::MissingProperty(_))
        ));
    }

    #[test]
    fn test_convert_reads_file_and_cameras() {
        let dir = tempfile::tempdir().expect("temp dir");
        let ply = dir.path().join("output.ply");
        std::fs::write(&ply, splat_ply(1)).expect("write ply");
        std::fs::write(
            dir.path().join(CAMERAS_FILE_NAME),
            r#"[{"id": 0, "img_name": "cam0", "width": 640, "height": 480,
                "position": [0, 0, 0], "rotation": [[1,0,0],[0,1,0],[0,0,1]],
                "fx": 500.0, "fy": 500.0}]"#,
        )
        .expect("write cameras");
        let path = Utf8Path::from_path(&ply).expect("utf-8 path");

        let asset = PlyConverter::new()
            .convert("output", path, true)
            .expect("converts");
        assert_eq!(asset.header.cameras.len(), 1);
        assert_eq!(asset.header.cameras[0].name, "cam0");

        let without = PlyConverter::new()
            .convert("output", path, false)
            .expect("converts");
        assert!(without.header.cameras.is_empty());
    }

    #[test]
    fn test_convert_missing_cameras_is_not_fatal() {
        let dir = tempfile::tempdir().expect("temp dir");
        let ply = dir.path().join("output.ply");
        std::fs::write(&ply, splat_ply(1)).expect("write ply");
        let path = Utf8Path::from_path(&ply).expect("utf-8 path");

        let asset = PlyConverter::new()
            .convert("output", path, true)
            .expect("converts");
        assert!(asset.header.cameras.is_empty());
    }

    #[test]
    fn test_convert_bad_cameras_fails() {
        let dir = tempfile::tempdir().expect("temp dir");
        let ply = dir.path().join("output.ply");
        std::fs::write(&ply, splat_ply(1)).expect("write ply");
        std::fs::write(dir.path().join(CAMERAS_FILE_NAME), "{").expect("write cameras");
        let path = Utf8Path::from_path(&ply).expect("utf-8 path");

        assert!(matches!(
            PlyConverter::new().convert("output", path, true),
            Err(ConvertError::AuxMetadata { .. })
        ));
    }

    #[test]
    fn test_convert_missing_file() {
        let err = PlyConverter::new()
            .convert("output", Utf8Path::new("/nonexistent/output.ply"), false)
            .expect_err("missing file");
        assert!(matches!(err, ConvertError::Read { .. }));
    }
}
