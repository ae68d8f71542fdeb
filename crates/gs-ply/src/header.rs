//! PLY header parsing.
//!
//! Only binary vertex data is supported, and the `vertex` element must be the
//! first element with a non-zero count (elements after it are ignored).

use crate::error::PlyError;

const END_HEADER: &[u8] = b"end_header";

/// Encoding of the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlyFormat {
    /// `binary_little_endian`
    BinaryLittleEndian,
    /// `binary_big_endian`
    BinaryBigEndian,
}

/// Scalar property types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    /// `char` / `int8`
    I8,
    /// `uchar` / `uint8`
    U8,
    /// `short` / `int16`
    I16,
    /// `ushort` / `uint16`
    U16,
    /// `int` / `int32`
    I32,
    /// `uint` / `uint32`
    U32,
    /// `float` / `float32`
    F32,
    /// `double` / `float64`
    F64,
}

impl ScalarType {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "char" | "int8" => Self::I8,
            "uchar" | "uint8" => Self::U8,
            "short" | "int16" => Self::I16,
            "ushort" | "uint16" => Self::U16,
            "int" | "int32" => Self::I32,
            "uint" | "uint32" => Self::U32,
            "float" | "float32" => Self::F32,
            "double" | "float64" => Self::F64,
            _ => return None,
        })
    }

    /// Size in bytes.
    #[must_use]
    pub const fn size(self) -> usize {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::F64 => 8,
        }
    }
}

/// One scalar vertex property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    /// Property name, e.g. `x` or `f_rest_12`.
    pub name: String,
    /// Scalar type.
    pub ty: ScalarType,
    /// Byte offset inside one vertex record.
    pub offset: usize,
}

impl Property {
    /// Reads this property from one vertex record, converted to `f32`.
    ///
    /// `vertex` must be at least one stride long.
    #[must_use]
    pub fn read(&self, vertex: &[u8], format: PlyFormat) -> f32 {
        let raw = &vertex[self.offset..self.offset + self.ty.size()];
        macro_rules! decode {
            ($t:ty, $n:literal) => {{
                let mut bytes = [0u8; $n];
                bytes.copy_from_slice(raw);
                match format {
                    PlyFormat::BinaryLittleEndian => <$t>::from_le_bytes(bytes),
                    PlyFormat::BinaryBigEndian => <$t>::from_be_bytes(bytes),
                }
            }};
        }
        match self.ty {
            ScalarType::I8 => f32::from(decode!(i8, 1)),
            ScalarType::U8 => f32::from(decode!(u8, 1)),
            ScalarType::I16 => f32::from(decode!(i16, 2)),
            ScalarType::U16 => f32::from(decode!(u16, 2)),
            ScalarType::I32 => decode!(i32, 4) as f32,
            ScalarType::U32 => decode!(u32, 4) as f32,
            ScalarType::F32 => decode!(f32, 4),
            ScalarType::F64 => decode!(f64, 8) as f32,
        }
    }
}

/// A parsed PLY header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlyHeader {
    /// Body encoding.
    pub format: PlyFormat,
    /// Number of vertices (splats).
    pub vertex_count: usize,
    /// Vertex properties in record order.
    pub properties: Vec<Property>,
    /// Size of one vertex record in bytes.
    pub stride: usize,
    /// Offset of the first vertex record in the file.
    pub data_offset: usize,
}

impl PlyHeader {
    /// Parses the header at the start of `bytes`.
    pub fn parse(bytes: &[u8]) -> Result<Self, PlyError> {
        if !bytes.starts_with(b"ply") {
            return Err(PlyError::MissingMagic);
        }
        let end = bytes
            .windows(END_HEADER.len())
            .position(|w| w == END_HEADER)
            .ok_or(PlyError::MissingEndHeader)?;
        let data_offset = bytes[end..]
            .iter()
            .position(|&b| b == b'\n')
            .map(|nl| end + nl + 1)
            .ok_or(PlyError::MissingEndHeader)?;
        let text = std::str::from_utf8(&bytes[..end])
            .map_err(|_| PlyError::invalid_header(0, "header is not valid UTF-8"))?;

        let mut format = None;
        let mut vertex_count = None;
        let mut in_vertex = false;
        let mut properties = Vec::new();
        let mut stride = 0;

        for (index, line) in text.lines().enumerate().skip(1) {
            let line_no = index + 1;
            let mut words = line.split_whitespace();
            match words.next() {
                None | Some("comment" | "obj_info") => {}
                Some("format") => {
                    format = Some(match words.next() {
                        Some("binary_little_endian") => PlyFormat::BinaryLittleEndian,
                        Some("binary_big_endian") => PlyFormat::BinaryBigEndian,
                        Some(other) => {
                            return Err(PlyError::Unsupported(format!("format '{other}'")));
                        }
                        None => return Err(PlyError::invalid_header(line_no, "missing format")),
                    });
                }
                Some("element") => {
                    let name = words
                        .next()
                        .ok_or_else(|| PlyError::invalid_header(line_no, "missing element name"))?;
                    let count: usize = words
                        .next()
                        .and_then(|c| c.parse().ok())
                        .ok_or_else(|| PlyError::invalid_header(line_no, "invalid element count"))?;
                    if name == "vertex" {
                        vertex_count = Some(count);
                        in_vertex = true;
                    } else {
                        if vertex_count.is_none() && count > 0 {
                            return Err(PlyError::Unsupported(format!(
                                "element '{name}' before vertex data"
                            )));
                        }
                        in_vertex = false;
                    }
                }
                Some("property") if in_vertex => {
                    let ty_name = words
                        .next()
                        .ok_or_else(|| PlyError::invalid_header(line_no, "missing property type"))?;
                    if ty_name == "list" {
                        return Err(PlyError::Unsupported("list vertex properties".to_owned()));
                    }
                    let ty = ScalarType::parse(ty_name).ok_or_else(|| {
                        PlyError::invalid_header(line_no, format!("unknown type '{ty_name}'"))
                    })?;
                    let name = words
                        .next()
                        .ok_or_else(|| PlyError::invalid_header(line_no, "missing property name"))?;
                    properties.push(Property {
                        name: name.to_owned(),
                        ty,
                        offset: stride,
                    });
                    stride += ty.size();
                }
                Some("property") => {}
                Some(other) => {
                    return Err(PlyError::invalid_header(
                        line_no,
                        format!("unexpected keyword '{other}'"),
                    ));
                }
            }
        }

        let format = format.ok_or_else(|| PlyError::invalid_header(2, "missing format line"))?;
        let vertex_count =
            vertex_count.ok_or_else(|| PlyError::Unsupported("no vertex element".to_owned()))?;

        Ok(Self {
            format,
            vertex_count,
            properties,
            stride,
            data_offset,
        })
    }

    /// Looks up a property by name.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Looks up a property that must be present.
    pub fn require(&self, name: &str) -> Result<&Property, PlyError> {
        self.property(name)
            .ok_or_else(|| PlyError::MissingProperty(name.to_owned()))
    }

    /// Returns the `f_rest_*` properties ordered by their index.
    #[must_use]
    pub fn sh_rest(&self) -> Vec<&Property> {
        let mut rest: Vec<(usize, &Property)> = self
            .properties
            .iter()
            .filter_map(|p| {
                p.name
                    .strip_prefix("f_rest_")
                    .and_then(|i| i.parse().ok())
                    .map(|i| (i, p))
            })
            .collect();
        rest.sort_by_key(|(i, _)| *i);
        rest.into_iter().map(|(_, p)| p).collect()
    }

    /// Number of body bytes the header promises.
    ///
    /// `None` when the declared vertex count overflows the address space.
    #[must_use]
    pub const fn body_len(&self) -> Option<usize> {
        self.vertex_count.checked_mul(self.stride)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(text: &str) -> Vec<u8> {
        text.as_bytes().to_vec()
    }

    #[test]
    fn test_parse_minimal_header() {
        let bytes = header(
            "ply\nformat binary_little_endian 1.0\ncomment made by hand\n\
             element vertex 2\nproperty float x\nproperty float y\nproperty float z\n\
             end_header\n",
        );
        let parsed = PlyHeader::parse(&bytes).expect("valid header");

        assert_eq!(parsed.format, PlyFormat::BinaryLittleEndian);
        assert_eq!(parsed.vertex_count, 2);
        assert_eq!(parsed.stride, 12);
        assert_eq!(parsed.data_offset, bytes.len());
        assert_eq!(parsed.require("z").expect("z").offset, 8);
    }

    #[test]
    fn test_parse_mixed_types_offsets() {
        let bytes = header(
            "ply\nformat binary_big_endian 1.0\nelement vertex 1\n\
             property double x\nproperty uchar red\nproperty float y\nend_header\n",
        );
        let parsed = PlyHeader::parse(&bytes).expect("valid header");
        assert_eq!(parsed.format, PlyFormat::BinaryBigEndian);
        assert_eq!(parsed.stride, 13);
        assert_eq!(parsed.require("y").expect("y").offset, 9);
        assert_eq!(parsed.body_len(), Some(13));
    }

    #[test]
    fn test_body_len_overflow() {
        let bytes = header(
            "ply\nformat binary_little_endian 1.0\nelement vertex 4611686018427387904\n\
             property float x\nproperty float y\nproperty float z\nend_header\n",
        );
        let parsed = PlyHeader::parse(&bytes).expect("valid header");
        assert_eq!(parsed.body_len(), None);
    }

    #[test]
    fn test_ascii_is_unsupported() {
        let bytes = header("ply\nformat ascii 1.0\nelement vertex 0\nend_header\n");
        assert!(matches!(
            PlyHeader::parse(&bytes),
            Err(PlyError::Unsupported(_))
        ));
    }

    #[test]
    fn test_missing_magic() {
        assert_eq!(PlyHeader::parse(b"obj\n"), Err(PlyError::MissingMagic));
    }

    #[test]
    fn test_missing_end_header() {
        let bytes = header("ply\nformat binary_little_endian 1.0\nelement vertex 1\n");
        assert_eq!(PlyHeader::parse(&bytes), Err(PlyError::MissingEndHeader));
    }

    #[test]
    fn test_list_property_is_unsupported() {
        let bytes = header(
            "ply\nformat binary_little_endian 1.0\nelement vertex 1\n\
             property list uchar int idx\nend_header\n",
        );
        assert!(matches!(
            PlyHeader::parse(&bytes),
            Err(PlyError::Unsupported(_))
        ));
    }

    #[test]
    fn test_faces_after_vertices_are_ignored() {
        let bytes = header(
            "ply\nformat binary_little_endian 1.0\nelement vertex 1\nproperty float x\n\
             element face 3\nproperty list uchar int vertex_indices\nend_header\n",
        );
        let parsed = PlyHeader::parse(&bytes).expect("valid header");
        assert_eq!(parsed.properties.len(), 1);
    }

    #[test]
    fn test_sh_rest_ordering() {
        let bytes = header(
            "ply\nformat binary_little_endian 1.0\nelement vertex 1\n\
             property float f_rest_10\nproperty float f_rest_2\nproperty float f_rest_0\n\
             end_header\n",
        );
        let parsed = PlyHeader::parse(&bytes).expect("valid header");
        let names: Vec<_> = parsed.sh_rest().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["f_rest_0", "f_rest_2", "f_rest_10"]);
    }

    #[test]
    fn test_property_read_endianness() {
        let prop = Property {
            name: "x".to_owned(),
            ty: ScalarType::F32,
            offset: 0,
        };
        let le = 1.5f32.to_le_bytes();
        let be = 1.5f32.to_be_bytes();
        assert!((prop.read(&le, PlyFormat::BinaryLittleEndian) - 1.5).abs() < f32::EPSILON);
        assert!((prop.read(&be, PlyFormat::BinaryBigEndian) - 1.5).abs() < f32::EPSILON);
    }
}
