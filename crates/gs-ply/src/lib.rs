//! Reference PLY splat converter.
//!
//! Implements [`gs_core::Converter`] for binary PLY files written by 3D
//! Gaussian splatting trainers. Vertex records are decoded in parallel with
//! rayon and repacked into the five asset buffers as plain float32 data.
//! Production quantization and compression live in other converters.

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod converter;
pub mod error;
pub mod header;

pub use converter::{CAMERAS_FILE_NAME, PlyConverter};
pub use error::PlyError;
pub use header::{PlyFormat, PlyHeader, Property, ScalarType};
