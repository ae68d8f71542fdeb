//! The converter boundary.
//!
//! A [`Converter`] turns a completely written interchange file into an
//! [`Asset`]. Its quality and format settings are fixed when the converter is
//! constructed; the pipeline only supplies the name, the path, and whether
//! auxiliary metadata should be imported.
//!
//! Conversion is CPU-bound and synchronous. The pipeline runs it on the
//! blocking pool and treats both an `Err` and a panic as a conversion error.

use std::sync::Arc;

use camino::Utf8Path;

use crate::error::ConvertError;
use crate::types::Asset;

/// Turns an interchange file into a renderer-ready [`Asset`].
///
/// # Examples
///
/// ```
/// use gs_core::{Asset, Converter, ConvertError};
/// use camino::Utf8Path;
///
/// struct AlwaysFails;
///
/// impl Converter for AlwaysFails {
///     fn convert(&self, _name: &str, path: &Utf8Path, _aux: bool) -> Result<Asset, ConvertError> {
///         Err(ConvertError::malformed(path, "not a splat file"))
///     }
/// }
/// ```
pub trait Converter: Send + Sync + 'static {
    /// Converts the file at `path` into an asset called `name`.
    ///
    /// `include_aux_metadata` asks the converter to also import metadata
    /// stored next to the input, such as the capture camera list.
    fn convert(
        &self,
        name: &str,
        path: &Utf8Path,
        include_aux_metadata: bool,
    ) -> Result<Asset, ConvertError>;
}

impl<C: Converter + ?Sized> Converter for Box<C> {
    fn convert(
        &self,
        name: &str,
        path: &Utf8Path,
        include_aux_metadata: bool,
    ) -> Result<Asset, ConvertError> {
        (**self).convert(name, path, include_aux_metadata)
    }
}

impl<C: Converter + ?Sized> Converter for Arc<C> {
    fn convert(
        &self,
        name: &str,
        path: &Utf8Path,
        include_aux_metadata: bool,
    ) -> Result<Asset, ConvertError> {
        (**self).convert(name, path, include_aux_metadata)
    }
}
