//! Error types for the gs-ply crate.

use camino::Utf8Path;
use gs_core::ConvertError;

/// Errors that can occur while decoding a PLY splat file.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PlyError {
    /// The file does not start with the `ply` magic line.
    #[error("missing 'ply' magic")]
    MissingMagic,

    /// No `end_header` line was found.
    #[error("header is not terminated by 'end_header'")]
    MissingEndHeader,

    /// A header line could not be understood.
    #[error("invalid header line {line}: {reason}")]
    InvalidHeader {
        /// One-based header line number.
        line: usize,
        /// What was wrong with it.
        reason: String,
    },

    /// The file uses a layout this decoder does not handle.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// A property every splat file must carry is absent.
    #[error("missing vertex property '{0}'")]
    MissingProperty(String),

    /// The body is shorter than the header promises.
    #[error("vertex data truncated: expected {expected} bytes, found {actual}")]
    Truncated {
        /// Bytes required by the header.
        expected: usize,
        /// Bytes present after the header.
        actual: usize,
    },
}

impl PlyError {
    /// Creates a new [`PlyError::InvalidHeader`] error.
    #[inline]
    pub fn invalid_header(line: usize, reason: impl Into<String>) -> Self {
        Self::InvalidHeader {
            line,
            reason: reason.into(),
        }
    }

    /// Attaches the input path, producing a converter-boundary error.
    #[must_use]
    pub fn at(self, path: &Utf8Path) -> ConvertError {
        ConvertError::malformed(path, self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncated_display() {
        let err = PlyError::Truncated {
            expected: 248,
            actual: 100,
        };
        assert_eq!(
            err.to_string(),
            "vertex data truncated: expected 248 bytes, found 100"
        );
    }

    #[test]
    fn test_at_attaches_path() {
        let err = PlyError::MissingProperty("opacity".to_owned()).at(Utf8Path::new("/w/output.ply"));
        let msg = err.to_string();
        assert!(msg.contains("/w/output.ply"));
        assert!(msg.contains("opacity"));
    }
}
