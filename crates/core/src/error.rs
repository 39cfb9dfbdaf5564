//! Error types for aquapi

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for aquapi operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Raster not found: {}", path.display())]
    RasterNotFound { path: PathBuf },

    #[error("Cannot read raster {}: {reason}", path.display())]
    RasterRead { path: PathBuf, reason: String },

    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error(
        "Raster shape mismatch: expected {}x{} (cols x rows), got {}x{}",
        expected.1, expected.0, actual.1, actual.0
    )]
    ShapeMismatch {
        /// (rows, cols) of the primary raster
        expected: (usize, usize),
        /// (rows, cols) of the raster combined with it
        actual: (usize, usize),
    },

    #[error("Invalid factor: {name} = {value} ({reason})")]
    InvalidFactor {
        name: &'static str,
        value: f64,
        reason: String,
    },

    #[error("Unknown indicator: {0}")]
    UnknownIndicator(String),

    #[error("Indicator '{0}' not implemented yet")]
    NotImplemented(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Expression references band '{0}' which has no raster bound to it")]
    UnboundBand(String),

    #[error("Invalid configuration for '{key}': {reason}")]
    Config { key: String, reason: String },

    #[error("{0}")]
    Other(String),
}

/// Result type alias for aquapi operations
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`], suitable for front ends that
/// react to the kind of failure rather than its message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    UnknownIndicator,
    RasterNotFound,
    RasterReadError,
    ShapeMismatch,
    InvalidFactor,
    NotImplemented,
    InvalidRequest,
    Io,
    Config,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnknownIndicator => "UnknownIndicator",
            Self::RasterNotFound => "RasterNotFound",
            Self::RasterReadError => "RasterReadError",
            Self::ShapeMismatch => "ShapeMismatch",
            Self::InvalidFactor => "InvalidFactor",
            Self::NotImplemented => "NotImplemented",
            Self::InvalidRequest => "InvalidRequest",
            Self::Io => "Io",
            Self::Config => "Config",
            Self::Internal => "Internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) => ErrorKind::Io,
            Self::RasterNotFound { .. } => ErrorKind::RasterNotFound,
            Self::RasterRead { .. } => ErrorKind::RasterReadError,
            Self::ShapeMismatch { .. } => ErrorKind::ShapeMismatch,
            Self::InvalidFactor { .. } => ErrorKind::InvalidFactor,
            Self::UnknownIndicator(_) => ErrorKind::UnknownIndicator,
            Self::NotImplemented(_) => ErrorKind::NotImplemented,
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::Config { .. } => ErrorKind::Config,
            Self::InvalidDimensions { .. }
            | Self::IndexOutOfBounds { .. }
            | Self::UnboundBand(_)
            | Self::Other(_) => ErrorKind::Internal,
        }
    }

    /// Build a [`Error::ShapeMismatch`] from two `(rows, cols)` shapes.
    pub fn shape_mismatch(expected: (usize, usize), actual: (usize, usize)) -> Self {
        Self::ShapeMismatch { expected, actual }
    }
}

/// Structured form of an [`Error`]: its kind and a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&Error> for ErrorReport {
    fn from(err: &Error) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_mismatch_message_reports_both_sizes() {
        let err = Error::shape_mismatch((100, 100), (50, 50));
        assert_eq!(err.kind(), ErrorKind::ShapeMismatch);
        let msg = err.to_string();
        assert!(msg.contains("100x100"), "{msg}");
        assert!(msg.contains("50x50"), "{msg}");
    }

    #[test]
    fn test_io_not_found_is_io_kind() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn test_report_carries_kind_and_message() {
        let err = Error::InvalidFactor {
            name: "MC",
            value: 1.0,
            reason: "moisture content must differ from 1".into(),
        };
        let report = ErrorReport::from(&err);
        assert_eq!(report.kind, ErrorKind::InvalidFactor);
        assert_eq!(report.message, "Invalid factor: MC = 1 (moisture content must differ from 1)");
        assert_eq!(report.to_string(), format!("InvalidFactor: {}", report.message));
    }
}
