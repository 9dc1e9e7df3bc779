// =============================================================================
// Error Types
// =============================================================================
//
// One error enum for the whole library. Every fallible function returns
// `crate::Result<T>`, so `?` works everywhere without conversions.
//
// Configuration problems (bad argument combinations, unsupported partition
// counts) are raised before any file is read or any model is fitted.
// Numerical failures from the fitting engine propagate unchanged.
//
// =============================================================================

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while loading trial data, partitioning it, or fitting models.
#[derive(Error, Debug)]
pub enum MldsError {
    /// Invalid combination of constructor arguments.
    #[error("configuration error: {0}")]
    Config(String),

    /// A partition the selected segment policy refuses.
    #[error("unsupported segmentation: {0}")]
    Unsupported(String),

    /// A case the selected segment policy never implemented.
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// Array shapes that do not line up.
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// An input that must not be empty was empty.
    #[error("empty input: {0}")]
    EmptyInput(String),

    /// A value outside its valid domain.
    #[error("invalid value: {0}")]
    InvalidValue(String),

    /// A linear system could not be solved.
    #[error("linear algebra error: {0}")]
    LinearAlgebra(String),

    /// Malformed trial file contents.
    #[error("{}:{line}: {message}", .path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// Failure reading a trial file.
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, MldsError>;
