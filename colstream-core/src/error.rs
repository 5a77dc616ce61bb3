//! Error types for ranges, containers and batch streams

use std::io;
use thiserror::Error;

/// Result type for colstream operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for colstream operations
#[derive(Error, Debug)]
pub enum Error {
    /// Direct (non-slice) access outside the valid index range
    #[error("Index {index} out of range for length {len}")]
    Index {
        /// The index as requested by the caller, before negative resolution
        index: isize,
        /// Length of the addressed sequence
        len: usize,
    },

    /// Jagged or otherwise non-rectangular nested construction
    #[error("Shape error: {0}")]
    Shape(String),

    /// Unsupported element kind or malformed host value during conversion
    #[error("Conversion error: {0}")]
    Conversion(String),

    /// Batch columns disagree with the declared schema
    #[error("Schema error: {0}")]
    Schema(String),

    /// Opaque failure reported by a dataset source
    #[error("Source error: {0}")]
    Source(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Operation requires a finite range
    #[error("Unbounded range: {0}")]
    Unbounded(String),

    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// IO error while loading configuration
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Malformed configuration document
    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),
}

impl Error {
    /// Wrap any error raised by a dataset source
    pub fn from_source<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Error::Source(err.into())
    }

    /// Whether this is an out-of-bounds indexing failure
    pub fn is_index(&self) -> bool {
        matches!(self, Error::Index { .. })
    }
}
