//! Error types for dataset readers

use thiserror::Error;

/// Error type for dataset readers
#[derive(Error, Debug)]
pub enum Error {
    /// Core library error
    #[error("Core error: {0}")]
    Core(#[from] colstream_core::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV format error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// File contents do not match the expected layout
    #[error("Format error: {0}")]
    Format(String),

    /// Reader configuration does not describe a valid schema
    #[error("Schema error: {0}")]
    Schema(String),

    /// Missing or unknown label
    #[error("Label error: {0}")]
    Label(String),
}

/// Result type for dataset readers
pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for colstream_core::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Core(inner) => inner,
            other => colstream_core::Error::from_source(other),
        }
    }
}
