use std::path::PathBuf;

use thiserror::Error;

use crate::format::FormatError;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to {operation} {path}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed record at {path}")]
    Format {
        path: PathBuf,
        #[source]
        source: FormatError,
    },

    #[error("Failed to encode record for {path}")]
    Encode {
        path: PathBuf,
        #[source]
        source: FormatError,
    },

    #[error("Invalid record file name: {name:?}")]
    InvalidFileName { name: String },

    #[error("No per-application data directory on this platform")]
    NoDataDirectory,
}

impl StoreError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io { operation, path: path.into(), source }
    }

    /// I/O failures may succeed on retry; the rest will not change by themselves.
    pub fn is_recoverable(&self) -> bool {
        match self {
            StoreError::Io { .. } => true,
            StoreError::Format { .. } => false,
            StoreError::Encode { .. } => false,
            StoreError::InvalidFileName { .. } => false,
            StoreError::NoDataDirectory => false,
        }
    }
}
