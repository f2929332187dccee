//! Error types for bag operations.

use rusty_archival_common::{HashAlgorithm, PathError};
use thiserror::Error;

/// Errors raised while wrapping, unwrapping or verifying a bag.
#[derive(Debug, Error, Clone)]
pub enum BagError {
    /// Local I/O error.
    #[error("I/O error for {path}: {message}")]
    IoError { path: String, message: String },

    /// The path is not a directory that can hold a bag.
    #[error("Not a directory: {path}")]
    NotADirectory { path: String },

    /// The directory carries no bag metadata.
    #[error("Not a bag: {path}")]
    NotABag { path: String },

    /// A mandatory file is missing, or payload and manifests disagree.
    #[error("Bag at {path} is incomplete: {reason}")]
    Incomplete { path: String, reason: String },

    /// A manifest line could not be parsed.
    #[error("Invalid manifest {path} line {line}: {message}")]
    InvalidManifest {
        path: String,
        line: usize,
        message: String,
    },

    /// A file's recomputed checksum differs from the manifest.
    #[error("Checksum mismatch for {path} ({algorithm}): expected {expected}, computed {actual}")]
    CorruptChecksum {
        path: String,
        algorithm: HashAlgorithm,
        expected: String,
        actual: String,
    },

    /// Verification could not be carried out.
    #[error("Verification failed: {message}")]
    Verification { message: String },

    /// A payload path cannot be represented in a manifest.
    #[error(transparent)]
    Path(#[from] PathError),
}

impl BagError {
    /// Create an IoError from std::io::Error.
    ///
    /// # Arguments
    /// * `path` - Path where the error occurred
    /// * `err` - The underlying IO error
    pub fn io(path: impl Into<String>, err: std::io::Error) -> Self {
        BagError::IoError {
            path: path.into(),
            message: err.to_string(),
        }
    }

    /// Whether this error reports corrupted payload or tag file content.
    pub fn is_corruption(&self) -> bool {
        matches!(self, BagError::CorruptChecksum { .. })
    }
}
