//! Error types for archive operations.

use thiserror::Error;

use crate::container::ContainerType;

/// Errors that can occur while packing or unpacking archives.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Local I/O error.
    #[error("I/O error for {path}: {message}")]
    IoError { path: String, message: String },

    /// A parent directory for an extracted entry could not be created.
    #[error("Unable to create directory {path}: {message}")]
    CreateDirectory { path: String, message: String },

    /// An archive member would land outside the output directory.
    #[error("Unsafe archive entry {entry}")]
    UnsafeEntry { entry: String },

    /// The archive is not a tar or gzip-tar container.
    #[error("Unsupported archive type for {path}: {detected}")]
    Unsupported {
        path: String,
        detected: ContainerType,
    },

    /// No input files were given to pack.
    #[error("Nothing to archive")]
    EmptyInput,
}

impl ArchiveError {
    /// Create an IoError from std::io::Error.
    ///
    /// # Arguments
    /// * `path` - Path where the error occurred
    /// * `err` - The underlying IO error
    pub fn io(path: impl Into<String>, err: std::io::Error) -> Self {
        ArchiveError::IoError {
            path: path.into(),
            message: err.to_string(),
        }
    }
}
