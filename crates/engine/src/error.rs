//! Error types for the storage engine.

use rusty_archival_bagit::BagError;
use rusty_archival_codec::ArchiveError;
use rusty_archival_common::PathError;
use rusty_archival_storage::StorageError;
use thiserror::Error;

/// A task description that cannot be turned into a `StorageTask`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// A required field is missing or blank.
    #[error("Storage task [{task}] is missing required parameter [{field}]")]
    MissingField { task: String, field: &'static str },

    /// The action is not one of upload, download, delete or list.
    #[error("Invalid storage action [{value}]")]
    InvalidAction { value: String },

    /// The task type is present but not `storage`.
    #[error("Invalid task type [{value}], expected [storage]")]
    InvalidType { value: String },

    /// The remote path cannot be decomposed into bucket and key.
    #[error("Invalid remote path [{path}]: {message}")]
    InvalidRemotePath { path: String, message: String },

    /// The task JSON is malformed.
    #[error("Invalid task JSON: {message}")]
    InvalidJson { message: String },
}

/// Errors raised while executing a storage task.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A precondition failed before any work started.
    #[error("Precondition failed: {message}")]
    Precondition { message: String },

    /// Not enough free space to start the operation.
    #[error("Not enough free space in {path}: needs {required}, has {available}")]
    InsufficientSpace {
        path: String,
        required: String,
        available: String,
    },

    /// The remote path names a provider this engine cannot reach.
    #[error("Unsupported storage provider: {provider}")]
    UnsupportedProvider { provider: String },

    /// A bag failed its completeness or checksum checks.
    #[error("Bag {path} failed verification: {source}")]
    Integrity {
        path: String,
        #[source]
        source: BagError,
    },

    /// Several objects of a prefix transfer failed.
    #[error("{failed} of {total} objects failed under {prefix}")]
    PartialFailure {
        prefix: String,
        failed: usize,
        total: usize,
    },

    /// Configuration file could not be read or parsed.
    #[error("Invalid configuration {path}: {message}")]
    Config { path: String, message: String },

    /// Local I/O error.
    #[error("I/O error for {path}: {message}")]
    IoError { path: String, message: String },

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error(transparent)]
    Bag(#[from] BagError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Path(#[from] PathError),

    /// A blocking worker panicked or was cancelled.
    #[error("Background task failed: {message}")]
    Join { message: String },
}

impl EngineError {
    /// Create an IoError from std::io::Error.
    ///
    /// # Arguments
    /// * `path` - Path where the error occurred
    /// * `err` - The underlying IO error
    pub fn io(path: impl Into<String>, err: std::io::Error) -> Self {
        EngineError::IoError {
            path: path.into(),
            message: err.to_string(),
        }
    }

    /// Create a precondition error.
    pub fn precondition(message: impl Into<String>) -> Self {
        EngineError::Precondition {
            message: message.into(),
        }
    }

    /// Whether the error was raised before any work started.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            EngineError::Precondition { .. }
                | EngineError::InsufficientSpace { .. }
                | EngineError::UnsupportedProvider { .. }
                | EngineError::Task(_)
        )
    }
}
