//! Error types for storage operations.

use thiserror::Error;

/// Errors that can occur during storage operations.
#[derive(Error, Debug, Clone)]
pub enum StorageError {
    /// Bucket or object not found.
    #[error("Object not found: s3://{bucket}/{key}")]
    NotFound { bucket: String, key: String },

    /// The backend rejected a request.
    #[error("Service error{}: {message}", format_service_details(.status, .code, .request_id))]
    ServiceError {
        message: String,
        status: Option<u16>,
        code: Option<String>,
        request_id: Option<String>,
        retryable: bool,
    },

    /// Network error.
    #[error("Network error: {message}")]
    NetworkError { message: String, retryable: bool },

    /// Local and remote checksums disagree after a transfer.
    #[error("Checksum mismatch for {key}: local {local}, remote {remote}")]
    ChecksumMismatch {
        key: String,
        local: String,
        remote: String,
    },

    /// Local I/O error.
    #[error("I/O error for {path}: {message}")]
    IoError { path: String, message: String },

    /// Operation cancelled by a progress callback.
    #[error("Operation cancelled")]
    Cancelled,

    /// Invalid configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Other error.
    #[error("{message}")]
    Other { message: String },
}

fn format_service_details(
    status: &Option<u16>,
    code: &Option<String>,
    request_id: &Option<String>,
) -> String {
    let mut details: Vec<String> = Vec::new();
    if let Some(status) = status {
        details.push(format!("status {}", status));
    }
    if let Some(code) = code {
        details.push(format!("code {}", code));
    }
    if let Some(request_id) = request_id {
        details.push(format!("request id {}", request_id));
    }
    if details.is_empty() {
        String::new()
    } else {
        format!(" ({})", details.join(", "))
    }
}

impl StorageError {
    /// Create an IoError from std::io::Error.
    ///
    /// # Arguments
    /// * `path` - Path where the error occurred
    /// * `err` - The underlying IO error
    pub fn io(path: impl Into<String>, err: std::io::Error) -> Self {
        StorageError::IoError {
            path: path.into(),
            message: err.to_string(),
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            StorageError::ServiceError { retryable, .. } => *retryable,
            StorageError::NetworkError { retryable, .. } => *retryable,
            StorageError::NotFound { .. } => false,
            StorageError::ChecksumMismatch { .. } => false,
            StorageError::IoError { .. } => false,
            StorageError::Cancelled => false,
            StorageError::InvalidConfig { .. } => false,
            StorageError::Other { .. } => false,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::IoError {
            path: String::new(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_error_display_includes_diagnostics() {
        let err: StorageError = StorageError::ServiceError {
            message: "Access Denied".into(),
            status: Some(403),
            code: Some("AccessDenied".into()),
            request_id: Some("REQ123".into()),
            retryable: false,
        };
        assert_eq!(
            err.to_string(),
            "Service error (status 403, code AccessDenied, request id REQ123): Access Denied"
        );

        let bare: StorageError = StorageError::ServiceError {
            message: "boom".into(),
            status: None,
            code: None,
            request_id: None,
            retryable: true,
        };
        assert_eq!(bare.to_string(), "Service error: boom");
        assert!(bare.is_retryable());
    }
}
