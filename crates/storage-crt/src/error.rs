//! Mapping of AWS SDK failures onto `StorageError`.

use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::operation::RequestId;

use rusty_archival_storage::StorageError;

/// HTTP status of a failed request, if a response was received.
pub(crate) fn status_of<E>(err: &SdkError<E, HttpResponse>) -> Option<u16> {
    err.raw_response().map(|response| response.status().as_u16())
}

/// Convert an SDK error into a `StorageError`.
///
/// Transport failures become `NetworkError`. Anything the service answered
/// becomes `ServiceError` carrying the HTTP status, the S3 error code and the
/// request id. Throttling and 5xx answers are marked retryable.
pub(crate) fn from_sdk<E>(err: SdkError<E, HttpResponse>) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    match &err {
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) | SdkError::ResponseError(_) => {
            StorageError::NetworkError {
                message: DisplayErrorContext(&err).to_string(),
                retryable: true,
            }
        }
        _ => {
            let status: Option<u16> = status_of(&err);
            let code: Option<String> = err.code().map(str::to_string);
            let request_id: Option<String> = err.request_id().map(str::to_string);
            let message: String = err
                .message()
                .map(str::to_string)
                .unwrap_or_else(|| DisplayErrorContext(&err).to_string());
            StorageError::ServiceError {
                message,
                status,
                code,
                request_id,
                retryable: matches!(status, Some(s) if s >= 500 || s == 429),
            }
        }
    }
}

/// Convert a failure to obtain credentials into a configuration error.
pub(crate) fn credentials_error(err: impl std::fmt::Display) -> StorageError {
    StorageError::InvalidConfig {
        message: format!("No usable credentials: {}", err),
    }
}
