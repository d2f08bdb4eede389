use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by every storage backend.
///
/// Adapters translate provider failures into `NotFound`, `InvalidArgument` or
/// `Backend`; no provider error type crosses the storage boundary. `TimedOut`
/// comes from the service layer's deadlines, either directly or through an
/// upload body that stopped delivering data.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object `{key}` not found in bucket `{bucket}`")]
    NotFound { bucket: String, key: String },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("storage backend error: {0}")]
    Backend(String),
    #[error("{0}")]
    TimedOut(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

impl StorageError {
    pub fn not_found(bucket: &str, key: &str) -> Self {
        Self::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    }

    pub fn timed_out(operation: &str, after: Duration) -> Self {
        Self::TimedOut(format!("{operation} timed out after {}s", after.as_secs()))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Map a failure of the caller-supplied upload body.
    pub fn from_body(err: std::io::Error, bucket: &str, key: &str) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut => Self::TimedOut(format!("{bucket}/{key}: {err}")),
            _ => Self::Backend(format!("{bucket}/{key}: reading upload body: {err}")),
        }
    }

    /// Map an opendal failure for `bucket`/`key` onto the taxonomy.
    ///
    /// opendal already folds provider codes (`NoSuchKey`, HTTP 404,
    /// `BlobNotFound`, ...) into [`opendal::ErrorKind::NotFound`].
    pub(crate) fn from_provider(err: opendal::Error, bucket: &str, key: &str) -> Self {
        use opendal::ErrorKind;

        match err.kind() {
            ErrorKind::NotFound => Self::not_found(bucket, key),
            ErrorKind::IsADirectory | ErrorKind::NotADirectory | ErrorKind::ConfigInvalid => {
                Self::InvalidArgument(format!("{bucket}/{key}: {err}"))
            }
            _ => Self::Backend(format!("{bucket}/{key}: {err}")),
        }
    }
}
