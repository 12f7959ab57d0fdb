use thiserror::Error;

/// Errors produced by the backend layer.
#[derive(Error, Debug)]
pub enum BackendError {
    /// The backend task has shut down and can no longer answer.
    #[error("Backend connection closed")]
    Closed,

    /// Blob exceeds the configured upload limit.
    #[error("Blob too large: {size} bytes (max {max})")]
    BlobTooLarge { size: usize, max: usize },

    /// Attempted to upload an empty blob.
    #[error("Empty blob")]
    EmptyBlob,

    /// A write was rejected by the backend.
    #[error("Write rejected: {0}")]
    WriteRejected(String),
}
