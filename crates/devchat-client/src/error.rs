use thiserror::Error;

use devchat_backend::BackendError;
use devchat_shared::types::UserId;
use devchat_shared::ValidationError;

/// Errors produced by the client layer.
#[derive(Error, Debug)]
pub enum ClientError {
    /// A form failed local validation; no remote call was made.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// A remote call failed. Never retried automatically.
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Sign-in resolved to a uid with no stored profile.
    #[error("Unknown user: {0}")]
    UnknownUser(UserId),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
