use thiserror::Error;

/// A local validation failure, detected before any remote call is made.
///
/// There is no structured error-code scheme: a failure carries a
/// human-readable message only, and the UI attaches it to the relevant
/// field by substring matching.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ValidationError {
    pub message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
