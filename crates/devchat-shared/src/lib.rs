//! # devchat-shared
//!
//! Domain types shared between the DevChat client core and the realtime
//! backend: ids, message/channel models, remote path handling, and the
//! local-first form validation rules.

pub mod error;
pub mod paths;
pub mod types;
pub mod validation;

pub use error::ValidationError;
pub use paths::RemotePath;
