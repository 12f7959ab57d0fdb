//! # devchat-backend
//!
//! The realtime backend the DevChat client talks to, expressed as a
//! command/event task: [`BackendCommand`]s go in over a tokio mpsc channel,
//! feed events come back out on a single [`BackendEvent`] stream. The
//! in-process reference implementation keeps an insertion-ordered JSON tree,
//! allocates order-preserving push keys, replays an ordered backlog on
//! subscription, fires disconnect cleanups, and serves blob uploads with
//! progress reporting.
//!
//! The client never constructs this directly; it holds a cloneable
//! [`BackendHandle`] and a receiver for the event stream, so a different
//! backend can be substituted behind the same two channels.

pub mod backend;
pub mod blobs;
pub mod config;
pub mod keys;
pub mod tree;

mod error;

pub use backend::{spawn_backend, BackendCommand, BackendEvent, BackendHandle};
pub use blobs::{BlobMetadata, UploadEvent, UploadTask};
pub use config::BackendConfig;
pub use error::BackendError;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, BackendError>;
