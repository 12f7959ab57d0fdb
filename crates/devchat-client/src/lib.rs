//! # devchat-client
//!
//! The DevChat front-end core: a remote feed adapter that mirrors the
//! backend's child-event streams into local render-ready collections, the
//! session/view state those collections feed, and the user-facing
//! operations (registration, channels, messages, typing indicators,
//! presence, starred channels, media uploads).
//!
//! All remote events arrive on one event stream and are dispatched
//! sequentially; no view state is shared across threads.

pub mod app;
pub mod auth;
pub mod channels;
pub mod listeners;
pub mod messages;
pub mod presence;
pub mod starred;
pub mod state;
pub mod typing;
pub mod uploads;

mod error;

pub use app::ChatApp;
pub use error::ClientError;

use tracing_subscriber::{fmt, EnvFilter};

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Install the global tracing subscriber for a client process.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("devchat_client=debug,devchat_backend=info,warn"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}
