//! Backend configuration.
//!
//! All settings have sensible defaults so a backend can be spawned with
//! zero configuration in tests and local development.

/// Tunables for a spawned backend task.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Capacity of the command channel into the backend task.
    /// Env: `DEVCHAT_COMMAND_CAPACITY`
    /// Default: `256`
    pub command_capacity: usize,

    /// Capacity of the event channel out of the backend task. A client
    /// that stops draining events will eventually apply backpressure to
    /// the backend rather than grow without bound.
    /// Env: `DEVCHAT_EVENT_CAPACITY`
    /// Default: `256`
    pub event_capacity: usize,

    /// Maximum accepted blob size in bytes (10 MiB).
    /// Env: `DEVCHAT_MAX_BLOB_SIZE`
    /// Default: `10485760`
    pub max_blob_size: usize,

    /// Number of progress ticks reported per upload before completion.
    pub upload_progress_steps: u32,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            command_capacity: 256,
            event_capacity: 256,
            max_blob_size: 10 * 1024 * 1024, // 10 MiB
            upload_progress_steps: 4,
        }
    }
}

impl BackendConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            command_capacity: env_usize("DEVCHAT_COMMAND_CAPACITY")
                .unwrap_or(defaults.command_capacity),
            event_capacity: env_usize("DEVCHAT_EVENT_CAPACITY")
                .unwrap_or(defaults.event_capacity),
            max_blob_size: env_usize("DEVCHAT_MAX_BLOB_SIZE").unwrap_or(defaults.max_blob_size),
            upload_progress_steps: defaults.upload_progress_steps,
        }
    }
}

fn env_usize(name: &str) -> Option<usize> {
    std::env::var(name).ok()?.parse().ok()
}
