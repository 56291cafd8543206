//! Custom error types for the crate.
//!
//! This module defines the primary error type, `CacheError`, for the whole
//! library. Using the `thiserror` crate, it provides a centralized and
//! consistent way to handle the different kinds of failures that can occur,
//! from path lookups to transport round trips.
//!
//! ## Error Hierarchy
//!
//! - **`NotFound`**: A path lookup in a [`ConfigStore`](crate::store::ConfigStore)
//!   found no direct value at the requested path.
//! - **`Access`**: An attempt to use a write-protected snapshot (`default`,
//!   `init`) as a save destination.
//! - **`Channel`**: A channel identifier exceeded the bank capacity, or a
//!   batch operation received the wrong number of values.
//! - **`Transport`** / **`Timeout`**: Failures surfaced by the transport
//!   collaborator. The store and the cache engine never catch these; they
//!   always propagate to the caller with the offending command in the
//!   message. The one exception is default-file generation, which skips
//!   parameters whose individual query fails.
//! - **`Io`**, **`Json`**, **`Settings`**: Wrapped failures from file
//!   persistence and configuration bootstrapping.
//! - **`CommandFormat`**: A command template could not be rendered.
//!
//! By using `#[from]`, `CacheError` can be seamlessly created from underlying
//! error types, simplifying error handling throughout the crate with the `?`
//! operator.

use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type Result<T> = std::result::Result<T, CacheError>;

/// Unified error type for configuration caching and hardware sync.
#[derive(Error, Debug)]
pub enum CacheError {
    /// No direct value is stored at the requested path.
    #[error("no configuration value at '{0}'")]
    NotFound(String),

    /// The named snapshot is write-protected and cannot be a save target.
    #[error("snapshot '{0}' is write-protected")]
    Access(String),

    /// Channel bounds or count mismatch in a multi-channel operation.
    #[error("channel error: {0}")]
    Channel(String),

    /// The transport collaborator failed to carry a command.
    #[error("transport failure for '{command}': {message}")]
    Transport {
        /// The command that was being written or queried.
        command: String,
        /// Human-readable description of the failure.
        message: String,
    },

    /// The transport collaborator timed out waiting for a response.
    #[error("timed out after {timeout_ms} ms waiting for '{command}'")]
    Timeout {
        /// The command that was being queried.
        command: String,
        /// The timeout that elapsed, in milliseconds.
        timeout_ms: u64,
    },

    /// File I/O error during save/load.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error while reading or writing a configuration file.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error while loading crate settings.
    #[error("configuration error: {0}")]
    Settings(#[from] config::ConfigError),

    /// A command template could not be rendered.
    #[error("command formatting error: {0}")]
    CommandFormat(String),
}

impl CacheError {
    /// Build a transport failure carrying the offending command.
    pub fn transport(command: impl Into<String>, message: impl Into<String>) -> Self {
        CacheError::Transport {
            command: command.into(),
            message: message.into(),
        }
    }

    /// True for failures surfaced by the transport collaborator, including
    /// timeouts. Used where per-parameter transport errors are recoverable.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            CacheError::Transport { .. } | CacheError::Timeout { .. }
        )
    }
}
