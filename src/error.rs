//! Error types for driftplay
//!
//! Defines module-specific error types using thiserror for clear error propagation.

use thiserror::Error;

/// Main error type for the driftplay engine
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file loading or validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Playlist loading or validation errors
    #[error("Playlist error: {0}")]
    Playlist(String),

    /// Playlist contains no clips; the scheduler cannot start
    #[error("Playlist is empty")]
    EmptyPlaylist,

    /// Player handle operation errors
    #[error("Player error: {0}")]
    Player(String),

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type using the driftplay Error
pub type Result<T> = std::result::Result<T, Error>;
