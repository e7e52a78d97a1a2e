//! Common error types for sndout

use thiserror::Error;

/// Common result type for sndout operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors shared by the engine and its collaborators
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Decoder failed to produce PCM data
    #[error("Decode error: {0}")]
    Decode(String),

    /// Invalid caller input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
