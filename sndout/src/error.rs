//! Error types for sndout
//!
//! Construction-time failures propagate to the caller; failures inside the
//! background scheduler are logged and absorbed there.

use thiserror::Error;

/// Main error type for the output engine
#[derive(Error, Debug)]
pub enum Error {
    /// No free voice is left in the pool
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// No device format matches a decoder's channel layout and sample type
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Device open, context setup or voice allocation failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// A device call reported an error
    #[error("Device error: {0}")]
    Device(String),

    /// Operation requires an initialized output
    #[error("Output not initialized")]
    NotInitialized,

    /// Decoder, configuration or I/O failure from a collaborator
    #[error(transparent)]
    Common(#[from] sndout_common::Error),
}

/// Convenience Result type using sndout Error
pub type Result<T> = std::result::Result<T, Error>;
