//! # sndout Common Library
//!
//! Shared code for the sndout playback engine and anything that feeds it:
//! - Sample format vocabulary (channel layouts, sample encodings)
//! - Decoder and loudness-analyzer contracts
//! - Configuration loading
//! - Logging initialisation

pub mod config;
pub mod decoder;
pub mod error;
pub mod format;
pub mod logging;
pub mod loudness;

pub use decoder::{Decoder, DecoderInfo, DecoderProvider};
pub use error::{Error, Result};
pub use format::{ChannelConfig, SampleType};
pub use loudness::LoudnessAnalyzer;
