//! # sndout Playback Engine
//!
//! Voice management and streaming core of an audio output layer.
//!
//! **Purpose:** Lend hardware voices to one-shot sounds and decoder-backed
//! streams, keep streaming voices fed from a background worker, and run
//! deferred loudness analysis without stalling playback.
//!
//! **Architecture:**
//! - [`device`]: abstract voice/buffer device plus an in-memory implementation
//! - [`voice_pool`]: fixed pool of voices allocated at init
//! - [`stream`]: per-stream buffer rings and the scheduler servicing them
//! - [`registry`]: live sounds/streams and their playback parameters
//! - [`output`]: the engine tying them together

pub mod device;
pub mod error;
pub mod output;
pub mod registry;
pub mod stream;
pub mod voice_pool;

pub use error::{Error, Result};
pub use output::{Output, SoundData};
pub use registry::{Environment, PlayFlags, PlayParams, PlayType, SoundId, StreamId};
