//! Streaming playback
//!
//! **Architecture:**
//! - [`StreamFeeder`]: per-stream ring of device buffers kept full from a decoder
//! - [`StreamScheduler`]: single background worker advancing every registered
//!   feeder and draining deferred loudness jobs one at a time

pub mod feeder;
pub mod scheduler;

pub use feeder::StreamFeeder;
pub use scheduler::{LoudnessJob, StreamScheduler};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A feeder shared between its owning stream handle and the scheduler
pub type SharedFeeder = Arc<Mutex<StreamFeeder>>;

/// Lock a feeder, recovering from a poisoned lock
pub fn lock_feeder(feeder: &SharedFeeder) -> MutexGuard<'_, StreamFeeder> {
    feeder.lock().unwrap_or_else(PoisonError::into_inner)
}
