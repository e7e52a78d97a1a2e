//! Voice pool
//!
//! Fixed set of hardware voices allocated once when the device opens. Voices
//! are lent to one active sound or stream at a time and come back on stop.
//! Only the caller thread touches the pool.

use crate::device::{Device, VoiceId};
use crate::error::{Error, Result};
use std::collections::VecDeque;
use tracing::{debug, info, warn};

/// Free-list of hardware voices
#[derive(Debug, Default)]
pub struct VoicePool {
    free: VecDeque<VoiceId>,
    capacity: usize,
}

impl VoicePool {
    /// Allocate voices from `device`.
    ///
    /// Capacity is the device's mono + stereo capability clamped to
    /// `max_voices`; a device reporting zero capability is assumed to
    /// support `max_voices`. Allocation stops at the first device error.
    /// Fails with `InitializationFailed` if no voice could be created.
    pub fn allocate(device: &dyn Device, max_voices: usize) -> Result<Self> {
        let reported = device.channel_capacity()?.total() as usize;
        let target = match reported.min(max_voices) {
            0 => max_voices,
            n => n,
        };

        let mut free = VecDeque::with_capacity(target);
        for _ in 0..target {
            match device.gen_voice() {
                Ok(voice) => free.push_back(voice),
                Err(e) => {
                    warn!(
                        "Voice allocation stopped after {} of {}: {}, trying to continue",
                        free.len(),
                        target,
                        e
                    );
                    break;
                }
            }
        }

        if free.is_empty() {
            return Err(Error::InitializationFailed(
                "Could not allocate any voices".to_string(),
            ));
        }

        info!("Allocated {} voices (device reported {})", free.len(), reported);
        let capacity = free.len();
        Ok(Self { free, capacity })
    }

    /// Take a free voice
    pub fn acquire(&mut self) -> Result<VoiceId> {
        self.free
            .pop_front()
            .ok_or_else(|| Error::ResourceExhausted("No free voices".to_string()))
    }

    /// Return a voice to the free set
    pub fn release(&mut self, voice: VoiceId) {
        debug_assert!(!self.free.contains(&voice), "{} released twice", voice);
        self.free.push_back(voice);
    }

    /// Voices allocated at initialization
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.free.len()
    }

    /// Voices currently lent out
    pub fn in_use(&self) -> usize {
        self.capacity - self.free.len()
    }

    /// Delete every free voice from the device and empty the pool
    pub fn destroy(&mut self, device: &dyn Device) {
        for voice in self.free.drain(..) {
            if let Err(e) = device.delete_voice(voice) {
                debug!("Failed to delete {}: {}", voice, e);
            }
        }
        self.capacity = 0;
    }
}
