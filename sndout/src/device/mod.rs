//! Hardware voice/buffer abstraction
//!
//! The engine talks to playback hardware only through [`Device`]. A device
//! hands out voices (playback channels) and buffers (PCM storage), queues
//! buffers on voices, and reports playback state back.
//!
//! **Threading:** a device is shared between the caller thread and the
//! stream scheduler's worker, so every method takes `&self` and
//! implementations synchronize internally.

pub mod format;
pub mod software;

pub use format::{negotiate_format, PcmFormat};
pub use software::{DeviceOp, SoftwareBackend, SoftwareDevice};

use crate::error::Result;
use glam::Vec3;
use std::fmt;
use std::sync::Arc;

/// Opaque identity of one hardware playback channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoiceId(pub(crate) u32);

impl fmt::Display for VoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "voice#{}", self.0)
    }
}

/// Opaque identity of one device-side PCM buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub(crate) u32);

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buffer#{}", self.0)
    }
}

/// Playback state of a voice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    Initial,
    Playing,
    Paused,
    Stopped,
}

impl VoiceState {
    /// Playing or paused: the voice still holds audio it intends to play
    pub fn is_active(self) -> bool {
        matches!(self, VoiceState::Playing | VoiceState::Paused)
    }
}

/// Simultaneous voice capability reported by a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelCapacity {
    pub mono: u32,
    pub stereo: u32,
}

impl ChannelCapacity {
    pub fn total(&self) -> u32 {
        self.mono.saturating_add(self.stereo)
    }
}

/// Optional format families a device may support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceExtension {
    /// Quad, 5.1 and 7.1 layouts
    MultiChannelFormats,
    /// 32-bit float samples
    Float32Formats,
}

/// Per-voice playback parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceParams {
    pub gain: f32,
    pub pitch: f32,
    pub position: Vec3,
    pub reference_distance: f32,
    pub max_distance: f32,
    pub rolloff_factor: f32,
    /// Position is relative to the listener rather than world space
    pub relative: bool,
    pub looping: bool,
}

impl Default for VoiceParams {
    fn default() -> Self {
        Self {
            gain: 1.0,
            pitch: 1.0,
            position: Vec3::ZERO,
            reference_distance: 1.0,
            max_distance: 1000.0,
            rolloff_factor: 1.0,
            relative: false,
            looping: false,
        }
    }
}

/// Abstract hardware voice and buffer provider.
///
/// Errors are reported as [`crate::Error::Device`].
pub trait Device: Send + Sync {
    /// Human readable device name
    fn name(&self) -> String;

    /// Simultaneous mono and stereo voices the device claims to support
    fn channel_capacity(&self) -> Result<ChannelCapacity>;

    fn has_extension(&self, extension: DeviceExtension) -> bool;

    fn gen_voice(&self) -> Result<VoiceId>;
    fn delete_voice(&self, voice: VoiceId) -> Result<()>;

    fn gen_buffers(&self, count: usize) -> Result<Vec<BufferId>>;
    fn delete_buffers(&self, buffers: &[BufferId]) -> Result<()>;

    /// Replace the contents of `buffer`
    fn buffer_data(
        &self,
        buffer: BufferId,
        format: PcmFormat,
        data: &[u8],
        sample_rate: u32,
    ) -> Result<()>;

    /// Size in bytes of the PCM held by `buffer`
    fn buffer_size(&self, buffer: BufferId) -> Result<usize>;

    /// Attach a single static buffer to a voice, or detach everything with `None`
    fn bind_buffer(&self, voice: VoiceId, buffer: Option<BufferId>) -> Result<()>;
    fn bound_buffer(&self, voice: VoiceId) -> Result<Option<BufferId>>;

    /// Append buffers to a voice's streaming queue
    fn queue_buffers(&self, voice: VoiceId, buffers: &[BufferId]) -> Result<()>;

    /// Remove `count` already-played buffers from the front of the queue
    fn unqueue_buffers(&self, voice: VoiceId, count: usize) -> Result<Vec<BufferId>>;

    /// Buffers on the queue, including played ones not yet unqueued
    fn buffers_queued(&self, voice: VoiceId) -> Result<usize>;

    /// Played buffers still sitting on the queue
    fn buffers_processed(&self, voice: VoiceId) -> Result<usize>;

    fn play(&self, voices: &[VoiceId]) -> Result<()>;
    fn pause(&self, voices: &[VoiceId]) -> Result<()>;
    fn stop(&self, voice: VoiceId) -> Result<()>;
    fn voice_state(&self, voice: VoiceId) -> Result<VoiceState>;

    /// Play cursor in sample frames, relative to the head of the queue
    fn sample_offset(&self, voice: VoiceId) -> Result<u64>;

    fn set_voice_params(&self, voice: VoiceId, params: &VoiceParams) -> Result<()>;

    /// Seek the voice to `seconds` into its bound audio
    fn set_sec_offset(&self, voice: VoiceId, seconds: f32) -> Result<()>;

    fn set_listener(&self, position: Vec3, at: Vec3, up: Vec3) -> Result<()>;

    /// Defer applying parameter changes until [`Device::process`]
    fn suspend(&self);
    fn process(&self);
}

/// Enumerates and opens devices
pub trait DeviceBackend: Send + Sync {
    fn enumerate(&self) -> Vec<String>;

    /// Open a device by name; an empty name selects the default device
    fn open(&self, name: &str) -> Result<Arc<dyn Device>>;
}
