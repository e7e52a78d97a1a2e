//! Sample format vocabulary
//!
//! Describes decoded PCM as it leaves a decoder: a channel layout plus a
//! per-sample encoding. The engine derives frame sizes from these to size
//! its streaming buffers.

use std::fmt;

/// Channel layout of decoded PCM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelConfig {
    Mono,
    Stereo,
    Rear,
    Quad,
    Surround51,
    Surround61,
    Surround71,
}

impl ChannelConfig {
    /// Number of interleaved channels per frame
    pub fn channel_count(self) -> usize {
        match self {
            ChannelConfig::Mono => 1,
            ChannelConfig::Stereo => 2,
            ChannelConfig::Rear => 2,
            ChannelConfig::Quad => 4,
            ChannelConfig::Surround51 => 6,
            ChannelConfig::Surround61 => 7,
            ChannelConfig::Surround71 => 8,
        }
    }
}

impl fmt::Display for ChannelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChannelConfig::Mono => "Mono",
            ChannelConfig::Stereo => "Stereo",
            ChannelConfig::Rear => "Rear",
            ChannelConfig::Quad => "Quad",
            ChannelConfig::Surround51 => "5.1 Surround",
            ChannelConfig::Surround61 => "6.1 Surround",
            ChannelConfig::Surround71 => "7.1 Surround",
        };
        f.write_str(name)
    }
}

/// Per-sample encoding of decoded PCM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleType {
    /// Unsigned 8-bit, midpoint 0x80
    UInt8,
    /// Signed 16-bit, native endian
    Int16,
    /// 32-bit IEEE float
    Float32,
}

impl SampleType {
    /// Bytes occupied by one sample of one channel
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleType::UInt8 => 1,
            SampleType::Int16 => 2,
            SampleType::Float32 => 4,
        }
    }
}

impl fmt::Display for SampleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SampleType::UInt8 => "U8",
            SampleType::Int16 => "S16",
            SampleType::Float32 => "Float32",
        };
        f.write_str(name)
    }
}

/// Convert a frame count to a byte count for the given layout and encoding
pub fn frames_to_bytes(frames: usize, channels: ChannelConfig, sample_type: SampleType) -> usize {
    frames * channels.channel_count() * sample_type.bytes_per_sample()
}

/// Convert a byte count to whole frames (trailing partial frame is dropped)
pub fn bytes_to_frames(bytes: usize, channels: ChannelConfig, sample_type: SampleType) -> usize {
    bytes / (channels.channel_count() * sample_type.bytes_per_sample())
}
