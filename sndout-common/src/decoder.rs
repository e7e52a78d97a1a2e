//! Decoder contract
//!
//! Decoders are pull-based PCM producers owned by whoever plays them. The
//! engine never knows the codec behind a decoder; it only asks for the
//! format, pulls bytes, and reads back the absolute sample position.

use crate::error::Result;
use crate::format::{ChannelConfig, SampleType};

/// Format of the PCM a decoder produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderInfo {
    pub sample_rate: u32,
    pub channels: ChannelConfig,
    pub sample_type: SampleType,
}

/// Pull-based PCM producer
pub trait Decoder: Send {
    /// Output format of this decoder
    fn info(&mut self) -> Result<DecoderInfo>;

    /// Fill `buf` with PCM bytes and return how many were written.
    ///
    /// Returns fewer than `buf.len()` bytes only at end of stream.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Append every remaining PCM byte to `out`.
    ///
    /// On error, bytes decoded before the failure remain in `out`.
    fn read_all(&mut self, out: &mut Vec<u8>) -> Result<()>;

    /// Absolute position of the next sample frame to be read
    fn sample_offset(&self) -> u64;

    /// Release decoder resources. Further reads are undefined.
    fn close(&mut self);

    /// Human readable name for diagnostics
    fn name(&self) -> &str;
}

/// Opens decoders for named sound resources
pub trait DecoderProvider: Send + Sync {
    /// Whether a resource with this name exists
    fn exists(&self, name: &str) -> bool;

    /// Open a decoder positioned at the start of the named resource
    fn open(&self, name: &str) -> Result<Box<dyn Decoder>>;
}
