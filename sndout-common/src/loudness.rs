//! Loudness analysis contract

use crate::format::{ChannelConfig, SampleType};

/// Consumes fully decoded PCM and records a loudness-over-time profile.
///
/// Implementations keep their own results; the engine only drives the call.
pub trait LoudnessAnalyzer: Send + Sync {
    fn analyze_loudness(
        &self,
        pcm: &[u8],
        sample_rate: u32,
        channels: ChannelConfig,
        sample_type: SampleType,
        samples_per_sec: f32,
    );
}
