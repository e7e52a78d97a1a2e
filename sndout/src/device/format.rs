//! Device PCM formats and format negotiation

use super::{Device, DeviceExtension};
use crate::error::{Error, Result};
use sndout_common::{ChannelConfig, SampleType};

/// PCM layouts a device can accept for buffer uploads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PcmFormat {
    Mono8,
    Mono16,
    Stereo8,
    Stereo16,
    Quad8,
    Quad16,
    Surround51x8,
    Surround51x16,
    Surround71x8,
    Surround71x16,
    MonoFloat32,
    StereoFloat32,
    QuadFloat32,
    Surround51Float32,
    Surround71Float32,
}

impl PcmFormat {
    pub fn channels(self) -> ChannelConfig {
        use PcmFormat::*;
        match self {
            Mono8 | Mono16 | MonoFloat32 => ChannelConfig::Mono,
            Stereo8 | Stereo16 | StereoFloat32 => ChannelConfig::Stereo,
            Quad8 | Quad16 | QuadFloat32 => ChannelConfig::Quad,
            Surround51x8 | Surround51x16 | Surround51Float32 => ChannelConfig::Surround51,
            Surround71x8 | Surround71x16 | Surround71Float32 => ChannelConfig::Surround71,
        }
    }

    pub fn sample_type(self) -> SampleType {
        use PcmFormat::*;
        match self {
            Mono8 | Stereo8 | Quad8 | Surround51x8 | Surround71x8 => SampleType::UInt8,
            Mono16 | Stereo16 | Quad16 | Surround51x16 | Surround71x16 => SampleType::Int16,
            MonoFloat32 | StereoFloat32 | QuadFloat32 | Surround51Float32 | Surround71Float32 => {
                SampleType::Float32
            }
        }
    }

    /// Bytes per sample frame
    pub fn frame_size(self) -> usize {
        sndout_common::format::frames_to_bytes(1, self.channels(), self.sample_type())
    }
}

const BASE_FORMATS: &[PcmFormat] = &[
    PcmFormat::Mono16,
    PcmFormat::Mono8,
    PcmFormat::Stereo16,
    PcmFormat::Stereo8,
];

const MULTICHANNEL_FORMATS: &[PcmFormat] = &[
    PcmFormat::Quad16,
    PcmFormat::Quad8,
    PcmFormat::Surround51x16,
    PcmFormat::Surround51x8,
    PcmFormat::Surround71x16,
    PcmFormat::Surround71x8,
];

const FLOAT_FORMATS: &[PcmFormat] = &[PcmFormat::MonoFloat32, PcmFormat::StereoFloat32];

const FLOAT_MULTICHANNEL_FORMATS: &[PcmFormat] = &[
    PcmFormat::QuadFloat32,
    PcmFormat::Surround51Float32,
    PcmFormat::Surround71Float32,
];

fn find(table: &[PcmFormat], channels: ChannelConfig, sample_type: SampleType) -> Option<PcmFormat> {
    table
        .iter()
        .copied()
        .find(|f| f.channels() == channels && f.sample_type() == sample_type)
}

/// Pick the device format matching a decoder's output.
///
/// Mono and stereo 8/16-bit are always available. Multichannel and float
/// layouts are only offered when the device advertises the extension.
pub fn negotiate_format(
    device: &dyn Device,
    channels: ChannelConfig,
    sample_type: SampleType,
) -> Result<PcmFormat> {
    if let Some(format) = find(BASE_FORMATS, channels, sample_type) {
        return Ok(format);
    }

    let multichannel = device.has_extension(DeviceExtension::MultiChannelFormats);
    let float = device.has_extension(DeviceExtension::Float32Formats);

    if multichannel {
        if let Some(format) = find(MULTICHANNEL_FORMATS, channels, sample_type) {
            return Ok(format);
        }
    }
    if float {
        if let Some(format) = find(FLOAT_FORMATS, channels, sample_type) {
            return Ok(format);
        }
        if multichannel {
            if let Some(format) = find(FLOAT_MULTICHANNEL_FORMATS, channels, sample_type) {
                return Ok(format);
            }
        }
    }

    Err(Error::UnsupportedFormat(format!(
        "Unsupported sound format ({}, {})",
        channels, sample_type
    )))
}
