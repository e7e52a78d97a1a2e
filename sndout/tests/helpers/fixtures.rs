//! Devices and outputs wired for tests

use super::MapProvider;
use sndout::device::SoftwareBackend;
use sndout::device::SoftwareDevice;
use sndout::stream::StreamScheduler;
use sndout::Output;
use sndout_common::config::OutputConfig;
use sndout_common::{ChannelConfig, DecoderInfo, SampleType};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const SAMPLE_RATE: u32 = 48000;

/// Bytes per streaming buffer for 48 kHz 16-bit stereo at default settings
pub const STEREO16_BUFFER: usize = 6000 * 4;

pub fn stereo16_info() -> DecoderInfo {
    DecoderInfo {
        sample_rate: SAMPLE_RATE,
        channels: ChannelConfig::Stereo,
        sample_type: SampleType::Int16,
    }
}

/// Initialized output on `device` whose scheduler is driven by `run_pass`
pub fn manual_output(device: &Arc<SoftwareDevice>, provider: MapProvider) -> Output {
    let config = OutputConfig::default();
    let scheduler = StreamScheduler::manual(&config.streaming);
    let backend = Arc::new(SoftwareBackend::single(Arc::clone(device)));
    let mut output = Output::with_scheduler(backend, Arc::new(provider), config, scheduler);
    output.init("").unwrap();
    output
}

/// Poll `condition` until it holds or `timeout` passes
pub fn wait_until<F: FnMut() -> bool>(timeout: Duration, mut condition: F) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}
