//! Streaming feeder behaviour against the software device

mod helpers;

use helpers::{ScriptedDecoder, SAMPLE_RATE, STEREO16_BUFFER};
use sndout::device::{Device, DeviceExtension, DeviceOp, SoftwareDevice, VoiceId, VoiceState};
use sndout::stream::StreamFeeder;
use sndout::Error;
use sndout_common::config::StreamingConfig;
use sndout_common::{ChannelConfig, DecoderInfo, SampleType};
use std::sync::Arc;

fn setup() -> (Arc<SoftwareDevice>, VoiceId) {
    let device = Arc::new(SoftwareDevice::new("sw"));
    let voice = device.gen_voice().unwrap();
    (device, voice)
}

fn feeder(device: &Arc<SoftwareDevice>, voice: VoiceId, decoder: ScriptedDecoder) -> StreamFeeder {
    StreamFeeder::new(
        Arc::clone(device) as Arc<dyn Device>,
        voice,
        decoder.boxed(),
        &StreamingConfig::default(),
    )
    .unwrap()
}

#[test]
fn test_buffer_size_is_whole_frames() {
    let (device, voice) = setup();
    let feeder = feeder(&device, voice, ScriptedDecoder::stereo16("a", 0));
    assert_eq!(feeder.buffer_size(), STEREO16_BUFFER);
    assert_eq!(feeder.ring_len(), 6);
    assert_eq!(device.buffer_count(), 6);

    let odd = DecoderInfo {
        sample_rate: 22050,
        channels: ChannelConfig::Mono,
        sample_type: SampleType::Int16,
    };
    let (device, voice) = setup();
    let feeder = self::feeder(&device, voice, ScriptedDecoder::new("b", odd, 0));
    // 0.125 * 22050 = 2756.25 frames, rounded
    assert_eq!(feeder.buffer_size(), 2756 * 2);
}

#[test]
fn test_ten_buffer_stream_fills_ring_then_tops_up() {
    let (device, voice) = setup();
    let decoder = ScriptedDecoder::stereo16("ten", 10 * STEREO16_BUFFER);
    let probe = decoder.probe();
    let mut feeder = feeder(&device, voice, decoder);

    // First pass fills the ring and starts playback
    assert!(feeder.advance());
    assert_eq!(device.buffers_queued(voice).unwrap(), 6);
    assert_eq!(device.voice_state(voice).unwrap(), VoiceState::Playing);
    assert_eq!(probe.reads(), 6);

    // Four buffers drain; the next pass replaces them
    device.finish_buffers(voice, 4).unwrap();
    assert!(feeder.advance());
    assert_eq!(device.buffers_queued(voice).unwrap(), 6);
    assert_eq!(probe.nonempty_reads(), 10);
    // Every read so far was full length, so end of stream is not known yet
    assert!(!feeder.is_finished());

    // The next free slot sees the empty read and ends decoding
    device.finish_buffers(voice, 1).unwrap();
    assert!(feeder.advance());
    assert!(feeder.is_finished());
    assert_eq!(device.buffers_queued(voice).unwrap(), 5);
    assert_eq!(probe.nonempty_reads(), 10);

    // Retired only once the voice has drained
    device.finish_buffers(voice, 5).unwrap();
    assert!(!feeder.advance());
    assert_eq!(probe.reads(), 11);
}

#[test]
fn test_enqueued_buffers_match_stream_length() {
    let (device, voice) = setup();
    let total = 7 * STEREO16_BUFFER + 4000;
    let decoder = ScriptedDecoder::stereo16("seven-and-a-bit", total);
    let probe = decoder.probe();
    let mut feeder = feeder(&device, voice, decoder);

    let mut passes = 0;
    while feeder.advance() {
        device.finish_buffers(voice, 1).unwrap();
        passes += 1;
        assert!(passes < 100, "feeder never retired");
    }

    assert!(feeder.is_finished());
    assert_eq!(probe.nonempty_reads(), (total + STEREO16_BUFFER - 1) / STEREO16_BUFFER);
}

#[test]
fn test_final_short_buffer_is_padded_with_silence() {
    let (device, voice) = setup();
    let total = 2 * STEREO16_BUFFER + 100;
    let mut feeder = feeder(&device, voice, ScriptedDecoder::stereo16("short", total).with_fill(0x55));

    assert_eq!(feeder.refill().unwrap(), 3);
    assert!(feeder.is_finished());

    let queued = device.queued_buffers(voice);
    let tail = device.buffer_contents(queued[2]).unwrap();
    assert_eq!(tail.len(), STEREO16_BUFFER);
    assert!(tail[..100].iter().all(|b| *b == 0x55));
    assert!(tail[100..].iter().all(|b| *b == 0));
}

#[test]
fn test_unsigned_8bit_tail_is_zero_filled() {
    let (device, voice) = setup();
    let info = DecoderInfo {
        sample_rate: SAMPLE_RATE,
        channels: ChannelConfig::Mono,
        sample_type: SampleType::UInt8,
    };
    let mut feeder = feeder(&device, voice, ScriptedDecoder::new("u8", info, 10).with_fill(0x80));

    assert_eq!(feeder.refill().unwrap(), 1);
    let data = device.buffer_contents(device.queued_buffers(voice)[0]).unwrap();
    assert!(data[..10].iter().all(|b| *b == 0x80));
    assert!(data[10..].iter().all(|b| *b == 0));
}

#[test]
fn test_exact_multiple_has_no_padding_buffer() {
    let (device, voice) = setup();
    let mut feeder = feeder(&device, voice, ScriptedDecoder::stereo16("two", 2 * STEREO16_BUFFER));

    // Two full reads and one empty read; nothing extra is queued
    assert_eq!(feeder.refill().unwrap(), 2);
    assert!(feeder.is_finished());
}

#[test]
fn test_stream_delay_tracks_play_cursor() {
    let (device, voice) = setup();
    let mut feeder = feeder(&device, voice, ScriptedDecoder::stereo16("d", 20 * STEREO16_BUFFER));
    assert_eq!(feeder.stream_delay().unwrap(), 0.0);

    feeder.advance();
    assert!((feeder.stream_delay().unwrap() - 0.75).abs() < 1e-9);

    device.render(voice, 6000).unwrap();
    assert!((feeder.stream_delay().unwrap() - 0.625).abs() < 1e-9);

    device.pause(&[voice]).unwrap();
    assert!((feeder.stream_delay().unwrap() - 0.625).abs() < 1e-9);
}

#[test]
fn test_stream_offset_never_decreases() {
    let (device, voice) = setup();
    let mut feeder = feeder(&device, voice, ScriptedDecoder::stereo16("o", 20 * STEREO16_BUFFER));

    // Before playback the offset is the decoder position
    assert_eq!(feeder.stream_offset().unwrap(), 0.0);

    let mut last = 0.0;
    let mut passes = 0;
    while feeder.advance() {
        let offset = feeder.stream_offset().unwrap();
        assert!(offset >= last, "offset went from {} to {}", last, offset);
        last = offset;
        device.render(voice, 1500).unwrap();
        passes += 1;
        assert!(passes < 1000, "feeder never retired");
    }

    assert!(feeder.stream_offset().unwrap() >= last);
    assert!((feeder.stream_offset().unwrap() - 2.5).abs() < 1e-9);
}

#[test]
fn test_unsupported_format_releases_ring() {
    let device = Arc::new(SoftwareDevice::new("plain").with_extensions(&[]));
    let voice = device.gen_voice().unwrap();
    let info = DecoderInfo {
        sample_rate: SAMPLE_RATE,
        channels: ChannelConfig::Surround51,
        sample_type: SampleType::Int16,
    };
    let decoder = ScriptedDecoder::new("surround", info, 1000);
    let probe = decoder.probe();

    let result = StreamFeeder::new(
        Arc::clone(&device) as Arc<dyn Device>,
        voice,
        decoder.boxed(),
        &StreamingConfig::default(),
    );
    assert!(matches!(result, Err(Error::UnsupportedFormat(_))));
    assert_eq!(device.buffer_count(), 0);
    assert!(probe.is_closed());
}

#[test]
fn test_oversized_buffer_duration_is_rejected() {
    let (device, voice) = setup();
    for duration in [1.0e30_f32, 1.0e6] {
        let decoder = ScriptedDecoder::stereo16("huge", 1000);
        let probe = decoder.probe();
        let config = StreamingConfig {
            buffer_duration_secs: duration,
            ..StreamingConfig::default()
        };

        let result = StreamFeeder::new(Arc::clone(&device) as Arc<dyn Device>, voice, decoder.boxed(), &config);
        assert!(matches!(result, Err(Error::Common(sndout_common::Error::InvalidInput(_)))));
        assert_eq!(device.buffer_count(), 0);
        assert!(probe.is_closed());
    }
}

#[test]
fn test_decoder_info_failure_propagates() {
    let (device, voice) = setup();
    let result = StreamFeeder::new(
        Arc::clone(&device) as Arc<dyn Device>,
        voice,
        ScriptedDecoder::stereo16("bad", 1000).failing_info().boxed(),
        &StreamingConfig::default(),
    );
    assert!(matches!(result, Err(Error::Common(sndout_common::Error::Decode(_)))));
    assert_eq!(device.buffer_count(), 0);
}

#[test]
fn test_ring_allocation_failure_propagates() {
    let (device, voice) = setup();
    device.fail_next(DeviceOp::GenBuffers);
    let result = StreamFeeder::new(
        Arc::clone(&device) as Arc<dyn Device>,
        voice,
        ScriptedDecoder::stereo16("x", 1000).boxed(),
        &StreamingConfig::default(),
    );
    assert!(matches!(result, Err(Error::Device(_))));
}

#[test]
fn test_decode_error_ends_stream_without_propagating() {
    let (device, voice) = setup();
    let decoder = ScriptedDecoder::stereo16("flaky", 20 * STEREO16_BUFFER).failing_read_after(6);
    let probe = decoder.probe();
    let mut feeder = feeder(&device, voice, decoder);

    assert!(feeder.advance());
    device.finish_buffers(voice, 1).unwrap();

    // Read fails: stream is finished but still drains what it queued
    assert!(feeder.advance());
    assert!(feeder.is_finished());
    assert_eq!(device.buffers_queued(voice).unwrap(), 5);

    let reads = probe.reads();
    device.finish_buffers(voice, 5).unwrap();
    assert!(!feeder.advance());
    assert_eq!(probe.reads(), reads);
}

#[test]
fn test_device_error_ends_stream() {
    let (device, voice) = setup();
    let mut feeder = feeder(&device, voice, ScriptedDecoder::stereo16("dev", 20 * STEREO16_BUFFER));

    device.fail_next(DeviceOp::QueueBuffers);
    // Nothing was queued and the voice never started
    assert!(!feeder.advance());
    assert!(feeder.is_finished());
}

#[test]
fn test_underrun_restarts_voice() {
    let (device, voice) = setup();
    let mut feeder = feeder(&device, voice, ScriptedDecoder::stereo16("u", 20 * STEREO16_BUFFER));

    feeder.advance();
    device.finish_buffers(voice, 6).unwrap();
    assert_eq!(device.voice_state(voice).unwrap(), VoiceState::Stopped);

    assert!(feeder.advance());
    assert_eq!(device.voice_state(voice).unwrap(), VoiceState::Playing);
    assert_eq!(device.buffers_queued(voice).unwrap(), 6);
    assert_eq!(device.buffers_processed(voice).unwrap(), 0);
}

#[test]
fn test_drop_releases_ring_and_closes_decoder() {
    let (device, voice) = setup();
    let decoder = ScriptedDecoder::stereo16("drop", 1000);
    let probe = decoder.probe();
    let feeder = feeder(&device, voice, decoder);
    assert_eq!(device.buffer_count(), 6);

    drop(feeder);
    assert_eq!(device.buffer_count(), 0);
    assert!(probe.is_closed());
}

#[test]
fn test_multichannel_stream_negotiates_extension_format() {
    let device = Arc::new(SoftwareDevice::new("mc").with_extensions(&[DeviceExtension::MultiChannelFormats]));
    let voice = device.gen_voice().unwrap();
    let info = DecoderInfo {
        sample_rate: SAMPLE_RATE,
        channels: ChannelConfig::Surround51,
        sample_type: SampleType::Int16,
    };
    let feeder = feeder(&device, voice, ScriptedDecoder::new("51", info, 1000));
    assert_eq!(feeder.buffer_size(), 6000 * 12);
}
