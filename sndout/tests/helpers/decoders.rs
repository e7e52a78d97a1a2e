//! Scripted decoders
//!
//! Produce a fixed number of bytes filled with a constant value, and can be
//! told to fail at specific points.

use sndout_common::format::{frames_to_bytes, ChannelConfig, SampleType};
use sndout_common::{Decoder, DecoderInfo, DecoderProvider, Error, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Observes a decoder after ownership moved into the engine
#[derive(Clone, Default)]
pub struct DecoderProbe {
    closed: Arc<AtomicBool>,
    reads: Arc<AtomicUsize>,
    nonempty_reads: Arc<AtomicUsize>,
}

impl DecoderProbe {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Calls to `read`, including ones that failed or returned 0
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Calls to `read` that produced at least one byte
    pub fn nonempty_reads(&self) -> usize {
        self.nonempty_reads.load(Ordering::SeqCst)
    }
}

/// In-memory decoder producing `total` bytes of `fill`
pub struct ScriptedDecoder {
    name: String,
    info: DecoderInfo,
    total: usize,
    position: usize,
    fill: u8,
    fail_info: bool,
    fail_read_after: Option<usize>,
    fail_read_all: bool,
    probe: DecoderProbe,
}

impl ScriptedDecoder {
    pub fn new(name: &str, info: DecoderInfo, total: usize) -> Self {
        Self {
            name: name.to_string(),
            info,
            total,
            position: 0,
            fill: 0x55,
            fail_info: false,
            fail_read_after: None,
            fail_read_all: false,
            probe: DecoderProbe::default(),
        }
    }

    /// 48 kHz 16-bit stereo
    pub fn stereo16(name: &str, total: usize) -> Self {
        Self::new(name, super::stereo16_info(), total)
    }

    pub fn with_fill(mut self, fill: u8) -> Self {
        self.fill = fill;
        self
    }

    /// `info` returns an error
    pub fn failing_info(mut self) -> Self {
        self.fail_info = true;
        self
    }

    /// `read` succeeds `reads` times, then errors
    pub fn failing_read_after(mut self, reads: usize) -> Self {
        self.fail_read_after = Some(reads);
        self
    }

    /// `read_all` appends half the remaining bytes, then errors
    pub fn failing_read_all(mut self) -> Self {
        self.fail_read_all = true;
        self
    }

    pub fn probe(&self) -> DecoderProbe {
        self.probe.clone()
    }

    pub fn boxed(self) -> Box<dyn Decoder> {
        Box::new(self)
    }

    fn frame_size(&self) -> usize {
        frames_to_bytes(1, self.info.channels, self.info.sample_type)
    }
}

impl Decoder for ScriptedDecoder {
    fn info(&mut self) -> Result<DecoderInfo> {
        if self.fail_info {
            return Err(Error::Decode(format!("{}: corrupt header", self.name)));
        }
        Ok(self.info)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let attempt = self.probe.reads.fetch_add(1, Ordering::SeqCst);
        if let Some(limit) = self.fail_read_after {
            if attempt >= limit {
                return Err(Error::Decode(format!("{}: corrupt frame", self.name)));
            }
        }

        let n = buf.len().min(self.total - self.position);
        buf[..n].fill(self.fill);
        self.position += n;
        if n > 0 {
            self.probe.nonempty_reads.fetch_add(1, Ordering::SeqCst);
        }
        Ok(n)
    }

    fn read_all(&mut self, out: &mut Vec<u8>) -> Result<()> {
        let remaining = self.total - self.position;
        if self.fail_read_all {
            let half = remaining / 2;
            out.resize(out.len() + half, self.fill);
            self.position += half;
            return Err(Error::Decode(format!("{}: truncated", self.name)));
        }
        out.resize(out.len() + remaining, self.fill);
        self.position = self.total;
        Ok(())
    }

    fn sample_offset(&self) -> u64 {
        (self.position / self.frame_size()) as u64
    }

    fn close(&mut self) {
        self.probe.closed.store(true, Ordering::SeqCst);
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Sound resources addressed by name
#[derive(Default)]
pub struct MapProvider {
    sounds: HashMap<String, (DecoderInfo, usize)>,
}

impl MapProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sound(mut self, name: &str, info: DecoderInfo, bytes: usize) -> Self {
        self.sounds.insert(name.to_string(), (info, bytes));
        self
    }

    /// One second of 48 kHz 16-bit mono
    pub fn with_mono_second(self, name: &str) -> Self {
        let info = DecoderInfo {
            sample_rate: super::SAMPLE_RATE,
            channels: ChannelConfig::Mono,
            sample_type: SampleType::Int16,
        };
        self.with_sound(name, info, super::SAMPLE_RATE as usize * 2)
    }
}

impl DecoderProvider for MapProvider {
    fn exists(&self, name: &str) -> bool {
        self.sounds.contains_key(name)
    }

    fn open(&self, name: &str) -> Result<Box<dyn Decoder>> {
        match self.sounds.get(name) {
            Some((info, bytes)) => Ok(ScriptedDecoder::new(name, *info, *bytes).boxed()),
            None => Err(Error::Decode(format!("{}: not found", name))),
        }
    }
}
