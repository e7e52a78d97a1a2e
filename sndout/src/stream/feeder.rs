//! Streaming feeder
//!
//! Keeps one voice's buffer queue topped up from a decoder. A feeder owns a
//! small ring of device buffers; each refill unqueues whatever the voice has
//! finished playing and decodes fresh audio into the freed slots.
//!
//! **Lifecycle:**
//! - Construction allocates the ring and negotiates the device format
//! - [`StreamFeeder::advance`] is called periodically by the scheduler
//! - Dropping the feeder deletes the ring and closes the decoder
//!
//! A feeder is never advanced concurrently; it lives behind a mutex shared
//! by the scheduler and the stream handle that owns it.

use crate::device::{negotiate_format, BufferId, Device, PcmFormat, VoiceId};
use crate::error::{Error, Result};
use sndout_common::config::StreamingConfig;
use sndout_common::{Decoder, DecoderInfo};
use std::sync::Arc;
use tracing::{debug, error};

/// Largest single streaming buffer, in bytes
pub const MAX_BUFFER_BYTES: usize = 64 * 1024 * 1024;

/// Buffer ring feeding one streaming voice
pub struct StreamFeeder {
    device: Arc<dyn Device>,
    voice: VoiceId,
    decoder: Box<dyn Decoder>,

    /// Ring of device buffers, filled in order
    buffers: Vec<BufferId>,
    /// Next ring slot to fill
    current: usize,

    format: PcmFormat,
    sample_rate: u32,
    /// Bytes decoded per buffer, always a whole number of frames
    buffer_size: usize,
    /// Byte used to pad the final short buffer
    silence: u8,

    /// Decoder reached end of stream or failed
    finished: bool,
}

impl StreamFeeder {
    /// Create a feeder for `voice`, taking ownership of `decoder`.
    ///
    /// Fails if the ring cannot be allocated, the decoder cannot report
    /// its format, or the device has no matching PCM format. The ring is
    /// deleted before returning an error.
    pub fn new(
        device: Arc<dyn Device>,
        voice: VoiceId,
        mut decoder: Box<dyn Decoder>,
        config: &StreamingConfig,
    ) -> Result<Self> {
        let buffers = device.gen_buffers(config.ring_buffers)?;

        let (info, format) = match Self::negotiate(device.as_ref(), decoder.as_mut()) {
            Ok(negotiated) => negotiated,
            Err(e) => {
                if let Err(del) = device.delete_buffers(&buffers) {
                    debug!("Failed to delete stream buffers: {}", del);
                }
                decoder.close();
                return Err(e);
            }
        };

        let buffer_size = match Self::buffer_bytes(config.buffer_duration_secs, info.sample_rate, format) {
            Ok(size) => size,
            Err(e) => {
                if let Err(del) = device.delete_buffers(&buffers) {
                    debug!("Failed to delete stream buffers: {}", del);
                }
                decoder.close();
                return Err(e);
            }
        };

        debug!(
            "Streaming \"{}\": {} Hz {:?}, {} x {} byte buffers",
            decoder.name(),
            info.sample_rate,
            format,
            buffers.len(),
            buffer_size
        );

        Ok(Self {
            device,
            voice,
            decoder,
            buffers,
            current: 0,
            format,
            sample_rate: info.sample_rate,
            buffer_size,
            silence: 0,
            finished: false,
        })
    }

    /// Whole-frame byte size of one buffer holding `duration` seconds
    fn buffer_bytes(duration: f32, sample_rate: u32, format: PcmFormat) -> Result<usize> {
        let frames = (duration as f64 * sample_rate as f64).round();
        let size = if frames.is_finite() && frames <= MAX_BUFFER_BYTES as f64 {
            (frames as usize).max(1).checked_mul(format.frame_size())
        } else {
            None
        };
        match size {
            Some(size) if size <= MAX_BUFFER_BYTES => Ok(size),
            _ => Err(Error::Common(sndout_common::Error::InvalidInput(format!(
                "{}s at {} Hz {:?} exceeds the {} byte buffer limit",
                duration, sample_rate, format, MAX_BUFFER_BYTES
            )))),
        }
    }

    fn negotiate(device: &dyn Device, decoder: &mut dyn Decoder) -> Result<(DecoderInfo, PcmFormat)> {
        let info = decoder.info()?;
        if info.sample_rate == 0 {
            return Err(Error::Common(sndout_common::Error::InvalidInput(format!(
                "\"{}\" reports a sample rate of 0",
                decoder.name()
            ))));
        }
        let format = negotiate_format(device, info.channels, info.sample_type)?;
        Ok((info, format))
    }

    /// Reclaim played buffers and decode into free ring slots.
    ///
    /// Stops filling at end of stream; the final short read is padded
    /// with silence to a full buffer. Returns how many buffers are queued
    /// on the voice afterwards.
    ///
    /// End of stream is only seen as a short read. A decoder whose length
    /// is an exact multiple of the buffer size is marked finished by one
    /// further read that returns nothing and enqueues nothing.
    pub fn refill(&mut self) -> Result<usize> {
        let processed = self.device.buffers_processed(self.voice)?;
        if processed > 0 {
            self.device.unqueue_buffers(self.voice, processed)?;
        }

        let mut queued = self.device.buffers_queued(self.voice)?;
        if self.finished || queued >= self.buffers.len() {
            return Ok(queued);
        }

        let mut data = vec![self.silence; self.buffer_size];
        while !self.finished && queued < self.buffers.len() {
            let got = self.decoder.read(&mut data)?.min(data.len());
            if got < data.len() {
                self.finished = true;
                data[got..].fill(self.silence);
            }
            if got > 0 {
                let buffer = self.buffers[self.current];
                self.device
                    .buffer_data(buffer, self.format, &data, self.sample_rate)?;
                self.device.queue_buffers(self.voice, &[buffer])?;
                self.current = (self.current + 1) % self.buffers.len();
                queued += 1;
            }
        }
        Ok(queued)
    }

    /// One scheduler step: refill, and restart the voice if it ran dry.
    ///
    /// Errors are logged and end the stream rather than propagating.
    /// Returns whether the feeder should stay registered.
    pub fn advance(&mut self) -> bool {
        if let Err(e) = self.pump() {
            error!("Error updating stream \"{}\": {}", self.decoder.name(), e);
            self.finished = true;
        }

        match self.is_playing() {
            Ok(alive) => alive,
            Err(e) => {
                error!("Error querying stream \"{}\": {}", self.decoder.name(), e);
                self.finished = true;
                false
            }
        }
    }

    fn pump(&mut self) -> Result<()> {
        if self.refill()? > 0 && !self.device.voice_state(self.voice)?.is_active() {
            // Voice underran: whatever it played is now processed
            self.refill()?;
            self.device.play(&[self.voice])?;
        }
        Ok(())
    }

    /// Voice still holds audio, or the decoder has more to give
    pub fn is_playing(&self) -> Result<bool> {
        Ok(self.device.voice_state(self.voice)?.is_active() || !self.finished)
    }

    /// Frames queued on the device and not yet played
    fn frames_pending(&self) -> Result<i64> {
        let queued = self.device.buffers_queued(self.voice)? as i64;
        let offset = self.device.sample_offset(self.voice)? as i64;
        let frames_per_buffer = (self.buffer_size / self.format.frame_size()) as i64;
        Ok(frames_per_buffer * queued - offset)
    }

    /// Seconds of queued audio ahead of the play cursor; 0 when the voice is idle
    pub fn stream_delay(&self) -> Result<f64> {
        if !self.device.voice_state(self.voice)?.is_active() {
            return Ok(0.0);
        }
        Ok(self.frames_pending()? as f64 / self.sample_rate as f64)
    }

    /// Playback position in seconds.
    ///
    /// While the voice is active this is the decoder position minus what is
    /// still queued. Otherwise it is the decoder position, where the next
    /// play resumes from.
    pub fn stream_offset(&self) -> Result<f64> {
        let decoded = self.decoder.sample_offset() as i64;
        let played = if self.device.voice_state(self.voice)?.is_active() {
            decoded - self.frames_pending()?
        } else {
            decoded
        };
        Ok(played as f64 / self.sample_rate as f64)
    }

    pub fn voice(&self) -> VoiceId {
        self.voice
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Bytes decoded per buffer
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn format(&self) -> PcmFormat {
        self.format
    }

    /// Buffers in the ring
    pub fn ring_len(&self) -> usize {
        self.buffers.len()
    }

    pub fn decoder_name(&self) -> &str {
        self.decoder.name()
    }
}

impl Drop for StreamFeeder {
    fn drop(&mut self) {
        if let Err(e) = self.device.delete_buffers(&self.buffers) {
            debug!(
                "Failed to delete buffers of stream \"{}\": {}",
                self.decoder.name(),
                e
            );
        }
        self.decoder.close();
    }
}
