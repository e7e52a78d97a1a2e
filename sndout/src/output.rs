//! Output engine
//!
//! [`Output`] is the caller-facing engine. It owns the opened device, the
//! voice pool, the registry of active sounds and streams, and the stream
//! scheduler. There is no global state; everything lives and dies with the
//! `Output` instance between [`Output::init`] and [`Output::deinit`].
//!
//! **Threading:** `Output` is driven from one caller thread. Only streaming
//! feeders and loudness jobs are touched by the scheduler's worker.

use crate::device::{negotiate_format, BufferId, Device, DeviceBackend, VoiceId};
use crate::error::{Error, Result};
use crate::registry::{
    ActiveHandle, ActiveRegistry, Environment, ListenerState, PlayFlags, PlayParams, PlayType,
    Playable, SoundId, StreamId,
};
use crate::stream::{lock_feeder, LoudnessJob, StreamFeeder, StreamScheduler};
use crate::voice_pool::VoicePool;
use glam::Vec3;
use sndout_common::config::OutputConfig;
use sndout_common::{Decoder, DecoderProvider, LoudnessAnalyzer};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Fully decoded sound held in a device buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SoundData(BufferId);

impl SoundData {
    pub fn buffer(&self) -> BufferId {
        self.0
    }
}

/// Name tried when a sound resource is missing: same path, `.mp3` extension
fn fallback_name(name: &str) -> Option<String> {
    let path = Path::new(name);
    path.extension()?;
    Some(path.with_extension("mp3").to_string_lossy().into_owned())
}

/// Audio output engine
pub struct Output {
    backend: Arc<dyn DeviceBackend>,
    provider: Arc<dyn DecoderProvider>,
    config: OutputConfig,

    /// Opened device; `None` until initialized
    device: Option<Arc<dyn Device>>,
    voices: VoicePool,
    registry: ActiveRegistry,
    scheduler: StreamScheduler,
    listener: ListenerState,
}

impl Output {
    /// Create an uninitialized engine and start the stream scheduler
    pub fn new(
        backend: Arc<dyn DeviceBackend>,
        provider: Arc<dyn DecoderProvider>,
        config: OutputConfig,
    ) -> Result<Self> {
        config.streaming.validate()?;
        let scheduler = StreamScheduler::spawn(&config.streaming).map_err(|e| {
            Error::InitializationFailed(format!("Failed to start stream scheduler: {}", e))
        })?;
        Ok(Self::with_scheduler(backend, provider, config, scheduler))
    }

    /// Create an engine around an existing scheduler.
    ///
    /// Pair with [`StreamScheduler::manual`] to drive streaming from the
    /// host's own loop.
    pub fn with_scheduler(
        backend: Arc<dyn DeviceBackend>,
        provider: Arc<dyn DecoderProvider>,
        config: OutputConfig,
        scheduler: StreamScheduler,
    ) -> Self {
        Self {
            backend,
            provider,
            config,
            device: None,
            voices: VoicePool::default(),
            registry: ActiveRegistry::new(),
            scheduler,
            listener: ListenerState::default(),
        }
    }

    /// Names of the devices the backend can open
    pub fn enumerate(&self) -> Vec<String> {
        self.backend.enumerate()
    }

    /// Open `devname` (empty for the default device) and allocate voices.
    ///
    /// Any previous initialization is torn down first.
    pub fn init(&mut self, devname: &str) -> Result<()> {
        self.deinit();

        let device = self.backend.open(devname).map_err(|e| {
            if devname.is_empty() {
                Error::InitializationFailed(format!("Failed to open default device: {}", e))
            } else {
                Error::InitializationFailed(format!("Failed to open \"{}\": {}", devname, e))
            }
        })?;
        info!("Opened \"{}\"", device.name());

        self.voices = VoicePool::allocate(device.as_ref(), self.config.streaming.max_voices)?;
        self.device = Some(device);
        Ok(())
    }

    /// Open the device named in the configuration
    pub fn init_from_config(&mut self) -> Result<()> {
        let devname = self.config.device.clone();
        self.init(&devname)
    }

    /// Stop everything, free all voices and close the device.
    ///
    /// Pending loudness jobs are dropped without running.
    pub fn deinit(&mut self) {
        self.scheduler.clear();

        let Some(device) = self.device.take() else {
            return;
        };

        for handle in self.registry.drain() {
            let voice = handle.voice();
            if let Err(e) = device.stop(voice).and_then(|_| device.bind_buffer(voice, None)) {
                debug!("Failed to detach {}: {}", voice, e);
            }
            self.voices.release(voice);
            // Stream feeders are dropped here, deleting their buffers
        }

        self.voices.destroy(device.as_ref());
        self.voices = VoicePool::default();
        info!("Closed \"{}\"", device.name());
    }

    pub fn is_initialized(&self) -> bool {
        self.device.is_some()
    }

    fn device(&self) -> Result<Arc<dyn Device>> {
        self.device.as_ref().map(Arc::clone).ok_or(Error::NotInitialized)
    }

    pub fn config(&self) -> &OutputConfig {
        &self.config
    }

    pub fn listener(&self) -> &ListenerState {
        &self.listener
    }

    pub fn scheduler(&self) -> &StreamScheduler {
        &self.scheduler
    }

    /// Voice capacity, free voices
    pub fn voice_usage(&self) -> (usize, usize) {
        (self.voices.capacity(), self.voices.available())
    }

    /// Live one-shot sounds and streams
    pub fn active_counts(&self) -> (usize, usize) {
        (self.registry.sound_count(), self.registry.stream_count())
    }

    /// Voice a live sound is playing on
    pub fn sound_voice(&self, id: SoundId) -> Option<VoiceId> {
        self.registry.sound(id).map(ActiveHandle::voice)
    }

    /// Voice a live stream is playing on
    pub fn stream_voice(&self, id: StreamId) -> Option<VoiceId> {
        self.registry.stream(id).map(ActiveHandle::voice)
    }

    /// Decode a named sound completely into a device buffer.
    ///
    /// If `name` does not exist, the same name with an `.mp3` extension is
    /// tried instead.
    pub fn load_sound(&self, name: &str) -> Result<SoundData> {
        let device = self.device()?;

        let mut decoder = match fallback_name(name) {
            Some(alt) if !self.provider.exists(name) => {
                debug!("\"{}\" not found, trying \"{}\"", name, alt);
                self.provider.open(&alt)?
            }
            _ => self.provider.open(name)?,
        };

        let info = decoder.info()?;
        let format = negotiate_format(device.as_ref(), info.channels, info.sample_type)?;

        let mut data = Vec::new();
        let read = decoder.read_all(&mut data);
        decoder.close();
        read?;

        let buffer = device
            .gen_buffers(1)?
            .pop()
            .ok_or_else(|| Error::Device("No buffer generated".to_string()))?;
        if let Err(e) = device.buffer_data(buffer, format, &data, info.sample_rate) {
            if let Err(del) = device.delete_buffers(&[buffer]) {
                debug!("Failed to delete {}: {}", buffer, del);
            }
            return Err(e);
        }

        debug!("Loaded \"{}\" ({} bytes, {:?})", name, data.len(), format);
        Ok(SoundData(buffer))
    }

    /// Free a loaded sound, first detaching it from any voice still using it
    pub fn unload_sound(&mut self, data: SoundData) -> Result<()> {
        let device = self.device()?;
        for voice in self.registry.sound_voices() {
            if device.bound_buffer(voice)? == Some(data.0) {
                device.stop(voice)?;
                device.bind_buffer(voice, None)?;
            }
        }
        device.delete_buffers(&[data.0])
    }

    /// Size in bytes of a loaded sound's PCM
    pub fn sound_data_size(&self, data: SoundData) -> Result<usize> {
        self.device()?.buffer_size(data.0)
    }

    /// Start a one-shot sound `offset` seconds in
    pub fn play_sound(&mut self, data: SoundData, params: PlayParams, offset: f32) -> Result<SoundId> {
        let device = self.device()?;
        let voice = self.voices.acquire()?;

        let looping = params.flags.contains(PlayFlags::LOOP);
        let voice_params = params.voice_params(&self.listener, looping);
        let started = device
            .set_voice_params(voice, &voice_params)
            .and_then(|_| device.bind_buffer(voice, Some(data.0)))
            .and_then(|_| device.set_sec_offset(voice, offset / voice_params.pitch))
            .and_then(|_| device.play(&[voice]));

        if let Err(e) = started {
            if let Err(unbind) = device.stop(voice).and_then(|_| device.bind_buffer(voice, None)) {
                debug!("Failed to reset {}: {}", voice, unbind);
            }
            self.voices.release(voice);
            return Err(e);
        }

        Ok(self.registry.insert_sound(voice, params))
    }

    /// Stop a sound and return its voice. Unknown ids are ignored.
    pub fn stop_sound(&mut self, id: SoundId) -> Result<()> {
        let Some(handle) = self.registry.remove_sound(id) else {
            return Ok(());
        };
        self.retire(handle)
    }

    /// Stop and detach a removed handle's voice, then return it to the pool
    fn retire(&mut self, handle: ActiveHandle) -> Result<()> {
        let voice = handle.voice();
        if let Playable::Stream { feeder, .. } = &handle.playable {
            self.scheduler.unregister(feeder);
        }

        let stopped = self
            .device()
            .and_then(|device| device.stop(voice).and_then(|_| device.bind_buffer(voice, None)));
        self.voices.release(voice);
        drop(handle);
        stopped
    }

    pub fn is_sound_playing(&self, id: SoundId) -> Result<bool> {
        match self.registry.sound(id) {
            Some(handle) => Ok(self.device()?.voice_state(handle.voice())?.is_active()),
            None => Ok(false),
        }
    }

    /// Parameters a live sound is currently using
    pub fn sound_params(&self, id: SoundId) -> Option<PlayParams> {
        self.registry.sound(id).map(|h| h.params)
    }

    /// Modify a live sound's parameters and reapply them to its voice
    pub fn update_sound<F>(&mut self, id: SoundId, update: F) -> Result<()>
    where
        F: FnOnce(&mut PlayParams),
    {
        let device = self.device()?;
        let listener = self.listener;
        if let Some(handle) = self.registry.sound_mut(id) {
            update(&mut handle.params);
            device.set_voice_params(handle.voice(), &handle.voice_params(&listener))?;
        }
        Ok(())
    }

    /// Start streaming a decoder. The loop flag is not supported for streams.
    pub fn stream_sound(&mut self, decoder: Box<dyn Decoder>, params: PlayParams) -> Result<StreamId> {
        let device = self.device()?;
        if params.flags.contains(PlayFlags::LOOP) {
            warn!("Cannot loop stream \"{}\"", decoder.name());
        }

        let voice = self.voices.acquire()?;
        // A feeder dropped on failure deletes its ring and closes the decoder
        let feeder = StreamFeeder::new(Arc::clone(&device), voice, decoder, &self.config.streaming)
            .and_then(|feeder| {
                device.set_voice_params(voice, &params.voice_params(&self.listener, false))?;
                Ok(feeder)
            });

        let feeder = match feeder {
            Ok(feeder) => Arc::new(Mutex::new(feeder)),
            Err(e) => {
                self.voices.release(voice);
                return Err(e);
            }
        };

        self.scheduler.register(Arc::clone(&feeder));
        Ok(self.registry.insert_stream(voice, feeder, params))
    }

    /// Stop a stream, release its voice and drop its feeder. Unknown ids are ignored.
    pub fn stop_stream(&mut self, id: StreamId) -> Result<()> {
        let Some(handle) = self.registry.remove_stream(id) else {
            return Ok(());
        };
        self.retire(handle)
    }

    fn with_feeder<T, F>(&self, id: StreamId, idle: T, query: F) -> Result<T>
    where
        F: FnOnce(&StreamFeeder) -> Result<T>,
    {
        match self.registry.stream(id).map(|h| &h.playable) {
            Some(Playable::Stream { feeder, .. }) => query(&*lock_feeder(feeder)),
            _ => Ok(idle),
        }
    }

    /// Seconds of audio queued ahead of the play cursor
    pub fn stream_delay(&self, id: StreamId) -> Result<f64> {
        self.with_feeder(id, 0.0, StreamFeeder::stream_delay)
    }

    /// Playback position of a stream in seconds
    pub fn stream_offset(&self, id: StreamId) -> Result<f64> {
        self.with_feeder(id, 0.0, StreamFeeder::stream_offset)
    }

    pub fn is_stream_playing(&self, id: StreamId) -> Result<bool> {
        self.with_feeder(id, false, StreamFeeder::is_playing)
    }

    /// Parameters a live stream is currently using
    pub fn stream_params(&self, id: StreamId) -> Option<PlayParams> {
        self.registry.stream(id).map(|h| h.params)
    }

    /// Modify a live stream's parameters and reapply them to its voice
    pub fn update_stream<F>(&mut self, id: StreamId, update: F) -> Result<()>
    where
        F: FnOnce(&mut PlayParams),
    {
        let device = self.device()?;
        let listener = self.listener;
        if let Some(handle) = self.registry.stream_mut(id) {
            update(&mut handle.params);
            device.set_voice_params(handle.voice(), &handle.voice_params(&listener))?;
        }
        Ok(())
    }

    /// Defer device parameter changes until [`Output::finish_update`]
    pub fn start_update(&self) {
        if let Some(device) = &self.device {
            device.suspend();
        }
    }

    /// Apply parameter changes made since [`Output::start_update`]
    pub fn finish_update(&self) {
        if let Some(device) = &self.device {
            device.process();
        }
    }

    /// Move the listener. Affects gain and pitch of sounds started or updated afterwards.
    pub fn update_listener(&mut self, position: Vec3, at: Vec3, up: Vec3, environment: Environment) -> Result<()> {
        if let Some(device) = &self.device {
            device.set_listener(position, at, up)?;
        }
        self.listener = ListenerState {
            position,
            environment,
        };
        Ok(())
    }

    /// Pause every sound and stream whose type intersects `types`
    pub fn pause_sounds(&self, types: PlayType) -> Result<()> {
        let voices = self.registry.voices_matching(types);
        if voices.is_empty() {
            return Ok(());
        }
        self.device()?.pause(&voices)
    }

    /// Resume every sound and stream whose type intersects `types`
    pub fn resume_sounds(&self, types: PlayType) -> Result<()> {
        let voices = self.registry.voices_matching(types);
        if voices.is_empty() {
            return Ok(());
        }
        self.device()?.play(&voices)
    }

    /// Queue a full-decode loudness analysis on the scheduler
    pub fn load_loudness_async(&self, decoder: Box<dyn Decoder>, analyzer: Arc<dyn LoudnessAnalyzer>) {
        debug!("Queueing loudness analysis of \"{}\"", decoder.name());
        self.scheduler.enqueue_job(LoudnessJob::new(decoder, analyzer));
    }
}

impl Drop for Output {
    fn drop(&mut self) {
        self.deinit();
        self.scheduler.shutdown();
    }
}
