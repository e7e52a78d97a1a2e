//! In-memory software device
//!
//! A [`Device`] that keeps voices, buffers and queues entirely in memory.
//! Nothing is mixed or sent to hardware; playback advances only when the
//! host calls [`SoftwareDevice::render`] (or [`SoftwareDevice::finish_buffers`]).
//! Used for headless operation and to exercise the engine deterministically.
//!
//! **Queue model:**
//! - Queued count includes played buffers until they are unqueued
//! - Sample offset is measured from the head of the queue
//! - Playing from Initial/Stopped rewinds to the head of the queue, or to
//!   the position last set with `set_sec_offset` while the voice was idle
//! - A voice stops on its own when it plays past the last queued buffer

use super::{
    BufferId, ChannelCapacity, Device, DeviceBackend, DeviceExtension, PcmFormat, VoiceId,
    VoiceParams, VoiceState,
};
use crate::error::{Error, Result};
use glam::Vec3;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Device operations that can be made to fail on demand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceOp {
    GenVoice,
    GenBuffers,
    BufferData,
    BindBuffer,
    QueueBuffers,
    UnqueueBuffers,
    Play,
    Pause,
    VoiceState,
    SampleOffset,
    SetVoiceParams,
    SetListener,
}

#[derive(Debug, Default)]
struct BufferSlot {
    format: Option<PcmFormat>,
    data: Vec<u8>,
    sample_rate: u32,
}

impl BufferSlot {
    fn frames(&self) -> u64 {
        match self.format {
            Some(format) => (self.data.len() / format.frame_size()) as u64,
            None => 0,
        }
    }
}

#[derive(Debug)]
struct VoiceSlot {
    state: VoiceState,
    queue: VecDeque<BufferId>,
    /// Played buffers at the front of `queue`
    processed: usize,
    /// Frames played inside `queue[processed]`
    cursor: u64,
    /// Start position for the next play from Initial/Stopped
    start_cursor: Option<u64>,
    /// `queue` holds a single statically bound buffer
    is_static: bool,
    params: VoiceParams,
}

impl VoiceSlot {
    fn new() -> Self {
        Self {
            state: VoiceState::Initial,
            queue: VecDeque::new(),
            processed: 0,
            cursor: 0,
            start_cursor: None,
            is_static: false,
            params: VoiceParams::default(),
        }
    }
}

#[derive(Debug, Default)]
struct Listener {
    position: Vec3,
    at: Vec3,
    up: Vec3,
}

#[derive(Debug, Default)]
struct DeviceState {
    next_id: u32,
    voices: HashMap<VoiceId, VoiceSlot>,
    buffers: HashMap<BufferId, BufferSlot>,
    listener: Listener,
    suspend_depth: u32,
    failures: HashSet<DeviceOp>,
}

impl DeviceState {
    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn check(&mut self, op: DeviceOp) -> Result<()> {
        if self.failures.remove(&op) {
            return Err(Error::Device(format!("injected failure in {:?}", op)));
        }
        Ok(())
    }

    fn voice(&self, voice: VoiceId) -> Result<&VoiceSlot> {
        self.voices
            .get(&voice)
            .ok_or_else(|| Error::Device(format!("Invalid name: {}", voice)))
    }

    fn voice_mut(&mut self, voice: VoiceId) -> Result<&mut VoiceSlot> {
        self.voices
            .get_mut(&voice)
            .ok_or_else(|| Error::Device(format!("Invalid name: {}", voice)))
    }

    fn frames_of(&self, buffer: BufferId) -> u64 {
        self.buffers.get(&buffer).map(BufferSlot::frames).unwrap_or(0)
    }

    fn buffer_in_use(&self, buffer: BufferId) -> bool {
        self.voices.values().any(|v| v.queue.contains(&buffer))
    }

    fn start(&mut self, voice: VoiceId) -> Result<()> {
        let slot = self.voice_mut(voice)?;
        match slot.state {
            VoiceState::Playing => {}
            VoiceState::Paused => slot.state = VoiceState::Playing,
            VoiceState::Initial | VoiceState::Stopped => {
                slot.processed = 0;
                slot.cursor = slot.start_cursor.take().unwrap_or(0);
                slot.state = if slot.queue.is_empty() {
                    VoiceState::Stopped
                } else {
                    VoiceState::Playing
                };
            }
        }
        Ok(())
    }

    fn advance(&mut self, voice: VoiceId, mut frames: u64) -> Result<()> {
        let (queue, looping) = {
            let slot = self.voice(voice)?;
            if slot.state != VoiceState::Playing {
                return Ok(());
            }
            (slot.queue.clone(), slot.params.looping && slot.is_static)
        };
        let lengths: Vec<u64> = queue.iter().map(|b| self.frames_of(*b)).collect();
        let total: u64 = lengths.iter().sum();

        let slot = self.voice_mut(voice)?;
        loop {
            if slot.processed >= lengths.len() {
                slot.state = VoiceState::Stopped;
                slot.cursor = 0;
                break;
            }
            let left = lengths[slot.processed] - slot.cursor;
            if frames < left {
                slot.cursor += frames;
                break;
            }
            frames -= left;
            slot.processed += 1;
            slot.cursor = 0;

            if slot.processed == lengths.len() {
                if looping && total > 0 {
                    slot.processed = 0;
                } else {
                    slot.state = VoiceState::Stopped;
                    break;
                }
            }
            if frames == 0 {
                break;
            }
        }
        Ok(())
    }
}

/// Software implementation of [`Device`]
pub struct SoftwareDevice {
    name: String,
    capacity: ChannelCapacity,
    extensions: Vec<DeviceExtension>,
    voice_limit: Option<usize>,
    state: Mutex<DeviceState>,
}

impl SoftwareDevice {
    /// Create a device reporting 255 mono + 1 stereo voices and every extension
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            capacity: ChannelCapacity { mono: 255, stereo: 1 },
            extensions: vec![
                DeviceExtension::MultiChannelFormats,
                DeviceExtension::Float32Formats,
            ],
            voice_limit: None,
            state: Mutex::new(DeviceState::default()),
        }
    }

    /// Override the advertised voice capacity
    pub fn with_capacity(mut self, mono: u32, stereo: u32) -> Self {
        self.capacity = ChannelCapacity { mono, stereo };
        self
    }

    /// Refuse voice allocation beyond `limit` live voices
    pub fn with_voice_limit(mut self, limit: usize) -> Self {
        self.voice_limit = Some(limit);
        self
    }

    pub fn with_extensions(mut self, extensions: &[DeviceExtension]) -> Self {
        self.extensions = extensions.to_vec();
        self
    }

    fn lock(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next call of `op` fail with a device error
    pub fn fail_next(&self, op: DeviceOp) {
        self.lock().failures.insert(op);
    }

    /// Advance a playing voice by `frames` sample frames
    pub fn render(&self, voice: VoiceId, frames: u64) -> Result<()> {
        self.lock().advance(voice, frames)
    }

    /// Play out the next `count` buffers of a voice completely
    pub fn finish_buffers(&self, voice: VoiceId, count: usize) -> Result<()> {
        let mut state = self.lock();
        for _ in 0..count {
            let remaining = {
                let slot = state.voice(voice)?;
                if slot.state != VoiceState::Playing {
                    break;
                }
                match slot.queue.get(slot.processed) {
                    Some(buffer) => state.frames_of(*buffer) - slot.cursor,
                    None => break,
                }
            };
            state.advance(voice, remaining)?;
        }
        Ok(())
    }

    /// Live voice count
    pub fn voice_count(&self) -> usize {
        self.lock().voices.len()
    }

    /// Live buffer count
    pub fn buffer_count(&self) -> usize {
        self.lock().buffers.len()
    }

    /// Last parameters applied to a voice
    pub fn voice_params(&self, voice: VoiceId) -> Option<VoiceParams> {
        self.lock().voices.get(&voice).map(|v| v.params)
    }

    /// Raw PCM currently held by a buffer
    pub fn buffer_contents(&self, buffer: BufferId) -> Option<Vec<u8>> {
        self.lock().buffers.get(&buffer).map(|b| b.data.clone())
    }

    /// Buffers on a voice's queue in play order
    pub fn queued_buffers(&self, voice: VoiceId) -> Vec<BufferId> {
        self.lock()
            .voices
            .get(&voice)
            .map(|v| v.queue.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn listener_position(&self) -> Vec3 {
        self.lock().listener.position
    }

    /// Listener forward and up vectors
    pub fn listener_orientation(&self) -> (Vec3, Vec3) {
        let state = self.lock();
        (state.listener.at, state.listener.up)
    }

    /// Nesting depth of [`Device::suspend`] calls not yet matched by `process`
    pub fn suspend_depth(&self) -> u32 {
        self.lock().suspend_depth
    }
}

impl Device for SoftwareDevice {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn channel_capacity(&self) -> Result<ChannelCapacity> {
        Ok(self.capacity)
    }

    fn has_extension(&self, extension: DeviceExtension) -> bool {
        self.extensions.contains(&extension)
    }

    fn gen_voice(&self) -> Result<VoiceId> {
        let mut state = self.lock();
        state.check(DeviceOp::GenVoice)?;
        if let Some(limit) = self.voice_limit {
            if state.voices.len() >= limit {
                return Err(Error::Device("Out of memory".to_string()));
            }
        }
        let id = VoiceId(state.next_id());
        state.voices.insert(id, VoiceSlot::new());
        Ok(id)
    }

    fn delete_voice(&self, voice: VoiceId) -> Result<()> {
        self.lock()
            .voices
            .remove(&voice)
            .map(|_| ())
            .ok_or_else(|| Error::Device(format!("Invalid name: {}", voice)))
    }

    fn gen_buffers(&self, count: usize) -> Result<Vec<BufferId>> {
        let mut state = self.lock();
        state.check(DeviceOp::GenBuffers)?;
        let ids: Vec<BufferId> = (0..count).map(|_| BufferId(state.next_id())).collect();
        for id in &ids {
            state.buffers.insert(*id, BufferSlot::default());
        }
        Ok(ids)
    }

    fn delete_buffers(&self, buffers: &[BufferId]) -> Result<()> {
        let mut state = self.lock();
        for buffer in buffers {
            if state.buffer_in_use(*buffer) {
                return Err(Error::Device(format!("{} is still queued", buffer)));
            }
        }
        for buffer in buffers {
            state.buffers.remove(buffer);
        }
        Ok(())
    }

    fn buffer_data(
        &self,
        buffer: BufferId,
        format: PcmFormat,
        data: &[u8],
        sample_rate: u32,
    ) -> Result<()> {
        let mut state = self.lock();
        state.check(DeviceOp::BufferData)?;
        let slot = state
            .buffers
            .get_mut(&buffer)
            .ok_or_else(|| Error::Device(format!("Invalid name: {}", buffer)))?;
        slot.format = Some(format);
        slot.data = data.to_vec();
        slot.sample_rate = sample_rate;
        Ok(())
    }

    fn buffer_size(&self, buffer: BufferId) -> Result<usize> {
        self.lock()
            .buffers
            .get(&buffer)
            .map(|b| b.data.len())
            .ok_or_else(|| Error::Device(format!("Invalid name: {}", buffer)))
    }

    fn bind_buffer(&self, voice: VoiceId, buffer: Option<BufferId>) -> Result<()> {
        let mut state = self.lock();
        state.check(DeviceOp::BindBuffer)?;
        if let Some(buffer) = buffer {
            if !state.buffers.contains_key(&buffer) {
                return Err(Error::Device(format!("Invalid name: {}", buffer)));
            }
        }
        let slot = state.voice_mut(voice)?;
        if slot.state.is_active() {
            return Err(Error::Device(format!("{} is busy", voice)));
        }
        slot.queue.clear();
        slot.processed = 0;
        slot.cursor = 0;
        slot.start_cursor = None;
        slot.is_static = buffer.is_some();
        slot.queue.extend(buffer);
        Ok(())
    }

    fn bound_buffer(&self, voice: VoiceId) -> Result<Option<BufferId>> {
        let state = self.lock();
        let slot = state.voice(voice)?;
        Ok(if slot.is_static {
            slot.queue.front().copied()
        } else {
            None
        })
    }

    fn queue_buffers(&self, voice: VoiceId, buffers: &[BufferId]) -> Result<()> {
        let mut state = self.lock();
        state.check(DeviceOp::QueueBuffers)?;
        for buffer in buffers {
            if !state.buffers.contains_key(buffer) {
                return Err(Error::Device(format!("Invalid name: {}", buffer)));
            }
        }
        let slot = state.voice_mut(voice)?;
        if slot.is_static {
            return Err(Error::Device(format!("{} has a static buffer", voice)));
        }
        slot.queue.extend(buffers.iter().copied());
        Ok(())
    }

    fn unqueue_buffers(&self, voice: VoiceId, count: usize) -> Result<Vec<BufferId>> {
        let mut state = self.lock();
        state.check(DeviceOp::UnqueueBuffers)?;
        let slot = state.voice_mut(voice)?;
        if count > slot.processed || slot.is_static {
            return Err(Error::Device(format!(
                "cannot unqueue {} buffers from {} ({} processed)",
                count, voice, slot.processed
            )));
        }
        slot.processed -= count;
        Ok(slot.queue.drain(..count).collect())
    }

    fn buffers_queued(&self, voice: VoiceId) -> Result<usize> {
        Ok(self.lock().voice(voice)?.queue.len())
    }

    fn buffers_processed(&self, voice: VoiceId) -> Result<usize> {
        let state = self.lock();
        let slot = state.voice(voice)?;
        Ok(if slot.is_static { 0 } else { slot.processed })
    }

    fn play(&self, voices: &[VoiceId]) -> Result<()> {
        let mut state = self.lock();
        state.check(DeviceOp::Play)?;
        for voice in voices {
            state.voice(*voice)?;
        }
        for voice in voices {
            state.start(*voice)?;
        }
        Ok(())
    }

    fn pause(&self, voices: &[VoiceId]) -> Result<()> {
        let mut state = self.lock();
        state.check(DeviceOp::Pause)?;
        for voice in voices {
            state.voice(*voice)?;
        }
        for voice in voices {
            let slot = state.voice_mut(*voice)?;
            if slot.state == VoiceState::Playing {
                slot.state = VoiceState::Paused;
            }
        }
        Ok(())
    }

    fn stop(&self, voice: VoiceId) -> Result<()> {
        let mut state = self.lock();
        let slot = state.voice_mut(voice)?;
        if slot.state != VoiceState::Initial {
            slot.state = VoiceState::Stopped;
            slot.processed = slot.queue.len();
            slot.cursor = 0;
        }
        slot.start_cursor = None;
        Ok(())
    }

    fn voice_state(&self, voice: VoiceId) -> Result<VoiceState> {
        let mut state = self.lock();
        state.check(DeviceOp::VoiceState)?;
        Ok(state.voice(voice)?.state)
    }

    fn sample_offset(&self, voice: VoiceId) -> Result<u64> {
        let mut state = self.lock();
        state.check(DeviceOp::SampleOffset)?;
        let slot = state.voice(voice)?;
        if !slot.state.is_active() {
            return Ok(0);
        }
        let played: u64 = slot
            .queue
            .iter()
            .take(slot.processed)
            .map(|b| state.frames_of(*b))
            .sum();
        Ok(played + slot.cursor)
    }

    fn set_voice_params(&self, voice: VoiceId, params: &VoiceParams) -> Result<()> {
        let mut state = self.lock();
        state.check(DeviceOp::SetVoiceParams)?;
        state.voice_mut(voice)?.params = *params;
        Ok(())
    }

    fn set_sec_offset(&self, voice: VoiceId, seconds: f32) -> Result<()> {
        let mut state = self.lock();
        let (buffer, is_static) = {
            let slot = state.voice(voice)?;
            (slot.queue.front().copied(), slot.is_static)
        };
        let rate = buffer
            .and_then(|b| state.buffers.get(&b))
            .map(|b| b.sample_rate)
            .unwrap_or(0);
        let frames = buffer.map(|b| state.frames_of(b)).unwrap_or(0);
        let target = (seconds.max(0.0) as f64 * rate as f64) as u64;
        if !is_static || target > frames {
            return Err(Error::Device(format!(
                "Invalid value: offset {}s on {}",
                seconds, voice
            )));
        }
        let slot = state.voice_mut(voice)?;
        if slot.state.is_active() {
            slot.cursor = target;
        } else {
            slot.start_cursor = Some(target);
        }
        Ok(())
    }

    fn set_listener(&self, position: Vec3, at: Vec3, up: Vec3) -> Result<()> {
        let mut state = self.lock();
        state.check(DeviceOp::SetListener)?;
        state.listener = Listener { position, at, up };
        Ok(())
    }

    fn suspend(&self) {
        self.lock().suspend_depth += 1;
    }

    fn process(&self) {
        let mut state = self.lock();
        state.suspend_depth = state.suspend_depth.saturating_sub(1);
    }
}

/// Backend serving a fixed set of software devices
pub struct SoftwareBackend {
    devices: Vec<Arc<SoftwareDevice>>,
}

impl SoftwareBackend {
    /// The first device is the default device
    pub fn new(devices: Vec<Arc<SoftwareDevice>>) -> Self {
        Self { devices }
    }

    /// Backend with a single default device
    pub fn single(device: Arc<SoftwareDevice>) -> Self {
        Self::new(vec![device])
    }
}

impl DeviceBackend for SoftwareBackend {
    fn enumerate(&self) -> Vec<String> {
        self.devices.iter().map(|d| d.name.clone()).collect()
    }

    fn open(&self, name: &str) -> Result<Arc<dyn Device>> {
        let device = if name.is_empty() {
            self.devices.first()
        } else {
            self.devices.iter().find(|d| d.name == name)
        };
        match device {
            Some(device) => {
                debug!("Opening software device \"{}\"", device.name);
                Ok(Arc::clone(device) as Arc<dyn Device>)
            }
            None => Err(Error::Device(format!("No such device \"{}\"", name))),
        }
    }
}
