//! Active playback registry
//!
//! Tracks every sound and stream currently holding a voice, along with the
//! parameters it was started with. Handles are addressed by opaque ids the
//! caller gets back from `play_sound`/`stream_sound`.

use crate::device::{VoiceId, VoiceParams};
use crate::stream::SharedFeeder;
use bitflags::bitflags;
use glam::Vec3;
use std::fmt;
use uuid::Uuid;

bitflags! {
    /// Behaviour flags for a sound or stream
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PlayFlags: u32 {
        /// Repeat until stopped. Ignored for streams.
        const LOOP = 1 << 0;
        /// Unaffected by the listener's environment
        const NO_ENV = 1 << 1;
    }
}

bitflags! {
    /// Category of a sound, used to pause and resume groups together
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PlayType: u32 {
        const SFX = 1 << 0;
        const VOICE = 1 << 1;
        const FOLEY = 1 << 2;
        const MOVIE = 1 << 3;
        const MUSIC = 1 << 4;
    }
}

/// Acoustic environment around the listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Normal,
    Underwater,
}

/// Gain multiplier applied underwater
const UNDERWATER_GAIN: f32 = 0.9;
/// Pitch multiplier applied underwater
const UNDERWATER_PITCH: f32 = 0.7;

/// Listener position and environment as last reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ListenerState {
    pub position: Vec3,
    pub environment: Environment,
}

/// Parameters a sound or stream was started with
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayParams {
    /// World position; only meaningful when `positional`
    pub position: Vec3,
    pub volume: f32,
    /// Category volume multiplied into `volume`
    pub base_volume: f32,
    pub pitch: f32,
    /// Distance at which attenuation starts
    pub min_distance: f32,
    /// Beyond this distance a positional sound is silent
    pub max_distance: f32,
    pub flags: PlayFlags,
    pub play_type: PlayType,
    /// Spatialized in world space rather than played at the listener
    pub positional: bool,
}

impl PlayParams {
    /// Non-positional parameters played at the listener
    pub fn ambient(volume: f32, base_volume: f32, pitch: f32) -> Self {
        Self {
            position: Vec3::ZERO,
            volume,
            base_volume,
            pitch,
            min_distance: 1.0,
            max_distance: 1000.0,
            flags: PlayFlags::empty(),
            play_type: PlayType::SFX,
            positional: false,
        }
    }

    /// Parameters for a sound placed in the world
    pub fn positional(
        position: Vec3,
        volume: f32,
        base_volume: f32,
        pitch: f32,
        min_distance: f32,
        max_distance: f32,
    ) -> Self {
        Self {
            position,
            min_distance,
            max_distance,
            positional: true,
            ..Self::ambient(volume, base_volume, pitch)
        }
    }

    pub fn with_type(mut self, play_type: PlayType) -> Self {
        self.play_type = play_type;
        self
    }

    pub fn with_flags(mut self, flags: PlayFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Volume after applying the category volume
    pub fn real_volume(&self) -> f32 {
        self.volume * self.base_volume
    }

    /// Whether the listener's environment affects this sound
    pub fn uses_environment(&self) -> bool {
        !self.flags.contains(PlayFlags::NO_ENV)
    }

    /// Effective (gain, pitch) heard by `listener`.
    ///
    /// Positional sounds beyond max distance are silenced; underwater
    /// listeners hear environment-affected sounds quieter and lower.
    pub fn gain_and_pitch(&self, listener: &ListenerState) -> (f32, f32) {
        let mut gain = self.real_volume();
        let mut pitch = self.pitch;

        if self.positional
            && self.position.distance_squared(listener.position)
                > self.max_distance * self.max_distance
        {
            gain = 0.0;
        }

        if self.uses_environment() && listener.environment == Environment::Underwater {
            gain *= UNDERWATER_GAIN;
            pitch *= UNDERWATER_PITCH;
        }

        (gain, pitch)
    }

    /// Device parameters for these settings as heard by `listener`
    pub fn voice_params(&self, listener: &ListenerState, looping: bool) -> VoiceParams {
        let (gain, pitch) = self.gain_and_pitch(listener);
        if self.positional {
            VoiceParams {
                gain,
                pitch,
                position: self.position,
                reference_distance: self.min_distance,
                max_distance: self.max_distance,
                rolloff_factor: 1.0,
                relative: false,
                looping,
            }
        } else {
            VoiceParams {
                gain,
                pitch,
                position: Vec3::ZERO,
                reference_distance: 1.0,
                max_distance: 1000.0,
                rolloff_factor: 0.0,
                relative: true,
                looping,
            }
        }
    }
}

/// Handle to a playing one-shot sound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SoundId(Uuid);

/// Handle to a playing stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamId(Uuid);

impl fmt::Display for SoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sound:{}", self.0)
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream:{}", self.0)
    }
}

/// What a registry entry is playing
pub enum Playable {
    /// Static buffer bound to a voice
    OneShot { voice: VoiceId },
    /// Decoder streamed through a feeder
    Stream { voice: VoiceId, feeder: SharedFeeder },
}

impl Playable {
    pub fn voice(&self) -> VoiceId {
        match self {
            Playable::OneShot { voice } | Playable::Stream { voice, .. } => *voice,
        }
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, Playable::Stream { .. })
    }
}

/// One registry entry
pub struct ActiveHandle {
    key: Uuid,
    pub params: PlayParams,
    pub playable: Playable,
}

impl ActiveHandle {
    pub fn voice(&self) -> VoiceId {
        self.playable.voice()
    }

    /// Whether toggling `types` should affect this entry
    pub fn matches(&self, types: PlayType) -> bool {
        self.params.play_type.intersects(types)
    }

    /// Device parameters for this entry as heard by `listener`
    pub fn voice_params(&self, listener: &ListenerState) -> VoiceParams {
        let looping = !self.playable.is_stream() && self.params.flags.contains(PlayFlags::LOOP);
        self.params.voice_params(listener, looping)
    }
}

/// Sounds and streams currently holding voices
#[derive(Default)]
pub struct ActiveRegistry {
    handles: Vec<ActiveHandle>,
}

impl ActiveRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_sound(&mut self, voice: VoiceId, params: PlayParams) -> SoundId {
        let key = Uuid::new_v4();
        self.handles.push(ActiveHandle {
            key,
            params,
            playable: Playable::OneShot { voice },
        });
        SoundId(key)
    }

    pub fn insert_stream(&mut self, voice: VoiceId, feeder: SharedFeeder, params: PlayParams) -> StreamId {
        let key = Uuid::new_v4();
        self.handles.push(ActiveHandle {
            key,
            params,
            playable: Playable::Stream { voice, feeder },
        });
        StreamId(key)
    }

    fn position(&self, key: Uuid, stream: bool) -> Option<usize> {
        self.handles
            .iter()
            .position(|h| h.key == key && h.playable.is_stream() == stream)
    }

    pub fn sound(&self, id: SoundId) -> Option<&ActiveHandle> {
        self.position(id.0, false).map(|i| &self.handles[i])
    }

    pub fn sound_mut(&mut self, id: SoundId) -> Option<&mut ActiveHandle> {
        self.position(id.0, false).map(|i| &mut self.handles[i])
    }

    pub fn stream(&self, id: StreamId) -> Option<&ActiveHandle> {
        self.position(id.0, true).map(|i| &self.handles[i])
    }

    pub fn stream_mut(&mut self, id: StreamId) -> Option<&mut ActiveHandle> {
        self.position(id.0, true).map(|i| &mut self.handles[i])
    }

    pub fn remove_sound(&mut self, id: SoundId) -> Option<ActiveHandle> {
        self.position(id.0, false).map(|i| self.handles.remove(i))
    }

    pub fn remove_stream(&mut self, id: StreamId) -> Option<ActiveHandle> {
        self.position(id.0, true).map(|i| self.handles.remove(i))
    }

    /// Voices of every entry whose type intersects `types`
    pub fn voices_matching(&self, types: PlayType) -> Vec<VoiceId> {
        self.handles
            .iter()
            .filter(|h| h.matches(types))
            .map(ActiveHandle::voice)
            .collect()
    }

    /// Voices of every one-shot sound
    pub fn sound_voices(&self) -> Vec<VoiceId> {
        self.handles
            .iter()
            .filter(|h| !h.playable.is_stream())
            .map(ActiveHandle::voice)
            .collect()
    }

    /// Remove and return every entry
    pub fn drain(&mut self) -> Vec<ActiveHandle> {
        std::mem::take(&mut self.handles)
    }

    pub fn sound_count(&self) -> usize {
        self.handles.iter().filter(|h| !h.playable.is_stream()).count()
    }

    pub fn stream_count(&self) -> usize {
        self.handles.iter().filter(|h| h.playable.is_stream()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}
