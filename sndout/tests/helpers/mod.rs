//! Test helper modules for sndout integration tests
//!
//! Provides reusable test infrastructure components:
//! - ScriptedDecoder: in-memory decoder with injectable failures
//! - RecordingAnalyzer: loudness analyzer that records every call
//! - MapProvider: named sound resources backed by scripted decoders
//! - Fixtures: software devices and outputs wired for tests
//! - LogCapture: per-thread tracing capture

#![allow(dead_code, unused_imports)]

pub mod analyzer;
pub mod decoders;
pub mod fixtures;
pub mod log_capture;

pub use analyzer::{Analysis, AnalysisLog, RecordingAnalyzer};
pub use decoders::{DecoderProbe, MapProvider, ScriptedDecoder};
pub use log_capture::{capture_logs, contains};
pub use fixtures::{manual_output, stereo16_info, wait_until, SAMPLE_RATE, STEREO16_BUFFER};
