//! Recording loudness analyzer

use sndout_common::{ChannelConfig, LoudnessAnalyzer, SampleType};
use std::sync::{Arc, Mutex};

/// One recorded analysis call
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub label: String,
    pub bytes: usize,
    pub sample_rate: u32,
    pub channels: ChannelConfig,
    pub sample_type: SampleType,
    pub samples_per_sec: f32,
}

/// Analysis calls shared by several analyzers, in completion order
pub type AnalysisLog = Arc<Mutex<Vec<Analysis>>>;

pub struct RecordingAnalyzer {
    label: String,
    log: AnalysisLog,
}

impl RecordingAnalyzer {
    pub fn new(label: &str, log: &AnalysisLog) -> Arc<Self> {
        Arc::new(Self {
            label: label.to_string(),
            log: Arc::clone(log),
        })
    }

    /// Labels of completed analyses, oldest first
    pub fn labels(log: &AnalysisLog) -> Vec<String> {
        log.lock().unwrap().iter().map(|a| a.label.clone()).collect()
    }
}

impl LoudnessAnalyzer for RecordingAnalyzer {
    fn analyze_loudness(
        &self,
        pcm: &[u8],
        sample_rate: u32,
        channels: ChannelConfig,
        sample_type: SampleType,
        samples_per_sec: f32,
    ) {
        self.log.lock().unwrap().push(Analysis {
            label: self.label.clone(),
            bytes: pcm.len(),
            sample_rate,
            channels,
            sample_type,
            samples_per_sec,
        });
    }
}
