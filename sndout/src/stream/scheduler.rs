//! Stream scheduler
//!
//! One background worker thread services every active stream and a FIFO
//! of deferred loudness analysis jobs.
//!
//! **Worker loop:**
//! 1. Advance every registered feeder, dropping those that finished
//! 2. If a loudness job is pending, run exactly one with the lock released
//!    and go back to step 1
//! 3. Otherwise sleep until notified or the poll interval elapses
//!
//! Running one job per pass keeps streams from underrunning while a long
//! analysis is in progress.

use super::{lock_feeder, SharedFeeder};
use sndout_common::config::StreamingConfig;
use sndout_common::format::{ChannelConfig, SampleType};
use sndout_common::{Decoder, DecoderInfo, LoudnessAnalyzer};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Format assumed when a loudness job's decoder cannot report one
const FALLBACK_INFO: DecoderInfo = DecoderInfo {
    sample_rate: 48000,
    channels: ChannelConfig::Mono,
    sample_type: SampleType::Int16,
};

/// Deferred loudness analysis of one decoder's full output
pub struct LoudnessJob {
    decoder: Box<dyn Decoder>,
    analyzer: Arc<dyn LoudnessAnalyzer>,
}

impl LoudnessJob {
    pub fn new(decoder: Box<dyn Decoder>, analyzer: Arc<dyn LoudnessAnalyzer>) -> Self {
        Self { decoder, analyzer }
    }

    /// Decode everything, analyze whatever was decoded, close the decoder
    fn run(mut self, samples_per_sec: f32) {
        let mut info = FALLBACK_INFO;
        let mut data = Vec::new();

        if let Err(e) = self.decode(&mut info, &mut data) {
            warn!(
                "Failed to decode \"{}\" for loudness analysis: {} ({} bytes kept)",
                self.decoder.name(),
                e,
                data.len()
            );
        }

        self.analyzer.analyze_loudness(
            &data,
            info.sample_rate,
            info.channels,
            info.sample_type,
            samples_per_sec,
        );
        self.decoder.close();
    }

    fn decode(&mut self, info: &mut DecoderInfo, data: &mut Vec<u8>) -> sndout_common::Result<()> {
        *info = self.decoder.info()?;
        self.decoder.read_all(data)
    }
}

/// State guarded by the scheduler lock
#[derive(Default)]
struct SchedulerState {
    streams: Vec<SharedFeeder>,
    loudness_jobs: VecDeque<LoudnessJob>,
}

/// Shared state between the caller thread and the worker
struct SharedSchedulerState {
    state: Mutex<SchedulerState>,

    /// Wakes the worker when work is added or on shutdown
    condvar: Condvar,

    stop_flag: AtomicBool,

    poll_interval: Duration,
    loudness_samples_per_sec: f32,
}

impl SharedSchedulerState {
    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Advance all feeders, then take the next loudness job if any.
    /// Called with the lock held.
    fn service(state: &mut SchedulerState) -> Option<LoudnessJob> {
        state.streams.retain(|feeder| lock_feeder(feeder).advance());
        state.loudness_jobs.pop_front()
    }
}

/// Background servicing of streams and loudness jobs
pub struct StreamScheduler {
    shared: Arc<SharedSchedulerState>,

    /// Worker thread handle; `None` once shut down or when driven manually
    thread: Option<JoinHandle<()>>,
}

impl StreamScheduler {
    fn shared(config: &StreamingConfig) -> Arc<SharedSchedulerState> {
        Arc::new(SharedSchedulerState {
            state: Mutex::new(SchedulerState::default()),
            condvar: Condvar::new(),
            stop_flag: AtomicBool::new(false),
            poll_interval: config.poll_interval(),
            loudness_samples_per_sec: config.loudness_samples_per_sec,
        })
    }

    /// Create the scheduler and start its worker thread
    pub fn spawn(config: &StreamingConfig) -> std::io::Result<Self> {
        let shared = Self::shared(config);
        let worker_state = Arc::clone(&shared);

        let handle = thread::Builder::new()
            .name("sndout-streams".to_string())
            .spawn(move || Self::worker_loop(worker_state))?;

        info!(
            "Stream scheduler started (poll interval {}ms)",
            config.poll_interval_ms
        );

        Ok(Self {
            shared,
            thread: Some(handle),
        })
    }

    /// Create a scheduler without a worker thread.
    ///
    /// The host drives it by calling [`StreamScheduler::run_pass`].
    pub fn manual(config: &StreamingConfig) -> Self {
        Self {
            shared: Self::shared(config),
            thread: None,
        }
    }

    fn worker_loop(shared: Arc<SharedSchedulerState>) {
        debug!("Stream scheduler worker started");

        let mut state = shared.lock();
        while !shared.stop_flag.load(Ordering::Acquire) {
            if let Some(job) = SharedSchedulerState::service(&mut state) {
                drop(state);
                job.run(shared.loudness_samples_per_sec);
                state = shared.lock();
                continue;
            }

            let (guard, _) = shared
                .condvar
                .wait_timeout(state, shared.poll_interval)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }

        debug!("Stream scheduler worker exiting");
    }

    /// Perform one worker pass on the calling thread.
    ///
    /// Returns whether a loudness job ran. Meant for schedulers created
    /// with [`StreamScheduler::manual`].
    pub fn run_pass(&self) -> bool {
        let job = SharedSchedulerState::service(&mut self.shared.lock());
        match job {
            Some(job) => {
                job.run(self.shared.loudness_samples_per_sec);
                true
            }
            None => false,
        }
    }

    /// Start servicing a feeder. Registering the same feeder twice is a no-op.
    pub fn register(&self, feeder: SharedFeeder) {
        {
            let mut state = self.shared.lock();
            if state.streams.iter().any(|f| Arc::ptr_eq(f, &feeder)) {
                return;
            }
            state.streams.push(feeder);
        }
        self.shared.condvar.notify_all();
    }

    /// Stop servicing a feeder. Returns whether it was registered.
    pub fn unregister(&self, feeder: &SharedFeeder) -> bool {
        let mut state = self.shared.lock();
        let before = state.streams.len();
        state.streams.retain(|f| !Arc::ptr_eq(f, feeder));
        state.streams.len() != before
    }

    /// Queue a loudness analysis to run after earlier jobs
    pub fn enqueue_job(&self, job: LoudnessJob) {
        self.shared.lock().loudness_jobs.push_back(job);
        self.shared.condvar.notify_all();
    }

    /// Forget every stream and pending job.
    ///
    /// Returns once any in-progress pass over the streams has completed.
    pub fn clear(&self) {
        let mut state = self.shared.lock();
        state.streams.clear();
        state.loudness_jobs.clear();
    }

    /// Feeders currently being serviced
    pub fn stream_count(&self) -> usize {
        self.shared.lock().streams.len()
    }

    /// Loudness jobs waiting to run
    pub fn pending_jobs(&self) -> usize {
        self.shared.lock().loudness_jobs.len()
    }

    pub fn is_running(&self) -> bool {
        self.thread.is_some()
    }

    /// Stop the worker and wait for it to exit
    pub fn shutdown(&mut self) {
        let Some(handle) = self.thread.take() else {
            return;
        };

        self.shared.stop_flag.store(true, Ordering::Release);
        // Taking the lock orders the flag before the worker's next wait
        drop(self.shared.lock());
        self.shared.condvar.notify_all();

        match handle.join() {
            Ok(()) => debug!("Stream scheduler worker joined"),
            Err(e) => error!("Stream scheduler worker panicked: {:?}", e),
        }
    }
}

impl Drop for StreamScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
