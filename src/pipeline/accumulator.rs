//! Integral handoff between the capture thread and the flight-control loop.
//!
//! The producer keeps adding to the integral; every successful read drains
//! it. Both sides take the same lock, so a reader sees either everything a
//! producer update added or nothing of it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crossbeam::utils::CachePadded;

/// Motion integrated since the last successful read
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FlowIntegral {
    /// Flow in radians about the camera x axis
    pub pixel_flow_x_integral: f32,
    pub pixel_flow_y_integral: f32,
    /// Gyro rate integrated over `integration_timespan_us`, in rad/s times µs.
    /// Dividing by the timespan gives the mean rate.
    pub gyro_x_integral: f32,
    pub gyro_y_integral: f32,
    pub integration_timespan_us: u64,
    /// Quality of the most recent flow computation
    pub quality: u8,
}

/// Contribution of one frame pair
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FlowSample {
    pub flow_x: f32,
    pub flow_y: f32,
    pub gyro_x: f32,
    pub gyro_y: f32,
    pub elapsed_us: u64,
    pub quality: u8,
}

#[derive(Default)]
struct State {
    integral: FlowIntegral,
    data_available: bool,
}

#[derive(Default)]
struct Stats {
    frames_captured: AtomicU64,
    samples_added: AtomicU64,
    reads: AtomicU64,
    empty_reads: AtomicU64,
}

/// Counters of the pipeline since start
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub frames_captured: u64,
    pub samples_added: u64,
    pub reads: u64,
    pub empty_reads: u64,
}

struct Shared {
    state: Mutex<State>,
    stats: CachePadded<Stats>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        // State is plain numbers, a panicking holder can't leave it torn
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Create the producer and consumer ends of one accumulator
pub fn integral_channel() -> (IntegralWriter, FlowReader) {
    let shared = Arc::new(Shared {
        state: Mutex::new(State::default()),
        stats: CachePadded::new(Stats::default()),
    });
    (
        IntegralWriter {
            shared: shared.clone(),
        },
        FlowReader { shared },
    )
}

/// Producer end, owned by the capture loop
pub struct IntegralWriter {
    shared: Arc<Shared>,
}

impl IntegralWriter {
    pub fn add(&self, sample: &FlowSample) {
        {
            let mut state = self.shared.lock();
            let acc = &mut state.integral;
            acc.pixel_flow_x_integral += sample.flow_x;
            acc.pixel_flow_y_integral += sample.flow_y;
            acc.gyro_x_integral += sample.gyro_x;
            acc.gyro_y_integral += sample.gyro_y;
            acc.integration_timespan_us += sample.elapsed_us;
            acc.quality = sample.quality;
            state.data_available = true;
        }
        self.shared.stats.samples_added.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frame_captured(&self) {
        self.shared
            .stats
            .frames_captured
            .fetch_add(1, Ordering::Relaxed);
    }
}

/// Consumer end. Cheap to clone; all clones drain the same integral.
#[derive(Clone)]
pub struct FlowReader {
    shared: Arc<Shared>,
}

impl FlowReader {
    /// Take the integral accumulated since the last successful read.
    ///
    /// Returns `None`, changing nothing, when the producer hasn't added
    /// anything since then.
    pub fn read(&self) -> Option<FlowIntegral> {
        let taken = {
            let mut state = self.shared.lock();
            if state.data_available {
                state.data_available = false;
                let quality = state.integral.quality;
                let taken = std::mem::take(&mut state.integral);
                // Quality is a level, not an integral
                state.integral.quality = quality;
                Some(taken)
            } else {
                None
            }
        };

        let counter = if taken.is_some() {
            &self.shared.stats.reads
        } else {
            &self.shared.stats.empty_reads
        };
        counter.fetch_add(1, Ordering::Relaxed);
        taken
    }

    /// Like `read`, filling a caller-owned record. `out` is untouched on failure.
    pub fn read_into(&self, out: &mut FlowIntegral) -> bool {
        match self.read() {
            Some(integral) => {
                *out = integral;
                true
            }
            None => false,
        }
    }

    pub fn stats(&self) -> PipelineStats {
        let stats = &self.shared.stats;
        PipelineStats {
            frames_captured: stats.frames_captured.load(Ordering::Relaxed),
            samples_added: stats.samples_added.load(Ordering::Relaxed),
            reads: stats.reads.load(Ordering::Relaxed),
            empty_reads: stats.empty_reads.load(Ordering::Relaxed),
        }
    }
}
