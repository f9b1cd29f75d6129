//! Capture thread setup and the handle the flight-control side holds

use std::io;
use std::thread::{self, JoinHandle};

use tracing::{info, instrument, warn};

use crate::capture::{V4l2Device, VideoDevice};
use crate::error::SensorFault;
use crate::flow::{BlockMatchFlow, FlowEngine, FlowParams};
use crate::gyro::GyroSource;
use crate::pipeline::{
    integral_channel, negotiate, CaptureLoop, FlowIntegral, FlowReader, FrameRecorder, Negotiated,
    PipelineStats,
};
use crate::platform::{self, CameraPlatform};
use crate::{Config, ThreadConfig};

const CAPTURE_THREAD_NAME: &str = "optflow-capture";

/// A running optical-flow sensor.
///
/// The capture thread lives for the rest of the process. Its only way out
/// is a fatal fault, delivered through `faults()`.
pub struct OpticalFlowSensor {
    reader: FlowReader,
    faults: flume::Receiver<SensorFault>,
    negotiated: Negotiated,
    _thread: JoinHandle<()>,
}

impl OpticalFlowSensor {
    /// Bring up the configured platform and V4L2 camera with the block-matching flow engine
    #[instrument(skip_all, fields(device = %config.capture.device))]
    pub fn start<G>(config: &Config, gyro: G) -> Result<Self, SensorFault>
    where
        G: GyroSource + 'static,
    {
        let mut platform = platform::for_config(&config.capture);
        info!("Bringing up {} camera", platform.name());
        platform.prepare()?;

        let path = &config.capture.device;
        let device = V4l2Device::open(path, config.capture.memory).map_err(|source| {
            SensorFault::DeviceOpen {
                path: path.clone(),
                source,
            }
        })?;

        Self::start_with(device, platform.as_ref(), BlockMatchFlow::new, gyro, config)
    }

    /// Start on an already opened device. `make_flow` builds the flow
    /// engine once the frame geometry is known.
    pub fn start_with<D, F, G>(
        mut device: D,
        platform: &dyn CameraPlatform,
        make_flow: impl FnOnce(FlowParams) -> F,
        gyro: G,
        config: &Config,
    ) -> Result<Self, SensorFault>
    where
        D: VideoDevice + 'static,
        F: FlowEngine + 'static,
        G: GyroSource + 'static,
    {
        let negotiated = negotiate(&mut device, platform, &config.capture)?;
        let flow = make_flow(FlowParams {
            frame_width: negotiated.plan.output_width,
            stride: negotiated.stride,
            max_flow_pixels: config.flow.max_flow_pixels,
            feature_threshold: config.flow.feature_threshold,
            value_threshold: config.flow.value_threshold,
        });

        let (writer, reader) = integral_channel();
        let mut capture = CaptureLoop::new(
            device,
            flow,
            gyro,
            &negotiated,
            config.flow.focal_length_px,
            writer,
        );
        if let Some(path) = &config.capture.record_path {
            match FrameRecorder::create(path, config.capture.record_metadata) {
                Ok(recorder) => capture = capture.with_recorder(recorder),
                Err(e) => warn!("Not recording to {}: {}", path.display(), e),
            }
        }

        let (fault_tx, faults) = flume::bounded(1);
        let thread = spawn_capture_thread(capture, config.thread.clone(), fault_tx)?;

        Ok(Self {
            reader,
            faults,
            negotiated,
            _thread: thread,
        })
    }

    /// Drain the flow integral; `None` when nothing new was captured
    pub fn read(&self) -> Option<FlowIntegral> {
        self.reader.read()
    }

    /// A reader handle for another consumer thread
    pub fn reader(&self) -> FlowReader {
        self.reader.clone()
    }

    pub fn stats(&self) -> PipelineStats {
        self.reader.stats()
    }

    pub fn negotiated(&self) -> &Negotiated {
        &self.negotiated
    }

    /// Fatal faults of the capture thread. At most one is ever sent.
    pub fn faults(&self) -> &flume::Receiver<SensorFault> {
        &self.faults
    }
}

fn spawn_capture_thread<D, F, G>(
    capture: CaptureLoop<D, F, G>,
    policy: ThreadConfig,
    fault_tx: flume::Sender<SensorFault>,
) -> Result<JoinHandle<()>, SensorFault>
where
    D: VideoDevice + 'static,
    F: FlowEngine + 'static,
    G: GyroSource + 'static,
{
    let (ready_tx, ready_rx) = flume::bounded(1);

    let handle = thread::Builder::new()
        .name(CAPTURE_THREAD_NAME.into())
        .spawn(move || {
            let setup = apply_thread_policy(&policy);
            let ready = setup.is_ok();
            let _ = ready_tx.send(setup);
            if !ready {
                return;
            }
            let fault = capture.run();
            let _ = fault_tx.send(fault);
        })
        .map_err(SensorFault::ThreadSpawn)?;

    let setup = ready_rx.recv().map_err(|_| {
        SensorFault::ThreadSpawn(io::Error::other("capture thread died during setup"))
    })?;
    setup?;
    Ok(handle)
}

/// Pin and raise the calling thread as configured
fn apply_thread_policy(policy: &ThreadConfig) -> Result<(), SensorFault> {
    if let Some(id) = policy.cpu_core {
        if core_affinity::set_for_current(core_affinity::CoreId { id }) {
            info!("Capture thread pinned to core {}", id);
        } else {
            warn!("Couldn't pin capture thread to core {}", id);
        }
    }

    if policy.rt_priority <= 0 {
        return Ok(());
    }

    // SAFETY: sched_param is plain data; only sched_priority matters for SCHED_FIFO
    let mut param: libc::sched_param = unsafe { std::mem::zeroed() };
    param.sched_priority = policy.rt_priority;
    // SAFETY: pthread_self() is always a valid handle for the calling thread
    let ret =
        unsafe { libc::pthread_setschedparam(libc::pthread_self(), libc::SCHED_FIFO, &param) };
    if ret == 0 {
        info!("Capture thread at SCHED_FIFO priority {}", policy.rt_priority);
        return Ok(());
    }

    let source = io::Error::from_raw_os_error(ret);
    if policy.require_realtime {
        return Err(SensorFault::RealtimePriority {
            priority: policy.rt_priority,
            source,
        });
    }
    warn!(
        "Capture thread stays at normal priority, SCHED_FIFO {} refused: {}",
        policy.rt_priority, source
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(rt_priority: i32, require_realtime: bool) -> ThreadConfig {
        ThreadConfig {
            rt_priority,
            require_realtime,
            cpu_core: None,
        }
    }

    /// Runs on a scratch thread so the test runner's own scheduling is untouched
    fn apply_on_thread(policy: ThreadConfig) -> Result<(), SensorFault> {
        thread::spawn(move || apply_thread_policy(&policy))
            .join()
            .unwrap()
    }

    #[test]
    fn refused_priority_is_fatal_when_required() {
        // Far outside the SCHED_FIFO range, rejected with EINVAL for everyone
        let err = apply_on_thread(policy(10_000, true)).unwrap_err();
        assert!(matches!(
            err,
            SensorFault::RealtimePriority { priority: 10_000, .. }
        ));
    }

    #[test]
    fn refused_priority_only_warns_when_optional() {
        assert!(apply_on_thread(policy(10_000, false)).is_ok());
    }

    #[test]
    fn zero_priority_skips_the_scheduler() {
        assert!(apply_on_thread(policy(0, true)).is_ok());
    }

    #[test]
    fn realtime_is_required_by_default() {
        assert!(Config::default().thread.require_realtime);
    }
}
