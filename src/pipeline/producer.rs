//! The capture loop: frames in, flow integral out

use std::time::Instant;

use tracing::{debug, error, info};

use super::accumulator::{FlowSample, IntegralWriter};
use super::geometry::{Correction, GeometryPlan};
use super::negotiate::Negotiated;
use super::record::FrameRecorder;
use crate::capture::convert::normalize_in_place;
use crate::capture::{Frame, PixelFormat, VideoDevice};
use crate::error::SensorFault;
use crate::flow::FlowEngine;
use crate::gyro::{GyroRate, GyroSource};

/// Producer half of the sensor. Owns the device, the flow engine and the
/// gyro source; publishes into the accumulator.
pub struct CaptureLoop<D, F, G> {
    device: D,
    flow: F,
    gyro: G,
    format: PixelFormat,
    plan: GeometryPlan,
    focal_length_px: f32,
    /// Bytes handed to the flow engine per frame
    luma_len: usize,
    min_frame_len: usize,
    convert_buffer: Vec<u8>,
    output_buffer: Vec<u8>,
    writer: IntegralWriter,
    recorder: Option<FrameRecorder>,
    prev_frame: Option<Frame>,
    prev_gyro: GyroRate,
}

impl<D, F, G> CaptureLoop<D, F, G>
where
    D: VideoDevice,
    F: FlowEngine,
    G: GyroSource,
{
    pub fn new(
        device: D,
        flow: F,
        gyro: G,
        negotiated: &Negotiated,
        focal_length_px: f32,
        writer: IntegralWriter,
    ) -> Self {
        let plan = negotiated.plan;
        let camera_pixels = plan.camera_len();
        let luma_len = negotiated.stride as usize * plan.output_height as usize;

        let convert_buffer = if negotiated.format == PixelFormat::Yuyv {
            vec![0; camera_pixels]
        } else {
            Vec::new()
        };
        let output_buffer = if plan.correction != Correction::None {
            vec![0; plan.output_len()]
        } else {
            Vec::new()
        };
        let min_frame_len = match negotiated.format {
            PixelFormat::Yuyv => camera_pixels * 2,
            _ => camera_pixels.max(luma_len),
        };

        Self {
            device,
            flow,
            gyro,
            format: negotiated.format,
            plan,
            focal_length_px,
            luma_len,
            min_frame_len,
            convert_buffer,
            output_buffer,
            writer,
            recorder: None,
            prev_frame: None,
            prev_gyro: GyroRate::default(),
        }
    }

    pub fn with_recorder(mut self, recorder: FrameRecorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// Process one frame from the device.
    ///
    /// Returns the contribution added to the accumulator, or `None` for the
    /// first frame, which only seeds the frame pair.
    pub fn step(&mut self) -> Result<Option<FlowSample>, SensorFault> {
        let mut frame = self
            .device
            .get_frame()
            .map_err(SensorFault::FrameAcquisition)?;
        self.writer.frame_captured();
        metrics::counter!("optflow_frames_total").increment(1);

        if frame.data.len() < self.min_frame_len {
            let got = frame.data.len();
            self.device.put_frame(frame);
            return Err(SensorFault::ShortFrame {
                expected: self.min_frame_len,
                got,
            });
        }

        normalize_in_place(
            &mut frame.data,
            self.format,
            self.plan.camera_len(),
            &mut self.convert_buffer,
        );
        self.plan.apply(&mut frame.data, &mut self.output_buffer);

        // A flow computation needs a pair
        let Some(prev) = self.prev_frame.take() else {
            debug!("First frame at {} us", frame.timestamp_us);
            self.prev_frame = Some(frame);
            return Ok(None);
        };

        // Sampled once per pair; the first pair integrates from a zero rate
        let gyro = self.gyro.rate();
        if let Some(recorder) = self.recorder.as_mut() {
            recorder.record(&frame.data[..self.luma_len], frame.timestamp_us, gyro);
        }

        let elapsed_us = frame.timestamp_us.saturating_sub(prev.timestamp_us);
        let compute_start = Instant::now();
        let result = self.flow.compute_flow(
            &prev.data[..self.luma_len],
            &frame.data[..self.luma_len],
            u32::try_from(elapsed_us).unwrap_or(u32::MAX),
        );
        metrics::histogram!("optflow_flow_compute_us")
            .record(compute_start.elapsed().as_micros() as f64);
        metrics::gauge!("optflow_quality").set(f64::from(result.quality));

        let gyro_integral = GyroRate::trapezoid(self.prev_gyro, gyro, elapsed_us as f32);
        let sample = FlowSample {
            flow_x: result.flow_x / self.focal_length_px,
            flow_y: result.flow_y / self.focal_length_px,
            gyro_x: gyro_integral.x,
            gyro_y: gyro_integral.y,
            elapsed_us,
            quality: result.quality,
        };
        self.writer.add(&sample);
        metrics::counter!("optflow_flow_pairs_total").increment(1);

        self.device.put_frame(prev);
        self.prev_frame = Some(frame);
        self.prev_gyro = gyro;
        Ok(Some(sample))
    }

    /// Run until the first fatal fault, which is returned to the caller
    pub fn run(mut self) -> SensorFault {
        info!("Optical flow capture running");
        loop {
            if let Err(fault) = self.step() {
                error!("Optical flow capture stopped: {}", fault);
                if let Some(prev) = self.prev_frame.take() {
                    self.device.put_frame(prev);
                }
                return fault;
            }
        }
    }
}
