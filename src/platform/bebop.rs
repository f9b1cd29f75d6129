//! Boards with a PWM-clocked camera sensor behind a V4L2 subdevice

use std::path::PathBuf;

use tracing::info;

use super::pwm::{PowerControl, SysfsPwm};
use super::CameraPlatform;
use crate::capture::subdev::{SubdevNode, MEDIA_BUS_FMT_UYVY8_2X8};
use crate::capture::{PixelFormat, SensorSubdevice};
use crate::error::SensorFault;
use crate::CaptureConfig;

pub struct Bebop {
    clock_chip: PathBuf,
    clock_channel: u32,
    clock_hz: u32,
    subdev: String,
    sensor_width: u32,
    sensor_height: u32,
}

impl Bebop {
    pub fn new(config: &CaptureConfig) -> Self {
        Self {
            clock_chip: config.camera_clock.chip.clone(),
            clock_channel: config.camera_clock.channel,
            clock_hz: config.camera_clock.freq_hz,
            subdev: config.subdev.clone(),
            sensor_width: config.sensor_width,
            sensor_height: config.sensor_height,
        }
    }
}

impl CameraPlatform for Bebop {
    fn name(&self) -> &'static str {
        "bebop"
    }

    fn prepare(&mut self) -> Result<(), SensorFault> {
        let clock_fault = |e: std::io::Error| SensorFault::Platform(format!("camera clock: {e}"));
        let mut clock = SysfsPwm::open(&self.clock_chip, self.clock_channel).map_err(clock_fault)?;
        clock.set_freq(self.clock_hz).map_err(clock_fault)?;
        clock.enable(true).map_err(clock_fault)?;
        info!("Camera clock at {} Hz", self.clock_hz);

        let mut sensor = SubdevNode::open(&self.subdev)
            .map_err(|e| SensorFault::Platform(format!("{}: {e}", self.subdev)))?;
        sensor
            .set_format(self.sensor_width, self.sensor_height, MEDIA_BUS_FMT_UYVY8_2X8)
            .map_err(|e| SensorFault::Platform(format!("couldn't set subdev fmt: {e}")))
    }

    fn choose_format(&self, _available: &[PixelFormat]) -> Option<PixelFormat> {
        Some(PixelFormat::Nv12)
    }
}
