//! Per-board camera bring-up, chosen once from the configuration

pub mod bebop;
pub mod generic;
pub mod pwm;

use crate::capture::PixelFormat;
use crate::error::SensorFault;
use crate::{CaptureConfig, Platform};

pub use bebop::Bebop;
pub use generic::Generic;

pub trait CameraPlatform: Send {
    fn name(&self) -> &'static str;

    /// Power, clock and sensor setup before the video device is configured
    fn prepare(&mut self) -> Result<(), SensorFault>;

    /// Pick the capture format among the ones the video device offers
    fn choose_format(&self, available: &[PixelFormat]) -> Option<PixelFormat>;
}

pub fn for_config(config: &CaptureConfig) -> Box<dyn CameraPlatform> {
    match config.platform {
        Platform::Generic => Box::new(Generic),
        Platform::Bebop => Box::new(Bebop::new(config)),
    }
}
