use tracing::debug;

use super::CameraPlatform;
use crate::capture::PixelFormat;
use crate::error::SensorFault;

/// Any V4L2 camera; nothing to bring up
#[derive(Debug, Default, Clone, Copy)]
pub struct Generic;

impl CameraPlatform for Generic {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn prepare(&mut self) -> Result<(), SensorFault> {
        Ok(())
    }

    /// First planar-luma format wins; YUYV is kept only as a fallback
    fn choose_format(&self, available: &[PixelFormat]) -> Option<PixelFormat> {
        let mut chosen = None;
        for &format in available {
            if format.has_planar_luma() {
                return Some(format);
            }
            if format == PixelFormat::Yuyv {
                debug!("YUYV available, looking for a format without conversion");
                chosen = Some(format);
            }
        }
        chosen
    }
}
