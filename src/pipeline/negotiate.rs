//! Format negotiation and geometry planning at sensor start

use tracing::{debug, info, instrument, warn};

use super::geometry::{Correction, GeometryPlan};
use crate::capture::{CropRect, FormatRequest, PixelFormat, VideoDevice};
use crate::error::{CaptureError, SensorFault};
use crate::platform::CameraPlatform;
use crate::CaptureConfig;

/// Outcome of bringing a video device up for the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Negotiated {
    pub format: PixelFormat,
    pub plan: GeometryPlan,
    /// Row stride of the frames handed to the flow engine
    pub stride: u32,
    pub hardware_crop: bool,
}

/// Configure `device` and start capture.
///
/// Every failure here is fatal: a sensor that isn't configured exactly as
/// planned must not produce motion data.
#[instrument(skip_all, fields(platform = platform.name()))]
pub fn negotiate<D: VideoDevice + ?Sized>(
    device: &mut D,
    platform: &dyn CameraPlatform,
    config: &CaptureConfig,
) -> Result<Negotiated, SensorFault> {
    let available = device
        .pixel_formats()
        .map_err(SensorFault::FormatNegotiation)?;
    debug!("Device formats: {:?}", available);
    let wanted = platform
        .choose_format(&available)
        .ok_or(SensorFault::NoUsableFormat)?;

    let out_w = config.output_width;
    let out_h = config.output_height;
    let negotiated = device
        .set_format(FormatRequest {
            width: out_w,
            height: out_h,
            format: wanted,
        })
        .map_err(|e| match e {
            CaptureError::UnsupportedFourcc(fourcc) => SensorFault::UnsupportedFormat(fourcc),
            other => SensorFault::FormatNegotiation(other),
        })?;

    let shrink = (negotiated.width, negotiated.height) != (out_w, out_h);

    // Square window in the middle of the sensor, dropping the lateral edges
    let crop = CropRect {
        left: config.sensor_width.saturating_sub(config.sensor_height) / 2,
        top: 0,
        width: config.crop_width,
        height: config.crop_height,
    };
    let hardware_crop = match device.set_crop(crop) {
        Ok(()) => true,
        Err(e) => {
            debug!("Hardware crop unavailable ({}), cropping in software", e);
            false
        }
    };

    let geometry_fault = || SensorFault::Geometry {
        camera_width: negotiated.width,
        camera_height: negotiated.height,
        output_width: out_w,
        output_height: out_h,
    };
    // Shrinking already selects a centered region, so it wins over cropping
    let plan = if shrink {
        GeometryPlan::shrink(negotiated.width, negotiated.height, out_w, out_h)
            .ok_or_else(geometry_fault)?
    } else if !hardware_crop {
        GeometryPlan::crop(negotiated.width, negotiated.height, out_w, out_h)
            .ok_or_else(geometry_fault)?
    } else {
        GeometryPlan::passthrough(out_w, out_h)
    };

    let stride = if plan.correction == Correction::None && negotiated.format.has_planar_luma() {
        negotiated.bytes_per_line.max(out_w)
    } else {
        out_w
    };

    if negotiated.format == PixelFormat::Yuyv {
        warn!("Camera only offers YUYV, converting every frame to luma");
    }
    info!(
        "Camera {}x{} {:?} -> {}x{} ({:?}, hardware crop: {})",
        plan.camera_width,
        plan.camera_height,
        negotiated.format,
        out_w,
        out_h,
        plan.correction,
        hardware_crop
    );

    device
        .allocate_buffers(config.buffer_count)
        .map_err(|source| SensorFault::BufferAllocation {
            count: config.buffer_count,
            source,
        })?;
    device.start().map_err(SensorFault::StreamStart)?;

    Ok(Negotiated {
        format: negotiated.format,
        plan,
        stride,
        hardware_crop,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::frame::Frame;
    use crate::capture::{NegotiatedFormat, ReplayDevice};
    use crate::platform::Generic;
    use crate::Config;

    fn config() -> CaptureConfig {
        Config::default().capture
    }

    /// Camera with fixed geometry that may support hardware crop
    struct FixedCamera {
        width: u32,
        height: u32,
        formats: Vec<PixelFormat>,
        crop_supported: bool,
        allocated: Option<u32>,
        started: bool,
    }

    impl FixedCamera {
        fn new(width: u32, height: u32, crop_supported: bool) -> Self {
            Self {
                width,
                height,
                formats: vec![PixelFormat::Yuyv, PixelFormat::Grey],
                crop_supported,
                allocated: None,
                started: false,
            }
        }
    }

    impl VideoDevice for FixedCamera {
        fn pixel_formats(&self) -> Result<Vec<PixelFormat>, CaptureError> {
            Ok(self.formats.clone())
        }

        fn set_format(&mut self, request: FormatRequest) -> Result<NegotiatedFormat, CaptureError> {
            Ok(NegotiatedFormat {
                width: self.width,
                height: self.height,
                format: request.format,
                bytes_per_line: self.width,
                size_image: self.width * self.height,
            })
        }

        fn set_crop(&mut self, _rect: CropRect) -> Result<(), CaptureError> {
            if self.crop_supported {
                Ok(())
            } else {
                Err(CaptureError::Unsupported("crop"))
            }
        }

        fn allocate_buffers(&mut self, count: u32) -> Result<(), CaptureError> {
            self.allocated = Some(count);
            Ok(())
        }

        fn start(&mut self) -> Result<(), CaptureError> {
            self.started = true;
            Ok(())
        }

        fn get_frame(&mut self) -> Result<Frame, CaptureError> {
            Err(CaptureError::EndOfStream)
        }

        fn put_frame(&mut self, _frame: Frame) {}
    }

    #[test]
    fn exact_geometry_with_hardware_crop_needs_no_correction() {
        let mut cam = FixedCamera::new(64, 64, true);
        let n = negotiate(&mut cam, &Generic, &config()).unwrap();
        assert_eq!(n.format, PixelFormat::Grey);
        assert_eq!(n.plan.correction, Correction::None);
        assert!(n.hardware_crop);
        assert_eq!(cam.allocated, Some(8));
        assert!(cam.started);
    }

    #[test]
    fn larger_camera_is_shrunk_even_with_hardware_crop() {
        let mut cam = FixedCamera::new(320, 240, true);
        let n = negotiate(&mut cam, &Generic, &config()).unwrap();
        assert!(matches!(n.plan.correction, Correction::Shrink { scale: 3, .. }));
        assert_eq!(n.stride, 64);
    }

    #[test]
    fn exact_geometry_without_hardware_crop_is_cropped_in_place() {
        let mut cam = FixedCamera::new(64, 64, false);
        let n = negotiate(&mut cam, &Generic, &config()).unwrap();
        assert_eq!(n.plan.correction, Correction::Crop { left: 0, top: 0 });
        assert!(!n.hardware_crop);
    }

    #[test]
    fn small_camera_is_fatal() {
        let mut cam = FixedCamera::new(32, 32, false);
        let err = negotiate(&mut cam, &Generic, &config()).unwrap_err();
        assert!(matches!(err, SensorFault::Geometry { camera_width: 32, .. }));
        assert_eq!(cam.allocated, None);
    }

    #[test]
    fn no_usable_format_is_fatal() {
        let mut cam = FixedCamera::new(64, 64, true);
        cam.formats.clear();
        assert!(matches!(
            negotiate(&mut cam, &Generic, &config()),
            Err(SensorFault::NoUsableFormat)
        ));
    }

    #[test]
    fn replay_device_shrinks_by_one_when_slightly_larger() {
        let frames: Vec<(u64, Vec<u8>)> = Vec::new();
        let mut replay = ReplayDevice::from_frames(128, 96, PixelFormat::Grey, frames);
        let n = negotiate(&mut replay, &Generic, &config()).unwrap();
        assert_eq!(n.plan.camera_width, 128);
        assert_eq!(
            n.plan.correction,
            Correction::Shrink {
                scale: 1,
                left: 32,
                top: 16,
                region_width: 64,
                region_height: 64,
            }
        );
    }
}
