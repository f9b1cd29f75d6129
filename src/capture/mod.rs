pub mod convert;
pub mod frame;
pub mod replay;
pub mod subdev;
pub mod v4l2;

use serde::{Deserialize, Serialize};

use crate::error::CaptureError;

pub use frame::Frame;
pub use frame::PixelFormat;
pub use replay::ReplayDevice;
pub use subdev::SensorSubdevice;
pub use v4l2::V4l2Device;

/// How frame buffers are shared with the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryMode {
    Mmap,
    UserPtr,
}

/// Requested capture format. The device may refine every field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatRequest {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

/// Format the device actually agreed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiatedFormat {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub bytes_per_line: u32,
    pub size_image: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

/// A camera capture backend.
///
/// Frames handed out by `get_frame` stay owned by the caller until they are
/// given back with `put_frame`.
pub trait VideoDevice: Send {
    fn pixel_formats(&self) -> Result<Vec<PixelFormat>, CaptureError>;

    fn set_format(&mut self, request: FormatRequest) -> Result<NegotiatedFormat, CaptureError>;

    /// Hardware crop. Backends without crop support return `Unsupported`.
    fn set_crop(&mut self, rect: CropRect) -> Result<(), CaptureError>;

    fn allocate_buffers(&mut self, count: u32) -> Result<(), CaptureError>;

    fn start(&mut self) -> Result<(), CaptureError>;

    /// Block until the next frame is available
    fn get_frame(&mut self) -> Result<Frame, CaptureError>;

    fn put_frame(&mut self, frame: Frame);
}

impl<D: VideoDevice + ?Sized> VideoDevice for Box<D> {
    fn pixel_formats(&self) -> Result<Vec<PixelFormat>, CaptureError> {
        (**self).pixel_formats()
    }

    fn set_format(&mut self, request: FormatRequest) -> Result<NegotiatedFormat, CaptureError> {
        (**self).set_format(request)
    }

    fn set_crop(&mut self, rect: CropRect) -> Result<(), CaptureError> {
        (**self).set_crop(rect)
    }

    fn allocate_buffers(&mut self, count: u32) -> Result<(), CaptureError> {
        (**self).allocate_buffers(count)
    }

    fn start(&mut self) -> Result<(), CaptureError> {
        (**self).start()
    }

    fn get_frame(&mut self) -> Result<Frame, CaptureError> {
        (**self).get_frame()
    }

    fn put_frame(&mut self, frame: Frame) {
        (**self).put_frame(frame)
    }
}
