//! V4L2 camera sensor subdevice (format configuration at the sensor)

use std::fs::{File, OpenOptions};
use std::os::fd::AsRawFd;

use tracing::{info, instrument};

use crate::error::CaptureError;

/// Media bus code for UYVY 8-bit, 2 samples per pixel
pub const MEDIA_BUS_FMT_UYVY8_2X8: u32 = 0x2006;

const V4L2_SUBDEV_FORMAT_ACTIVE: u32 = 1;
const V4L2_FIELD_NONE: u32 = 1;

#[repr(C)]
#[derive(Default)]
struct V4l2MbusFramefmt {
    width: u32,
    height: u32,
    code: u32,
    field: u32,
    colorspace: u32,
    ycbcr_enc: u16,
    quantization: u16,
    xfer_func: u16,
    flags: u16,
    reserved: [u16; 10],
}

#[repr(C)]
#[derive(Default)]
struct V4l2SubdevFormat {
    which: u32,
    pad: u32,
    format: V4l2MbusFramefmt,
    stream: u32,
    reserved: [u32; 7],
}

nix::ioctl_readwrite!(vidioc_subdev_s_fmt, b'V', 5, V4l2SubdevFormat);

/// Sensor-side format control
pub trait SensorSubdevice {
    fn set_format(&mut self, width: u32, height: u32, mbus_code: u32) -> Result<(), CaptureError>;
}

/// Subdevice node such as `/dev/v4l-subdev0`
pub struct SubdevNode {
    file: File,
}

impl SubdevNode {
    #[instrument]
    pub fn open(path: &str) -> Result<Self, CaptureError> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self { file })
    }
}

impl SensorSubdevice for SubdevNode {
    fn set_format(&mut self, width: u32, height: u32, mbus_code: u32) -> Result<(), CaptureError> {
        let mut fmt = V4l2SubdevFormat {
            which: V4L2_SUBDEV_FORMAT_ACTIVE,
            format: V4l2MbusFramefmt {
                width,
                height,
                code: mbus_code,
                field: V4L2_FIELD_NONE,
                ..Default::default()
            },
            ..Default::default()
        };

        // SAFETY: `fmt` is a valid v4l2_subdev_format for the duration of the call
        unsafe { vidioc_subdev_s_fmt(self.file.as_raw_fd(), &mut fmt) }.map_err(|source| {
            CaptureError::Ioctl {
                name: "VIDIOC_SUBDEV_S_FMT",
                source,
            }
        })?;

        info!(
            "Sensor format {}x{} code {:#x} (applied {}x{})",
            width, height, mbus_code, fmt.format.width, fmt.format.height
        );
        Ok(())
    }
}
