//! V4L2 capture backend

use std::os::fd::RawFd;
use std::time::Instant;

use bytes::BytesMut;
use tracing::{debug, info, instrument, warn};
use v4l::buffer::{Metadata, Type};
use v4l::capability::Flags as CapFlags;
use v4l::io::traits::{CaptureStream, Stream as _};
use v4l::prelude::{MmapStream, UserptrStream};
use v4l::video::Capture;
use v4l::Device;

use crate::capture::frame::{Frame, PixelFormat};
use crate::capture::{CropRect, FormatRequest, MemoryMode, NegotiatedFormat, VideoDevice};
use crate::error::CaptureError;

const V4L2_BUF_TYPE_VIDEO_CAPTURE: u32 = 1;

#[repr(C)]
struct V4l2Rect {
    left: i32,
    top: i32,
    width: u32,
    height: u32,
}

#[repr(C)]
struct V4l2Crop {
    kind: u32,
    c: V4l2Rect,
}

nix::ioctl_write_ptr!(vidioc_s_crop, b'V', 60, V4l2Crop);

enum CaptureStreamKind {
    Mmap(MmapStream<'static>),
    UserPtr(UserptrStream),
}

impl CaptureStreamKind {
    fn start(&mut self) -> std::io::Result<()> {
        match self {
            CaptureStreamKind::Mmap(s) => s.start(),
            CaptureStreamKind::UserPtr(s) => s.start(),
        }
    }

    fn next(&mut self) -> std::io::Result<(&[u8], &Metadata)> {
        match self {
            CaptureStreamKind::Mmap(s) => s.next(),
            CaptureStreamKind::UserPtr(s) => s.next(),
        }
    }
}

/// V4L2 video capture device
pub struct V4l2Device {
    device: Box<Device>,
    path: String,
    memory: MemoryMode,
    stream: Option<CaptureStreamKind>,
    negotiated: Option<NegotiatedFormat>,
    buffer_count: u32,
    /// Buffers returned through `put_frame`, reused for the next frames
    free: Vec<BytesMut>,
    sequence: u64,
    opened_at: Instant,
}

impl V4l2Device {
    #[instrument]
    pub fn open(path: &str, memory: MemoryMode) -> Result<Self, CaptureError> {
        let device = Device::with_path(path)?;

        let caps = device.query_caps()?;
        info!("Video device {}: {} ({})", path, caps.card, caps.driver);

        if !caps.capabilities.contains(CapFlags::VIDEO_CAPTURE) {
            return Err(CaptureError::Unsupported("video capture"));
        }
        if !caps.capabilities.contains(CapFlags::STREAMING) {
            return Err(CaptureError::Unsupported("streaming I/O"));
        }

        Ok(Self {
            device: Box::new(device),
            path: path.to_owned(),
            memory,
            stream: None,
            negotiated: None,
            buffer_count: 0,
            free: Vec::new(),
            sequence: 0,
            opened_at: Instant::now(),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn fd(&self) -> RawFd {
        self.device.handle().fd()
    }

    fn timestamp_us(&self, sec: i64, usec: i64) -> u64 {
        let sec = sec.max(0) as u64;
        let usec = usec.max(0) as u64;
        if sec == 0 && usec == 0 {
            // Driver doesn't stamp buffers
            return self.opened_at.elapsed().as_micros() as u64;
        }
        sec * 1_000_000 + usec
    }
}

impl VideoDevice for V4l2Device {
    fn pixel_formats(&self) -> Result<Vec<PixelFormat>, CaptureError> {
        let formats = self
            .device
            .enum_formats()?
            .into_iter()
            .filter_map(|desc| {
                let known = PixelFormat::from_fourcc(desc.fourcc);
                debug!("Device format {} -> {:?}", desc.fourcc, known);
                known
            })
            .collect();
        Ok(formats)
    }

    fn set_format(&mut self, request: FormatRequest) -> Result<NegotiatedFormat, CaptureError> {
        let mut fmt = self.device.format()?;
        fmt.width = request.width;
        fmt.height = request.height;
        fmt.fourcc = request.format.fourcc();

        let applied = self.device.set_format(&fmt)?;
        // Drivers may substitute a format we can't handle; let the caller reject it
        let format = PixelFormat::from_fourcc(applied.fourcc)
            .ok_or_else(|| CaptureError::UnsupportedFourcc(applied.fourcc.to_string()))?;

        let negotiated = NegotiatedFormat {
            width: applied.width,
            height: applied.height,
            format,
            bytes_per_line: applied.stride,
            size_image: applied.size,
        };
        info!(
            "Video format {}x{} {:?} (stride {}, {} bytes)",
            negotiated.width,
            negotiated.height,
            negotiated.format,
            negotiated.bytes_per_line,
            negotiated.size_image
        );
        self.negotiated = Some(negotiated);
        Ok(negotiated)
    }

    fn set_crop(&mut self, rect: CropRect) -> Result<(), CaptureError> {
        let crop = V4l2Crop {
            kind: V4L2_BUF_TYPE_VIDEO_CAPTURE,
            c: V4l2Rect {
                left: rect.left as i32,
                top: rect.top as i32,
                width: rect.width,
                height: rect.height,
            },
        };
        // SAFETY: `crop` is a valid v4l2_crop for the duration of the call
        unsafe { vidioc_s_crop(self.fd(), &crop) }.map_err(|source| CaptureError::Ioctl {
            name: "VIDIOC_S_CROP",
            source,
        })?;
        Ok(())
    }

    fn allocate_buffers(&mut self, count: u32) -> Result<(), CaptureError> {
        let stream = match self.memory {
            MemoryMode::Mmap => CaptureStreamKind::Mmap(MmapStream::with_buffers(
                &self.device,
                Type::VideoCapture,
                count,
            )?),
            MemoryMode::UserPtr => CaptureStreamKind::UserPtr(UserptrStream::with_buffers(
                &self.device,
                Type::VideoCapture,
                count,
            )?),
        };

        let size = self
            .negotiated
            .map(|n| n.size_image as usize)
            .unwrap_or_default();
        self.free = (0..count).map(|_| BytesMut::with_capacity(size)).collect();
        self.buffer_count = count;
        self.stream = Some(stream);
        info!("Allocated {} {:?} capture buffers", count, self.memory);
        Ok(())
    }

    fn start(&mut self) -> Result<(), CaptureError> {
        self.stream
            .as_mut()
            .ok_or(CaptureError::NotStreaming)?
            .start()?;
        info!("Capture started on {}", self.path);
        Ok(())
    }

    fn get_frame(&mut self) -> Result<Frame, CaptureError> {
        let stream = self.stream.as_mut().ok_or(CaptureError::NotStreaming)?;
        let (buf, meta) = stream.next()?;
        let (sec, usec) = (meta.timestamp.sec as i64, meta.timestamp.usec as i64);

        let mut data = self.free.pop().unwrap_or_else(|| {
            warn!("Capture buffer pool exhausted, allocating");
            BytesMut::with_capacity(buf.len())
        });
        data.clear();
        data.extend_from_slice(buf);

        let index = (self.sequence % u64::from(self.buffer_count.max(1))) as u32;
        self.sequence += 1;

        Ok(Frame {
            index,
            data,
            timestamp_us: self.timestamp_us(sec, usec),
            sequence: self.sequence,
        })
    }

    fn put_frame(&mut self, frame: Frame) {
        if self.free.len() < self.buffer_count as usize {
            self.free.push(frame.data);
        }
    }
}
