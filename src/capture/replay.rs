//! Frame source backed by memory or by a recording made with `FrameRecorder`

use std::collections::VecDeque;
use std::fs;
use std::path::Path;

use bytes::BytesMut;
use tracing::info;

use crate::capture::frame::{Frame, PixelFormat};
use crate::capture::{CropRect, FormatRequest, NegotiatedFormat, VideoDevice};
use crate::error::CaptureError;
use crate::pipeline::record::METADATA_LEN;

/// Plays back pre-captured luma frames as if they came from a camera.
///
/// The geometry is fixed by the frames; format requests are answered with
/// that geometry so negotiation behaves like a camera that can't scale.
pub struct ReplayDevice {
    width: u32,
    height: u32,
    format: PixelFormat,
    frames: VecDeque<(u64, Vec<u8>)>,
    started: bool,
    sequence: u64,
    released: u64,
}

impl ReplayDevice {
    /// Frames are `(timestamp_us, pixels)` in capture order
    pub fn from_frames(
        width: u32,
        height: u32,
        format: PixelFormat,
        frames: impl IntoIterator<Item = (u64, Vec<u8>)>,
    ) -> Self {
        Self {
            width,
            height,
            format,
            frames: frames.into_iter().collect(),
            started: false,
            sequence: 0,
            released: 0,
        }
    }

    /// Load a recording of GREY frames of the given geometry
    pub fn open_recording(
        path: &Path,
        width: u32,
        height: u32,
        with_metadata: bool,
    ) -> Result<Self, CaptureError> {
        let bytes = fs::read(path)?;
        let frame_len = width as usize * height as usize;
        let record_len = frame_len + if with_metadata { METADATA_LEN } else { 0 };
        if record_len == 0 {
            return Err(CaptureError::Unsupported("empty frame geometry"));
        }

        let mut frames = VecDeque::with_capacity(bytes.len() / record_len);
        for (i, record) in bytes.chunks_exact(record_len).enumerate() {
            let timestamp = if with_metadata {
                let ts = &record[frame_len..frame_len + 4];
                u64::from(u32::from_le_bytes([ts[0], ts[1], ts[2], ts[3]]))
            } else {
                // No metadata: assume a steady 30 fps
                i as u64 * 33_333
            };
            frames.push_back((timestamp, record[..frame_len].to_vec()));
        }

        info!("Loaded {} frames from {}", frames.len(), path.display());
        Ok(Self::from_frames(width, height, PixelFormat::Grey, frames))
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }

    /// Number of frames handed back through `put_frame`
    pub fn released(&self) -> u64 {
        self.released
    }
}

impl VideoDevice for ReplayDevice {
    fn pixel_formats(&self) -> Result<Vec<PixelFormat>, CaptureError> {
        Ok(vec![self.format])
    }

    fn set_format(&mut self, _request: FormatRequest) -> Result<NegotiatedFormat, CaptureError> {
        let bytes_per_line = match self.format {
            PixelFormat::Yuyv => self.width * 2,
            _ => self.width,
        };
        let size_image = match self.format {
            PixelFormat::Nv12 => self.width * self.height * 3 / 2,
            _ => bytes_per_line * self.height,
        };
        Ok(NegotiatedFormat {
            width: self.width,
            height: self.height,
            format: self.format,
            bytes_per_line,
            size_image,
        })
    }

    fn set_crop(&mut self, _rect: CropRect) -> Result<(), CaptureError> {
        Err(CaptureError::Unsupported("hardware crop"))
    }

    fn allocate_buffers(&mut self, _count: u32) -> Result<(), CaptureError> {
        Ok(())
    }

    fn start(&mut self) -> Result<(), CaptureError> {
        self.started = true;
        Ok(())
    }

    fn get_frame(&mut self) -> Result<Frame, CaptureError> {
        if !self.started {
            return Err(CaptureError::NotStreaming);
        }
        let (timestamp_us, pixels) = self.frames.pop_front().ok_or(CaptureError::EndOfStream)?;
        self.sequence += 1;
        Ok(Frame {
            index: 0,
            data: BytesMut::from(&pixels[..]),
            timestamp_us,
            sequence: self.sequence,
        })
    }

    fn put_frame(&mut self, _frame: Frame) {
        self.released += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_come_back_in_order_then_end() {
        let mut dev = ReplayDevice::from_frames(
            2,
            1,
            PixelFormat::Grey,
            [(100, vec![1, 2]), (200, vec![3, 4])],
        );
        assert!(matches!(dev.get_frame(), Err(CaptureError::NotStreaming)));
        dev.start().unwrap();

        let first = dev.get_frame().unwrap();
        assert_eq!(first.timestamp_us, 100);
        assert_eq!(&first.data[..], &[1, 2]);
        let second = dev.get_frame().unwrap();
        assert_eq!(second.timestamp_us, 200);
        assert!(matches!(dev.get_frame(), Err(CaptureError::EndOfStream)));

        dev.put_frame(first);
        assert_eq!(dev.released(), 1);
    }

    #[test]
    fn refuses_hardware_crop() {
        let mut dev =
            ReplayDevice::from_frames(4, 4, PixelFormat::Grey, Vec::<(u64, Vec<u8>)>::new());
        let crop = CropRect {
            left: 0,
            top: 0,
            width: 2,
            height: 2,
        };
        assert!(matches!(dev.set_crop(crop), Err(CaptureError::Unsupported(_))));
    }
}
