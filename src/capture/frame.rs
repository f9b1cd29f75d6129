use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use v4l::FourCC;

/// Captured frame, owned by the capture path between `get_frame` and `put_frame`
#[derive(Debug)]
pub struct Frame {
    /// Device buffer slot this frame came from
    pub index: u32,

    /// Pixel data. After normalization and correction only the luma plane
    /// of the output geometry is left in here.
    pub data: BytesMut,

    /// Monotonic capture timestamp in microseconds
    pub timestamp_us: u64,

    pub sequence: u64,
}

/// Pixel formats the pipeline knows how to feed to the flow engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    /// Planar luma followed by interleaved chroma
    Nv12,
    /// Luma only
    Grey,
    /// Interleaved luma/chroma, needs conversion
    Yuyv,
}

impl PixelFormat {
    pub fn fourcc(self) -> FourCC {
        match self {
            PixelFormat::Nv12 => FourCC::new(b"NV12"),
            PixelFormat::Grey => FourCC::new(b"GREY"),
            PixelFormat::Yuyv => FourCC::new(b"YUYV"),
        }
    }

    pub fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        match &fourcc.repr {
            b"NV12" => Some(PixelFormat::Nv12),
            b"GREY" => Some(PixelFormat::Grey),
            b"YUYV" => Some(PixelFormat::Yuyv),
            _ => None,
        }
    }

    /// Whether the flow engine can consume this format without conversion
    pub fn has_planar_luma(self) -> bool {
        matches!(self, PixelFormat::Nv12 | PixelFormat::Grey)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fourcc_round_trips_known_formats() {
        for fmt in [PixelFormat::Nv12, PixelFormat::Grey, PixelFormat::Yuyv] {
            assert_eq!(PixelFormat::from_fourcc(fmt.fourcc()), Some(fmt));
        }
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"MJPG")), None);
    }

    #[test]
    fn only_nv12_and_grey_skip_conversion() {
        assert!(PixelFormat::Nv12.has_planar_luma());
        assert!(PixelFormat::Grey.has_planar_luma());
        assert!(!PixelFormat::Yuyv.has_planar_luma());
    }
}
