//! Error types for the capture layer and the fatal sensor faults built on top of it

use std::io;

use thiserror::Error;

/// Errors reported by a capture backend
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("ioctl {name} failed: {source}")]
    Ioctl {
        name: &'static str,
        #[source]
        source: nix::Error,
    },

    #[error("operation not supported by this device: {0}")]
    Unsupported(&'static str),

    #[error("device switched to pixel format {0}")]
    UnsupportedFourcc(String),

    #[error("capture not started")]
    NotStreaming,

    #[error("end of stream")]
    EndOfStream,
}

/// Fatal faults of the optical-flow sensor.
///
/// None of these are retried: the supervisor decides what to do with the
/// sensor (the binary exits).
#[derive(Debug, Error)]
pub enum SensorFault {
    #[error("couldn't open video device {path}: {source}")]
    DeviceOpen {
        path: String,
        #[source]
        source: CaptureError,
    },

    #[error("device offers no usable pixel format")]
    NoUsableFormat,

    #[error("couldn't set video format: {0}")]
    FormatNegotiation(#[source] CaptureError),

    #[error("negotiated pixel format {0} is not supported")]
    UnsupportedFormat(String),

    #[error("camera output {camera_width}x{camera_height} is smaller than {output_width}x{output_height}")]
    Geometry {
        camera_width: u32,
        camera_height: u32,
        output_width: u32,
        output_height: u32,
    },

    #[error("couldn't allocate {count} video buffers: {source}")]
    BufferAllocation {
        count: u32,
        #[source]
        source: CaptureError,
    },

    #[error("couldn't start capture: {0}")]
    StreamStart(#[source] CaptureError),

    #[error("platform bring-up failed: {0}")]
    Platform(String),

    #[error("couldn't spawn capture thread: {0}")]
    ThreadSpawn(#[source] io::Error),

    #[error("couldn't set realtime priority {priority}: {source}")]
    RealtimePriority {
        priority: i32,
        #[source]
        source: io::Error,
    },

    #[error("couldn't get frame: {0}")]
    FrameAcquisition(#[source] CaptureError),

    #[error("frame holds {got} bytes, expected at least {expected}")]
    ShortFrame { expected: usize, got: usize },
}
