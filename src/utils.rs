use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use tracing::info;
use v4l::{capability::Flags, video::Capture, Device};

use crate::capture::frame::PixelFormat;

// Detected capture device info
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoundDevice {
    pub path: String,
    pub format: PixelFormat,
}

impl FoundDevice {
    pub fn new(path: String, format: PixelFormat) -> Self {
        Self { path, format }
    }
}

/// Find the first capture device offering a format the flow pipeline can use
pub fn auto_detect_device() -> Result<FoundDevice> {
    use std::path::Path;

    info!("Auto-detecting capture devices...");

    for i in 0..10 {
        let path = format!("/dev/video{}", i);
        if !Path::new(&path).exists() {
            continue;
        }

        let Ok(dev) = Device::with_path(&path) else {
            continue;
        };
        let Ok(caps) = dev.query_caps() else {
            continue;
        };
        if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
            continue;
        }

        if let Ok(formats) = dev.enum_formats() {
            let usable: Vec<PixelFormat> = formats
                .iter()
                .filter_map(|fmt| PixelFormat::from_fourcc(fmt.fourcc))
                .collect();
            // Same preference as negotiation: planar luma first
            let best = usable
                .iter()
                .copied()
                .find(|f| f.has_planar_luma())
                .or_else(|| usable.first().copied());
            if let Some(format) = best {
                info!("Found {:?} device: {} - {}", format, path, caps.card);
                return Ok(FoundDevice::new(path, format));
            }
        }
    }

    Err(eyre!("No suitable capture device found"))
}
