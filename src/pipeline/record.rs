//! Appends corrected frames to a file for offline analysis and replay

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use tracing::{info, warn};

use crate::gyro::GyroRate;

/// Bytes of packed metadata after each frame: timestamp + 3 gyro floats
pub const METADATA_LEN: usize = 16;

pub struct FrameRecorder {
    out: Option<BufWriter<File>>,
    with_metadata: bool,
}

impl FrameRecorder {
    pub fn create(path: &Path, with_metadata: bool) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        info!("Recording frames to {}", path.display());
        Ok(Self {
            out: Some(BufWriter::new(file)),
            with_metadata,
        })
    }

    pub fn is_active(&self) -> bool {
        self.out.is_some()
    }

    /// Record one frame. A write error stops recording for good.
    pub fn record(&mut self, luma: &[u8], timestamp_us: u64, gyro: GyroRate) {
        let Some(out) = self.out.as_mut() else {
            return;
        };
        if let Err(e) = write_record(out, luma, timestamp_us, gyro, self.with_metadata) {
            warn!("Frame recording stopped: {}", e);
            self.out = None;
        }
    }
}

fn write_record(
    out: &mut impl Write,
    luma: &[u8],
    timestamp_us: u64,
    gyro: GyroRate,
    with_metadata: bool,
) -> io::Result<()> {
    out.write_all(luma)?;
    if with_metadata {
        let mut meta = [0u8; METADATA_LEN];
        // Wraps after ~71 minutes, like the device timestamps it mirrors
        meta[0..4].copy_from_slice(&(timestamp_us as u32).to_le_bytes());
        meta[4..8].copy_from_slice(&gyro.x.to_le_bytes());
        meta[8..12].copy_from_slice(&gyro.y.to_le_bytes());
        meta[12..16].copy_from_slice(&gyro.z.to_le_bytes());
        out.write_all(&meta)?;
    }
    out.flush()
}
