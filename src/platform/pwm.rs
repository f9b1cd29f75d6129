//! Sysfs PWM, used to clock the camera sensor

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Camera power / clock control
pub trait PowerControl {
    fn set_freq(&mut self, hz: u32) -> io::Result<()>;
    fn enable(&mut self, on: bool) -> io::Result<()>;
}

pub struct SysfsPwm {
    chip: PathBuf,
    channel: u32,
}

impl SysfsPwm {
    /// Export `channel` of `chip` if it isn't already
    pub fn open(chip: &Path, channel: u32) -> io::Result<Self> {
        let pwm = Self {
            chip: chip.to_path_buf(),
            channel,
        };
        if !pwm.channel_dir().exists() {
            debug!("Exporting PWM {} of {}", channel, chip.display());
            fs::write(chip.join("export"), channel.to_string())?;
        }
        Ok(pwm)
    }

    fn channel_dir(&self) -> PathBuf {
        self.chip.join(format!("pwm{}", self.channel))
    }

    fn write_attr(&self, attr: &str, value: impl ToString) -> io::Result<()> {
        fs::write(self.channel_dir().join(attr), value.to_string())
    }
}

/// Period of a `hz` signal in nanoseconds
pub fn period_ns(hz: u32) -> u64 {
    if hz == 0 {
        return 0;
    }
    1_000_000_000 / u64::from(hz)
}

impl PowerControl for SysfsPwm {
    fn set_freq(&mut self, hz: u32) -> io::Result<()> {
        let period = period_ns(hz);
        self.write_attr("period", period)?;
        self.write_attr("duty_cycle", period / 2)
    }

    fn enable(&mut self, on: bool) -> io::Result<()> {
        self.write_attr("enable", u8::from(on))
    }
}
