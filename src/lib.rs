pub mod capture;
pub mod error;
pub mod flow;
pub mod gyro;
pub mod pipeline;
pub mod platform;
pub mod sensor;
pub mod utils;

use std::path::{Path, PathBuf};

use arc_swap::ArcSwap;
use capture::MemoryMode;
use serde::{Deserialize, Serialize};

pub use capture::{Frame, PixelFormat};
pub use error::{CaptureError, SensorFault};
pub use gyro::{GyroRate, GyroSource};
pub use pipeline::accumulator::{FlowIntegral, FlowReader};
pub use sensor::OpticalFlowSensor;

/// Output geometry handed to the flow engine
pub const OUTPUT_WIDTH: u32 = 64;
pub const OUTPUT_HEIGHT: u32 = 64;

/// Active configuration, swapped in by the binary after loading
pub static CONFIG: once_cell::sync::Lazy<ArcSwap<Config>> =
    once_cell::sync::Lazy::new(|| ArcSwap::from_pointee(Config::default()));

/// System configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub capture: CaptureConfig,
    pub flow: FlowConfig,
    pub thread: ThreadConfig,
    pub consumer: ConsumerConfig,
}

/// Board-specific camera bring-up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Plain V4L2 camera, format picked from what the device offers
    Generic,
    /// PWM-clocked sensor behind a subdevice, NV12 output
    Bebop,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    pub platform: Platform,
    /// Empty means auto-detect
    pub device: String,
    pub subdev: String,
    pub memory: MemoryMode,
    pub buffer_count: u32,
    /// Native sensor geometry, used for the hardware crop window
    pub sensor_width: u32,
    pub sensor_height: u32,
    pub crop_width: u32,
    pub crop_height: u32,
    pub output_width: u32,
    pub output_height: u32,
    pub camera_clock: ClockConfig,
    /// Append every paired frame, after correction, to this file
    pub record_path: Option<PathBuf>,
    /// Store timestamp and gyro rate after each recorded frame
    pub record_metadata: bool,
}

/// Sysfs PWM feeding the camera sensor clock
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClockConfig {
    pub chip: PathBuf,
    pub channel: u32,
    pub freq_hz: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowConfig {
    pub max_flow_pixels: u32,
    pub feature_threshold: u32,
    pub value_threshold: u32,
    /// Pixels per radian of the optics after geometry correction
    pub focal_length_px: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadConfig {
    /// SCHED_FIFO priority of the capture thread
    pub rt_priority: i32,
    /// Fail when the priority can't be applied
    pub require_realtime: bool,
    pub cpu_core: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerConfig {
    pub poll_hz: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capture: CaptureConfig {
                platform: Platform::Generic,
                device: "/dev/video0".into(),
                subdev: "/dev/v4l-subdev0".into(),
                memory: MemoryMode::Mmap,
                buffer_count: 8,
                sensor_width: 320,
                sensor_height: 240,
                crop_width: 240,
                crop_height: 240,
                output_width: OUTPUT_WIDTH,
                output_height: OUTPUT_HEIGHT,
                camera_clock: ClockConfig {
                    chip: PathBuf::from("/sys/class/pwm/pwmchip0"),
                    channel: 9,
                    freq_hz: 43_333_333,
                },
                record_path: None,
                record_metadata: true,
            },
            flow: FlowConfig {
                max_flow_pixels: 4,
                feature_threshold: 30,
                value_threshold: 5000,
                // 2.5mm lens, 3.6um pixels binned by 2
                focal_length_px: 2.5 / (3.6 * 2.0 / 1000.0),
            },
            thread: ThreadConfig {
                rt_priority: 11,
                require_realtime: true,
                cpu_core: None,
            },
            consumer: ConsumerConfig { poll_hz: 100 },
        }
    }
}

impl Config {
    /// Defaults, then the TOML file if given, then `OPTFLOW__SECTION__KEY` variables
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Config::default())?);
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder
            .add_source(
                config::Environment::with_prefix("OPTFLOW")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()
    }
}
