//! Gyro samples pulled synchronously by the capture thread

/// Body angular rate, rad/s
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GyroRate {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl GyroRate {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Trapezoidal integral between two samples over `dt`, in the caller's time unit
    pub fn trapezoid(prev: GyroRate, curr: GyroRate, dt: f32) -> GyroRate {
        GyroRate {
            x: (prev.x + curr.x) / 2.0 * dt,
            y: (prev.y + curr.y) / 2.0 * dt,
            z: (prev.z + curr.z) / 2.0 * dt,
        }
    }
}

/// Source of the latest gyro rate. Called once per frame, must not block.
pub trait GyroSource: Send {
    fn rate(&mut self) -> GyroRate;
}

impl<F> GyroSource for F
where
    F: FnMut() -> GyroRate + Send,
{
    fn rate(&mut self) -> GyroRate {
        self()
    }
}

/// Always reports zero rate, for benches without an IMU
#[derive(Debug, Default, Clone, Copy)]
pub struct NoGyro;

impl GyroSource for NoGyro {
    fn rate(&mut self) -> GyroRate {
        GyroRate::default()
    }
}
