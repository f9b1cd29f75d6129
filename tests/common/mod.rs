// tests/common/mod.rs: shared fixtures for the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use optflow::capture::ReplayDevice;
use optflow::flow::{FlowEngine, FlowResult};
use optflow::gyro::{GyroRate, GyroSource};
use optflow::{Config, PixelFormat};

/// What the flow engine was handed on one call
#[derive(Debug, Clone)]
pub struct FlowCall {
    pub prev: Vec<u8>,
    pub curr: Vec<u8>,
    pub elapsed_us: u32,
}

/// Flow engine returning canned results and logging its inputs
pub struct ScriptedFlow {
    results: VecDeque<FlowResult>,
    pub calls: Arc<Mutex<Vec<FlowCall>>>,
}

impl ScriptedFlow {
    pub fn new(results: impl IntoIterator<Item = FlowResult>) -> Self {
        Self {
            results: results.into_iter().collect(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl FlowEngine for ScriptedFlow {
    fn compute_flow(&mut self, prev: &[u8], curr: &[u8], elapsed_us: u32) -> FlowResult {
        self.calls.lock().unwrap().push(FlowCall {
            prev: prev.to_vec(),
            curr: curr.to_vec(),
            elapsed_us,
        });
        self.results.pop_front().unwrap_or_default()
    }
}

pub fn flow(flow_x: f32, flow_y: f32, quality: u8) -> FlowResult {
    FlowResult {
        flow_x,
        flow_y,
        quality,
    }
}

/// Gyro source replaying a fixed list of rates, then zero
pub fn scripted_gyro(rates: Vec<GyroRate>) -> impl GyroSource {
    let mut rates = rates.into_iter();
    move || rates.next().unwrap_or_default()
}

/// Config whose capture thread runs at normal priority
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.thread.rt_priority = 0;
    config
}

/// Flat GREY frames of the output geometry at the given timestamps
pub fn grey_frames(timestamps: &[u64]) -> ReplayDevice {
    let len = (optflow::OUTPUT_WIDTH * optflow::OUTPUT_HEIGHT) as usize;
    ReplayDevice::from_frames(
        optflow::OUTPUT_WIDTH,
        optflow::OUTPUT_HEIGHT,
        PixelFormat::Grey,
        timestamps
            .iter()
            .enumerate()
            .map(|(i, &ts)| (ts, vec![i as u8; len]))
            .collect::<Vec<_>>(),
    )
}

/// Checkerboard of `cell`-sized squares whose corner sits at (`x0`, `y0`)
pub fn checkerboard(width: u32, height: u32, cell: u32, x0: u32, y0: u32) -> Vec<u8> {
    let mut img = Vec::with_capacity((width * height) as usize);
    for y in 0..height as i32 {
        for x in 0..width as i32 {
            let cx = (x - x0 as i32).div_euclid(cell as i32);
            let cy = (y - y0 as i32).div_euclid(cell as i32);
            img.push(if (cx + cy).rem_euclid(2) == 0 { 255 } else { 0 });
        }
    }
    img
}
