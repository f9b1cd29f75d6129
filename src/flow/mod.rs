//! Pixel-domain flow estimation between two luma frames

pub mod block_match;

use serde::{Deserialize, Serialize};

pub use block_match::BlockMatchFlow;

/// Result of one flow computation
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FlowResult {
    /// Displacement between the two frames, pixels
    pub flow_x: f32,
    pub flow_y: f32,
    /// 0 (no usable match) to 255 (every probe matched)
    pub quality: u8,
}

/// Construction parameters of a flow engine
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlowParams {
    pub frame_width: u32,
    pub stride: u32,
    /// Search radius in pixels
    pub max_flow_pixels: u32,
    /// Minimum texture of a block for it to be matched
    pub feature_threshold: u32,
    /// Maximum SAD of an accepted match
    pub value_threshold: u32,
}

pub trait FlowEngine: Send {
    fn compute_flow(&mut self, prev: &[u8], curr: &[u8], elapsed_us: u32) -> FlowResult;
}

impl<F: FlowEngine + ?Sized> FlowEngine for Box<F> {
    fn compute_flow(&mut self, prev: &[u8], curr: &[u8], elapsed_us: u32) -> FlowResult {
        (**self).compute_flow(prev, curr, elapsed_us)
    }
}
