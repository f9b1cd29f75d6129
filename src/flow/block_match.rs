//! SAD block-matching flow, in the spirit of the PX4FLOW estimator

use super::{FlowEngine, FlowParams, FlowResult};

const BLOCK: usize = 8;
/// Probes per axis
const GRID: usize = 5;

/// Matches a grid of 8x8 blocks of the previous frame in the current one
pub struct BlockMatchFlow {
    params: FlowParams,
}

impl BlockMatchFlow {
    pub fn new(params: FlowParams) -> Self {
        Self { params }
    }

    /// Sum of neighbour differences in a block, scaled per row
    fn texture(&self, img: &[u8], x: usize, y: usize) -> u32 {
        let stride = self.params.stride as usize;
        let mut acc = 0u32;
        for row in 0..BLOCK - 1 {
            let base = (y + row) * stride + x;
            for col in 0..BLOCK - 1 {
                let p = i32::from(img[base + col]);
                acc += (p - i32::from(img[base + col + 1])).unsigned_abs();
                acc += (p - i32::from(img[base + col + stride])).unsigned_abs();
            }
        }
        acc / BLOCK as u32
    }

    fn sad(&self, prev: &[u8], curr: &[u8], x: usize, y: usize, cx: usize, cy: usize) -> u32 {
        let stride = self.params.stride as usize;
        (0..BLOCK)
            .map(|row| {
                let a = &prev[(y + row) * stride + x..][..BLOCK];
                let b = &curr[(cy + row) * stride + cx..][..BLOCK];
                a.iter()
                    .zip(b)
                    .map(|(&p, &c)| (i32::from(p) - i32::from(c)).unsigned_abs())
                    .sum::<u32>()
            })
            .sum()
    }

    /// Top-left corners of the probe blocks, evenly spread inside the search margin
    fn probes(&self, width: usize, height: usize) -> Vec<(usize, usize)> {
        let margin = self.params.max_flow_pixels as usize;
        let span = |len: usize| -> Vec<usize> {
            if len < 2 * margin + BLOCK {
                return Vec::new();
            }
            let last = len - margin - BLOCK;
            (0..GRID)
                .map(|i| margin + (last - margin) * i / (GRID - 1))
                .collect()
        };
        let xs = span(width);
        let ys = span(height);
        ys.iter()
            .flat_map(|&y| xs.iter().map(move |&x| (x, y)))
            .collect()
    }
}

impl FlowEngine for BlockMatchFlow {
    fn compute_flow(&mut self, prev: &[u8], curr: &[u8], _elapsed_us: u32) -> FlowResult {
        let width = self.params.frame_width as usize;
        let stride = self.params.stride as usize;
        if stride == 0 || width > stride {
            return FlowResult::default();
        }
        let height = prev.len().min(curr.len()) / stride;
        let radius = self.params.max_flow_pixels as i32;

        let probes = self.probes(width, height);
        if probes.is_empty() {
            return FlowResult::default();
        }

        let (mut sum_x, mut sum_y, mut accepted) = (0i32, 0i32, 0u32);
        for &(x, y) in &probes {
            if self.texture(prev, x, y) < self.params.feature_threshold {
                continue;
            }

            let mut best = (u32::MAX, 0i32, 0i32);
            for dy in -radius..=radius {
                for dx in -radius..=radius {
                    let cx = (x as i32 + dx) as usize;
                    let cy = (y as i32 + dy) as usize;
                    let sad = self.sad(prev, curr, x, y, cx, cy);
                    // Prefer the smallest displacement on ties
                    let closer = dx.abs() + dy.abs() < best.1.abs() + best.2.abs();
                    if sad < best.0 || (sad == best.0 && closer) {
                        best = (sad, dx, dy);
                    }
                }
            }

            if best.0 < self.params.value_threshold {
                sum_x += best.1;
                sum_y += best.2;
                accepted += 1;
            }
        }

        if accepted == 0 {
            return FlowResult::default();
        }
        FlowResult {
            flow_x: sum_x as f32 / accepted as f32,
            flow_y: sum_y as f32 / accepted as f32,
            quality: (accepted * 255 / probes.len() as u32) as u8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const W: u32 = 64;

    fn params() -> FlowParams {
        FlowParams {
            frame_width: W,
            stride: W,
            max_flow_pixels: 4,
            feature_threshold: 30,
            value_threshold: 5000,
        }
    }

    fn texture(x: i32, y: i32) -> u8 {
        let mut h = (x as u32).wrapping_mul(374_761_393) ^ (y as u32).wrapping_mul(668_265_263);
        h = (h ^ (h >> 13)).wrapping_mul(1_274_126_177);
        (h >> 24) as u8
    }

    fn image(shift_x: i32, shift_y: i32) -> Vec<u8> {
        (0..W as i32)
            .flat_map(|y| (0..W as i32).map(move |x| texture(x - shift_x, y - shift_y)))
            .collect()
    }

    #[test]
    fn finds_integer_shift() {
        let mut flow = BlockMatchFlow::new(params());
        let result = flow.compute_flow(&image(0, 0), &image(2, -1), 33_000);
        assert_eq!(result.flow_x, 2.0);
        assert_eq!(result.flow_y, -1.0);
        assert_eq!(result.quality, 255);
    }

    #[test]
    fn still_scene_has_zero_flow() {
        let mut flow = BlockMatchFlow::new(params());
        let frame = image(0, 0);
        let result = flow.compute_flow(&frame, &frame, 33_000);
        assert_eq!((result.flow_x, result.flow_y), (0.0, 0.0));
        assert_eq!(result.quality, 255);
    }

    #[test]
    fn flat_scene_has_no_quality() {
        let mut flow = BlockMatchFlow::new(params());
        let flat = vec![128u8; (W * W) as usize];
        assert_eq!(flow.compute_flow(&flat, &flat, 33_000), FlowResult::default());
    }

    #[test]
    fn too_small_frame_is_rejected() {
        let mut flow = BlockMatchFlow::new(FlowParams {
            frame_width: 8,
            stride: 8,
            ..params()
        });
        let tiny = vec![0u8; 64];
        assert_eq!(flow.compute_flow(&tiny, &tiny, 1), FlowResult::default());
    }
}
