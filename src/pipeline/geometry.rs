//! Software geometry correction for cameras that can't scale or crop in hardware

use bytes::BytesMut;

/// How frames are brought to the output geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Correction {
    /// Camera already delivers the output geometry
    None,
    /// Block-average a centered region of `output * scale`
    Shrink {
        scale: u32,
        left: u32,
        top: u32,
        region_width: u32,
        region_height: u32,
    },
    /// Copy a centered window of the output geometry
    Crop { left: u32, top: u32 },
}

/// Pipeline geometry, fixed once negotiation is done
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeometryPlan {
    pub camera_width: u32,
    pub camera_height: u32,
    pub output_width: u32,
    pub output_height: u32,
    pub correction: Correction,
}

impl GeometryPlan {
    /// Plan a software shrink of a camera frame down to the output geometry.
    ///
    /// Returns `None` when the camera frame is smaller than the output.
    pub fn shrink(
        camera_width: u32,
        camera_height: u32,
        output_width: u32,
        output_height: u32,
    ) -> Option<Self> {
        let scale = if camera_width > camera_height {
            camera_height / output_height
        } else {
            camera_width / output_width
        };
        let region_width = output_width * scale;
        let region_height = output_height * scale;
        if scale == 0 || region_width > camera_width || region_height > camera_height {
            return None;
        }

        Some(Self {
            camera_width,
            camera_height,
            output_width,
            output_height,
            correction: Correction::Shrink {
                scale,
                left: (camera_width - region_width) / 2,
                top: (camera_height - region_height) / 2,
                region_width,
                region_height,
            },
        })
    }

    /// Plan a centered software crop. `None` when the camera frame is too small.
    pub fn crop(
        camera_width: u32,
        camera_height: u32,
        output_width: u32,
        output_height: u32,
    ) -> Option<Self> {
        if camera_width < output_width || camera_height < output_height {
            return None;
        }
        Some(Self {
            camera_width,
            camera_height,
            output_width,
            output_height,
            correction: Correction::Crop {
                left: camera_width / 2 - output_width / 2,
                top: camera_height / 2 - output_height / 2,
            },
        })
    }

    pub fn passthrough(output_width: u32, output_height: u32) -> Self {
        Self {
            camera_width: output_width,
            camera_height: output_height,
            output_width,
            output_height,
            correction: Correction::None,
        }
    }

    pub fn output_len(&self) -> usize {
        self.output_width as usize * self.output_height as usize
    }

    pub fn camera_len(&self) -> usize {
        self.camera_width as usize * self.camera_height as usize
    }

    /// Apply the correction to a luma frame in place.
    ///
    /// `scratch` must hold at least `output_len()` bytes. The frame is
    /// truncated to the output geometry.
    pub fn apply(&self, data: &mut BytesMut, scratch: &mut [u8]) {
        let out_len = self.output_len();
        match self.correction {
            Correction::None => return,
            Correction::Shrink {
                scale,
                left,
                top,
                region_width,
                region_height,
            } => shrink_8bpp(
                data,
                &mut scratch[..out_len],
                self.camera_width,
                left,
                region_width,
                top,
                region_height,
                scale,
                scale,
            ),
            Correction::Crop { left, top } => crop_8bpp(
                data,
                &mut scratch[..out_len],
                self.camera_width,
                left,
                self.output_width,
                top,
                self.output_height,
            ),
        }
        data[..out_len].copy_from_slice(&scratch[..out_len]);
        data.truncate(out_len);
    }
}

/// Average `fx * fy` blocks of the selected region of an 8-bit image.
///
/// `output` receives `(selection_width / fx) * (selection_height / fy)` bytes.
#[allow(clippy::too_many_arguments)]
pub fn shrink_8bpp(
    input: &[u8],
    output: &mut [u8],
    width: u32,
    left: u32,
    selection_width: u32,
    top: u32,
    selection_height: u32,
    fx: u32,
    fy: u32,
) {
    let width = width as usize;
    let (fx, fy) = (fx as usize, fy as usize);
    let out_width = selection_width as usize / fx;
    let out_height = selection_height as usize / fy;
    let block_size = (fx * fy) as u32;
    let origin = top as usize * width + left as usize;

    for i in 0..out_height {
        let block_y = i * fy * width;
        for j in 0..out_width {
            let block = origin + block_y + j * fx;
            let sum: u32 = (0..fy)
                .flat_map(|k| {
                    let row = block + k * width;
                    input[row..row + fx].iter().map(|&px| u32::from(px))
                })
                .sum();
            output[i * out_width + j] = (sum / block_size) as u8;
        }
    }
}

/// Copy a `crop_width x crop_height` window of an 8-bit image into `output`
pub fn crop_8bpp(
    input: &[u8],
    output: &mut [u8],
    width: u32,
    left: u32,
    crop_width: u32,
    top: u32,
    crop_height: u32,
) {
    let width = width as usize;
    let crop_width = crop_width as usize;
    for (row, out) in output
        .chunks_exact_mut(crop_width)
        .take(crop_height as usize)
        .enumerate()
    {
        let start = (top as usize + row) * width + left as usize;
        out.copy_from_slice(&input[start..start + crop_width]);
    }
}
