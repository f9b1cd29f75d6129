//! Pixel format normalization ahead of geometry correction

use bytes::BytesMut;

use super::frame::PixelFormat;

/// Extract the luma bytes of an interleaved YUYV buffer into `grey`.
///
/// `yuyv` holds two bytes per pixel; `grey` receives one per pixel and its
/// length decides how many pixels are converted.
pub fn yuyv_to_grey(yuyv: &[u8], grey: &mut [u8]) {
    for (dst, pair) in grey.iter_mut().zip(yuyv.chunks_exact(2)) {
        *dst = pair[0];
    }
}

/// Reduce a frame buffer to `pixels` bytes of planar luma, in place.
///
/// NV12 and GREY already start with the luma plane and are left untouched.
/// YUYV buffers go through `scratch` and are truncated to luma size.
pub fn normalize_in_place(
    data: &mut BytesMut,
    format: PixelFormat,
    pixels: usize,
    scratch: &mut [u8],
) {
    if format != PixelFormat::Yuyv {
        return;
    }

    let pixels = pixels.min(data.len() / 2).min(scratch.len());
    yuyv_to_grey(&data[..pixels * 2], &mut scratch[..pixels]);
    data[..pixels].copy_from_slice(&scratch[..pixels]);
    data.truncate(pixels);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yuyv_keeps_even_bytes() {
        let yuyv = [10u8, 128, 20, 129, 30, 130, 40, 131];
        let mut grey = [0u8; 4];
        yuyv_to_grey(&yuyv, &mut grey);
        assert_eq!(grey, [10, 20, 30, 40]);
    }

    #[test]
    fn normalize_truncates_to_luma() {
        let mut data = BytesMut::from(&[1u8, 0, 2, 0, 3, 0, 4, 0][..]);
        let mut scratch = vec![0u8; 4];
        normalize_in_place(&mut data, PixelFormat::Yuyv, 4, &mut scratch);
        assert_eq!(&data[..], &[1, 2, 3, 4]);
    }

    #[test]
    fn planar_formats_pass_through() {
        let mut data = BytesMut::from(&[1u8, 2, 3, 4, 5, 6][..]);
        let mut scratch = vec![0u8; 4];
        normalize_in_place(&mut data, PixelFormat::Nv12, 4, &mut scratch);
        assert_eq!(&data[..], &[1, 2, 3, 4, 5, 6]);
    }
}
