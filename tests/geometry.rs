// tests/geometry.rs: software shrink and crop against synthetic frames.

mod common;

use bytes::BytesMut;
use common::checkerboard;
use optflow::pipeline::{Correction, GeometryPlan};

/// Reference block average, written out the long way
fn block_reduce(
    img: &[u8],
    width: u32,
    left: u32,
    top: u32,
    scale: u32,
    out_w: u32,
    out_h: u32,
) -> Vec<u8> {
    let mut out = Vec::new();
    for i in 0..out_h {
        for j in 0..out_w {
            let mut sum = 0u32;
            for dy in 0..scale {
                for dx in 0..scale {
                    let x = left + j * scale + dx;
                    let y = top + i * scale + dy;
                    sum += u32::from(img[(y * width + x) as usize]);
                }
            }
            out.push((sum / (scale * scale)) as u8);
        }
    }
    out
}

fn apply(plan: &GeometryPlan, input: &[u8]) -> Vec<u8> {
    let mut data = BytesMut::from(input);
    let mut scratch = vec![0u8; plan.output_len()];
    plan.apply(&mut data, &mut scratch);
    data.to_vec()
}

// ===== Shrink =====

#[test]
fn shrink_of_aligned_checkerboard_is_a_checkerboard() {
    // 320x240 -> 64x64: scale 3 over the centered 192x192 at (64, 24)
    let plan = GeometryPlan::shrink(320, 240, 64, 64).unwrap();
    let input = checkerboard(320, 240, 3, 64, 24);
    assert_eq!(apply(&plan, &input), checkerboard(64, 64, 1, 0, 0));
}

#[test]
fn shrink_of_misaligned_checkerboard_matches_block_reduction() {
    let plan = GeometryPlan::shrink(320, 240, 64, 64).unwrap();
    let Correction::Shrink { scale, left, top, .. } = plan.correction else {
        panic!("expected a shrink plan, got {:?}", plan.correction);
    };

    // Cells of 2 against blocks of 3 give mixed blocks
    let input = checkerboard(320, 240, 2, 1, 0);
    let got = apply(&plan, &input);
    assert_eq!(got.len(), 64 * 64);
    assert_eq!(got, block_reduce(&input, 320, left, top, scale, 64, 64));
    // At least some blocks are neither black nor white
    assert!(got.iter().any(|&px| px != 0 && px != 255));
}

#[test]
fn shrink_ignores_the_margins() {
    let plan = GeometryPlan::shrink(320, 240, 64, 64).unwrap();
    let mut input = vec![0u8; 320 * 240];
    // Paint everything outside the 192x192 region at (64, 24)
    for y in 0..240 {
        for x in 0..320 {
            if !(64..256).contains(&x) || !(24..216).contains(&y) {
                input[y * 320 + x] = 255;
            }
        }
    }
    assert!(apply(&plan, &input).iter().all(|&px| px == 0));
}

#[test]
fn shrink_is_reproducible() {
    let plan = GeometryPlan::shrink(200, 140, 64, 64).unwrap();
    let input: Vec<u8> = (0..200u32 * 140).map(|i| (i * 31 % 256) as u8).collect();
    assert_eq!(apply(&plan, &input), apply(&plan, &input));
}

// ===== Crop =====

#[test]
fn crop_is_the_exact_centered_window() {
    let plan = GeometryPlan::crop(100, 80, 64, 64).unwrap();
    assert_eq!(plan.correction, Correction::Crop { left: 18, top: 8 });

    let input: Vec<u8> = (0..100u32 * 80)
        .map(|i| ((i % 100) * 7 + (i / 100) * 13) as u8)
        .collect();
    let got = apply(&plan, &input);

    let mut want = Vec::with_capacity(64 * 64);
    for row in 0..64 {
        let start = (8 + row) * 100 + 18;
        want.extend_from_slice(&input[start..start + 64]);
    }
    assert_eq!(got, want);
}

#[test]
fn crop_of_checkerboard_keeps_phase() {
    let plan = GeometryPlan::crop(100, 80, 64, 64).unwrap();
    let input = checkerboard(100, 80, 4, 18, 8);
    assert_eq!(apply(&plan, &input), checkerboard(64, 64, 4, 0, 0));
}
