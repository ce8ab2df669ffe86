// src/depth/preview.rs
// Grayscale dumps of published depth for debugging captures.

use glam::IVec2;
use image::{GrayImage, Luma};

use crate::depth::frame::EyeFrame;
use crate::utils::util::clamp;

/// Renders one eye as a grayscale image: near surfaces bright, `max_depth`
/// and beyond dark grey, unknown texels black. Image rows run top-down.
pub fn depth_preview(eye: &EyeFrame, max_depth: f32) -> GrayImage {
    let res = eye.resolution() as u32;
    GrayImage::from_fn(res, res, |x, y| {
        let depth = eye.sample(IVec2::new(x as i32, (res - 1 - y) as i32));
        Luma([shade(depth, max_depth)])
    })
}

fn shade(depth: f32, max_depth: f32) -> u8 {
    if depth <= 0.0 || max_depth <= 0.0 {
        return 0;
    }
    let near = 1.0 - clamp(depth / max_depth, 0.0, 1.0);
    // Keep 16 levels at the far end so valid samples never read as unknown.
    (16.0 + near * 239.0).round() as u8
}
