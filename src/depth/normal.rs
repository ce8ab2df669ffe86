// src/depth/normal.rs
// Surface normal reconstruction from the depth field.

use glam::{IVec2, Vec3};

use crate::depth::frame::EyeFrame;

/// Reconstructs the surface normal around `point` from a five-tap cross of
/// normals (the centre texel and `±step` along each axis).
///
/// Returns the averaged normal, oriented towards the eye, and the fraction of
/// the five taps whose normal lies within `agreement_cos` of that average.
/// `None` when the point is too close to the buffer edge or the centre tap has
/// no usable depth.
pub(crate) fn reconstruct_normal_at_point(
    eye: &EyeFrame,
    point: Vec3,
    step: usize,
    agreement_cos: f32,
) -> Option<(Vec3, f32)> {
    let coords = eye.texel_coords(point)?;
    let center = coords.floor().as_ivec2();
    let step = step as i32;
    let margin = step * 2;
    let res = eye.resolution() as i32;
    if center.x < margin || center.y < margin || center.x >= res - margin || center.y >= res - margin {
        return None;
    }

    let taps = [
        IVec2::ZERO,
        IVec2::new(step, 0),
        IVec2::new(-step, 0),
        IVec2::new(0, step),
        IVec2::new(0, -step),
    ];
    let normals = taps.map(|offset| normal_at_texel(eye, center + offset, step));
    let center_normal = normals[0]?;

    let sum: Vec3 = normals.iter().flatten().copied().sum();
    let average = sum.try_normalize().unwrap_or(center_normal);
    let agreeing = normals
        .iter()
        .flatten()
        .filter(|n| n.dot(average) > agreement_cos)
        .count();
    Some((average, agreeing as f32 / taps.len() as f32))
}

/// Normal at a single texel from its axis derivatives.
fn normal_at_texel(eye: &EyeFrame, texel: IVec2, step: i32) -> Option<Vec3> {
    let depth = eye.sample(texel);
    if depth <= 0.0 {
        return None;
    }
    let p = eye.unproject(texel, depth);
    let ddx = one_sided_derivative(eye, texel, IVec2::new(step, 0), depth, p)?;
    let ddy = one_sided_derivative(eye, texel, IVec2::new(0, step), depth, p)?;
    let normal = ddx.cross(ddy).try_normalize()?;
    if normal.dot(eye.camera.position - p) < 0.0 {
        Some(-normal)
    } else {
        Some(normal)
    }
}

/// Picks the forward or backward difference along `offset`, whichever has the
/// smaller depth jump from the centre sample. Across a depth edge that keeps
/// the derivative on the centre's own surface.
fn one_sided_derivative(
    eye: &EyeFrame,
    texel: IVec2,
    offset: IVec2,
    depth: f32,
    p: Vec3,
) -> Option<Vec3> {
    let ahead = eye.sample(texel + offset);
    let behind = eye.sample(texel - offset);
    let forward = (ahead > 0.0).then(|| (eye.unproject(texel + offset, ahead) - p, (ahead - depth).abs()));
    let backward =
        (behind > 0.0).then(|| (p - eye.unproject(texel - offset, behind), (depth - behind).abs()));
    match (forward, backward) {
        (Some((f, fj)), Some((b, bj))) => Some(if fj <= bj { f } else { b }),
        (Some((f, _)), None) => Some(f),
        (None, Some((b, _))) => Some(b),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::depth::test_support::{constant_depth, forward_camera};
    use assert_approx_eq::assert_approx_eq;

    fn frame_with(depth: Vec<f32>) -> EyeFrame {
        EyeFrame::new(forward_camera(Vec3::ZERO), depth, 128)
    }

    #[test]
    fn test_flat_wall_normal_faces_eye() {
        let frame = frame_with(constant_depth(128, 2.0));
        let (normal, confidence) =
            reconstruct_normal_at_point(&frame, Vec3::new(0.2, -0.1, -2.0), 2, 0.95).unwrap();
        assert!(normal.dot(Vec3::Z) > 0.999);
        assert_approx_eq!(confidence, 1.0);
    }

    #[test]
    fn test_edge_margin_rejects() {
        let frame = frame_with(constant_depth(128, 2.0));
        // Close to the right edge of the view at 2 m.
        assert!(reconstruct_normal_at_point(&frame, Vec3::new(1.98, 0.0, -2.0), 2, 0.95).is_none());
    }

    #[test]
    fn test_tilted_floor_normal() {
        // Ground plane one metre below the eye: depth = 1 / -ndc_y for the lower half.
        let res = 128;
        let mut depth = vec![0.0; res * res];
        for y in 0..res {
            let ndc_y = (y as f32 + 0.5) / res as f32 * 2.0 - 1.0;
            if ndc_y < -0.05 {
                for x in 0..res {
                    depth[y * res + x] = 1.0 / -ndc_y;
                }
            }
        }
        let frame = frame_with(depth);
        let (normal, confidence) =
            reconstruct_normal_at_point(&frame, Vec3::new(0.0, -1.0, -2.5), 2, 0.95).unwrap();
        assert!(normal.dot(Vec3::Y) > 0.95, "normal {:?}", normal);
        assert!(confidence > 0.5);
    }

    #[test]
    fn test_depth_edge_keeps_centre_surface() {
        // Left half far, right half near; sample just left of the edge.
        let res = 128;
        let mut depth = constant_depth(res, 4.0);
        for y in 0..res {
            for x in res / 2..res {
                depth[y * res + x] = 1.5;
            }
        }
        let frame = frame_with(depth);
        let texel = IVec2::new(res as i32 / 2 - 1, 64);
        let p = frame.unproject(texel, 4.0);
        let normal = normal_at_texel(&frame, texel, 2).unwrap();
        assert!(normal.dot(Vec3::Z) > 0.999, "normal {:?} at {:?}", normal, p);
    }
}
