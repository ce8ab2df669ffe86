// src/depth/frame.rs
// Per-eye camera state and the depth samples captured with it.

use glam::{IVec2, Mat4, Vec2, Vec3};

use crate::depth::EYE_COUNT;
use crate::utils::Plane;

/// Frustum plane order. The first five are the ones a ray origin may be
/// clamped back through; the far plane only limits the ray's end.
pub const PLANE_LEFT: usize = 0;
pub const PLANE_RIGHT: usize = 1;
pub const PLANE_BOTTOM: usize = 2;
pub const PLANE_TOP: usize = 3;
pub const PLANE_NEAR: usize = 4;
pub const PLANE_FAR: usize = 5;

/// Camera matrices for one eye, captured when a depth copy is issued.
///
/// The projection is expected to map view-space depth to `[0, 1]`
/// (`Mat4::perspective_rh`); the view looks down its local -Z.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeCamera {
    pub view: Mat4,
    pub proj: Mat4,
    pub proj_view: Mat4,
    pub inv_proj_view: Mat4,
    /// Inward-facing planes, `[left, right, bottom, top, near, far]`.
    pub planes: [Plane; 6],
    pub position: Vec3,
}

impl EyeCamera {
    pub fn new(view: Mat4, proj: Mat4) -> Self {
        let proj_view = proj * view;
        let r0 = proj_view.row(0);
        let r1 = proj_view.row(1);
        let r2 = proj_view.row(2);
        let r3 = proj_view.row(3);
        let planes = [
            Plane::from_coefficients(r3 + r0),
            Plane::from_coefficients(r3 - r0),
            Plane::from_coefficients(r3 + r1),
            Plane::from_coefficients(r3 - r1),
            Plane::from_coefficients(r2),
            Plane::from_coefficients(r3 - r2),
        ];
        EyeCamera {
            view,
            proj,
            proj_view,
            inv_proj_view: proj_view.inverse(),
            planes,
            position: view.inverse().transform_point3(Vec3::ZERO),
        }
    }

    /// Linear depth of `point` along the view axis.
    #[inline]
    pub fn view_depth(&self, point: Vec3) -> f32 {
        -self.view.transform_point3(point).z
    }

    /// Normalized device coordinates of `point`, or `None` behind the eye.
    pub fn project_ndc(&self, point: Vec3) -> Option<Vec3> {
        let clip = self.proj_view * point.extend(1.0);
        if clip.w <= 1e-6 {
            return None;
        }
        Some(clip.truncate() / clip.w)
    }

    pub fn contains(&self, point: Vec3, tolerance: f32) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.signed_distance(point) >= -tolerance)
    }

    /// Converts a `[0, 1]` projective depth into linear view depth. Values on
    /// or outside the range mean "no data" and map to `0`.
    pub fn linearize(&self, ndc_depth: f32) -> f32 {
        if !(ndc_depth > 0.0 && ndc_depth < 1.0) {
            return 0.0;
        }
        let view = self.proj.inverse() * glam::Vec4::new(0.0, 0.0, ndc_depth, 1.0);
        if view.w.abs() <= f32::EPSILON {
            return 0.0;
        }
        (-view.z / view.w).max(0.0)
    }
}

/// One eye's camera plus its row-major depth samples (row 0 at the bottom).
#[derive(Debug, Clone)]
pub struct EyeFrame {
    pub camera: EyeCamera,
    pub depth: Vec<f32>,
    resolution: usize,
}

impl EyeFrame {
    pub fn new(camera: EyeCamera, depth: Vec<f32>, resolution: usize) -> Self {
        EyeFrame {
            camera,
            depth,
            resolution,
        }
    }

    pub fn resolution(&self) -> usize {
        self.resolution
    }

    /// Continuous texel coordinates of `point`; `(0, 0)` is the bottom-left
    /// corner of the first texel.
    pub fn texel_coords(&self, point: Vec3) -> Option<Vec2> {
        let ndc = self.camera.project_ndc(point)?;
        Some((ndc.truncate() * 0.5 + 0.5) * self.resolution as f32)
    }

    /// The texel containing the continuous coordinate, clamped to the buffer.
    pub fn texel_at(&self, coords: Vec2) -> IVec2 {
        let max = self.resolution as i32 - 1;
        coords.floor().as_ivec2().clamp(IVec2::ZERO, IVec2::splat(max))
    }

    /// Depth at `texel`; `0` (unknown) outside the buffer.
    pub fn sample(&self, texel: IVec2) -> f32 {
        let res = self.resolution as i32;
        if texel.x < 0 || texel.y < 0 || texel.x >= res || texel.y >= res {
            return 0.0;
        }
        self.depth[texel.y as usize * self.resolution + texel.x as usize]
    }

    /// World position of the centre of `texel` at linear `depth`.
    pub fn unproject(&self, texel: IVec2, depth: f32) -> Vec3 {
        let ndc = (texel.as_vec2() + 0.5) / self.resolution as f32 * 2.0 - 1.0;
        let near = self
            .camera
            .inv_proj_view
            .project_point3(Vec3::new(ndc.x, ndc.y, 0.0));
        let far = self
            .camera
            .inv_proj_view
            .project_point3(Vec3::new(ndc.x, ndc.y, 1.0));
        let near_depth = self.camera.view_depth(near);
        let far_depth = self.camera.view_depth(far);
        let span = far_depth - near_depth;
        if span.abs() <= f32::EPSILON {
            return near;
        }
        near + (far - near) * ((depth - near_depth) / span)
    }
}

/// A published stereo depth frame. Immutable once built.
#[derive(Debug, Clone)]
pub struct DepthFrame {
    pub id: u64,
    eyes: [EyeFrame; EYE_COUNT],
}

impl DepthFrame {
    pub fn new(id: u64, eyes: [EyeFrame; EYE_COUNT]) -> Self {
        DepthFrame { id, eyes }
    }

    pub fn eye(&self, index: usize) -> &EyeFrame {
        &self.eyes[index]
    }

    pub fn resolution(&self) -> usize {
        self.eyes[0].resolution()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::depth::test_support::{constant_depth, forward_camera, FAR, NEAR};
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_frustum_planes_face_inward() {
        let cam = forward_camera(Vec3::ZERO);
        assert!(cam.contains(Vec3::new(0.0, 0.0, -1.0), 0.0));
        assert!(!cam.contains(Vec3::new(0.0, 0.0, 1.0), 0.0));
        assert!(!cam.contains(Vec3::new(5.0, 0.0, -1.0), 0.0));
        assert!(!cam.contains(Vec3::new(0.0, 0.0, -30.0), 0.0));
        assert_approx_eq!(cam.planes[PLANE_NEAR].signed_distance(Vec3::ZERO), -NEAR, 1e-4);
        assert_approx_eq!(
            cam.planes[PLANE_FAR].signed_distance(Vec3::new(0.0, 0.0, -FAR)),
            0.0,
            1e-3
        );
        assert_approx_eq!(cam.planes[PLANE_LEFT].signed_distance(Vec3::ZERO), 0.0, 1e-5);
    }

    #[test]
    fn test_unproject_recovers_view_depth() {
        let frame = EyeFrame::new(forward_camera(Vec3::ZERO), constant_depth(128, 2.0), 128);
        for texel in [IVec2::new(0, 0), IVec2::new(64, 64), IVec2::new(100, 17)] {
            let p = frame.unproject(texel, 2.0);
            assert_approx_eq!(frame.camera.view_depth(p), 2.0, 1e-3);
            let back = frame.texel_at(frame.texel_coords(p).unwrap());
            assert_eq!(back, texel);
        }
    }

    #[test]
    fn test_linearize_round_trips_projection() {
        let cam = forward_camera(Vec3::ZERO);
        let ndc = cam.project_ndc(Vec3::new(0.0, 0.0, -3.0)).unwrap().z;
        assert_approx_eq!(cam.linearize(ndc), 3.0, 1e-2);
        assert_eq!(cam.linearize(1.0), 0.0);
        assert_eq!(cam.linearize(0.0), 0.0);
    }

    #[test]
    fn test_sample_outside_is_unknown() {
        let frame = EyeFrame::new(forward_camera(Vec3::ZERO), constant_depth(128, 2.0), 128);
        assert_eq!(frame.sample(IVec2::new(-1, 3)), 0.0);
        assert_eq!(frame.sample(IVec2::new(3, 128)), 0.0);
        assert_eq!(frame.sample(IVec2::new(3, 3)), 2.0);
    }
}
