// src/depth/placement.rs
// Box placement and collision queries built on top of single raycasts.

use glam::{Mat3, Quat, Vec3};
use log::{debug, warn};

use crate::depth::raycast::DepthRaycaster;
use crate::depth::{Eye, RaycastOutcome};
use crate::utils::Ray;

/// Where a box can rest against the environment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxPlacement {
    /// Centre of the box, lifted off the surface by half its depth.
    pub position: Vec3,
    /// Local +Z is the surface normal, local +Y the requested up projected
    /// onto the surface.
    pub rotation: Quat,
    pub normal: Vec3,
}

/// Corner offsets of the front face in `(right, up)` units, counter-clockwise.
const FACE_CORNERS: [(f32, f32); 4] = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];

/// Outline plus both diagonals of the front face.
const FACE_TRACES: [(usize, usize); 6] = [(0, 1), (1, 2), (2, 3), (3, 0), (0, 2), (1, 3)];

/// Box corner pairs that differ in exactly one axis bit.
const BOX_EDGES: [(usize, usize); 12] = [
    (0, 1),
    (2, 3),
    (4, 5),
    (6, 7),
    (0, 2),
    (1, 3),
    (4, 6),
    (5, 7),
    (0, 4),
    (1, 5),
    (2, 6),
    (3, 7),
];

impl DepthRaycaster {
    /// Finds a pose for a box of `box_size` (width, height, depth) resting on
    /// the surface hit by `ray`.
    ///
    /// The centre hit must carry a confident normal; four corner rays must
    /// land on the same plane with agreeing normals; and the volume in front
    /// of the surface must be free.
    pub fn place_box(&self, ray: &Ray, box_size: Vec3, up: Vec3, max_distance: f32) -> Option<BoxPlacement> {
        let cfg = &self.config.place_box;
        if !(box_size.x >= cfg.min_lateral_size && box_size.y >= cfg.min_lateral_size) {
            warn!(
                "place_box: lateral size {}x{} is below the minimum {}",
                box_size.x, box_size.y, cfg.min_lateral_size
            );
            return None;
        }
        if !(box_size.z >= 0.0) || !box_size.is_finite() {
            warn!("place_box: box depth {} must be finite and non-negative", box_size.z);
            return None;
        }

        let center = match self.raycast(ray, max_distance, Eye::Both, true, false) {
            RaycastOutcome::Success(hit) => hit,
            other => {
                debug!("place_box: centre ray gave {:?}", other);
                return None;
            }
        };
        let normal = center.normal?;
        if center.confidence < cfg.min_center_confidence {
            debug!("place_box: centre normal confidence {} too low", center.confidence);
            return None;
        }

        let (right, box_up) = surface_axes(normal, up, ray.direction);
        let half_w = box_size.x * 0.5;
        let half_h = box_size.y * 0.5;
        let tolerance = cfg.coplanar_tolerance_ratio * box_size.x.max(box_size.y);

        let mut corners = [Vec3::ZERO; 4];
        for (corner, (sx, sy)) in corners.iter_mut().zip(FACE_CORNERS) {
            let target = center.point + right * (sx * half_w) + box_up * (sy * half_h);
            let (corner_ray, _) = Ray::between(ray.origin, target)?;
            let hit = match self.raycast(&corner_ray, max_distance, Eye::Both, true, false) {
                RaycastOutcome::Success(hit) => hit,
                other => {
                    debug!("place_box: corner ray gave {:?}", other);
                    return None;
                }
            };
            if (hit.point - center.point).dot(normal).abs() > tolerance {
                debug!("place_box: corner {:?} leaves the centre plane", hit.point);
                return None;
            }
            match hit.normal {
                Some(n) if n.dot(normal) > cfg.corner_normal_cos => {}
                _ => {
                    debug!("place_box: corner normal disagrees with centre");
                    return None;
                }
            }
            *corner = hit.point;
        }

        let plane_normal = corner_plane_normal(&corners, normal)?;
        if plane_normal.dot(normal) <= cfg.plane_normal_cos {
            debug!("place_box: corner plane normal {:?} disagrees with {:?}", plane_normal, normal);
            return None;
        }

        let (right, box_up) = surface_axes(plane_normal, up, ray.direction);
        let rotation = Quat::from_mat3(&Mat3::from_cols(right, box_up, plane_normal));

        if box_size.z > cfg.thin_box_depth {
            let sweep_center = center.point + plane_normal * (box_size.z * 0.5 + cfg.collision_offset);
            if self.check_box(sweep_center, box_size * 0.5, rotation) {
                debug!("place_box: volume in front of the surface is blocked");
                return None;
            }
        } else {
            let lift = plane_normal * cfg.collision_offset;
            let face = FACE_CORNERS
                .map(|(sx, sy)| center.point + lift + right * (sx * half_w) + box_up * (sy * half_h));
            if FACE_TRACES.iter().any(|&(a, b)| self.segment_blocked(face[a], face[b])) {
                debug!("place_box: front face is blocked");
                return None;
            }
        }

        Some(BoxPlacement {
            position: center.point + plane_normal * (box_size.z * 0.5),
            rotation,
            normal: plane_normal,
        })
    }

    /// Returns `true` when any of the box's twelve edges runs into the
    /// environment (or cannot be verified against it).
    pub fn check_box(&self, center: Vec3, half_extents: Vec3, orientation: Quat) -> bool {
        let spacing = self.config.place_box.edge_sample_spacing.max(1e-3);
        let corners: [Vec3; 8] = std::array::from_fn(|i| {
            let sign = Vec3::new(
                if i & 1 != 0 { 1.0 } else { -1.0 },
                if i & 2 != 0 { 1.0 } else { -1.0 },
                if i & 4 != 0 { 1.0 } else { -1.0 },
            );
            center + orientation * (half_extents * sign)
        });

        for &(a, b) in &BOX_EDGES {
            let (start, end) = (corners[a], corners[b]);
            let segments = ((end - start).length() / spacing).ceil().max(1.0) as usize;
            for k in 0..segments {
                let p0 = start.lerp(end, k as f32 / segments as f32);
                let p1 = start.lerp(end, (k + 1) as f32 / segments as f32);
                if self.segment_blocked(p0, p1) {
                    debug!("check_box: edge {}-{} blocked near {:?}", a, b, p0);
                    return true;
                }
            }
        }
        false
    }

    /// Traces `from -> to` without normals; anything but `NoHit` blocks.
    fn segment_blocked(&self, from: Vec3, to: Vec3) -> bool {
        match Ray::between(from, to) {
            Some((ray, length)) => !matches!(
                self.raycast(&ray, length, Eye::Both, false, false),
                RaycastOutcome::NoHit
            ),
            None => false,
        }
    }
}

/// Right and up axes spanning the surface with `normal`, with up following
/// `up` where possible and `fallback` (usually the view ray) on floors and
/// ceilings.
fn surface_axes(normal: Vec3, up: Vec3, fallback: Vec3) -> (Vec3, Vec3) {
    let project = |v: Vec3| (v - normal * v.dot(normal)).try_normalize();
    let box_up = project(up)
        .or_else(|| project(fallback))
        .unwrap_or_else(|| normal.any_orthonormal_vector());
    (box_up.cross(normal), box_up)
}

/// Plane normal from the four face corners: the mean of the cross products
/// taken at the two diagonal-opposite corners, oriented like `reference`.
fn corner_plane_normal(corners: &[Vec3; 4], reference: Vec3) -> Option<Vec3> {
    let n0 = (corners[1] - corners[0]).cross(corners[3] - corners[0]);
    let n2 = (corners[3] - corners[2]).cross(corners[1] - corners[2]);
    let n = (n0.try_normalize()? + n2.try_normalize()?).try_normalize()?;
    Some(if n.dot(reference) < 0.0 { -n } else { n })
}
