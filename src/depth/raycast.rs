// src/depth/raycast.rs

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use glam::{IVec2, Vec2, Vec3};
use log::{debug, error};

use crate::config::RaycastConfig;
use crate::depth::buffer::DepthFieldBuffer;
use crate::depth::frame::{DepthFrame, EyeFrame, PLANE_NEAR};
use crate::depth::{DepthHit, Eye, RaycastOutcome, EYE_COUNT};
use crate::utils::geometry::closest_ray_param_to_line;
use crate::utils::util::{clamp, is_unit_length, lerp};
use crate::utils::Ray;

/// Raycaster over a [`DepthFieldBuffer`].
///
/// Owned by the caller; several raycasters may share one buffer through the
/// `Arc`.
pub struct DepthRaycaster {
    buffer: Arc<DepthFieldBuffer>,
    pub(crate) config: RaycastConfig,
    raycasts: AtomicU64,
}

/// Parameters of a single query, shared by both eyes.
#[derive(Debug, Clone, Copy)]
struct RayQuery {
    ray: Ray,
    max_distance: f32,
    reconstruct_normal: bool,
    allow_occluded_origin: bool,
}

/// A walk step that landed on a valid sample.
#[derive(Debug, Clone, Copy)]
struct WalkStep {
    texel: IVec2,
    env_depth: f32,
    point: Vec3,
    in_front: bool,
}

impl DepthRaycaster {
    pub fn new(config: RaycastConfig) -> Self {
        let buffer = Arc::new(DepthFieldBuffer::new(config.resolution));
        Self::with_buffer(buffer, config)
    }

    pub fn with_buffer(buffer: Arc<DepthFieldBuffer>, config: RaycastConfig) -> Self {
        DepthRaycaster {
            buffer,
            config,
            raycasts: AtomicU64::new(0),
        }
    }

    pub fn buffer(&self) -> &Arc<DepthFieldBuffer> {
        &self.buffer
    }

    pub fn config(&self) -> &RaycastConfig {
        &self.config
    }

    /// Number of [`raycast`](Self::raycast) calls made so far, including the
    /// ones issued internally by box placement.
    pub fn raycast_count(&self) -> u64 {
        self.raycasts.load(Ordering::Relaxed)
    }

    /// Finds where `ray` first meets the captured environment.
    ///
    /// With [`Eye::Both`] the left eye runs first; its `Success` wins,
    /// otherwise the right eye's `Success` does. When both eyes report
    /// `HitPointOccluded` the point that travelled farther from the origin is
    /// returned, since it has seen more of the environment. Any other
    /// combination returns the left eye's result; that choice is arbitrary.
    ///
    /// `ray.direction` must be unit length and `max_distance` non-negative;
    /// violations are logged and answered with `NoHit`.
    pub fn raycast(
        &self,
        ray: &Ray,
        max_distance: f32,
        eye: Eye,
        reconstruct_normal: bool,
        allow_occluded_origin: bool,
    ) -> RaycastOutcome {
        self.raycasts.fetch_add(1, Ordering::Relaxed);

        if !is_unit_length(ray.direction, self.config.unit_length_tolerance) {
            error!(
                "Raycast direction {:?} is not unit length (|d| = {})",
                ray.direction,
                ray.direction.length()
            );
            return RaycastOutcome::NoHit;
        }
        if !(max_distance >= 0.0) || !max_distance.is_finite() {
            error!("Raycast max distance must be finite and non-negative, got {}", max_distance);
            return RaycastOutcome::NoHit;
        }

        let Some(frame) = self.buffer.snapshot() else {
            return RaycastOutcome::NotReady;
        };

        let query = RayQuery {
            ray: *ray,
            max_distance,
            reconstruct_normal,
            allow_occluded_origin,
        };
        match eye.index() {
            Some(index) => self.raycast_eye(&frame, index, &query),
            None => self.raycast_stereo(&frame, &query),
        }
    }

    fn raycast_stereo(&self, frame: &DepthFrame, query: &RayQuery) -> RaycastOutcome {
        let left = self.raycast_eye(frame, 0, query);
        if left.is_success() {
            return left;
        }
        let right = self.raycast_eye(frame, 1, query);
        if right.is_success() {
            return right;
        }
        if let (RaycastOutcome::HitPointOccluded(l), RaycastOutcome::HitPointOccluded(r)) =
            (left, right)
        {
            let origin = query.ray.origin;
            return if r.distance(origin) > l.distance(origin) {
                right
            } else {
                left
            };
        }
        left
    }

    fn raycast_eye(&self, frame: &DepthFrame, eye_index: usize, query: &RayQuery) -> RaycastOutcome {
        debug_assert!(eye_index < EYE_COUNT);
        let eye = frame.eye(eye_index);
        let ray = &query.ray;

        let Some((t_start, t_end)) = self.clip_to_frustum(eye, ray, query.max_distance) else {
            return RaycastOutcome::RayOutsideFrustum;
        };
        let start = ray.at(t_start);
        let end = ray.at(t_end);
        let start_depth = eye.camera.view_depth(start);
        let end_depth = eye.camera.view_depth(end);
        if start_depth <= 0.0 || end_depth <= 0.0 {
            return RaycastOutcome::RayOutsideFrustum;
        }
        let (Some(start_tex), Some(end_tex)) = (eye.texel_coords(start), eye.texel_coords(end))
        else {
            return RaycastOutcome::RayOutsideFrustum;
        };

        if !query.allow_occluded_origin {
            let env = eye.sample(eye.texel_at(start_tex));
            if env > 0.0 && start_depth > env {
                return RaycastOutcome::RayOccluded;
            }
        }

        let outcome = if eye.texel_at(start_tex) == eye.texel_at(end_tex) {
            Self::single_texel(eye, start, end, start_tex, start_depth, end_depth)
        } else {
            self.march(eye, start, end, start_tex, end_tex, start_depth, end_depth)
        };

        match outcome {
            RaycastOutcome::Success(hit) if query.reconstruct_normal => {
                let mut hit = hit;
                if let Some((normal, confidence)) = self.reconstruct_normal(eye, hit.point) {
                    hit.normal = Some(normal);
                    hit.confidence = confidence;
                }
                RaycastOutcome::Success(hit)
            }
            other => other,
        }
    }

    /// Clamps the ray to the eye's frustum, returning the parameter range
    /// that lies inside it.
    fn clip_to_frustum(&self, eye: &EyeFrame, ray: &Ray, max_distance: f32) -> Option<(f32, f32)> {
        let tolerance = self.config.frustum_tolerance;
        let planes = &eye.camera.planes;

        let mut t_start = 0.0f32;
        if !eye.camera.contains(ray.origin, tolerance) {
            // Walk every plane but the far one for a point where the ray re-enters.
            let mut entry: Option<f32> = None;
            for plane in &planes[..=PLANE_NEAR] {
                if plane.signed_distance(ray.origin) >= -tolerance {
                    continue;
                }
                let Some(t) = plane.intersect_ray(ray) else {
                    continue;
                };
                if t < 0.0 || t > max_distance {
                    continue;
                }
                if eye.camera.contains(ray.at(t), tolerance) {
                    entry = Some(entry.map_or(t, |e| e.min(t)));
                }
            }
            t_start = entry?;
            debug!("Ray origin clamped into frustum at t = {}", t_start);
        }

        let mut t_end = max_distance;
        for plane in planes {
            if plane.normal.dot(ray.direction) >= 0.0 {
                continue;
            }
            if let Some(t) = plane.intersect_ray(ray) {
                if t >= t_start {
                    t_end = t_end.min(t);
                }
            }
        }
        Some((t_start, t_end.max(t_start)))
    }

    /// Both ends fall in the same texel: one comparison decides.
    fn single_texel(
        eye: &EyeFrame,
        start: Vec3,
        end: Vec3,
        tex: Vec2,
        start_depth: f32,
        end_depth: f32,
    ) -> RaycastOutcome {
        let env = eye.sample(eye.texel_at(tex));
        if env <= 0.0 || start_depth >= env {
            return RaycastOutcome::RayOccluded;
        }
        if end_depth < env {
            return RaycastOutcome::NoHit;
        }
        // View depth is linear along a world-space segment.
        let s = (env - start_depth) / (end_depth - start_depth);
        RaycastOutcome::Success(DepthHit::at(start.lerp(end, s)))
    }

    /// Fixed-step digital walk across the texels between the two ends.
    #[allow(clippy::too_many_arguments)]
    fn march(
        &self,
        eye: &EyeFrame,
        start: Vec3,
        end: Vec3,
        start_tex: Vec2,
        end_tex: Vec2,
        start_depth: f32,
        end_depth: f32,
    ) -> RaycastOutcome {
        let delta = end_tex - start_tex;
        let steps = delta.abs().max_element().ceil().max(1.0) as usize;
        let inv_start = 1.0 / start_depth;
        let inv_end = 1.0 / end_depth;

        let mut found_empty_space = false;
        let mut prev: Option<WalkStep> = None;
        for i in 0..=steps {
            let f = i as f32 / steps as f32;
            let texel = eye.texel_at(start_tex + delta * f);
            let inv_depth = lerp(inv_start, inv_end, f);
            let ray_depth = 1.0 / inv_depth;
            // Perspective-correct position along the world segment.
            let s = f * inv_end / inv_depth;
            let point = start.lerp(end, s);

            let env_depth = eye.sample(texel);
            if env_depth <= 0.0 {
                continue;
            }
            let in_front = ray_depth < env_depth;
            if in_front {
                found_empty_space = true;
            } else if let Some(last) = prev.filter(|p| p.in_front) {
                return self.resolve_crossing(eye, start, end, &last, texel, env_depth, point);
            }
            prev = Some(WalkStep {
                texel,
                env_depth,
                point,
                in_front,
            });
        }

        if found_empty_space {
            RaycastOutcome::NoHit
        } else {
            RaycastOutcome::RayOccluded
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn resolve_crossing(
        &self,
        eye: &EyeFrame,
        start: Vec3,
        end: Vec3,
        last: &WalkStep,
        texel: IVec2,
        env_depth: f32,
        point: Vec3,
    ) -> RaycastOutcome {
        if (env_depth - last.env_depth).abs() > self.config.discontinuity_threshold {
            debug!(
                "Depth discontinuity {} -> {} at texel {:?}",
                last.env_depth, env_depth, texel
            );
            return RaycastOutcome::HitPointOccluded(last.point);
        }

        let surface_a = eye.unproject(last.texel, last.env_depth);
        let surface_b = eye.unproject(texel, env_depth);
        let direction = (end - start).normalize_or_zero();
        let segment = Ray::new(start, direction);
        let t_min = last.point.distance(start);
        let t_max = point.distance(start);
        let t = clamp(closest_ray_param_to_line(&segment, surface_a, surface_b), t_min, t_max);
        RaycastOutcome::Success(DepthHit::at(segment.at(t)))
    }

    pub(crate) fn reconstruct_normal(&self, eye: &EyeFrame, point: Vec3) -> Option<(Vec3, f32)> {
        crate::depth::normal::reconstruct_normal_at_point(
            eye,
            point,
            self.config.normal_tap_step,
            self.config.normal_agreement_cos,
        )
    }

    /// Reconstructs the surface normal at `point` from the live frame.
    ///
    /// Normals come from a single view; [`Eye::Both`] reads the left eye.
    /// Returns `None` before the first completed copy.
    pub fn reconstruct_normal_at_point(&self, eye: Eye, point: Vec3) -> Option<(Vec3, f32)> {
        let frame = self.buffer.snapshot()?;
        let index = eye.index().unwrap_or(0);
        self.reconstruct_normal(frame.eye(index), point)
    }
}
