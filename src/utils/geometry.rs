// src/utils/geometry.rs
// Geometry primitives shared by the depth raycaster and the triangulator.

use glam::{Vec2, Vec3, Vec4};

/// A ray in world space. `direction` is expected to be unit length; the
/// raycaster checks this before using it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Ray { origin, direction }
    }

    /// Builds a ray from `from` towards `to`, returning the unit ray and the
    /// distance between the points. `None` for coincident points.
    pub fn between(from: Vec3, to: Vec3) -> Option<(Self, f32)> {
        let delta = to - from;
        let len = delta.length();
        if len <= f32::EPSILON || !len.is_finite() {
            return None;
        }
        Some((Ray::new(from, delta / len), len))
    }

    #[inline]
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}

/// A plane `normal · p + d = 0`. Points with a positive signed distance are
/// on the side the normal points to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub normal: Vec3,
    pub d: f32,
}

impl Plane {
    /// Builds a plane from the `(a, b, c, d)` coefficients of a clip-space row
    /// combination, normalizing so distances are in world units.
    pub fn from_coefficients(coeffs: Vec4) -> Self {
        let normal = coeffs.truncate();
        let len = normal.length();
        if len <= f32::EPSILON {
            return Plane { normal: Vec3::ZERO, d: coeffs.w };
        }
        Plane {
            normal: normal / len,
            d: coeffs.w / len,
        }
    }

    #[inline]
    pub fn signed_distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.d
    }

    /// Parameter `t` at which `ray` crosses the plane, if it is not parallel.
    pub fn intersect_ray(&self, ray: &Ray) -> Option<f32> {
        let denom = self.normal.dot(ray.direction);
        if denom.abs() <= 1e-8 {
            return None;
        }
        Some(-self.signed_distance(ray.origin) / denom)
    }
}

/// Axis-aligned 2D bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds2 {
    pub min: Vec2,
    pub max: Vec2,
}

impl Default for Bounds2 {
    fn default() -> Self {
        Bounds2::new_empty()
    }
}

impl Bounds2 {
    pub fn new_empty() -> Self {
        Bounds2 {
            min: Vec2::splat(f32::INFINITY),
            max: Vec2::splat(f32::NEG_INFINITY),
        }
    }

    pub fn new(min: Vec2, max: Vec2) -> Self {
        Bounds2 { min, max }
    }

    pub fn from_points(points: &[Vec2]) -> Self {
        let mut bounds = Bounds2::new_empty();
        for p in points {
            bounds.expand_point(*p);
        }
        bounds
    }

    pub fn expand_point(&mut self, p: Vec2) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    pub fn size(&self) -> Vec2 {
        (self.max - self.min).max(Vec2::ZERO)
    }
}

/// 2D cross product of `(b - a)` and `(c - a)`. Positive when `a, b, c` turn
/// counter-clockwise.
#[inline]
pub fn orient2d(a: Vec2, b: Vec2, c: Vec2) -> f32 {
    (b - a).perp_dot(c - a)
}

/// Signed area of a closed loop (shoelace). Positive for counter-clockwise.
pub fn signed_area(points: &[Vec2]) -> f32 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for i in 0..points.len() {
        let a = points[i];
        let b = points[(i + 1) % points.len()];
        sum += a.perp_dot(b);
    }
    sum * 0.5
}

/// Unsigned area of a 2D triangle.
#[inline]
pub fn triangle_area(a: Vec2, b: Vec2, c: Vec2) -> f32 {
    orient2d(a, b, c).abs() * 0.5
}

/// Inclusive point-in-triangle test for a counter-clockwise triangle.
pub fn point_in_triangle(p: Vec2, a: Vec2, b: Vec2, c: Vec2) -> bool {
    orient2d(a, b, p) >= 0.0 && orient2d(b, c, p) >= 0.0 && orient2d(c, a, p) >= 0.0
}

/// Intersects the horizontal ray `origin + (t, 0)`, `t >= 0`, with segment
/// `a-b`. Returns the x coordinate of the hit.
pub fn horizontal_ray_hit(origin: Vec2, a: Vec2, b: Vec2) -> Option<f32> {
    if (a.y > origin.y) == (b.y > origin.y) && a.y != origin.y && b.y != origin.y {
        return None;
    }
    if a.y == b.y {
        // Collinear with the ray: the nearest endpoint ahead of the origin.
        if a.y != origin.y {
            return None;
        }
        let x = a.x.min(b.x).max(origin.x);
        return (x <= a.x.max(b.x)).then_some(x);
    }
    let t = (origin.y - a.y) / (b.y - a.y);
    if !(0.0..=1.0).contains(&t) {
        return None;
    }
    let x = a.x + t * (b.x - a.x);
    (x >= origin.x).then_some(x)
}

/// Closest point on `ray` (restricted to `t >= 0`) to the infinite line
/// through `p0` and `p1`. Falls back to the projection of `p0` when the two
/// are parallel or the line is degenerate. Returns the ray parameter.
pub fn closest_ray_param_to_line(ray: &Ray, p0: Vec3, p1: Vec3) -> f32 {
    let u = ray.direction;
    let v = p1 - p0;
    let w = ray.origin - p0;
    let a = u.dot(u);
    let b = u.dot(v);
    let c = v.dot(v);
    let d = u.dot(w);
    let e = v.dot(w);
    let denom = a * c - b * b;
    let t = if c <= 1e-12 || denom.abs() <= 1e-9 * a * c {
        -d / a
    } else {
        (b * e - c * d) / denom
    };
    t.max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_plane_distance_and_intersection() {
        let plane = Plane::from_coefficients(Vec4::new(0.0, 0.0, 2.0, 4.0));
        assert_approx_eq!(plane.signed_distance(Vec3::ZERO), 2.0);
        let ray = Ray::new(Vec3::new(0.0, 0.0, 1.0), -Vec3::Z);
        assert_approx_eq!(plane.intersect_ray(&ray).unwrap(), 3.0);
    }

    #[test]
    fn test_signed_area_orientation() {
        let square = [
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(0.0, 1.0),
        ];
        assert_approx_eq!(signed_area(&square), 1.0);
        let mut reversed = square;
        reversed.reverse();
        assert_approx_eq!(signed_area(&reversed), -1.0);
    }

    #[test]
    fn test_bounds_from_points() {
        let bounds = Bounds2::from_points(&[Vec2::new(1.0, -2.0), Vec2::new(-1.0, 3.0), Vec2::ZERO]);
        assert_eq!(bounds.min, Vec2::new(-1.0, -2.0));
        assert_eq!(bounds.max, Vec2::new(1.0, 3.0));
        assert_eq!(bounds.size(), Vec2::new(2.0, 5.0));
        assert_eq!(Bounds2::new_empty().size(), Vec2::ZERO);
    }

    #[test]
    fn test_horizontal_ray_hit() {
        let hit = horizontal_ray_hit(Vec2::ZERO, Vec2::new(2.0, -1.0), Vec2::new(2.0, 1.0));
        assert_eq!(hit, Some(2.0));
        assert!(horizontal_ray_hit(Vec2::ZERO, Vec2::new(-2.0, -1.0), Vec2::new(-2.0, 1.0)).is_none());
    }

    #[test]
    fn test_closest_ray_param_to_line() {
        let ray = Ray::new(Vec3::ZERO, Vec3::X);
        let t = closest_ray_param_to_line(&ray, Vec3::new(3.0, 1.0, -1.0), Vec3::new(3.0, 1.0, 1.0));
        assert_approx_eq!(t, 3.0);
    }
}
