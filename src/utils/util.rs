//! # Numeric helpers
//!
//! Small scalar and vector helpers shared by the raycaster and the
//! partitioner.
//!
//! `clamp` differs from `f32::clamp` in that it never panics on an inverted
//! range.

use glam::Vec3;

/// Restricts `value` to `[min, max]`. NaN passes through untouched.
///
/// ```
/// use mr_scene_core::utils::util::clamp;
///
/// assert_eq!(clamp(0.25, 0.0, 1.0), 0.25);
/// assert_eq!(clamp(-3.0, 0.0, 1.0), 0.0);
/// assert_eq!(clamp(2.0, 1.0, 0.5), 0.5);
/// ```
pub fn clamp(value: f32, min: f32, max: f32) -> f32 {
    if value > max {
        max
    } else if value < min {
        min
    } else {
        value
    }
}

/// Linear interpolation between `a` and `b`.
#[inline]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Returns `true` when `v` has length 1 within `tolerance`.
pub fn is_unit_length(v: Vec3, tolerance: f32) -> bool {
    let len = v.length();
    len.is_finite() && (len - 1.0).abs() <= tolerance
}

/// Index of the smallest value, lowest index on ties. `None` for an empty iterator.
pub fn argmin<I: IntoIterator<Item = f32>>(values: I) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, v) in values.into_iter().enumerate() {
        match best {
            Some((_, b)) if v >= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}
