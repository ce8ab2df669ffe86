// src/triangulate/seam.rs
// Merges hole loops into the outer loop with zero-width seam edges.

use glam::Vec2;
use log::warn;

use crate::utils::geometry::{horizontal_ray_hit, orient2d, point_in_triangle};

/// Cuts every hole into `ring` (counter-clockwise outer loop of vertex ids).
/// Holes must be clockwise. Rightmost holes go first so later seams can land
/// on earlier holes.
pub(crate) fn merge_holes(points: &[Vec2], mut ring: Vec<usize>, mut holes: Vec<Vec<usize>>) -> Vec<usize> {
    holes.sort_by(|a, b| max_x(points, b).total_cmp(&max_x(points, a)));
    for hole in holes {
        match bridge(points, &ring, &hole) {
            Some(merged) => ring = merged,
            None => warn!("Hole at {:?} is not inside the outer loop, skipping it", points[hole[0]]),
        }
    }
    ring
}

fn max_x(points: &[Vec2], loop_ids: &[usize]) -> f32 {
    loop_ids
        .iter()
        .map(|&i| points[i].x)
        .fold(f32::NEG_INFINITY, f32::max)
}

/// Splices `hole` into `ring` through a seam from the hole's rightmost vertex
/// to a ring vertex it can see.
fn bridge(points: &[Vec2], ring: &[usize], hole: &[usize]) -> Option<Vec<usize>> {
    let start = (0..hole.len()).max_by(|&a, &b| {
        let (pa, pb) = (points[hole[a]], points[hole[b]]);
        pa.x.total_cmp(&pb.x).then(pb.y.total_cmp(&pa.y))
    })?;
    let m = points[hole[start]];
    let anchor = visible_vertex(points, ring, m)?;

    let mut merged = Vec::with_capacity(ring.len() + hole.len() + 2);
    merged.extend_from_slice(&ring[..=anchor]);
    merged.extend(hole[start..].iter().chain(&hole[..start]));
    merged.push(hole[start]);
    merged.push(ring[anchor]);
    merged.extend_from_slice(&ring[anchor + 1..]);
    Some(merged)
}

/// Ring position of a vertex visible from `m`, found by casting a ray towards
/// +x and, when reflex vertices shadow the hit, taking the one closest in
/// angle to the ray.
fn visible_vertex(points: &[Vec2], ring: &[usize], m: Vec2) -> Option<usize> {
    let n = ring.len();
    let mut best: Option<(f32, usize, usize)> = None;
    for i in 0..n {
        let j = (i + 1) % n;
        let (a, b) = (points[ring[i]], points[ring[j]]);
        if let Some(x) = horizontal_ray_hit(m, a, b) {
            if best.map_or(true, |(bx, _, _)| x < bx) {
                best = Some((x, i, j));
            }
        }
    }
    let (hit_x, i, j) = best?;
    let (a, b) = (points[ring[i]], points[ring[j]]);
    // The ray runs straight into a vertex.
    if a.y == m.y && a.x == hit_x {
        return Some(i);
    }
    if b.y == m.y && b.x == hit_x {
        return Some(j);
    }

    let candidate = if a.x > b.x || (a.x == b.x && (a.y - m.y).abs() < (b.y - m.y).abs()) {
        i
    } else {
        j
    };
    let hit = Vec2::new(hit_x, m.y);
    let p = points[ring[candidate]];
    let (t0, t1, t2) = if orient2d(m, hit, p) >= 0.0 { (m, hit, p) } else { (m, p, hit) };

    let mut chosen = candidate;
    let mut best_key = (f32::INFINITY, f32::INFINITY);
    for k in 0..n {
        let q = points[ring[k]];
        if k == candidate || q == p || q == m {
            continue;
        }
        let prev = points[ring[(k + n - 1) % n]];
        let next = points[ring[(k + 1) % n]];
        let reflex = orient2d(prev, q, next) < 0.0;
        if !reflex || !point_in_triangle(q, t0, t1, t2) {
            continue;
        }
        let d = q - m;
        let key = (d.y.abs().atan2(d.x), d.length_squared());
        if key < best_key {
            best_key = key;
            chosen = k;
        }
    }
    Some(chosen)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_into_square() {
        let points = vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(4.0, 0.0),
            Vec2::new(4.0, 4.0),
            Vec2::new(0.0, 4.0),
            // Clockwise hole.
            Vec2::new(1.0, 1.0),
            Vec2::new(1.0, 3.0),
            Vec2::new(3.0, 3.0),
            Vec2::new(3.0, 1.0),
        ];
        let ring = merge_holes(&points, vec![0, 1, 2, 3], vec![vec![4, 5, 6, 7]]);
        assert_eq!(ring.len(), 10);
        // The seam starts at the hole's rightmost, lowest vertex.
        let seam = ring.iter().position(|&v| v == 7).unwrap();
        assert!(ring[seam - 1] == 1 || ring[seam - 1] == 2);
        assert_eq!(ring.iter().filter(|&&v| v == 7).count(), 2);
    }

    #[test]
    fn test_reflex_vertex_shadows_hit() {
        // Outer loop with a notch pointing at the hole.
        let points = vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(6.0, 0.0),
            Vec2::new(6.0, 4.0),
            Vec2::new(3.5, 2.2),
            Vec2::new(0.0, 4.0),
            Vec2::new(1.0, 1.5),
            Vec2::new(1.0, 2.5),
            Vec2::new(2.0, 2.0),
        ];
        let idx = visible_vertex(&points, &[0, 1, 2, 3, 4], points[7]).unwrap();
        // The ray hits the right edge, but the notch vertex sits between the
        // ray and the corner it would otherwise bridge to.
        assert_eq!(idx, 3);
    }
}
