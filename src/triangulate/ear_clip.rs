// src/triangulate/ear_clip.rs

use glam::Vec2;
use log::{debug, warn};

use crate::utils::geometry::orient2d;
use crate::utils::Bounds2;

/// Boundary points closer than this fraction of the ring's extent to a
/// triangle side count as lying on that side.
const EDGE_TOLERANCE: f32 = 1e-5;

/// Doubly linked view of the ring slots that have not been clipped yet.
struct Links {
    prev: Vec<usize>,
    next: Vec<usize>,
    remaining: usize,
}

impl Links {
    fn new(n: usize) -> Self {
        Links {
            prev: (0..n).map(|i| (i + n - 1) % n).collect(),
            next: (0..n).map(|i| (i + 1) % n).collect(),
            remaining: n,
        }
    }

    /// Unlinks `slot` and returns its former neighbours.
    fn remove(&mut self, slot: usize) -> (usize, usize) {
        let (a, c) = (self.prev[slot], self.next[slot]);
        self.next[a] = c;
        self.prev[c] = a;
        self.remaining -= 1;
        (a, c)
    }
}

/// Ear-clips a counter-clockwise ring of vertex ids (seams from hole merging
/// may repeat ids). Produces `ring.len() - 2` counter-clockwise triangles.
pub(crate) fn clip_ears(points: &[Vec2], ring: &[usize]) -> Vec<[usize; 3]> {
    let n = ring.len();
    let mut triangles = Vec::with_capacity(n.saturating_sub(2));
    if n < 3 {
        return triangles;
    }

    let pos: Vec<Vec2> = ring.iter().map(|&i| points[i]).collect();
    let extent = Bounds2::from_points(&pos).size().max_element();
    let tolerance = extent.max(f32::MIN_POSITIVE) * EDGE_TOLERANCE;
    let mut links = Links::new(n);

    let mut current = 0;
    let mut misses = 0;
    while links.remaining > 3 {
        let (a, c) = (links.prev[current], links.next[current]);
        if is_ear(&pos, &links, a, current, c, tolerance) {
            triangles.push([ring[a], ring[current], ring[c]]);
            links.remove(current);
            misses = 0;
            // Step back so the neighbour that just changed shape is retried first.
            current = a;
            continue;
        }
        misses += 1;
        current = c;
        if misses < links.remaining {
            continue;
        }

        // A full lap without a proper ear: drop a zero-area corner, which
        // leaves the covered area unchanged.
        misses = 0;
        let slot = flat_corner(&pos, &links, current, tolerance).unwrap_or_else(|| {
            warn!(
                "No valid ear among {} ring vertices, forcing a clip; output may overlap",
                links.remaining
            );
            current
        });
        debug!("Clipping flat corner at ring slot {}", slot);
        let (a, c) = (links.prev[slot], links.next[slot]);
        triangles.push([ring[a], ring[slot], ring[c]]);
        links.remove(slot);
        current = a;
    }
    let (a, c) = (links.prev[current], links.next[current]);
    triangles.push([ring[a], ring[current], ring[c]]);
    triangles
}

/// `b` is an ear when its corner is convex and no ring edge passes through
/// the open interior of triangle `a, b, c`. Edges that merely touch or run
/// along the triangle's sides do not count, which keeps collinear seam and
/// hole edges from blocking every candidate.
fn is_ear(pos: &[Vec2], links: &Links, a: usize, b: usize, c: usize, tolerance: f32) -> bool {
    let (pa, pb, pc) = (pos[a], pos[b], pos[c]);
    if orient2d(pa, pb, pc) <= 0.0 {
        return false;
    }
    let sides = [(pa, pb), (pb, pc), (pc, pa)];
    let lo = pa.min(pb).min(pc);
    let hi = pa.max(pb).max(pc);

    let mut slot = a;
    for _ in 0..links.remaining {
        let following = links.next[slot];
        let (u, v) = (pos[slot], pos[following]);
        let overlaps_box = u.max(v).cmpge(lo).all() && u.min(v).cmple(hi).all();
        if overlaps_box && crosses_interior(&sides, u, v, tolerance) {
            return false;
        }
        slot = following;
    }
    true
}

/// Whether segment `u-v` has a point farther than `tolerance` inside every
/// side of the counter-clockwise triangle given by `sides`.
fn crosses_interior(sides: &[(Vec2, Vec2); 3], u: Vec2, v: Vec2, tolerance: f32) -> bool {
    let (mut lo, mut hi) = (0.0f32, 1.0f32);
    for &(s0, s1) in sides {
        let len = s0.distance(s1);
        if len <= f32::EPSILON {
            return false;
        }
        // Inset distances of the two endpoints; linear along the segment.
        let du = orient2d(s0, s1, u) / len - tolerance;
        let dv = orient2d(s0, s1, v) / len - tolerance;
        match (du > 0.0, dv > 0.0) {
            (true, true) => {}
            (false, false) => return false,
            (true, false) => hi = hi.min(du / (du - dv)),
            (false, true) => lo = lo.max(du / (du - dv)),
        }
    }
    lo < hi
}

/// First remaining slot, walking from `start`, whose corner has no area.
fn flat_corner(pos: &[Vec2], links: &Links, start: usize, tolerance: f32) -> Option<usize> {
    let mut slot = start;
    for _ in 0..links.remaining {
        let (pa, pb, pc) = (pos[links.prev[slot]], pos[slot], pos[links.next[slot]]);
        if orient2d(pa, pb, pc).abs() <= tolerance * pa.distance(pc) {
            return Some(slot);
        }
        slot = links.next[slot];
    }
    None
}
