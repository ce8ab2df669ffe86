// src/triangulate/mod.rs
//! # Polygon triangulation
//!
//! Ear clipping for simple polygons with holes. Holes are first cut into the
//! outer loop with seam edges (see `seam`), turning the polygon into one
//! weakly simple loop that the ear clipper can consume. Pure and stateless;
//! safe to call from any number of threads.

pub mod anchor;
mod ear_clip;
mod seam;

pub use anchor::{wall_mesh, AnchorSurface, Rect2, SurfaceMesh, UvMapping};

use glam::Vec2;

use crate::utils::geometry::signed_area;

/// Output of [`triangulate_polygon`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Triangulation {
    /// Outer loop as supplied, followed by each hole loop as supplied.
    pub vertices: Vec<Vec2>,
    /// Triangle list into `vertices`.
    pub indices: Vec<u32>,
}

impl Triangulation {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn triangles(&self) -> impl Iterator<Item = [Vec2; 3]> + '_ {
        self.indices.chunks_exact(3).map(|t| {
            [
                self.vertices[t[0] as usize],
                self.vertices[t[1] as usize],
                self.vertices[t[2] as usize],
            ]
        })
    }

    /// Sum of the unsigned triangle areas.
    pub fn area(&self) -> f32 {
        self.triangles()
            .map(|[a, b, c]| crate::utils::geometry::triangle_area(a, b, c))
            .sum()
    }
}

/// Triangulates `outer` minus `holes`.
///
/// Loops may come in either orientation; triangles are wound like `outer`.
/// With `n` vertices and `h` holes the result has `n + 2h - 2` triangles.
/// Fewer than three outer vertices, or a zero-area outer loop, give an empty
/// index list. Holes with fewer than three vertices are ignored but their
/// vertices stay in the vertex list.
pub fn triangulate_polygon(outer: &[Vec2], holes: &[Vec<Vec2>]) -> Triangulation {
    let mut vertices = Vec::with_capacity(outer.len() + holes.iter().map(Vec::len).sum::<usize>());
    vertices.extend_from_slice(outer);
    for hole in holes {
        vertices.extend_from_slice(hole);
    }

    let outer_area = signed_area(outer);
    if outer.len() < 3 || outer_area == 0.0 || !outer_area.is_finite() {
        return Triangulation {
            vertices,
            indices: Vec::new(),
        };
    }

    let mut ring: Vec<usize> = (0..outer.len()).collect();
    if outer_area < 0.0 {
        ring.reverse();
    }

    let mut hole_loops = Vec::with_capacity(holes.len());
    let mut offset = outer.len();
    for hole in holes {
        let area = signed_area(hole);
        if hole.len() >= 3 && area != 0.0 {
            let mut ids: Vec<usize> = (offset..offset + hole.len()).collect();
            if area > 0.0 {
                ids.reverse();
            }
            hole_loops.push(ids);
        }
        offset += hole.len();
    }

    let ring = seam::merge_holes(&vertices, ring, hole_loops);
    let flip = outer_area < 0.0;
    let indices = ear_clip::clip_ears(&vertices, &ring)
        .into_iter()
        .flat_map(|[a, b, c]| if flip { [a, c, b] } else { [a, b, c] })
        .map(|i| i as u32)
        .collect();
    Triangulation { vertices, indices }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::geometry::orient2d;
    use assert_approx_eq::assert_approx_eq;
    use std::f32::consts::TAU;

    fn square(center: Vec2, half: f32) -> Vec<Vec2> {
        vec![
            center + Vec2::new(-half, -half),
            center + Vec2::new(half, -half),
            center + Vec2::new(half, half),
            center + Vec2::new(-half, half),
        ]
    }

    fn reversed(mut loop_points: Vec<Vec2>) -> Vec<Vec2> {
        loop_points.reverse();
        loop_points
    }

    fn assert_winding(tri: &Triangulation, ccw: bool) {
        for [a, b, c] in tri.triangles() {
            let o = orient2d(a, b, c);
            if ccw {
                assert!(o >= 0.0, "triangle {:?} is clockwise", [a, b, c]);
            } else {
                assert!(o <= 0.0, "triangle {:?} is counter-clockwise", [a, b, c]);
            }
        }
    }

    #[test]
    fn test_convex_polygon_gives_n_minus_two() {
        for n in 3..12 {
            let outer: Vec<Vec2> = (0..n)
                .map(|i| Vec2::from_angle(TAU * i as f32 / n as f32) * 2.0)
                .collect();
            let tri = triangulate_polygon(&outer, &[]);
            assert_eq!(tri.triangle_count(), n - 2);
            assert_approx_eq!(tri.area(), signed_area(&outer), 1e-4);
            assert_winding(&tri, true);
        }
    }

    #[test]
    fn test_square_with_rectangular_hole() {
        let outer = square(Vec2::ZERO, 2.0);
        let hole = reversed(square(Vec2::new(0.3, -0.2), 1.0));
        let tri = triangulate_polygon(&outer, &[hole]);
        assert_eq!(tri.vertices.len(), 8);
        assert_eq!(tri.triangle_count(), 8 + 2 - 2);
        assert_approx_eq!(tri.area(), 16.0 - 4.0, 1e-4);
        assert_winding(&tri, true);
    }

    #[test]
    fn test_hole_orientation_is_normalized() {
        let outer = square(Vec2::ZERO, 2.0);
        // Supplied counter-clockwise.
        let hole = square(Vec2::ZERO, 0.5);
        let tri = triangulate_polygon(&outer, &[hole]);
        assert_approx_eq!(tri.area(), 16.0 - 1.0, 1e-4);
    }

    #[test]
    fn test_rotated_hole() {
        let outer: Vec<Vec2> = (0..8)
            .map(|i| Vec2::from_angle(TAU * i as f32 / 8.0) * 5.0)
            .collect();
        let diamond = vec![
            Vec2::new(1.0, 0.0),
            Vec2::new(0.0, -1.0),
            Vec2::new(-1.0, 0.0),
            Vec2::new(0.0, 1.0),
        ];
        let tri = triangulate_polygon(&outer, &[diamond]);
        assert_eq!(tri.triangle_count(), 12 + 2 - 2);
        assert_approx_eq!(tri.area(), signed_area(&outer) - 2.0, 1e-3);
    }

    #[test]
    fn test_two_holes() {
        let outer = vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(10.0, 0.0),
            Vec2::new(10.0, 4.0),
            Vec2::new(0.0, 4.0),
        ];
        let left = reversed(square(Vec2::new(2.0, 2.0), 1.0));
        let right = reversed(square(Vec2::new(7.0, 2.0), 1.0));
        let tri = triangulate_polygon(&outer, &[left, right]);
        assert_eq!(tri.triangle_count(), 12 + 4 - 2);
        assert_approx_eq!(tri.area(), 40.0 - 8.0, 1e-3);
        assert_winding(&tri, true);
    }

    /// Square wall with a `cols x rows` grid of aligned square windows.
    fn window_grid(cols: usize, rows: usize) -> (Vec<Vec2>, Vec<Vec<Vec2>>) {
        let outer = vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(10.0, 0.0),
            Vec2::new(10.0, 10.0),
            Vec2::new(0.0, 10.0),
        ];
        let mut holes = Vec::new();
        for i in 0..cols {
            for j in 0..rows {
                let center = Vec2::new(1.5 + 2.3 * i as f32, 1.5 + 2.3 * j as f32);
                holes.push(reversed(square(center, 0.6)));
            }
        }
        (outer, holes)
    }

    fn assert_no_overlap(tri: &Triangulation, expected_area: f32) {
        assert_approx_eq!(tri.area(), expected_area, 1e-2);
        // Every triangle is wound like the outer loop, so no folded-over
        // triangle can cancel another's area.
        assert_winding(tri, true);
    }

    #[test]
    fn test_aligned_window_grid() {
        for (cols, rows) in [(2, 4), (3, 4), (4, 4)] {
            let (outer, holes) = window_grid(cols, rows);
            let h = holes.len();
            let tri = triangulate_polygon(&outer, &holes);
            let n = tri.vertices.len();
            assert_eq!(tri.triangle_count(), n + 2 * h - 2);
            assert_no_overlap(&tri, 100.0 - h as f32 * 1.44);
        }
    }

    #[test]
    fn test_clockwise_outer_keeps_its_winding() {
        let outer = reversed(square(Vec2::ZERO, 1.0));
        let tri = triangulate_polygon(&outer, &[square(Vec2::ZERO, 0.25)]);
        assert_approx_eq!(tri.area(), 4.0 - 0.25, 1e-4);
        assert_winding(&tri, false);
        // Vertex list keeps the supplied order.
        assert_eq!(tri.vertices[0], outer[0]);
    }

    #[test]
    fn test_degenerate_input_is_empty() {
        let tri = triangulate_polygon(&[Vec2::ZERO, Vec2::X], &[]);
        assert!(tri.indices.is_empty());
        assert_eq!(tri.vertices.len(), 2);

        let collinear = [Vec2::ZERO, Vec2::X, Vec2::new(2.0, 0.0)];
        assert!(triangulate_polygon(&collinear, &[]).indices.is_empty());
    }

    #[test]
    fn test_short_hole_is_ignored() {
        let outer = square(Vec2::ZERO, 1.0);
        let tri = triangulate_polygon(&outer, &[vec![Vec2::ZERO, Vec2::X * 0.1]]);
        assert_eq!(tri.vertices.len(), 6);
        assert_eq!(tri.triangle_count(), 2);
        assert!(tri.indices.iter().all(|&i| i < 4));
    }
}
