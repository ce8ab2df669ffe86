// src/mesh/components.rs
// Connected-component split of a segment, used when `split_disconnected` is on.

use std::collections::HashMap;

use union_find::{QuickUnionUf, UnionBySize, UnionFind};

use crate::mesh::MeshSegment;

/// Splits `segment` into pieces whose triangles are connected through shared
/// vertices. Pieces keep the segment's seed and come out in order of their
/// first triangle. A connected segment is returned unchanged.
pub(crate) fn split_components(segment: MeshSegment) -> Vec<MeshSegment> {
    if segment.is_degenerate() {
        return vec![segment];
    }

    let mut sets = QuickUnionUf::<UnionBySize>::new(segment.positions.len());
    for tri in segment.indices.chunks_exact(3) {
        let (a, b, c) = (tri[0] as usize, tri[1] as usize, tri[2] as usize);
        sets.union(a, b);
        sets.union(a, c);
    }

    let mut order: HashMap<usize, usize> = HashMap::new();
    let mut groups: Vec<Vec<u32>> = Vec::new();
    for (t, tri) in segment.indices.chunks_exact(3).enumerate() {
        let root = sets.find(tri[0] as usize);
        let slot = *order.entry(root).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(t as u32);
    }

    if groups.len() == 1 {
        return vec![segment];
    }
    let source = segment.attributes();
    groups
        .iter()
        .map(|triangles| source.extract(triangles, segment.seed, segment.reserved))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::test_support::{push_quad, quad_row};
    use glam::Vec3;

    fn as_segment(mesh: crate::mesh::MeshInput) -> MeshSegment {
        MeshSegment {
            seed: Some(3),
            positions: mesh.positions,
            indices: mesh.indices,
            ..Default::default()
        }
    }

    #[test]
    fn test_disjoint_quads_split_apart() {
        let pieces = split_components(as_segment(quad_row(3)));
        assert_eq!(pieces.len(), 3);
        for (i, piece) in pieces.iter().enumerate() {
            assert_eq!(piece.seed, Some(3));
            assert_eq!(piece.triangle_count(), 2);
            assert_eq!(piece.positions.len(), 4);
            assert_eq!(piece.positions[0].x, i as f32 * 2.0);
        }
    }

    #[test]
    fn test_connected_segment_is_untouched() {
        let mut mesh = crate::mesh::MeshInput::default();
        push_quad(&mut mesh, Vec3::ZERO);
        // Second quad shares an edge by index with the first.
        let base = mesh.positions.len() as u32;
        mesh.positions.extend([Vec3::new(2.0, 0.0, 0.0), Vec3::new(2.0, 1.0, 0.0)]);
        mesh.indices.extend([1, base, base + 1, 1, base + 1, 2]);
        let segment = as_segment(mesh);
        let pieces = split_components(segment.clone());
        assert_eq!(pieces, vec![segment]);
    }
}
