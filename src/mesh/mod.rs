// src/mesh/mod.rs
//! # Mesh partitioning
//!
//! Splits one captured room mesh into independent fragments around a handful
//! of seed points, while an optional axis-aligned band (typically a height
//! range) is kept whole as a single reserved fragment.
//!
//! The synchronous entry point is [`Partitioner::segment`]; long meshes go
//! through [`Partitioner::spawn`], which runs on the rayon pool and hands back
//! a [`SegmentationTask`].

mod components;
pub mod partition;
mod scratch;
pub mod task;

pub use partition::Partitioner;
pub use task::{CancelHandle, SegmentationTask};

use std::fmt;
use std::sync::Arc;

use glam::{Vec2, Vec3, Vec4};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// World axis a reserved band is measured along.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub fn component(&self, v: Vec3) -> f32 {
        match self {
            Axis::X => v.x,
            Axis::Y => v.y,
            Axis::Z => v.z,
        }
    }
}

/// How many of a triangle's vertices must lie in the band for the triangle to
/// be reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BandRule {
    /// All three vertices inside `[min, max]`.
    #[default]
    AllVertices,
    /// At least one vertex inside `[min, max]`.
    AnyVertex,
}

/// Closed interval along one axis whose triangles stay together.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReservedBand {
    pub axis: Axis,
    pub min: f32,
    pub max: f32,
}

impl ReservedBand {
    pub fn along(axis: Axis, min: f32, max: f32) -> Self {
        ReservedBand { axis, min, max }
    }

    pub fn contains(&self, point: Vec3) -> bool {
        let v = self.axis.component(point);
        v >= self.min && v <= self.max
    }

    pub fn holds_triangle(&self, rule: BandRule, corners: &[Vec3; 3]) -> bool {
        match rule {
            BandRule::AllVertices => corners.iter().all(|&p| self.contains(p)),
            BandRule::AnyVertex => corners.iter().any(|&p| self.contains(p)),
        }
    }
}

/// Caller-supplied seed choice: gets the triangle's corners and all seeds and
/// returns a seed index.
pub type SeedFn = dyn Fn(&[Vec3; 3], &[Vec3]) -> usize + Send + Sync;

/// How non-reserved triangles pick their seed. Ties go to the lowest index.
#[derive(Clone, Default)]
pub enum SeedAssignment {
    /// Seed closest to the triangle centroid.
    #[default]
    NearestCentroid,
    /// Seed closest to any of the three corners.
    NearestVertex,
    Custom(Arc<SeedFn>),
}

impl fmt::Debug for SeedAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeedAssignment::NearestCentroid => write!(f, "NearestCentroid"),
            SeedAssignment::NearestVertex => write!(f, "NearestVertex"),
            SeedAssignment::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// A triangle mesh to partition. Optional channels carry one entry per
/// position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshInput {
    pub positions: Vec<Vec3>,
    pub indices: Vec<u32>,
    pub uvs: Option<Vec<Vec2>>,
    pub tangents: Option<Vec<Vec4>>,
    pub colors: Option<Vec<Vec4>>,
}

impl MeshInput {
    pub fn new(positions: Vec<Vec3>, indices: Vec<u32>) -> Self {
        MeshInput {
            positions,
            indices,
            ..Default::default()
        }
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub(crate) fn attributes(&self) -> Attributes<'_> {
        Attributes {
            positions: &self.positions,
            indices: &self.indices,
            uvs: self.uvs.as_deref(),
            tangents: self.tangents.as_deref(),
            colors: self.colors.as_deref(),
        }
    }
}

/// One output fragment with its own vertex buffer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshSegment {
    /// Seed that claimed the triangles; `None` for the reserved segment.
    pub seed: Option<usize>,
    pub positions: Vec<Vec3>,
    pub indices: Vec<u32>,
    pub uvs: Option<Vec<Vec2>>,
    pub tangents: Option<Vec<Vec4>>,
    pub colors: Option<Vec<Vec4>>,
    pub reserved: bool,
}

impl MeshSegment {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Segments without triangles carry nothing renderable; consumers drop them.
    pub fn is_degenerate(&self) -> bool {
        self.indices.is_empty()
    }

    pub(crate) fn attributes(&self) -> Attributes<'_> {
        Attributes {
            positions: &self.positions,
            indices: &self.indices,
            uvs: self.uvs.as_deref(),
            tangents: self.tangents.as_deref(),
            colors: self.colors.as_deref(),
        }
    }
}

/// Result of one partitioning run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Segmentation {
    /// Ordered by seed index; seeds that claimed nothing are absent.
    pub segments: Vec<MeshSegment>,
    /// Present exactly when a band was requested, even if it is empty.
    pub reserved: Option<MeshSegment>,
}

impl Segmentation {
    pub fn triangle_count(&self) -> usize {
        self.segments.iter().map(MeshSegment::triangle_count).sum::<usize>()
            + self.reserved.as_ref().map_or(0, MeshSegment::triangle_count)
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PartitionError {
    #[error("index count {0} is not a multiple of 3")]
    InvalidIndexCount(usize),
    #[error("index {index} at position {at} is out of range for {vertex_count} vertices")]
    IndexOutOfRange { at: usize, index: u32, vertex_count: usize },
    #[error("{channel} channel has {actual} entries, expected {expected}")]
    MismatchedChannel { channel: &'static str, expected: usize, actual: usize },
    #[error("at least one seed point is required")]
    NoSeedPoints,
    #[error("reserved band [{min}, {max}] is not a finite, ordered interval")]
    InvalidBand { min: f32, max: f32 },
    #[error("custom assignment picked seed {seed} for triangle {triangle}, only {seed_count} seeds exist")]
    CustomSeedOutOfRange { triangle: usize, seed: usize, seed_count: usize },
    #[error("segmentation was cancelled")]
    Cancelled,
    #[error("segmentation worker stopped without reporting a result")]
    WorkerLost,
    #[error("segmentation result was already taken")]
    AlreadyDelivered,
}

/// Borrowed view over a vertex buffer and its optional channels, shared by
/// inputs and segments so both can be cut into new segments.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Attributes<'a> {
    pub positions: &'a [Vec3],
    pub indices: &'a [u32],
    pub uvs: Option<&'a [Vec2]>,
    pub tangents: Option<&'a [Vec4]>,
    pub colors: Option<&'a [Vec4]>,
}

impl Attributes<'_> {
    pub fn corners(&self, triangle: usize) -> [Vec3; 3] {
        let base = triangle * 3;
        [
            self.positions[self.indices[base] as usize],
            self.positions[self.indices[base + 1] as usize],
            self.positions[self.indices[base + 2] as usize],
        ]
    }

    /// Copies `triangles` into a fresh segment, renumbering vertices in order
    /// of first use.
    pub fn extract(&self, triangles: &[u32], seed: Option<usize>, reserved: bool) -> MeshSegment {
        let mut remap = std::collections::HashMap::with_capacity(triangles.len() * 2);
        let mut source = Vec::with_capacity(triangles.len() * 2);
        let mut indices = Vec::with_capacity(triangles.len() * 3);
        for &tri in triangles {
            let base = tri as usize * 3;
            for &old in &self.indices[base..base + 3] {
                let local = *remap.entry(old).or_insert_with(|| {
                    source.push(old as usize);
                    (source.len() - 1) as u32
                });
                indices.push(local);
            }
        }
        let gather = |channel: Option<&[Vec4]>| -> Option<Vec<Vec4>> {
            channel.map(|c| source.iter().map(|&i| c[i]).collect())
        };
        MeshSegment {
            seed,
            positions: source.iter().map(|&i| self.positions[i]).collect(),
            indices,
            uvs: self.uvs.map(|c| source.iter().map(|&i| c[i]).collect()),
            tangents: gather(self.tangents),
            colors: gather(self.colors),
            reserved,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_band_rules() {
        let band = ReservedBand::along(Axis::Y, 0.5, 1.5);
        let tri = [Vec3::ZERO, Vec3::new(0.0, 1.0, 0.0), Vec3::new(1.0, 1.0, 0.0)];
        assert!(!band.holds_triangle(BandRule::AllVertices, &tri));
        assert!(band.holds_triangle(BandRule::AnyVertex, &tri));
        let inside = [Vec3::new(0.0, 1.0, 0.0); 3];
        assert!(band.holds_triangle(BandRule::AllVertices, &inside));
    }

    #[test]
    fn test_extract_renumbers_and_carries_channels() {
        let mut mesh = quad_row(2);
        mesh.uvs = Some((0..mesh.positions.len()).map(|i| Vec2::splat(i as f32)).collect());
        let segment = mesh.attributes().extract(&[2, 3], Some(1), false);
        assert_eq!(segment.positions.len(), 4);
        assert_eq!(segment.indices, vec![0, 1, 2, 0, 2, 3]);
        assert_eq!(segment.positions[0], Vec3::new(2.0, 0.0, 0.0));
        assert_eq!(segment.uvs.as_ref().unwrap()[0], Vec2::splat(4.0));
        assert!(segment.tangents.is_none());
    }
}
