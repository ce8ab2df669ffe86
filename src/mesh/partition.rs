// src/mesh/partition.rs

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use glam::Vec3;
use log::{debug, info, warn};
use rayon::prelude::*;

use crate::config::PartitionConfig;
use crate::mesh::components::split_components;
use crate::mesh::scratch::ScratchArena;
use crate::mesh::{
    Attributes, MeshInput, MeshSegment, PartitionError, ReservedBand, SeedAssignment, Segmentation,
};
use crate::utils::util::argmin;

/// Label for triangles claimed by the reserved band.
const RESERVED: u32 = u32::MAX;

/// Splits room meshes into seed-owned fragments.
///
/// Cheap to clone; clones share the scratch gauge, so
/// [`outstanding_scratch_bytes`](Self::outstanding_scratch_bytes) covers every
/// run started from any of them.
#[derive(Debug, Clone, Default)]
pub struct Partitioner {
    config: PartitionConfig,
    assignment: SeedAssignment,
    scratch: Arc<AtomicUsize>,
}

impl Partitioner {
    pub fn new(config: PartitionConfig) -> Self {
        Partitioner {
            config,
            assignment: SeedAssignment::default(),
            scratch: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_assignment(mut self, assignment: SeedAssignment) -> Self {
        self.assignment = assignment;
        self
    }

    pub fn config(&self) -> &PartitionConfig {
        &self.config
    }

    /// A band along the configured default axis.
    pub fn band(&self, min: f32, max: f32) -> ReservedBand {
        ReservedBand::along(self.config.band_axis, min, max)
    }

    /// Bytes of scratch memory held by runs that have not retired yet.
    pub fn outstanding_scratch_bytes(&self) -> usize {
        self.scratch.load(Ordering::SeqCst)
    }

    /// Partitions `input` on the calling thread (classification still fans
    /// out over the rayon pool).
    ///
    /// Every triangle lands in exactly one output segment. Invalid input fails
    /// the whole call; no partial segmentation is ever returned.
    pub fn segment(
        &self,
        input: &MeshInput,
        seeds: &[Vec3],
        band: Option<ReservedBand>,
    ) -> Result<Segmentation, PartitionError> {
        self.run(input, seeds, band, &AtomicBool::new(false))
    }

    pub(crate) fn run(
        &self,
        input: &MeshInput,
        seeds: &[Vec3],
        band: Option<ReservedBand>,
        cancel: &AtomicBool,
    ) -> Result<Segmentation, PartitionError> {
        validate(input, seeds, band.as_ref())?;
        let mesh = input.attributes();
        let triangle_count = input.triangle_count();
        debug!(
            "Partitioning {} triangles around {} seeds (band: {:?})",
            triangle_count,
            seeds.len(),
            band
        );

        let mut arena = ScratchArena::new(self.scratch.clone());

        let mut labels: Vec<u32> = arena.buffer(triangle_count);
        let chunk = self.config.chunk_size.max(1);
        labels
            .par_chunks_mut(chunk)
            .enumerate()
            .try_for_each(|(c, out)| -> Result<(), PartitionError> {
                if cancel.load(Ordering::Relaxed) {
                    return Err(PartitionError::Cancelled);
                }
                for (i, label) in out.iter_mut().enumerate() {
                    *label = self.classify(&mesh, c * chunk + i, seeds, band.as_ref())?;
                }
                Ok(())
            })?;

        let mut counts: Vec<usize> = arena.buffer(seeds.len());
        let mut reserved_count = 0;
        for &label in &labels {
            match label {
                RESERVED => reserved_count += 1,
                seed => counts[seed as usize] += 1,
            }
        }
        let mut buckets: Vec<Vec<u32>> = counts.iter().map(|&n| Vec::with_capacity(n)).collect();
        let mut reserved_tris = Vec::with_capacity(reserved_count);
        for (t, &label) in labels.iter().enumerate() {
            match label {
                RESERVED => reserved_tris.push(t as u32),
                seed => buckets[seed as usize].push(t as u32),
            }
        }
        buckets.iter().for_each(|b| arena.register(b));
        arena.register(&reserved_tris);

        if cancel.load(Ordering::Relaxed) {
            return Err(PartitionError::Cancelled);
        }

        let split = self.config.split_disconnected;
        let segments: Vec<MeshSegment> = buckets
            .par_iter()
            .enumerate()
            .filter(|(_, tris)| !tris.is_empty())
            .flat_map_iter(|(seed, tris)| {
                let segment = mesh.extract(tris, Some(seed), false);
                if split {
                    split_components(segment)
                } else {
                    vec![segment]
                }
            })
            .collect();
        let reserved = band.map(|_| mesh.extract(&reserved_tris, None, true));

        drop(arena);
        let result = Segmentation { segments, reserved };
        info!(
            "Partitioned {} triangles into {} segments ({} reserved)",
            triangle_count,
            result.segments.len(),
            reserved_count
        );
        Ok(result)
    }

    fn classify(
        &self,
        mesh: &Attributes<'_>,
        triangle: usize,
        seeds: &[Vec3],
        band: Option<&ReservedBand>,
    ) -> Result<u32, PartitionError> {
        let corners = mesh.corners(triangle);
        if let Some(band) = band {
            if band.holds_triangle(self.config.band_rule, &corners) {
                return Ok(RESERVED);
            }
        }
        let seed = match &self.assignment {
            SeedAssignment::NearestCentroid => {
                let centroid = (corners[0] + corners[1] + corners[2]) / 3.0;
                nearest_seed(seeds, |s| s.distance_squared(centroid))
            }
            SeedAssignment::NearestVertex => nearest_seed(seeds, |s| {
                corners
                    .iter()
                    .map(|c| s.distance_squared(*c))
                    .fold(f32::INFINITY, f32::min)
            }),
            SeedAssignment::Custom(pick) => {
                let seed = pick(&corners, seeds);
                if seed >= seeds.len() {
                    return Err(PartitionError::CustomSeedOutOfRange {
                        triangle,
                        seed,
                        seed_count: seeds.len(),
                    });
                }
                seed
            }
        };
        Ok(seed as u32)
    }
}

fn nearest_seed<F: Fn(Vec3) -> f32>(seeds: &[Vec3], distance: F) -> usize {
    argmin(seeds.iter().map(|&s| distance(s))).unwrap_or(0)
}

fn validate(input: &MeshInput, seeds: &[Vec3], band: Option<&ReservedBand>) -> Result<(), PartitionError> {
    let fail = |err: PartitionError| {
        warn!("Rejecting partition request: {}", err);
        Err(err)
    };

    if input.indices.len() % 3 != 0 {
        return fail(PartitionError::InvalidIndexCount(input.indices.len()));
    }
    let vertex_count = input.positions.len();
    if let Some((at, &index)) = input
        .indices
        .iter()
        .enumerate()
        .find(|(_, &i)| i as usize >= vertex_count)
    {
        return fail(PartitionError::IndexOutOfRange {
            at,
            index,
            vertex_count,
        });
    }
    let channels = [
        ("uv", input.uvs.as_ref().map(Vec::len)),
        ("tangent", input.tangents.as_ref().map(Vec::len)),
        ("color", input.colors.as_ref().map(Vec::len)),
    ];
    for (channel, len) in channels {
        if let Some(actual) = len.filter(|&n| n != vertex_count) {
            return fail(PartitionError::MismatchedChannel {
                channel,
                expected: vertex_count,
                actual,
            });
        }
    }
    if seeds.is_empty() {
        return fail(PartitionError::NoSeedPoints);
    }
    if let Some(band) = band {
        if !(band.min.is_finite() && band.max.is_finite() && band.min <= band.max) {
            return fail(PartitionError::InvalidBand {
                min: band.min,
                max: band.max,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::test_support::{push_quad, quad_row};
    use crate::mesh::{Axis, BandRule};
    use glam::Vec2;

    fn column() -> MeshInput {
        let mut mesh = MeshInput::default();
        for level in 0..3 {
            push_quad(&mut mesh, Vec3::new(0.0, level as f32, 0.0));
        }
        mesh
    }

    fn assert_local_indices(segmentation: &Segmentation) {
        for segment in segmentation.segments.iter().chain(segmentation.reserved.iter()) {
            assert_eq!(segment.indices.len() % 3, 0);
            assert!(segment
                .indices
                .iter()
                .all(|&i| (i as usize) < segment.positions.len()));
        }
    }

    #[test]
    fn test_every_triangle_lands_once() {
        let partitioner = Partitioner::default();
        let mesh = quad_row(4);
        let seeds = [Vec3::new(0.5, 0.5, 0.0), Vec3::new(6.5, 0.5, 0.0)];
        let result = partitioner.segment(&mesh, &seeds, None).unwrap();
        assert_eq!(result.segments.len(), 2);
        assert_eq!(result.segments[0].seed, Some(0));
        assert_eq!(result.segments[0].triangle_count(), 4);
        assert_eq!(result.segments[1].seed, Some(1));
        assert_eq!(result.segments[1].triangle_count(), 4);
        assert!(result.reserved.is_none());
        assert_eq!(result.triangle_count(), mesh.triangle_count());
        assert_local_indices(&result);
        assert_eq!(partitioner.outstanding_scratch_bytes(), 0);
    }

    #[test]
    fn test_pre_labelled_mesh_matches_seeds() {
        // Each quad sits right under its own seed.
        let mesh = quad_row(5);
        let seeds: Vec<Vec3> = (0..5).map(|i| Vec3::new(i as f32 * 2.0 + 0.5, 0.5, 0.2)).collect();
        let result = Partitioner::default().segment(&mesh, &seeds, None).unwrap();
        assert_eq!(result.segments.len(), 5);
        for (i, segment) in result.segments.iter().enumerate() {
            assert_eq!(segment.seed, Some(i));
            assert_eq!(segment.triangle_count(), 2);
            assert!(segment.positions.iter().all(|p| p.x >= i as f32 * 2.0 && p.x <= i as f32 * 2.0 + 1.0));
        }
    }

    #[test]
    fn test_reserved_band_all_vertices() {
        let partitioner = Partitioner::default();
        let band = partitioner.band(0.9, 2.1);
        let result = partitioner
            .segment(&column(), &[Vec3::new(0.5, 1.5, 0.0)], Some(band))
            .unwrap();
        let reserved = result.reserved.as_ref().unwrap();
        assert!(reserved.reserved);
        assert_eq!(reserved.seed, None);
        assert_eq!(reserved.triangle_count(), 2);
        assert!(reserved.positions.iter().all(|p| p.y >= 1.0 && p.y <= 2.0));
        assert_eq!(result.segments.len(), 1);
        assert_eq!(result.segments[0].triangle_count(), 4);
        assert_eq!(result.triangle_count(), 6);
    }

    #[test]
    fn test_reserved_band_any_vertex() {
        let config = PartitionConfig {
            band_rule: BandRule::AnyVertex,
            ..Default::default()
        };
        let partitioner = Partitioner::new(config);
        let result = partitioner
            .segment(&column(), &[Vec3::ZERO], Some(ReservedBand::along(Axis::Y, 0.9, 2.1)))
            .unwrap();
        assert_eq!(result.reserved.as_ref().unwrap().triangle_count(), 6);
        // The only seed collected nothing, so it yields no segment.
        assert!(result.segments.is_empty());
        assert_eq!(result.triangle_count(), 6);
    }

    #[test]
    fn test_empty_band_still_reported() {
        let result = Partitioner::default()
            .segment(&quad_row(2), &[Vec3::ZERO], Some(ReservedBand::along(Axis::Z, 5.0, 6.0)))
            .unwrap();
        let reserved = result.reserved.unwrap();
        assert!(reserved.is_degenerate());
        assert_eq!(result.segments[0].triangle_count(), 4);
    }

    #[test]
    fn test_empty_seeds_dropped() {
        let seeds = [
            Vec3::new(0.5, 0.5, 0.0),
            Vec3::new(100.0, 0.0, 0.0),
            Vec3::new(2.5, 0.5, 0.0),
        ];
        let result = Partitioner::default().segment(&quad_row(2), &seeds, None).unwrap();
        let owners: Vec<_> = result.segments.iter().map(|s| s.seed).collect();
        assert_eq!(owners, vec![Some(0), Some(2)]);
    }

    #[test]
    fn test_tie_goes_to_lowest_seed() {
        let seed = Vec3::new(0.5, 0.5, 0.0);
        let result = Partitioner::default()
            .segment(&quad_row(1), &[seed, seed, seed], None)
            .unwrap();
        assert_eq!(result.segments.len(), 1);
        assert_eq!(result.segments[0].seed, Some(0));
    }

    #[test]
    fn test_nearest_vertex_assignment() {
        // Centroid of the first triangle is nearer seed 1, its corner (1, 0) sits on seed 0.
        let partitioner = Partitioner::default().with_assignment(SeedAssignment::NearestVertex);
        let mesh = MeshInput::new(
            vec![Vec3::new(0.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.0)],
            vec![0, 1, 2],
        );
        let seeds = [Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.3, 0.3, 0.0)];
        let by_vertex = partitioner.segment(&mesh, &seeds, None).unwrap();
        let by_centroid = Partitioner::default().segment(&mesh, &seeds, None).unwrap();
        assert_eq!(by_centroid.segments[0].seed, Some(1));
        assert_eq!(by_vertex.segments[0].seed, Some(0));
    }

    #[test]
    fn test_custom_assignment() {
        let partitioner = Partitioner::default()
            .with_assignment(SeedAssignment::Custom(Arc::new(
                |_: &[Vec3; 3], seeds: &[Vec3]| seeds.len() - 1,
            )));
        let result = partitioner
            .segment(&quad_row(3), &[Vec3::ZERO, Vec3::ONE], None)
            .unwrap();
        assert_eq!(result.segments.len(), 1);
        assert_eq!(result.segments[0].seed, Some(1));
        assert_eq!(result.segments[0].triangle_count(), 6);

        let bad = Partitioner::default().with_assignment(SeedAssignment::Custom(Arc::new(
            |_: &[Vec3; 3], _: &[Vec3]| 7,
        )));
        assert!(matches!(
            bad.segment(&quad_row(1), &[Vec3::ZERO], None),
            Err(PartitionError::CustomSeedOutOfRange { seed: 7, seed_count: 1, .. })
        ));
        assert_eq!(bad.outstanding_scratch_bytes(), 0);
    }

    #[test]
    fn test_channels_follow_vertices() {
        let mut mesh = quad_row(2);
        let n = mesh.positions.len();
        mesh.uvs = Some(mesh.positions.iter().map(|p| Vec2::new(p.x, p.y)).collect());
        mesh.colors = Some(vec![glam::Vec4::ONE; n]);
        let seeds = [Vec3::new(0.5, 0.5, 0.0), Vec3::new(2.5, 0.5, 0.0)];
        let result = Partitioner::default().segment(&mesh, &seeds, None).unwrap();
        for segment in &result.segments {
            let uvs = segment.uvs.as_ref().unwrap();
            assert_eq!(uvs.len(), segment.positions.len());
            for (uv, p) in uvs.iter().zip(&segment.positions) {
                assert_eq!(*uv, Vec2::new(p.x, p.y));
            }
            assert_eq!(segment.colors.as_ref().unwrap().len(), segment.positions.len());
            assert!(segment.tangents.is_none());
        }
    }

    #[test]
    fn test_invalid_input_fails_atomically() {
        let partitioner = Partitioner::default();
        let seeds = [Vec3::ZERO];

        let mut short = quad_row(1);
        short.indices.pop();
        assert_eq!(
            partitioner.segment(&short, &seeds, None),
            Err(PartitionError::InvalidIndexCount(5))
        );

        let mut out_of_range = quad_row(1);
        out_of_range.indices[4] = 9;
        assert_eq!(
            partitioner.segment(&out_of_range, &seeds, None),
            Err(PartitionError::IndexOutOfRange {
                at: 4,
                index: 9,
                vertex_count: 4
            })
        );

        let mut mismatched = quad_row(1);
        mismatched.tangents = Some(vec![glam::Vec4::X; 3]);
        assert_eq!(
            partitioner.segment(&mismatched, &seeds, None),
            Err(PartitionError::MismatchedChannel {
                channel: "tangent",
                expected: 4,
                actual: 3
            })
        );

        assert_eq!(
            partitioner.segment(&quad_row(1), &[], None),
            Err(PartitionError::NoSeedPoints)
        );
        assert!(matches!(
            partitioner.segment(&quad_row(1), &seeds, Some(partitioner.band(2.0, 1.0))),
            Err(PartitionError::InvalidBand { .. })
        ));
        assert!(matches!(
            partitioner.segment(&quad_row(1), &seeds, Some(partitioner.band(f32::NAN, 1.0))),
            Err(PartitionError::InvalidBand { .. })
        ));
        assert_eq!(partitioner.outstanding_scratch_bytes(), 0);
    }

    #[test]
    fn test_cancelled_run_releases_scratch() {
        let partitioner = Partitioner::default();
        let cancel = AtomicBool::new(true);
        let result = partitioner.run(&quad_row(4), &[Vec3::ZERO], None, &cancel);
        assert_eq!(result, Err(PartitionError::Cancelled));
        assert_eq!(partitioner.outstanding_scratch_bytes(), 0);
    }

    #[test]
    fn test_split_disconnected() {
        let config = PartitionConfig {
            split_disconnected: true,
            ..Default::default()
        };
        let partitioner = Partitioner::new(config);
        let band = partitioner.band(-1.0, -0.5);
        let result = partitioner
            .segment(&quad_row(3), &[Vec3::new(2.5, 0.5, 0.0)], Some(band))
            .unwrap();
        assert_eq!(result.segments.len(), 3);
        assert!(result.segments.iter().all(|s| s.seed == Some(0) && s.triangle_count() == 2));
        assert_eq!(result.triangle_count(), 6);
    }

    #[test]
    fn test_reserved_segment_never_split() {
        let config = PartitionConfig {
            split_disconnected: true,
            band_axis: Axis::X,
            ..Default::default()
        };
        let partitioner = Partitioner::new(config);
        let band = partitioner.band(-1.0, 10.0);
        let result = partitioner.segment(&quad_row(3), &[Vec3::ZERO], Some(band)).unwrap();
        assert!(result.segments.is_empty());
        assert_eq!(result.reserved.unwrap().triangle_count(), 6);
    }

    #[test]
    fn test_small_chunks_match_default() {
        let mesh = quad_row(9);
        let seeds = [Vec3::ZERO, Vec3::new(9.0, 0.0, 0.0), Vec3::new(17.0, 1.0, 0.0)];
        let chunked = Partitioner::new(PartitionConfig {
            chunk_size: 1,
            ..Default::default()
        });
        assert_eq!(
            chunked.segment(&mesh, &seeds, None).unwrap(),
            Partitioner::default().segment(&mesh, &seeds, None).unwrap()
        );
    }
}
