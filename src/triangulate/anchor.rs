// src/triangulate/anchor.rs
//! Renderable meshes for anchor surfaces and room walls.
//!
//! Plane anchors live in their own local frame: the surface spans local XY
//! and faces local +Z. Poses are expected to be rigid.

use std::fmt;
use std::sync::Arc;

use glam::{Affine3A, Vec2, Vec3};
use log::{debug, warn};

use crate::triangulate::triangulate_polygon;
use crate::utils::geometry::signed_area;
use crate::utils::Bounds2;

/// Axis-aligned rectangle in a plane's local XY.
pub type Rect2 = Bounds2;

/// Caller-supplied texture mapping: local point and surface rect in, UV out.
pub type UvFn = dyn Fn(Vec2, &Rect2) -> Vec2 + Send + Sync;

/// How texture coordinates are derived from local surface positions.
#[derive(Clone, Default)]
pub enum UvMapping {
    /// The surface rect maps onto `[0, 1]²`.
    #[default]
    Stretch,
    /// One UV unit per this many metres, anchored at the rect's min corner.
    WorldScale(f32),
    Custom(Arc<UvFn>),
}

impl UvMapping {
    pub fn map(&self, point: Vec2, rect: &Rect2) -> Vec2 {
        match self {
            UvMapping::Stretch => {
                let size = rect.size();
                let safe = Vec2::new(
                    if size.x > 0.0 { size.x } else { 1.0 },
                    if size.y > 0.0 { size.y } else { 1.0 },
                );
                (point - rect.min) / safe
            }
            UvMapping::WorldScale(metres) => (point - rect.min) / metres.max(f32::EPSILON),
            UvMapping::Custom(f) => f(point, rect),
        }
    }
}

impl fmt::Debug for UvMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UvMapping::Stretch => write!(f, "Stretch"),
            UvMapping::WorldScale(m) => write!(f, "WorldScale({})", m),
            UvMapping::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// Triangle mesh with per-vertex normals and UVs, counter-clockwise front
/// faces.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SurfaceMesh {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub uvs: Vec<Vec2>,
    pub indices: Vec<u32>,
}

impl SurfaceMesh {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn area(&self) -> f32 {
        self.indices
            .chunks_exact(3)
            .map(|t| {
                let [a, b, c] = [0, 1, 2].map(|k| self.positions[t[k] as usize]);
                (b - a).cross(c - a).length() * 0.5
            })
            .sum()
    }

    fn append(&mut self, other: SurfaceMesh) {
        let base = self.positions.len() as u32;
        self.positions.extend(other.positions);
        self.normals.extend(other.normals);
        self.uvs.extend(other.uvs);
        self.indices.extend(other.indices.into_iter().map(|i| i + base));
    }
}

/// An externally supplied anchor.
#[derive(Debug, Clone, PartialEq)]
pub enum AnchorSurface {
    Plane {
        pose: Affine3A,
        rect: Rect2,
        /// Outline in local XY; the rect is used when this has fewer than
        /// three points.
        boundary: Vec<Vec2>,
        /// Child planes cut out of this one, e.g. a window in a wall.
        holes: Vec<AnchorSurface>,
    },
    Volume {
        pose: Affine3A,
        min: Vec3,
        max: Vec3,
    },
}

impl AnchorSurface {
    /// A plane anchor whose rect is the bounding box of `boundary`.
    pub fn plane(pose: Affine3A, boundary: Vec<Vec2>) -> Self {
        AnchorSurface::Plane {
            pose,
            rect: Rect2::from_points(&boundary),
            boundary,
            holes: Vec::new(),
        }
    }

    /// Meshes the anchor in world space.
    ///
    /// Child planes are projected into this plane and subtracted; their own
    /// children are not considered. Volume children are ignored.
    pub fn mesh(&self, uv: &UvMapping) -> SurfaceMesh {
        match self {
            AnchorSurface::Plane {
                pose,
                rect,
                boundary,
                holes,
            } => plane_mesh(pose, rect, boundary, holes, uv),
            AnchorSurface::Volume { pose, min, max } => volume_mesh(pose, *min, *max, uv),
        }
    }
}

/// Plane outline in local XY, counter-clockwise.
fn plane_outline(rect: &Rect2, boundary: &[Vec2]) -> Vec<Vec2> {
    let mut outline = if boundary.len() >= 3 {
        boundary.to_vec()
    } else {
        vec![
            rect.min,
            Vec2::new(rect.max.x, rect.min.y),
            rect.max,
            Vec2::new(rect.min.x, rect.max.y),
        ]
    };
    if signed_area(&outline) < 0.0 {
        outline.reverse();
    }
    outline
}

fn plane_mesh(
    pose: &Affine3A,
    rect: &Rect2,
    boundary: &[Vec2],
    holes: &[AnchorSurface],
    uv: &UvMapping,
) -> SurfaceMesh {
    let outline = plane_outline(rect, boundary);
    let to_local = pose.inverse();
    let hole_loops: Vec<Vec<Vec2>> = holes
        .iter()
        .filter_map(|child| match child {
            AnchorSurface::Plane {
                pose: child_pose,
                rect,
                boundary,
                ..
            } => {
                let child_to_local = to_local * *child_pose;
                let points = plane_outline(rect, boundary)
                    .into_iter()
                    .map(|p| child_to_local.transform_point3(p.extend(0.0)).truncate())
                    .collect();
                Some(points)
            }
            AnchorSurface::Volume { .. } => {
                debug!("Ignoring volume child of a plane anchor");
                None
            }
        })
        .collect();

    let tri = triangulate_polygon(&outline, &hole_loops);
    let normal = pose.transform_vector3(Vec3::Z).normalize_or_zero();
    SurfaceMesh {
        positions: tri
            .vertices
            .iter()
            .map(|p| pose.transform_point3(p.extend(0.0)))
            .collect(),
        normals: vec![normal; tri.vertices.len()],
        uvs: tri.vertices.iter().map(|&p| uv.map(p, rect)).collect(),
        indices: tri.indices,
    }
}

/// Face normal, in-face right and up axes; `right × up == normal`.
const BOX_FACES: [(Vec3, Vec3, Vec3); 6] = [
    (Vec3::X, Vec3::NEG_Z, Vec3::Y),
    (Vec3::NEG_X, Vec3::Z, Vec3::Y),
    (Vec3::Y, Vec3::X, Vec3::NEG_Z),
    (Vec3::NEG_Y, Vec3::X, Vec3::Z),
    (Vec3::Z, Vec3::X, Vec3::Y),
    (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
];

fn volume_mesh(pose: &Affine3A, min: Vec3, max: Vec3, uv: &UvMapping) -> SurfaceMesh {
    let center = (min + max) * 0.5;
    let half = (max - min).abs() * 0.5;
    let mut mesh = SurfaceMesh::default();
    for (normal, right, up) in BOX_FACES {
        let hr = right.abs().dot(half);
        let hu = up.abs().dot(half);
        let face_center = center + normal * normal.abs().dot(half);
        let rect = Rect2::new(Vec2::new(-hr, -hu), Vec2::new(hr, hu));
        let corners = [
            Vec2::new(-hr, -hu),
            Vec2::new(hr, -hu),
            Vec2::new(hr, hu),
            Vec2::new(-hr, hu),
        ];
        let world_normal = pose.transform_vector3(normal).normalize_or_zero();
        mesh.append(SurfaceMesh {
            positions: corners
                .iter()
                .map(|c| pose.transform_point3(face_center + right * c.x + up * c.y))
                .collect(),
            normals: vec![world_normal; 4],
            uvs: corners.iter().map(|&c| uv.map(c, &rect)).collect(),
            indices: vec![0, 1, 2, 0, 2, 3],
        });
    }
    mesh
}

/// Builds inward-facing walls of `height` metres (+Y up) along a closed floor
/// outline. Each wall quad is triangulated in its own plane. UVs are in
/// metres: `u` runs along the perimeter, `v` up the wall.
pub fn wall_mesh(floor_boundary: &[Vec3], height: f32) -> SurfaceMesh {
    if floor_boundary.len() < 3 {
        warn!("wall_mesh: floor outline needs at least 3 points, got {}", floor_boundary.len());
        return SurfaceMesh::default();
    }
    if !(height > 0.0) || !height.is_finite() {
        warn!("wall_mesh: height must be positive, got {}", height);
        return SurfaceMesh::default();
    }

    // Seen from above (+Y), screen coordinates are (x, -z).
    let top_view: Vec<Vec2> = floor_boundary.iter().map(|p| Vec2::new(p.x, -p.z)).collect();
    let counter_clockwise = signed_area(&top_view) >= 0.0;

    let mut mesh = SurfaceMesh::default();
    let mut perimeter = 0.0;
    for (i, &a) in floor_boundary.iter().enumerate() {
        let b = floor_boundary[(i + 1) % floor_boundary.len()];
        let run = Vec3::new(b.x - a.x, 0.0, b.z - a.z);
        let length = run.length();
        if length <= f32::EPSILON {
            continue;
        }
        let along = run / length;
        let inward = if counter_clockwise {
            Vec3::Y.cross(along)
        } else {
            along.cross(Vec3::Y)
        };

        // Quad in (along, up) coordinates, ordered so its triangles face `inward`.
        let quad = [
            Vec2::new(0.0, 0.0),
            Vec2::new(length, 0.0),
            Vec2::new(length, height),
            Vec2::new(0.0, height),
        ];
        let outline: Vec<Vec2> = if counter_clockwise {
            quad.iter().rev().copied().collect()
        } else {
            quad.to_vec()
        };
        let tri = triangulate_polygon(&outline, &[]);
        mesh.append(SurfaceMesh {
            positions: tri
                .vertices
                .iter()
                .map(|p| a + along * p.x + Vec3::Y * p.y)
                .collect(),
            normals: vec![inward; tri.vertices.len()],
            uvs: tri
                .vertices
                .iter()
                .map(|p| Vec2::new(perimeter + p.x, p.y))
                .collect(),
            indices: tri.indices,
        });
        perimeter += length;
    }
    mesh
}
