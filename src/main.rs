#![warn(non_snake_case)]
//! # mr_scene_demo
//!
//! Exercises the three engines of `mr_scene_core` against synthetic input:
//! a depth wall for raycasts and box placement, a randomized room mesh for
//! partitioning, and an anchored wall with a window for triangulation.
//!
//! Usage: `mr_scene_demo [settings.json] [depth.png]`. The optional second
//! argument writes a grayscale preview of the left eye's depth. Set
//! `RUST_LOG=debug` for detail.

use std::env;
use std::error::Error;
use std::sync::Arc;

use glam::{Affine3A, Mat4, Vec2, Vec3};
use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use mr_scene_core::config::Settings;
use mr_scene_core::depth::preview::depth_preview;
use mr_scene_core::depth::{DepthRaycaster, Eye, EyeCamera};
use mr_scene_core::mesh::{MeshInput, Partitioner};
use mr_scene_core::triangulate::{wall_mesh, AnchorSurface, Rect2, UvMapping};
use mr_scene_core::utils::Ray;

/// Publishes a flat wall `distance` metres in front of both eyes.
fn capture_wall(raycaster: &DepthRaycaster, distance: f32) -> Result<(), Box<dyn Error>> {
    let res = raycaster.config().resolution;
    let proj = Mat4::perspective_rh(90f32.to_radians(), 1.0, 0.1, 20.0);
    let eye = |x: f32| EyeCamera::new(Mat4::look_to_rh(Vec3::new(x, 0.0, 0.0), Vec3::NEG_Z, Vec3::Y), proj);
    let ticket = raycaster.buffer().begin_copy([eye(-0.032), eye(0.032)]);
    let depth = vec![distance; res * res];
    raycaster.buffer().complete_copy(ticket, depth.clone(), depth)?;
    Ok(())
}

fn run_raycasts(settings: &Settings, preview: Option<&str>) -> Result<(), Box<dyn Error>> {
    let raycaster = DepthRaycaster::new(settings.raycast.clone());
    let ray = Ray::new(Vec3::ZERO, Vec3::NEG_Z);
    info!("Before capture: {:?}", raycaster.raycast(&ray, 5.0, Eye::Both, true, false));

    capture_wall(&raycaster, 2.0)?;
    let outcome = raycaster.raycast(&ray, 5.0, Eye::Both, true, false);
    info!("Raycast against wall: {:?}", outcome);

    let placement = raycaster.place_box(&ray, Vec3::new(0.3, 0.2, 0.1), Vec3::Y, 5.0);
    info!("Box placement: {:?}", placement);
    info!("Raycasts issued: {}", raycaster.raycast_count());

    if let (Some(path), Some(frame)) = (preview, raycaster.buffer().snapshot()) {
        depth_preview(frame.eye(0), 5.0).save(path)?;
        info!("Wrote depth preview to {}", path);
    }
    Ok(())
}

/// Scattered floor and wall quads with a few seeds spread over the room.
fn random_room(rng: &mut StdRng, quads: usize) -> MeshInput {
    let mut mesh = MeshInput::default();
    for _ in 0..quads {
        let base = mesh.positions.len() as u32;
        let origin = Vec3::new(
            rng.random_range(-3.0..3.0),
            rng.random_range(0.0..2.5),
            rng.random_range(-3.0..3.0),
        );
        let size = rng.random_range(0.1..0.4);
        mesh.positions.extend([
            origin,
            origin + Vec3::X * size,
            origin + Vec3::new(size, size, 0.0),
            origin + Vec3::Y * size,
        ]);
        mesh.indices.extend([base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    mesh
}

fn run_partition(settings: &Settings) -> Result<(), Box<dyn Error>> {
    let mut rng = StdRng::seed_from_u64(7);
    let mesh = Arc::new(random_room(&mut rng, 5000));
    let seeds: Vec<Vec3> = (0..6)
        .map(|_| Vec3::new(rng.random_range(-3.0..3.0), 1.0, rng.random_range(-3.0..3.0)))
        .collect();

    let partitioner = Partitioner::new(settings.partition.clone());
    let band = partitioner.band(0.0, 0.3);
    let segmentation = partitioner.spawn(mesh.clone(), seeds, Some(band)).wait()?;
    for segment in &segmentation.segments {
        info!(
            "Segment for seed {:?}: {} triangles, {} vertices",
            segment.seed,
            segment.triangle_count(),
            segment.positions.len()
        );
    }
    if let Some(reserved) = &segmentation.reserved {
        info!("Reserved band: {} triangles", reserved.triangle_count());
    }
    info!(
        "{} of {} triangles accounted for, {} scratch bytes outstanding",
        segmentation.triangle_count(),
        mesh.triangle_count(),
        partitioner.outstanding_scratch_bytes()
    );
    Ok(())
}

fn run_triangulation() {
    let window = AnchorSurface::Plane {
        pose: Affine3A::from_translation(Vec3::new(0.5, 0.2, 0.0)),
        rect: Rect2::new(Vec2::new(-0.4, -0.3), Vec2::new(0.4, 0.3)),
        boundary: Vec::new(),
        holes: Vec::new(),
    };
    let wall = AnchorSurface::Plane {
        pose: Affine3A::from_translation(Vec3::new(0.0, 1.25, -3.0)),
        rect: Rect2::new(Vec2::new(-2.0, -1.25), Vec2::new(2.0, 1.25)),
        boundary: Vec::new(),
        holes: vec![window],
    };
    let mesh = wall.mesh(&UvMapping::WorldScale(1.0));
    info!(
        "Wall anchor: {} triangles, {:.2} m² after the window cut",
        mesh.triangle_count(),
        mesh.area()
    );

    let floor = [
        Vec3::new(-3.0, 0.0, 3.0),
        Vec3::new(3.0, 0.0, 3.0),
        Vec3::new(3.0, 0.0, -3.0),
        Vec3::new(-3.0, 0.0, -3.0),
    ];
    let walls = wall_mesh(&floor, 2.5);
    info!("Room walls: {} triangles, {:.2} m²", walls.triangle_count(), walls.area());
}

fn main() -> Result<(), Box<dyn Error>> {
    // Initialize logging.
    env_logger::init();
    info!("mr_scene_demo starting...");

    let args: Vec<String> = env::args().collect();
    let settings = match args.get(1) {
        Some(path) => {
            info!("Loading settings from {}", path);
            Settings::load(path)?
        }
        None => Settings::default(),
    };

    run_raycasts(&settings, args.get(2).map(String::as_str))?;
    run_partition(&settings)?;
    run_triangulation();

    info!("mr_scene_demo exiting.");
    Ok(())
}
