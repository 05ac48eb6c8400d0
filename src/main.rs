//! Parcel terrain demo
//!
//! Generates terrain for a synthetic ownership layout and logs what each
//! stage produced.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use glam::{IVec2, Mat4, Vec2, Vec3};
use parcel_terrain::world::collider::ColliderTracker;
use parcel_terrain::{
    CellRandom, FrustumView, OwnershipSet, RegionLoader, TerrainError, TerrainGenerator,
    TerrainSettings, VisibilityCuller,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML settings file (defaults are used when omitted)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the world seed
    #[arg(long)]
    seed: Option<u32>,

    /// Number of owned plazas to scatter over the world
    #[arg(long, default_value_t = 40)]
    plazas: u32,

    /// Chunks to generate around the origin (square radius)
    #[arg(long, default_value_t = 2)]
    radius: i32,

    /// Worker threads (defaults to one per CPU)
    #[arg(long)]
    workers: Option<usize>,
}

fn load_settings(args: &Args) -> Result<TerrainSettings, Box<dyn std::error::Error>> {
    let mut settings = match &args.config {
        Some(path) => TerrainSettings::from_toml_str(&std::fs::read_to_string(path)?)?,
        None => TerrainSettings::default(),
    };
    if let Some(seed) = args.seed {
        settings.seed = seed;
    }
    Ok(settings)
}

/// Square plazas of owned parcels at seeded positions.
fn synthetic_ownership(settings: &TerrainSettings, plazas: u32) -> OwnershipSet {
    let bounds = settings.bounds();
    let mut rng = CellRandom::new(settings.seed);
    let mut owned = Vec::new();

    for _ in 0..plazas {
        let centre = IVec2::new(
            rng.range_f32(bounds.min.x as f32, bounds.max.x as f32) as i32,
            rng.range_f32(bounds.min.y as f32, bounds.max.y as f32) as i32,
        );
        let half = rng.range_f32(0.0, 4.0) as i32;
        for z in -half..=half {
            for x in -half..=half {
                owned.push(centre + IVec2::new(x, z));
            }
        }
    }
    OwnershipSet::new(bounds, owned)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let settings = load_settings(&args)?;
    let ownership = synthetic_ownership(&settings, args.plazas);
    tracing::info!(seed = settings.seed, owned = ownership.len(), "Starting terrain demo...");

    let generator = Arc::new(TerrainGenerator::new(settings.clone())?);
    let context = Arc::new(generator.prepare(ownership));

    // Chunks around the world origin, nearest first
    let origin = context
        .model
        .chunk_of(IVec2::ZERO)
        .map_or(IVec2::ZERO, |chunk| chunk.coord);
    let mut requests = Vec::new();
    for dz in -args.radius..=args.radius {
        for dx in -args.radius..=args.radius {
            let coord = origin + IVec2::new(dx, dz);
            if context.model.chunk(coord).is_some() {
                requests.push((coord, dx * dx + dz * dz));
            }
        }
    }

    let mut loader = match args.workers {
        Some(workers) => RegionLoader::with_worker_count(workers, Arc::clone(&generator), Arc::clone(&context))?,
        None => RegionLoader::new(Arc::clone(&generator), Arc::clone(&context))?,
    };
    let started = Instant::now();
    let queued = loader.request_chunks(&requests);
    tracing::info!(queued, workers = loader.worker_count(), "chunk requests queued");

    let (mut trees, mut terrain_pixels, mut failed) = (0usize, 0usize, 0usize);
    while let Some(result) = loader.wait_result() {
        match result.result {
            Ok(chunk) => {
                trees += chunk.trees.len();
                terrain_pixels += chunk.holes.terrain_pixel_count();
            }
            Err(TerrainError::Cancelled { .. }) => {}
            Err(err) => {
                failed += 1;
                tracing::error!(coord = ?result.coord, %err, "chunk failed");
            }
        }
    }
    tracing::info!(
        trees,
        terrain_pixels,
        failed,
        elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
        "chunks generated"
    );

    // Colliders follow a user walking along +x
    let mut tracker = ColliderTracker::new(settings.parcel_size);
    let mut baked = 0;
    for step in 0..8 {
        tracker.update(&[Vec2::new(step as f32 * 6.0, 8.0)]);
        let dirty: Vec<IVec2> = tracker.take_dirty().into_iter().map(|(_, parcel)| parcel).collect();
        baked += generator.collider_batch(&context, dirty).len();
    }
    tracing::info!(baked, slots = tracker.slot_count(), "collider parcels generated");

    // Visibility from a camera above the origin looking north
    let mut culler = VisibilityCuller::new(context.model.chunk_bounds());
    let eye = Vec3::new(0.0, 40.0, 0.0);
    let proj = Mat4::perspective_rh(70f32.to_radians(), 16.0 / 9.0, 0.1, 2000.0);
    let view = Mat4::look_to_rh(eye, Vec3::new(0.0, -0.3, -1.0), Vec3::Y);
    culler.update(&FrustumView::new(&(proj * view), eye, settings.detail_distance));
    tracing::info!(
        visible = culler.visible_count(),
        dirty = culler.dirty().count(),
        "visibility evaluated"
    );

    Ok(())
}
