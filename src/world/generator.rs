//! Terrain generation pipeline
//!
//! [`TerrainGenerator::prepare`] resolves everything that depends on the
//! whole world (parcel heights, chunk partition). [`TerrainGenerator::generate_chunk`]
//! then builds one chunk at a time and can run on any thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use glam::{IVec2, Vec2};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::core::error::{Result, TerrainError};
use crate::core::parcel::OwnershipSet;
use crate::utils::settings::TerrainSettings;
use crate::world::collider::ColliderBatch;
use crate::world::height::{HeightField, HeightFieldSynthesizer, TerrainHeightFunction};
use crate::world::holes::HoleMask;
use crate::world::model::{ChunkModel, TerrainModel};
use crate::world::noise::{NoiseRegion, NoiseStack};
use crate::world::parcel_heights::{ParcelHeightResolver, ParcelHeights};
use crate::world::splat::{DetailLayer, SplatMap};
use crate::world::trees::{TreeGrid, TreeInstance, VegetationPlacementEngine};

/// Cooperative cancellation flag, checked between generation phases.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_flag(flag: Arc<AtomicBool>) -> Self {
        CancellationToken(flag)
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// World-wide state shared by every chunk of one ownership set.
pub struct TerrainContext {
    pub ownership: OwnershipSet,
    pub heights: ParcelHeights,
    pub height_noise: Option<NoiseStack>,
    pub model: TerrainModel,
    /// Heightfield normalization factor, in world units.
    pub max_height: f32,
}

impl TerrainContext {
    pub fn height_fn(&self, parcel_size: i32) -> TerrainHeightFunction<'_> {
        TerrainHeightFunction::new(&self.heights, self.height_noise.as_ref(), parcel_size)
    }
}

/// Everything generated for one chunk.
#[derive(Clone, Debug)]
pub struct ChunkTerrain {
    pub coord: IVec2,
    pub min_parcel: IVec2,
    pub heightfield: HeightField,
    pub holes: HoleMask,
    /// Hole mask in the configured backend polarity.
    pub backend_holes: Vec<bool>,
    pub splat: Option<SplatMap>,
    pub details: Vec<DetailLayer>,
    pub trees: Vec<TreeInstance>,
}

pub struct TerrainGenerator {
    settings: TerrainSettings,
}

impl TerrainGenerator {
    pub fn new(settings: TerrainSettings) -> Result<Self> {
        settings.validate()?;
        Ok(TerrainGenerator { settings })
    }

    pub fn settings(&self) -> &TerrainSettings {
        &self.settings
    }

    pub fn prepare(&self, ownership: OwnershipSet) -> TerrainContext {
        let started = Instant::now();
        if *ownership.bounds() != self.settings.bounds() {
            warn!(
                ownership = ?ownership.bounds(),
                settings = ?self.settings.bounds(),
                "ownership bounds differ from configured world bounds, using ownership bounds"
            );
        }

        let heights = ParcelHeightResolver::new(self.settings.height_nerf).resolve(&ownership);
        let max_height = heights.max_base_height();
        let height_noise = self
            .settings
            .height_noise
            .as_ref()
            .map(|noise| NoiseStack::new(noise, self.settings.seed));
        let model = TerrainModel::new(
            &ownership,
            self.settings.chunk_size_parcels,
            self.settings.parcel_size,
            max_height,
        );

        info!(
            owned = ownership.len(),
            empty = heights.empty_count(),
            chunks = model.chunks().len(),
            max_height,
            elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
            "terrain prepared"
        );

        TerrainContext {
            ownership,
            heights,
            height_noise,
            model,
            max_height,
        }
    }

    pub fn generate_chunk(
        &self,
        ctx: &TerrainContext,
        coord: IVec2,
        cancel: &CancellationToken,
    ) -> Result<ChunkTerrain> {
        let chunk = ctx.model.chunk(coord).ok_or(TerrainError::ChunkOutOfBounds {
            x: coord.x,
            y: coord.y,
        })?;
        let check = || {
            if cancel.is_cancelled() {
                debug!(x = coord.x, y = coord.y, "chunk generation cancelled");
                Err(TerrainError::Cancelled {
                    x: coord.x,
                    y: coord.y,
                })
            } else {
                Ok(())
            }
        };
        let started = Instant::now();

        check()?;
        let heightfield = self.generate_heightfield(ctx, chunk)?;
        let heights_ms = started.elapsed().as_secs_f64() * 1000.0;

        check()?;
        let size = chunk.size_parcels as usize;
        let holes = HoleMask::build(chunk.min_parcel, size, size, &ctx.ownership);
        let backend_holes = holes.to_backend(self.settings.hole_polarity);

        check()?;
        let (splat, details) = self.generate_layers(ctx, chunk)?;
        let layers_ms = started.elapsed().as_secs_f64() * 1000.0;

        check()?;
        let trees = self.generate_trees(ctx, chunk)?;

        debug!(
            x = coord.x,
            y = coord.y,
            trees = trees.len(),
            heights_ms,
            layers_ms,
            total_ms = started.elapsed().as_secs_f64() * 1000.0,
            "chunk generated"
        );

        Ok(ChunkTerrain {
            coord,
            min_parcel: chunk.min_parcel,
            heightfield,
            holes,
            backend_holes,
            splat,
            details,
            trees,
        })
    }

    /// Generates every chunk in parallel; fails on the first error.
    pub fn generate_all(&self, ctx: &TerrainContext, cancel: &CancellationToken) -> Result<Vec<ChunkTerrain>> {
        let started = Instant::now();
        let chunks = ctx
            .model
            .chunks()
            .par_iter()
            .map(|chunk| self.generate_chunk(ctx, chunk.coord, cancel))
            .collect::<Result<Vec<_>>>()?;
        info!(
            chunks = chunks.len(),
            elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
            "terrain generated"
        );
        Ok(chunks)
    }

    /// Collider vertices for the given parcels.
    pub fn collider_batch(&self, ctx: &TerrainContext, parcels: Vec<IVec2>) -> ColliderBatch {
        ColliderBatch::generate(parcels, &ctx.height_fn(self.settings.parcel_size))
    }

    fn generate_heightfield(&self, ctx: &TerrainContext, chunk: &ChunkModel) -> Result<HeightField> {
        let synth = HeightFieldSynthesizer::new(ctx.height_fn(self.settings.parcel_size));
        let resolution = self.settings.heightmap_resolution();
        let region = synth.region(chunk.min_parcel, chunk.size_parcels, resolution);
        let noise = ctx.height_noise.as_ref().map(|stack| stack.generate(region));

        synth.synthesize(
            chunk.min_parcel,
            chunk.size_parcels,
            resolution,
            noise.as_ref(),
            ctx.max_height,
        )
    }

    fn layer_region(&self, chunk: &ChunkModel) -> NoiseRegion {
        let origin: Vec2 = (chunk.min_parcel * self.settings.parcel_size).as_vec2();
        NoiseRegion::square(origin, self.settings.chunk_size_units() as usize, 1.0)
    }

    fn generate_layers(&self, ctx: &TerrainContext, chunk: &ChunkModel) -> Result<(Option<SplatMap>, Vec<DetailLayer>)> {
        let region = self.layer_region(chunk);
        let seed = self.settings.seed;

        let splat = if self.settings.texture_layers.is_empty() {
            None
        } else {
            let fields: Vec<_> = self
                .settings
                .texture_layers
                .iter()
                .map(|layer| NoiseStack::new(layer, seed).generate(region))
                .collect();
            Some(SplatMap::from_layers(&fields)?)
        };

        let details = self
            .settings
            .detail_layers
            .iter()
            .map(|layer| {
                let field = NoiseStack::new(&layer.noise, seed).generate(region);
                let owned = layer.nullify_on_owned.then_some(&ctx.ownership);
                DetailLayer::from_noise(&field, self.settings.detail_scatter_mode, owned, self.settings.parcel_size)
            })
            .collect();

        Ok((splat, details))
    }

    fn generate_trees(&self, ctx: &TerrainContext, chunk: &ChunkModel) -> Result<Vec<TreeInstance>> {
        if self.settings.trees.is_empty() || chunk.is_fully_occupied() {
            return Ok(Vec::new());
        }
        let grid = TreeGrid::new(
            chunk.min_parcel,
            chunk.size_parcels,
            self.settings.parcel_size,
            self.settings.tree_cell_size,
        );
        let engine = VegetationPlacementEngine::new(
            &self.settings.trees,
            ctx.height_fn(self.settings.parcel_size),
            self.settings.seed,
        );
        let densities = engine.density_fields(&grid);
        Ok(engine.place(grid, &densities)?.collect_valid())
    }
}
