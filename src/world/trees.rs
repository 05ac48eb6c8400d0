//! Tree scattering over a per-chunk density grid
//!
//! Candidates are generated prototype by prototype; within a prototype every
//! grid cell is independent. Same-species overlaps are then resolved with a
//! read-only decision per cell: a candidate survives iff none of its
//! conflicting neighbours with a lower cell index survives.

use std::time::Instant;

use glam::{IVec2, Vec2, Vec3};
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::core::error::{Result, TerrainError};
use crate::core::parcel::NEIGHBOR_OFFSETS;
use crate::core::random::CellRandom;
use crate::utils::settings::TreePrototype;
use crate::world::height::TerrainHeightFunction;
use crate::world::noise::{NoiseField, NoiseRegion, NoiseStack};
use crate::world::parcel_heights::ParcelHeights;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TreeInstance {
    /// Chunk-local x/z, terrain height in y
    pub position: Vec3,
    pub prototype_index: usize,
    /// Radians around Y
    pub rotation: f32,
    pub width_scale: f32,
    pub height_scale: f32,
}

/// Square density grid covering one chunk.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TreeGrid {
    origin: Vec2,
    size: usize,
    cell_size: f32,
}

impl TreeGrid {
    pub fn new(chunk_min_parcel: IVec2, chunk_parcels: i32, parcel_size: i32, cell_size: f32) -> Self {
        let units = (chunk_parcels * parcel_size) as f32;
        TreeGrid {
            origin: (chunk_min_parcel * parcel_size).as_vec2(),
            size: ((units / cell_size).ceil() as usize).max(1),
            cell_size,
        }
    }

    pub fn origin(&self) -> Vec2 {
        self.origin
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    pub fn len(&self) -> usize {
        self.size * self.size
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Density noise is sampled at cell centres.
    pub fn region(&self) -> NoiseRegion {
        NoiseRegion::square(self.origin + Vec2::splat(self.cell_size * 0.5), self.size, self.cell_size)
    }

    pub fn cell_center(&self, index: usize) -> Vec2 {
        self.region().position(index % self.size, index / self.size)
    }

    /// World-wide cell coordinate, stable across chunks.
    pub fn global_cell(&self, index: usize) -> IVec2 {
        let base = (self.origin / self.cell_size).floor().as_ivec2();
        base + IVec2::new((index % self.size) as i32, (index / self.size) as i32)
    }
}

/// `true` marks a candidate discarded by conflict resolution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeInvalidationMap(Vec<bool>);

impl TreeInvalidationMap {
    pub fn is_invalid(&self, cell: usize) -> bool {
        self.0[cell]
    }

    pub fn invalid_count(&self) -> usize {
        self.0.iter().filter(|invalid| **invalid).count()
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.0
    }
}

#[derive(Clone, Debug)]
pub struct TreeLayout {
    pub grid: TreeGrid,
    pub candidates: Vec<Option<TreeInstance>>,
    pub invalidation: TreeInvalidationMap,
}

impl TreeLayout {
    /// Surviving instances in cell order.
    pub fn collect_valid(&self) -> Vec<TreeInstance> {
        self.candidates
            .iter()
            .zip(self.invalidation.as_slice())
            .filter_map(|(candidate, invalid)| if *invalid { None } else { *candidate })
            .collect()
    }

    pub fn candidate_count(&self) -> usize {
        self.candidates.iter().filter(|c| c.is_some()).count()
    }
}

/// Whether a canopy of `radius` at `local` (parcel-local, world units) reaches
/// owned land or the world edge, walking outward through neighbour records.
pub fn canopy_reaches_boundary(
    heights: &ParcelHeights,
    parcel: IVec2,
    local: Vec2,
    radius: f32,
    parcel_size: f32,
) -> bool {
    let edge_distance = |offset: i32, l: f32, depth: i32| -> f32 {
        match offset {
            -1 => l + depth as f32 * parcel_size,
            1 => parcel_size - l + depth as f32 * parcel_size,
            _ => 0.0,
        }
    };

    for (direction, offset) in NEIGHBOR_OFFSETS.iter().enumerate() {
        let mut current = parcel;
        let mut depth = 0;
        loop {
            let dx = edge_distance(offset.x, local.x, depth);
            let dz = edge_distance(offset.y, local.y, depth);
            if (dx * dx + dz * dz).sqrt() >= radius {
                break;
            }
            // The canopy crosses into the next parcel in this direction.
            let Some(record) = heights.record(current) else {
                return true;
            };
            if record.neighbors.get(direction).is_none() {
                return true;
            }
            current += *offset;
            depth += 1;
        }
    }
    false
}

pub struct VegetationPlacementEngine<'a> {
    prototypes: &'a [TreePrototype],
    height_fn: TerrainHeightFunction<'a>,
    seed: u32,
}

impl<'a> VegetationPlacementEngine<'a> {
    pub fn new(prototypes: &'a [TreePrototype], height_fn: TerrainHeightFunction<'a>, seed: u32) -> Self {
        VegetationPlacementEngine {
            prototypes,
            height_fn,
            seed,
        }
    }

    /// One density field per prototype over the grid.
    pub fn density_fields(&self, grid: &TreeGrid) -> Vec<NoiseField> {
        self.prototypes
            .iter()
            .map(|prototype| NoiseStack::new(&prototype.density_noise, self.seed).generate(grid.region()))
            .collect()
    }

    pub fn place(&self, grid: TreeGrid, densities: &[NoiseField]) -> Result<TreeLayout> {
        let started = Instant::now();
        let candidates = self.generate_candidates(&grid, densities)?;
        let generated = started.elapsed();
        let invalidation = self.invalidate(&grid, &candidates);

        let layout = TreeLayout {
            grid,
            candidates,
            invalidation,
        };
        debug!(
            candidates = layout.candidate_count(),
            invalid = layout.invalidation.invalid_count(),
            generate_ms = generated.as_secs_f64() * 1000.0,
            total_ms = started.elapsed().as_secs_f64() * 1000.0,
            "placed trees"
        );
        Ok(layout)
    }

    pub fn generate_candidates(&self, grid: &TreeGrid, densities: &[NoiseField]) -> Result<Vec<Option<TreeInstance>>> {
        if densities.len() != self.prototypes.len() {
            return Err(TerrainError::BufferSize {
                what: "tree density fields",
                expected: self.prototypes.len(),
                actual: densities.len(),
            });
        }
        if let Some(field) = densities.iter().find(|f| f.values().len() != grid.len()) {
            return Err(TerrainError::BufferSize {
                what: "tree density field",
                expected: grid.len(),
                actual: field.values().len(),
            });
        }

        let mut slots: Vec<Option<TreeInstance>> = vec![None; grid.len()];
        // Earlier prototypes claim cells first.
        for (index, (prototype, density)) in self.prototypes.iter().zip(densities).enumerate() {
            slots.par_iter_mut().enumerate().for_each(|(cell, slot)| {
                if slot.is_none() {
                    *slot = self.candidate(grid, cell, index, prototype, density.values()[cell]);
                }
            });
        }
        Ok(slots)
    }

    fn candidate(
        &self,
        grid: &TreeGrid,
        cell: usize,
        prototype_index: usize,
        prototype: &TreePrototype,
        density: f32,
    ) -> Option<TreeInstance> {
        if density <= 0.0 || density.is_nan() {
            return None;
        }
        let r = &prototype.randomization;
        let mut rng = CellRandom::for_cell(self.seed, grid.global_cell(cell), prototype_index as u32);

        let jitter = Vec2::new(
            rng.range_f32(-r.position_offset, r.position_offset),
            rng.range_f32(-r.position_offset, r.position_offset),
        );
        let world = grid.cell_center(cell) + jitter;
        let parcel = self.height_fn.parcel_of(world.x, world.y);
        let heights = self.height_fn.heights();
        // Owned or outside the world.
        heights.record(parcel)?;

        let width_scale = rng.range_f32(r.min_scale_xz, r.max_scale_xz);
        let height_scale = rng.range_f32(r.min_scale_y, r.max_scale_y);
        let rotation = rng.range_f32(r.min_rotation, r.max_rotation).to_radians();

        let parcel_size = self.height_fn.parcel_size();
        let local = world - parcel.as_vec2() * parcel_size;
        if canopy_reaches_boundary(heights, parcel, local, prototype.radius * width_scale, parcel_size) {
            return None;
        }

        let local_chunk = world - grid.origin();
        Some(TreeInstance {
            position: Vec3::new(local_chunk.x, self.height_fn.world_height(world.x, world.y), local_chunk.y),
            prototype_index,
            rotation,
            width_scale,
            height_scale,
        })
    }

    fn conflict_radius(&self, tree: &TreeInstance) -> f32 {
        self.prototypes[tree.prototype_index].radius * tree.width_scale
    }

    fn conflicts(&self, a: &TreeInstance, b: &TreeInstance) -> bool {
        if a.prototype_index != b.prototype_index {
            return false;
        }
        let d = (a.position.x - b.position.x).hypot(a.position.z - b.position.z);
        d < self.conflict_radius(a).max(self.conflict_radius(b))
    }

    /// Cells to scan around each candidate, covering the widest canopy plus jitter on both sides.
    fn window(&self, grid: &TreeGrid) -> i32 {
        let reach = self
            .prototypes
            .iter()
            .map(|p| p.radius * p.randomization.max_scale_xz + 2.0 * p.randomization.position_offset)
            .fold(0.0f32, f32::max);
        (reach / grid.cell_size()).ceil() as i32
    }

    pub fn invalidate(&self, grid: &TreeGrid, candidates: &[Option<TreeInstance>]) -> TreeInvalidationMap {
        let window = self.window(grid);
        let resolver = ConflictResolver {
            engine: self,
            candidates,
            size: grid.size() as i32,
            window,
        };

        let invalid: Vec<bool> = (0..candidates.len())
            .into_par_iter()
            .map_init(FxHashMap::default, |memo, cell| {
                candidates[cell].is_some() && !resolver.is_kept(cell, memo)
            })
            .collect();
        TreeInvalidationMap(invalid)
    }
}

struct ConflictResolver<'e, 'a> {
    engine: &'e VegetationPlacementEngine<'a>,
    candidates: &'e [Option<TreeInstance>],
    size: i32,
    window: i32,
}

impl ConflictResolver<'_, '_> {
    /// Conflicting candidates with a lower cell index than `cell`.
    fn lower_conflicts(&self, cell: usize) -> impl Iterator<Item = usize> + '_ {
        let tree = self.candidates[cell];
        let cx = cell as i32 % self.size;
        let cz = cell as i32 / self.size;
        let w = self.window;

        (cz - w..=cz).flat_map(move |z| (cx - w..=cx + w).map(move |x| (x, z))).filter_map(move |(x, z)| {
            if x < 0 || z < 0 || x >= self.size || z >= self.size {
                return None;
            }
            let other = (z * self.size + x) as usize;
            if other >= cell {
                return None;
            }
            let (tree, neighbor) = (tree.as_ref()?, self.candidates[other].as_ref()?);
            self.engine.conflicts(tree, neighbor).then_some(other)
        })
    }

    /// Depth-first over lower-index conflicts; `memo` is private to the calling task.
    fn is_kept(&self, cell: usize, memo: &mut FxHashMap<usize, bool>) -> bool {
        let mut stack = vec![cell];
        while let Some(&top) = stack.last() {
            if memo.contains_key(&top) {
                stack.pop();
                continue;
            }
            let mut kept = true;
            let mut pending = None;
            for other in self.lower_conflicts(top) {
                match memo.get(&other) {
                    Some(true) => {
                        kept = false;
                        break;
                    }
                    Some(false) => {}
                    None => {
                        pending = Some(other);
                        break;
                    }
                }
            }
            match pending {
                Some(other) => stack.push(other),
                None => {
                    memo.insert(top, kept);
                    stack.pop();
                }
            }
        }
        memo.get(&cell).copied().unwrap_or(true)
    }
}
