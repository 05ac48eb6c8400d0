//! Collision geometry for individual parcels
//!
//! Each parcel is a `(P + 1)²` vertex grid sampled from the terrain height
//! function at one world unit spacing. Vertex order is positional: z rows
//! outer, x inner, parcels in input order. The shared index buffer relies
//! on that order.

use bytemuck::{Pod, Zeroable};
use glam::{IVec2, Vec2};
use rayon::prelude::*;
use rustc_hash::FxHashSet;
use tracing::debug;

use crate::constants::COLLIDER_USE_RADIUS_FACTOR;
use crate::world::height::TerrainHeightFunction;

/// Collider vertex layout (matches the physics backend)
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct ColliderVertex {
    /// Parcel-local x/z, world height in y
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

pub fn vertices_per_parcel(parcel_size: i32) -> usize {
    let side = parcel_size as usize + 1;
    side * side
}

pub fn generate_vertices(parcels: &[IVec2], height_fn: &TerrainHeightFunction<'_>) -> Vec<ColliderVertex> {
    let parcel_size = height_fn.parcel_size() as i32;
    let side = parcel_size as usize + 1;
    let per_parcel = vertices_per_parcel(parcel_size);
    let mut vertices = vec![ColliderVertex::zeroed(); per_parcel * parcels.len()];

    vertices
        .par_chunks_mut(per_parcel)
        .zip(parcels.par_iter())
        .for_each(|(mesh, parcel)| {
            let origin = (*parcel * parcel_size).as_vec2();
            for (i, vertex) in mesh.iter_mut().enumerate() {
                let local = Vec2::new((i % side) as f32, (i / side) as f32);
                let world = origin + local;
                let y = height_fn.world_height(world.x, world.y);
                *vertex = ColliderVertex {
                    position: [local.x, y, local.y],
                    normal: height_fn.normal(world.x, world.y).to_array(),
                };
            }
        });

    vertices
}

/// Two triangles per quad, shared by every parcel mesh.
pub fn index_buffer(parcel_size: i32) -> Vec<u16> {
    let size = parcel_size as usize;
    let side = size + 1;
    let mut indices = Vec::with_capacity(size * size * 6);

    for z in 0..size {
        for x in 0..size {
            let start = z * side + x;
            indices.extend(
                [
                    start,
                    start + side + 1,
                    start + 1,
                    start,
                    start + side,
                    start + side + 1,
                ]
                .map(|i| i as u16),
            );
        }
    }
    indices
}

/// Turns one parcel mesh into backend collision data.
///
/// Called concurrently, once per mesh, with no ordering between meshes.
pub trait MeshBaker: Sync {
    fn bake(&self, parcel: IVec2, vertices: &[ColliderVertex], indices: &[u16]);
}

/// Vertex buffers of several parcel meshes, one contiguous allocation.
#[derive(Clone, Debug)]
pub struct ColliderBatch {
    parcels: Vec<IVec2>,
    vertices: Vec<ColliderVertex>,
    indices: Vec<u16>,
    per_parcel: usize,
}

impl ColliderBatch {
    pub fn generate(parcels: Vec<IVec2>, height_fn: &TerrainHeightFunction<'_>) -> Self {
        let parcel_size = height_fn.parcel_size() as i32;
        let vertices = generate_vertices(&parcels, height_fn);
        ColliderBatch {
            parcels,
            vertices,
            indices: index_buffer(parcel_size),
            per_parcel: vertices_per_parcel(parcel_size),
        }
    }

    pub fn parcels(&self) -> &[IVec2] {
        &self.parcels
    }

    pub fn vertices(&self) -> &[ColliderVertex] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u16] {
        &self.indices
    }

    pub fn mesh(&self, index: usize) -> &[ColliderVertex] {
        &self.vertices[index * self.per_parcel..(index + 1) * self.per_parcel]
    }

    pub fn len(&self) -> usize {
        self.parcels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parcels.is_empty()
    }

    pub fn bake_all<B: MeshBaker>(&self, baker: &B) {
        if self.per_parcel == 0 {
            return;
        }
        self.vertices
            .par_chunks(self.per_parcel)
            .zip(self.parcels.par_iter())
            .for_each(|(mesh, parcel)| baker.bake(*parcel, mesh, &self.indices));
    }
}

/// Half-open parcel rectangle `[min, max)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParcelRect {
    pub min: IVec2,
    pub max: IVec2,
}

impl ParcelRect {
    pub fn contains(&self, parcel: IVec2) -> bool {
        parcel.cmpge(self.min).all() && parcel.cmplt(self.max).all()
    }

    pub fn parcels(&self) -> impl Iterator<Item = IVec2> + '_ {
        (self.min.y..self.max.y)
            .flat_map(move |y| (self.min.x..self.max.x).map(move |x| IVec2::new(x, y)))
    }
}

/// Parcels touched by a circle of `radius` around `center` (world x/z).
pub fn parcel_rect_around(center: Vec2, radius: f32, parcel_size: i32) -> ParcelRect {
    let inv = 1.0 / parcel_size as f32;
    ParcelRect {
        min: ((center - radius) * inv).floor().as_ivec2(),
        max: ((center + radius) * inv).ceil().as_ivec2(),
    }
}

/// Keeps a pool of parcel collider slots around moving users.
///
/// A slot whose parcel leaves every user's area is freed; new parcels reuse
/// free slots before new ones are allocated. Slots that change parcel are
/// reported dirty until [`ColliderTracker::take_dirty`] is called.
#[derive(Debug)]
pub struct ColliderTracker {
    parcel_size: i32,
    use_radius: f32,
    slots: Vec<IVec2>,
    used: Vec<usize>,
    free: Vec<usize>,
    dirty: FxHashSet<usize>,
}

impl ColliderTracker {
    pub fn new(parcel_size: i32) -> Self {
        ColliderTracker {
            parcel_size,
            use_radius: parcel_size as f32 * COLLIDER_USE_RADIUS_FACTOR,
            slots: Vec::new(),
            used: Vec::new(),
            free: Vec::new(),
            dirty: FxHashSet::default(),
        }
    }

    pub fn update(&mut self, user_positions: &[Vec2]) {
        if user_positions.is_empty() {
            return;
        }
        let rects: Vec<ParcelRect> = user_positions
            .iter()
            .map(|p| parcel_rect_around(*p, self.use_radius, self.parcel_size))
            .collect();

        let mut i = self.used.len();
        while i > 0 {
            i -= 1;
            let slot = self.used[i];
            if !rects.iter().any(|r| r.contains(self.slots[slot])) {
                self.used.swap_remove(i);
                self.free.push(slot);
            }
        }

        for rect in &rects {
            for parcel in rect.parcels() {
                if self.used.iter().any(|slot| self.slots[*slot] == parcel) {
                    continue;
                }
                self.assign(parcel);
            }
        }
    }

    fn assign(&mut self, parcel: IVec2) {
        if let Some(pos) = self.free.iter().rposition(|slot| self.slots[*slot] == parcel) {
            let slot = self.free.swap_remove(pos);
            self.used.push(slot);
            return;
        }
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = parcel;
                slot
            }
            None => {
                self.slots.push(parcel);
                self.slots.len() - 1
            }
        };
        self.dirty.insert(slot);
        self.used.push(slot);
    }

    pub fn used_parcels(&self) -> impl Iterator<Item = IVec2> + '_ {
        self.used.iter().map(|slot| self.slots[*slot])
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Dirty `(slot, parcel)` pairs in slot order; clears the dirty set.
    pub fn take_dirty(&mut self) -> Vec<(usize, IVec2)> {
        let mut dirty: Vec<(usize, IVec2)> = self
            .dirty
            .drain()
            .map(|slot| (slot, self.slots[slot]))
            .collect();
        dirty.sort_unstable_by_key(|(slot, _)| *slot);
        if !dirty.is_empty() {
            debug!(count = dirty.len(), slots = self.slots.len(), "collider parcels dirty");
        }
        dirty
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::parcel::{OwnershipSet, WorldBounds};
    use crate::world::parcel_heights::ParcelHeightResolver;
    use std::sync::Mutex;

    #[test]
    fn index_buffer_covers_every_quad() {
        let indices = index_buffer(16);
        assert_eq!(indices.len(), 16 * 16 * 6);
        assert_eq!(&indices[..6], &[0, 18, 1, 0, 17, 18]);
        assert_eq!(*indices.iter().max().unwrap() as usize, 17 * 17 - 1);
    }

    #[test]
    fn vertices_are_row_major_per_parcel() {
        let ownership = OwnershipSet::new(WorldBounds::default(), [IVec2::new(2, 2)]);
        let heights = ParcelHeightResolver::new(2.0).resolve(&ownership);
        let f = TerrainHeightFunction::new(&heights, None, 16);
        let parcels = [IVec2::new(5, -3), IVec2::new(2, 2)];
        let vertices = generate_vertices(&parcels, &f);

        assert_eq!(vertices.len(), 2 * 289);
        assert_eq!(vertices[18].position[0], 1.0);
        assert_eq!(vertices[18].position[2], 1.0);
        assert_eq!(vertices[18].position[1], f.world_height(81.0, -47.0));
        // Owned parcel interior is flat.
        assert_eq!(vertices[289 + 8 * 17 + 8].position[1], 0.0);
        assert_eq!(bytemuck::cast_slice::<_, u8>(&vertices).len(), vertices.len() * 24);
    }

    struct Recorder(Mutex<Vec<(IVec2, usize)>>);

    impl MeshBaker for Recorder {
        fn bake(&self, parcel: IVec2, vertices: &[ColliderVertex], indices: &[u16]) {
            assert_eq!(indices.len(), 16 * 16 * 6);
            self.0.lock().unwrap().push((parcel, vertices.len()));
        }
    }

    #[test]
    fn bake_runs_once_per_mesh() {
        let ownership = OwnershipSet::new(WorldBounds::default(), []);
        let heights = ParcelHeightResolver::new(10.0).resolve(&ownership);
        let f = TerrainHeightFunction::new(&heights, None, 16);
        let batch = ColliderBatch::generate(vec![IVec2::ZERO, IVec2::ONE, IVec2::NEG_ONE], &f);

        let recorder = Recorder(Mutex::new(Vec::new()));
        batch.bake_all(&recorder);
        let mut baked = recorder.0.into_inner().unwrap();
        baked.sort_by_key(|(p, _)| (p.y, p.x));
        assert_eq!(baked, vec![(IVec2::NEG_ONE, 289), (IVec2::ZERO, 289), (IVec2::ONE, 289)]);
        assert_eq!(batch.mesh(1)[0].position, [0.0, f.world_height(16.0, 16.0), 0.0]);
    }

    #[test]
    fn rect_around_position() {
        let rect = parcel_rect_around(Vec2::new(8.0, 8.0), 16.0 / 3.0, 16);
        assert_eq!(rect, ParcelRect { min: IVec2::ZERO, max: IVec2::ONE });

        let rect = parcel_rect_around(Vec2::new(15.0, 1.0), 16.0 / 3.0, 16);
        assert_eq!(rect, ParcelRect { min: IVec2::new(0, -1), max: IVec2::new(2, 1) });
        assert_eq!(rect.parcels().count(), 4);
    }

    #[test]
    fn tracker_recycles_slots() {
        let mut tracker = ColliderTracker::new(16);
        tracker.update(&[Vec2::new(8.0, 8.0)]);
        assert_eq!(tracker.take_dirty(), vec![(0, IVec2::ZERO)]);

        // Same spot, nothing to regenerate.
        tracker.update(&[Vec2::new(9.0, 7.0)]);
        assert!(tracker.take_dirty().is_empty());

        // Moving away reuses the slot for the new parcel.
        tracker.update(&[Vec2::new(40.0, 8.0)]);
        assert_eq!(tracker.take_dirty(), vec![(0, IVec2::new(2, 0))]);
        assert_eq!(tracker.slot_count(), 1);

        // Two users need two slots.
        tracker.update(&[Vec2::new(40.0, 8.0), Vec2::new(-8.0, -8.0)]);
        assert_eq!(tracker.take_dirty(), vec![(1, IVec2::new(-1, -1))]);
        let mut used: Vec<IVec2> = tracker.used_parcels().collect();
        used.sort_by_key(|p| p.x);
        assert_eq!(used, vec![IVec2::new(-1, -1), IVec2::new(2, 0)]);
        assert_eq!(tracker.free_count(), 0);
    }
}
