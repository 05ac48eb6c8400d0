//! Partition of the bounded world into square terrain chunks

use glam::{IVec2, Vec3};

use crate::core::parcel::{OwnershipSet, WorldBounds};
use crate::render::frustum::Aabb;

#[derive(Clone, Debug, PartialEq)]
pub struct ChunkModel {
    /// Chunk grid coordinate
    pub coord: IVec2,
    pub min_parcel: IVec2,
    pub size_parcels: i32,
    /// Owned parcels inside the chunk, row order
    pub occupied_parcels: Vec<IVec2>,
    pub bounds: Aabb,
}

impl ChunkModel {
    pub fn contains(&self, parcel: IVec2) -> bool {
        let local = parcel - self.min_parcel;
        local.cmpge(IVec2::ZERO).all() && local.cmplt(IVec2::splat(self.size_parcels)).all()
    }

    pub fn is_fully_occupied(&self) -> bool {
        self.occupied_parcels.len() == (self.size_parcels * self.size_parcels) as usize
    }
}

#[derive(Clone, Debug)]
pub struct TerrainModel {
    bounds: WorldBounds,
    chunk_size_parcels: i32,
    chunks_per_axis: IVec2,
    chunks: Vec<ChunkModel>,
}

impl TerrainModel {
    /// `max_height` is the world-space height of the tallest terrain, used for chunk bounds.
    pub fn new(ownership: &OwnershipSet, chunk_size_parcels: i32, parcel_size: i32, max_height: f32) -> Self {
        let bounds = *ownership.bounds();
        let size = chunk_size_parcels.max(1);
        let per_axis = IVec2::new(
            (bounds.width() + size - 1) / size,
            (bounds.depth() + size - 1) / size,
        );

        let mut chunks = Vec::with_capacity((per_axis.x * per_axis.y) as usize);
        for cz in 0..per_axis.y {
            for cx in 0..per_axis.x {
                let coord = IVec2::new(cx, cz);
                let min_parcel = bounds.min + coord * size;
                let min = (min_parcel * parcel_size).as_vec2();
                let max = ((min_parcel + size) * parcel_size).as_vec2();
                chunks.push(ChunkModel {
                    coord,
                    min_parcel,
                    size_parcels: size,
                    occupied_parcels: Vec::new(),
                    bounds: Aabb::new(
                        Vec3::new(min.x, 0.0, min.y),
                        Vec3::new(max.x, max_height.max(0.0), max.y),
                    ),
                });
            }
        }

        // Owned parcels come sorted by row, so each chunk's list stays sorted.
        for parcel in ownership.parcels() {
            let coord = (*parcel - bounds.min) / size;
            chunks[(coord.y * per_axis.x + coord.x) as usize]
                .occupied_parcels
                .push(*parcel);
        }

        TerrainModel {
            bounds,
            chunk_size_parcels: size,
            chunks_per_axis: per_axis,
            chunks,
        }
    }

    pub fn bounds(&self) -> &WorldBounds {
        &self.bounds
    }

    pub fn chunk_size_parcels(&self) -> i32 {
        self.chunk_size_parcels
    }

    pub fn chunks_per_axis(&self) -> IVec2 {
        self.chunks_per_axis
    }

    pub fn chunks(&self) -> &[ChunkModel] {
        &self.chunks
    }

    pub fn chunk(&self, coord: IVec2) -> Option<&ChunkModel> {
        if coord.cmplt(IVec2::ZERO).any() || coord.cmpge(self.chunks_per_axis).any() {
            return None;
        }
        self.chunks
            .get((coord.y * self.chunks_per_axis.x + coord.x) as usize)
    }

    pub fn chunk_of(&self, parcel: IVec2) -> Option<&ChunkModel> {
        if !self.bounds.contains(parcel) {
            return None;
        }
        self.chunk((parcel - self.bounds.min) / self.chunk_size_parcels)
    }

    pub fn chunk_bounds(&self) -> impl Iterator<Item = Aabb> + '_ {
        self.chunks.iter().map(|chunk| chunk.bounds)
    }
}
