//! Parcel grid primitives: world bounds, dense indexing and the ownership set.

use glam::IVec2;
use serde::{Deserialize, Serialize};

use crate::constants::*;

/// The eight compass directions, in the order neighbour records store them.
pub const NEIGHBOR_OFFSETS: [IVec2; 8] = [
    IVec2::new(-1, 0),  // left
    IVec2::new(1, 0),   // right
    IVec2::new(0, 1),   // up
    IVec2::new(0, -1),  // down
    IVec2::new(-1, 1),  // up-left
    IVec2::new(1, 1),   // up-right
    IVec2::new(-1, -1), // down-left
    IVec2::new(1, -1),  // down-right
];

/// Inclusive parcel rectangle the world lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldBounds {
    pub min: IVec2,
    pub max: IVec2,
}

impl Default for WorldBounds {
    fn default() -> Self {
        WorldBounds::new(
            IVec2::splat(WORLD_MIN_PARCEL),
            IVec2::splat(WORLD_MAX_PARCEL),
        )
    }
}

impl WorldBounds {
    pub fn new(min: IVec2, max: IVec2) -> Self {
        WorldBounds {
            min: min.min(max),
            max: min.max(max),
        }
    }

    pub fn width(&self) -> i32 {
        self.max.x - self.min.x + 1
    }

    pub fn depth(&self) -> i32 {
        self.max.y - self.min.y + 1
    }

    pub fn len(&self) -> usize {
        self.width() as usize * self.depth() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, parcel: IVec2) -> bool {
        parcel.x >= self.min.x
            && parcel.x <= self.max.x
            && parcel.y >= self.min.y
            && parcel.y <= self.max.y
    }

    /// Row-major dense index of `parcel`, `None` outside the bounds.
    pub fn index_of(&self, parcel: IVec2) -> Option<usize> {
        if !self.contains(parcel) {
            return None;
        }
        let local = parcel - self.min;
        Some(local.y as usize * self.width() as usize + local.x as usize)
    }

    /// Inverse of [`WorldBounds::index_of`].
    pub fn parcel_at(&self, index: usize) -> IVec2 {
        let width = self.width() as usize;
        self.min + IVec2::new((index % width) as i32, (index / width) as i32)
    }

    /// Whether the Chebyshev square of `radius` around `parcel` leaves the world.
    pub fn square_exceeds(&self, parcel: IVec2, radius: i32) -> bool {
        parcel.x - radius < self.min.x
            || parcel.x + radius > self.max.x
            || parcel.y - radius < self.min.y
            || parcel.y + radius > self.max.y
    }

    /// Largest ring radius a search starting inside the bounds can ever need.
    pub fn max_ring_radius(&self) -> i32 {
        self.width().max(self.depth())
    }
}

/// Owned parcels of one generation pass. Immutable once built.
#[derive(Clone, Debug)]
pub struct OwnershipSet {
    bounds: WorldBounds,
    owned: Vec<bool>,
    parcels: Vec<IVec2>,
    // Summed-area table with a one-cell zero border, (width + 1) * (depth + 1).
    prefix: Vec<u32>,
}

impl OwnershipSet {
    /// Builds the set; parcels outside `bounds` and duplicates are ignored.
    pub fn new(bounds: WorldBounds, parcels: impl IntoIterator<Item = IVec2>) -> Self {
        let mut owned = vec![false; bounds.len()];
        let mut list = Vec::new();

        for parcel in parcels {
            if let Some(index) = bounds.index_of(parcel) {
                if !owned[index] {
                    owned[index] = true;
                    list.push(parcel);
                }
            }
        }
        list.sort_by_key(|p| (p.y, p.x));

        let width = bounds.width() as usize;
        let depth = bounds.depth() as usize;
        let stride = width + 1;
        let mut prefix = vec![0u32; stride * (depth + 1)];
        for z in 0..depth {
            let mut row_sum = 0u32;
            for x in 0..width {
                row_sum += owned[z * width + x] as u32;
                prefix[(z + 1) * stride + x + 1] = prefix[z * stride + x + 1] + row_sum;
            }
        }

        OwnershipSet {
            bounds,
            owned,
            parcels: list,
            prefix,
        }
    }

    pub fn bounds(&self) -> &WorldBounds {
        &self.bounds
    }

    pub fn is_owned(&self, parcel: IVec2) -> bool {
        self.bounds
            .index_of(parcel)
            .is_some_and(|index| self.owned[index])
    }

    pub fn is_owned_index(&self, index: usize) -> bool {
        self.owned[index]
    }

    /// Owned parcels sorted by row, then column.
    pub fn parcels(&self) -> &[IVec2] {
        &self.parcels
    }

    pub fn len(&self) -> usize {
        self.parcels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parcels.is_empty()
    }

    /// Number of owned parcels in the inclusive rectangle `[min, max]`,
    /// clamped to the world bounds.
    pub fn count_in_rect(&self, min: IVec2, max: IVec2) -> u32 {
        let lo = min.max(self.bounds.min);
        let hi = max.min(self.bounds.max);
        if hi.x < lo.x || hi.y < lo.y {
            return 0;
        }
        let lo = (lo - self.bounds.min).as_uvec2();
        let hi = (hi - self.bounds.min).as_uvec2() + 1;
        let stride = self.bounds.width() as usize + 1;
        let at = |x: u32, z: u32| self.prefix[z as usize * stride + x as usize];

        at(hi.x, hi.y) + at(lo.x, lo.y) - at(lo.x, hi.y) - at(hi.x, lo.y)
    }

    pub fn any_in_rect(&self, min: IVec2, max: IVec2) -> bool {
        self.count_in_rect(min, max) > 0
    }
}
