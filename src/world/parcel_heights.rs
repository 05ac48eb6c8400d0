//! Elevation of empty parcels, derived from the distance to owned land
//!
//! Two strictly ordered phases:
//! 1. every empty parcel searches growing square rings until it hits owned
//!    land or the world edge, giving its base height;
//! 2. once *all* base heights exist, every empty parcel samples the base
//!    heights of its eight neighbours.
//!
//! Phase 2 only accepts the finished [`BaseHeights`] value, so it cannot be
//! started on partial phase 1 output.

use std::time::Instant;

use glam::IVec2;
use rayon::prelude::*;
use tracing::debug;

use crate::core::parcel::{NEIGHBOR_OFFSETS, OwnershipSet, WorldBounds};

/// Base heights of the eight neighbours; `None` means owned or outside the world.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct NeighborHeights {
    pub left: Option<f32>,
    pub right: Option<f32>,
    pub up: Option<f32>,
    pub down: Option<f32>,
    pub up_left: Option<f32>,
    pub up_right: Option<f32>,
    pub down_left: Option<f32>,
    pub down_right: Option<f32>,
}

impl NeighborHeights {
    /// Neighbour in the direction of `NEIGHBOR_OFFSETS[direction]`.
    pub fn get(&self, direction: usize) -> Option<f32> {
        match direction {
            0 => self.left,
            1 => self.right,
            2 => self.up,
            3 => self.down,
            4 => self.up_left,
            5 => self.up_right,
            6 => self.down_left,
            7 => self.down_right,
            _ => None,
        }
    }

    fn set(&mut self, direction: usize, height: Option<f32>) {
        match direction {
            0 => self.left = height,
            1 => self.right = height,
            2 => self.up = height,
            3 => self.down = height,
            4 => self.up_left = height,
            5 => self.up_right = height,
            6 => self.down_left = height,
            7 => self.down_right = height,
            _ => {}
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EmptyParcelRecord {
    pub ring_radius: i32,
    pub base_height: f32,
    pub neighbors: NeighborHeights,
}

/// Phase 1 output: one slot per parcel of the world, `None` for owned parcels.
#[derive(Clone, Debug)]
pub struct BaseHeights {
    bounds: WorldBounds,
    slots: Vec<Option<(i32, f32)>>,
}

impl BaseHeights {
    pub fn ring_radius(&self, parcel: IVec2) -> Option<i32> {
        self.slot(parcel).map(|(ring, _)| ring)
    }

    pub fn base_height(&self, parcel: IVec2) -> Option<f32> {
        self.slot(parcel).map(|(_, height)| height)
    }

    fn slot(&self, parcel: IVec2) -> Option<(i32, f32)> {
        self.bounds.index_of(parcel).and_then(|i| self.slots[i])
    }
}

/// Resolver output: a record for every empty parcel of the world.
#[derive(Clone, Debug)]
pub struct ParcelHeights {
    bounds: WorldBounds,
    records: Vec<Option<EmptyParcelRecord>>,
    max_base_height: f32,
}

impl ParcelHeights {
    pub fn bounds(&self) -> &WorldBounds {
        &self.bounds
    }

    /// Record of an empty parcel; `None` for owned or out-of-world parcels.
    pub fn record(&self, parcel: IVec2) -> Option<&EmptyParcelRecord> {
        self.bounds
            .index_of(parcel)
            .and_then(|i| self.records[i].as_ref())
    }

    /// Base height of any in-world parcel: owned parcels are flat 0.
    pub fn base_height(&self, parcel: IVec2) -> Option<f32> {
        let index = self.bounds.index_of(parcel)?;
        Some(self.records[index].map_or(0.0, |record| record.base_height))
    }

    pub fn max_base_height(&self) -> f32 {
        self.max_base_height
    }

    pub fn empty_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_some()).count()
    }
}

pub struct ParcelHeightResolver {
    height_nerf: f32,
}

impl ParcelHeightResolver {
    pub fn new(height_nerf: f32) -> Self {
        ParcelHeightResolver { height_nerf }
    }

    /// Runs both phases with the barrier between them.
    pub fn resolve(&self, ownership: &OwnershipSet) -> ParcelHeights {
        let started = Instant::now();
        let base = self.resolve_base_heights(ownership);
        let phase1 = started.elapsed();

        let heights = self.sample_neighbors(ownership, &base);
        debug!(
            phase1_ms = phase1.as_secs_f64() * 1000.0,
            total_ms = started.elapsed().as_secs_f64() * 1000.0,
            empty = heights.empty_count(),
            max_height = heights.max_base_height,
            "resolved empty parcel heights"
        );
        heights
    }

    /// Phase 1: ring search for every empty parcel.
    pub fn resolve_base_heights(&self, ownership: &OwnershipSet) -> BaseHeights {
        let bounds = *ownership.bounds();
        let mut slots = vec![None; bounds.len()];

        slots.par_iter_mut().enumerate().for_each(|(index, slot)| {
            if ownership.is_owned_index(index) {
                return;
            }
            let ring = ring_search(ownership, bounds.parcel_at(index));
            *slot = Some((ring, (ring - 1) as f32 / self.height_nerf));
        });

        BaseHeights { bounds, slots }
    }

    /// Phase 2: neighbour sampling over the finished phase 1 output.
    pub fn sample_neighbors(&self, ownership: &OwnershipSet, base: &BaseHeights) -> ParcelHeights {
        let bounds = *ownership.bounds();
        let mut records = vec![None; bounds.len()];

        records.par_iter_mut().enumerate().for_each(|(index, record)| {
            let Some((ring_radius, base_height)) = base.slots[index] else {
                return;
            };
            let parcel = bounds.parcel_at(index);
            let mut neighbors = NeighborHeights::default();
            for (direction, offset) in NEIGHBOR_OFFSETS.iter().enumerate() {
                neighbors.set(direction, base.base_height(parcel + *offset));
            }
            *record = Some(EmptyParcelRecord {
                ring_radius,
                base_height,
                neighbors,
            });
        });

        let max_base_height = records
            .par_iter()
            .filter_map(|r| r.map(|r| r.base_height))
            .reduce(|| 0.0, f32::max);

        ParcelHeights {
            bounds,
            records,
            max_base_height,
        }
    }
}

/// Smallest ring radius whose square around `parcel` contains owned land or
/// leaves the world.
pub fn ring_search(ownership: &OwnershipSet, parcel: IVec2) -> i32 {
    let bounds = ownership.bounds();
    let limit = bounds.max_ring_radius();

    let mut radius = 1;
    while radius <= limit {
        if bounds.square_exceeds(parcel, radius)
            || ownership.any_in_rect(parcel - radius, parcel + radius)
        {
            return radius;
        }
        radius += 1;
    }
    // The world edge is always reached within `limit` rings.
    panic!("ring search from {parcel:?} did not terminate within {limit} rings");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world(owned: &[IVec2]) -> OwnershipSet {
        OwnershipSet::new(WorldBounds::default(), owned.iter().copied())
    }

    #[test]
    fn corner_parcel_stops_at_first_ring() {
        let ownership = world(&[]);
        assert_eq!(ring_search(&ownership, IVec2::new(150, 150)), 1);
        assert_eq!(ring_search(&ownership, IVec2::new(-150, 20)), 1);
    }

    #[test]
    fn center_of_empty_world_reaches_edge() {
        let ownership = world(&[]);
        assert_eq!(ring_search(&ownership, IVec2::ZERO), 151);
    }

    #[test]
    fn ring_search_around_single_owned_parcel() {
        let ownership = world(&[IVec2::ZERO]);
        let resolver = ParcelHeightResolver::new(2.0);
        let heights = resolver.resolve(&ownership);

        let near = heights.record(IVec2::new(1, 1)).unwrap();
        assert_eq!(near.ring_radius, 1);
        assert_eq!(near.base_height, 0.0);

        let far = heights.record(IVec2::new(2, 2)).unwrap();
        assert_eq!(far.ring_radius, 2);
        assert_eq!(far.base_height, 0.5);
    }

    #[test]
    fn owned_parcels_have_no_record_and_flat_height() {
        let ownership = world(&[IVec2::new(3, -4)]);
        let heights = ParcelHeightResolver::new(1.0).resolve(&ownership);

        assert!(heights.record(IVec2::new(3, -4)).is_none());
        assert_eq!(heights.base_height(IVec2::new(3, -4)), Some(0.0));
        assert_eq!(heights.base_height(IVec2::new(500, 0)), None);
    }

    #[test]
    fn neighbors_use_sentinel_for_owned_and_outside() {
        let ownership = world(&[IVec2::new(149, 150)]);
        let heights = ParcelHeightResolver::new(1.0).resolve(&ownership);
        let record = heights.record(IVec2::new(150, 150)).unwrap();

        assert_eq!(record.neighbors.left, None);
        assert_eq!(record.neighbors.right, None);
        assert_eq!(record.neighbors.up, None);
        assert_eq!(record.neighbors.down, Some(0.0));
        assert_eq!(record.neighbors.down_left, Some(0.0));
    }

    #[test]
    fn neighbor_heights_match_phase_one() {
        let ownership = world(&[IVec2::ZERO, IVec2::new(40, -12)]);
        let resolver = ParcelHeightResolver::new(3.0);
        let base = resolver.resolve_base_heights(&ownership);
        let heights = resolver.sample_neighbors(&ownership, &base);

        let parcel = IVec2::new(10, 7);
        let record = heights.record(parcel).unwrap();
        for (direction, offset) in NEIGHBOR_OFFSETS.iter().enumerate() {
            assert_eq!(record.neighbors.get(direction), base.base_height(parcel + *offset));
        }
        assert_eq!(base.ring_radius(parcel), Some(record.ring_radius));
    }

    #[test]
    fn max_height_is_tracked() {
        let ownership = world(&[]);
        let heights = ParcelHeightResolver::new(10.0).resolve(&ownership);
        assert_eq!(heights.max_base_height(), 15.0);
    }
}
