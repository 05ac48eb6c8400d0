//! Render hole mask: terrain is only drawn over owned parcels' complement

use glam::IVec2;
use rayon::prelude::*;

use crate::constants::HOLE_PIXELS_PER_PARCEL;
use crate::core::parcel::OwnershipSet;
use crate::utils::settings::HolePolarity;

/// Row-major mask over a parcel rectangle, `HOLE_PIXELS_PER_PARCEL` pixels per parcel edge.
/// `true` is a hole, `false` is terrain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HoleMask {
    min_parcel: IVec2,
    width: usize,
    depth: usize,
    pixels: Vec<bool>,
}

impl HoleMask {
    pub fn build(
        region_min_parcel: IVec2,
        width_parcels: usize,
        depth_parcels: usize,
        ownership: &OwnershipSet,
    ) -> Self {
        let ppp = HOLE_PIXELS_PER_PARCEL;
        let width = width_parcels * ppp;
        let depth = depth_parcels * ppp;
        let mut pixels = vec![false; width * depth];

        // Pass 1: everything is a hole.
        pixels.par_iter_mut().for_each(|pixel| *pixel = true);

        // Pass 2: owned blocks become terrain.
        if width > 0 {
            pixels.par_chunks_mut(width).enumerate().for_each(|(pz, row)| {
                let parcel_z = region_min_parcel.y + (pz / ppp) as i32;
                for bx in 0..width_parcels {
                    let parcel = IVec2::new(region_min_parcel.x + bx as i32, parcel_z);
                    if ownership.is_owned(parcel) {
                        row[bx * ppp..(bx + 1) * ppp].fill(false);
                    }
                }
            });
        }

        HoleMask {
            min_parcel: region_min_parcel,
            width,
            depth,
            pixels,
        }
    }

    pub fn min_parcel(&self) -> IVec2 {
        self.min_parcel
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn pixels(&self) -> &[bool] {
        &self.pixels
    }

    pub fn is_hole(&self, px: usize, pz: usize) -> bool {
        self.pixels[pz * self.width + px]
    }

    pub fn is_terrain_present(&self, px: usize, pz: usize) -> bool {
        !self.is_hole(px, pz)
    }

    pub fn terrain_pixel_count(&self) -> usize {
        self.pixels.iter().filter(|hole| !**hole).count()
    }

    /// Mask in the backend's boolean convention.
    pub fn to_backend(&self, polarity: HolePolarity) -> Vec<bool> {
        match polarity {
            HolePolarity::TrueIsHole => self.pixels.clone(),
            HolePolarity::TrueIsSurface => self.pixels.par_iter().map(|hole| !hole).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::parcel::WorldBounds;

    #[test]
    fn terrain_only_over_owned_blocks() {
        let owned = [IVec2::new(0, 0), IVec2::new(2, 1), IVec2::new(-1, 3)];
        let ownership = OwnershipSet::new(WorldBounds::default(), owned);
        let min = IVec2::new(-1, 0);
        let mask = HoleMask::build(min, 4, 4, &ownership);

        assert_eq!(mask.width(), 64);
        for pz in 0..mask.depth() {
            for px in 0..mask.width() {
                let parcel = min + IVec2::new((px / 16) as i32, (pz / 16) as i32);
                assert_eq!(mask.is_terrain_present(px, pz), owned.contains(&parcel));
            }
        }
        assert_eq!(mask.terrain_pixel_count(), 3 * 256);
    }

    #[test]
    fn empty_ownership_is_all_holes() {
        let ownership = OwnershipSet::new(WorldBounds::default(), []);
        let mask = HoleMask::build(IVec2::new(10, 10), 2, 3, &ownership);
        assert_eq!(mask.pixels().len(), 32 * 48);
        assert!(mask.pixels().iter().all(|hole| *hole));
    }

    #[test]
    fn surface_polarity_inverts() {
        let ownership = OwnershipSet::new(WorldBounds::default(), [IVec2::ZERO]);
        let mask = HoleMask::build(IVec2::ZERO, 2, 1, &ownership);
        let backend = mask.to_backend(HolePolarity::TrueIsSurface);
        assert!(backend[0]);
        assert!(!backend[20]);
        assert_eq!(mask.to_backend(HolePolarity::TrueIsHole), mask.pixels());
    }
}
