use glam::IVec2;
use parcel_terrain::{HoleMask, OwnershipSet, WorldBounds};
use proptest::prelude::*;

proptest! {
    // Terrain is present exactly over owned 16x16 blocks
    #[test]
    fn hole_mask_covers_owned_blocks(
        min in (-20i32..20, -20i32..20),
        width in 1usize..6,
        depth in 1usize..6,
        owned in prop::collection::vec((-25i32..30, -25i32..30), 0..20),
    ) {
        let min = IVec2::new(min.0, min.1);
        let owned: Vec<IVec2> = owned.into_iter().map(|(x, y)| IVec2::new(x, y)).collect();
        let ownership = OwnershipSet::new(WorldBounds::default(), owned.iter().copied());
        let mask = HoleMask::build(min, width, depth, &ownership);

        for pz in 0..mask.depth() {
            for px in 0..mask.width() {
                let parcel = min + IVec2::new((px / 16) as i32, (pz / 16) as i32);
                prop_assert_eq!(mask.is_terrain_present(px, pz), owned.contains(&parcel));
            }
        }
    }
}
