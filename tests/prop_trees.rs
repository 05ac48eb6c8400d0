use glam::{IVec2, Vec2, Vec3};
use parcel_terrain::world::trees::{TreeGrid, TreeInstance, VegetationPlacementEngine};
use parcel_terrain::{
    NoiseSettings, NoiseStackSettings, OwnershipSet, ParcelHeightResolver, TerrainHeightFunction,
    TreePrototype, TreeRandomization, WorldBounds,
};
use proptest::prelude::*;

fn prototype(radius: f32) -> TreePrototype {
    TreePrototype {
        name: format!("r{radius}"),
        radius,
        randomization: TreeRandomization {
            position_offset: 1.0,
            min_scale_xz: 1.0,
            max_scale_xz: 1.0,
            ..TreeRandomization::default()
        },
        density_noise: NoiseStackSettings::new(NoiseSettings::default()),
    }
}

fn conflicts(prototypes: &[TreePrototype], a: &TreeInstance, b: &TreeInstance) -> bool {
    let r = |t: &TreeInstance| prototypes[t.prototype_index].radius * t.width_scale;
    a.prototype_index == b.prototype_index
        && (a.position.x - b.position.x).hypot(a.position.z - b.position.z) < r(a).max(r(b))
}

// (cell, prototype, jitter) for a subset of an 8x8 grid
fn candidates() -> impl Strategy<Value = Vec<Option<(usize, f32, f32)>>> {
    prop::collection::vec(
        prop::option::weighted(0.6, (0usize..2, -1.0f32..1.0, -1.0f32..1.0)),
        64,
    )
}

proptest! {
    // Kept trees never conflict and every discarded tree conflicts with a kept one
    #[test]
    fn invalidation_is_a_maximal_independent_set(cells in candidates(), r0 in 0.5f32..6.0, r1 in 0.5f32..6.0) {
        let heights = ParcelHeightResolver::new(10.0).resolve(&OwnershipSet::new(WorldBounds::default(), []));
        let prototypes = [prototype(r0), prototype(r1)];
        let engine = VegetationPlacementEngine::new(&prototypes, TerrainHeightFunction::new(&heights, None, 16), 5);
        let grid = TreeGrid::new(IVec2::ZERO, 1, 16, 2.0);

        let trees: Vec<Option<TreeInstance>> = cells
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                cell.map(|(prototype_index, jx, jz)| {
                    let c = grid.cell_center(i) + Vec2::new(jx, jz);
                    TreeInstance {
                        position: Vec3::new(c.x, 0.0, c.y),
                        prototype_index,
                        rotation: 0.0,
                        width_scale: 1.0,
                        height_scale: 1.0,
                    }
                })
            })
            .collect();

        let map = engine.invalidate(&grid, &trees);
        let kept: Vec<(usize, TreeInstance)> = trees
            .iter()
            .enumerate()
            .filter_map(|(i, t)| t.filter(|_| !map.is_invalid(i)).map(|t| (i, t)))
            .collect();

        for (i, (_, a)) in kept.iter().enumerate() {
            for (_, b) in &kept[i + 1..] {
                prop_assert!(!conflicts(&prototypes, a, b));
            }
        }
        for (i, tree) in trees.iter().enumerate() {
            let Some(tree) = tree else {
                prop_assert!(!map.is_invalid(i));
                continue;
            };
            if map.is_invalid(i) {
                prop_assert!(kept.iter().any(|(j, k)| *j < i && conflicts(&prototypes, tree, k)));
            }
        }
    }
}
