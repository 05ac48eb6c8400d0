use glam::{IVec2, Vec2};
use parcel_terrain::{
    CancellationToken, ChunkTerrain, NoiseRegion, NoiseStack, NoiseStackSettings, OwnershipSet,
    TerrainGenerator, TerrainSettings,
};
use proptest::prelude::*;

fn settings(seed: u32) -> TerrainSettings {
    TerrainSettings {
        seed,
        world_min: [-12, -12],
        world_max: [11, 11],
        chunk_size_parcels: 8,
        ..TerrainSettings::default()
    }
}

fn generate_in_pool(threads: usize, seed: u32, owned: &[IVec2]) -> Vec<ChunkTerrain> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .unwrap();
    pool.install(|| {
        let settings = settings(seed);
        let ownership = OwnershipSet::new(settings.bounds(), owned.iter().copied());
        let generator = TerrainGenerator::new(settings).unwrap();
        let ctx = generator.prepare(ownership);
        generator.generate_all(&ctx, &CancellationToken::new()).unwrap()
    })
}

fn bits(values: &[f32]) -> Vec<u32> {
    values.iter().map(|v| v.to_bits()).collect()
}

#[test]
fn chunks_are_identical_across_thread_pools() {
    let owned = [IVec2::new(0, 0), IVec2::new(1, 0), IVec2::new(-7, 5), IVec2::new(9, -9)];
    let single = generate_in_pool(1, 17, &owned);
    let many = generate_in_pool(4, 17, &owned);

    assert_eq!(single.len(), 9);
    for (a, b) in single.iter().zip(&many) {
        assert_eq!(a.coord, b.coord);
        assert_eq!(bits(a.heightfield.heights()), bits(b.heightfield.heights()));
        assert_eq!(a.holes, b.holes);
        assert_eq!(a.details, b.details);
        assert_eq!(a.trees, b.trees);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    // Noise fields only depend on settings, seed and region
    #[test]
    fn noise_is_reproducible(seed in any::<u32>(), x in -5000.0f32..5000.0, z in -5000.0f32..5000.0) {
        let region = NoiseRegion::square(Vec2::new(x, z), 17, 1.5);
        let a = NoiseStack::new(&NoiseStackSettings::terrain_height(), seed).generate(region);
        let b = NoiseStack::new(&NoiseStackSettings::terrain_height(), seed).generate(region);
        prop_assert_eq!(bits(a.values()), bits(b.values()));
    }
}
