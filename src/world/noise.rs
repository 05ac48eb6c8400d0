//! Fractal value noise and field composition
//!
//! Every value is a pure function of the settings, the seed and the sample
//! position, so fields generated row-parallel are bit-identical to fields
//! sampled one cell at a time.

use fastnoise_lite::{FastNoiseLite, NoiseType};
use glam::Vec2;
use rayon::prelude::*;

use crate::constants::ROW_BATCH;
use crate::core::error::{Result, TerrainError};
use crate::core::random::CellRandom;
use crate::utils::settings::{NoiseOperation, NoiseSettings, NoiseStackSettings};

const OCTAVE_OFFSET_RANGE: f32 = 10_000.0;

/// Rectangular sample grid in world space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NoiseRegion {
    pub origin: Vec2,
    pub width: usize,
    pub depth: usize,
    /// World distance between neighbouring samples.
    pub step: f32,
}

impl NoiseRegion {
    pub fn new(origin: Vec2, width: usize, depth: usize, step: f32) -> Self {
        NoiseRegion {
            origin,
            width,
            depth,
            step,
        }
    }

    pub fn square(origin: Vec2, size: usize, step: f32) -> Self {
        Self::new(origin, size, size, step)
    }

    pub fn len(&self) -> usize {
        self.width * self.depth
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// World position of sample `(x, z)`.
    #[inline]
    pub fn position(&self, x: usize, z: usize) -> Vec2 {
        Vec2::new(
            self.origin.x + x as f32 * self.step,
            self.origin.y + z as f32 * self.step,
        )
    }
}

/// Dense row-major noise values over a [`NoiseRegion`].
#[derive(Clone, Debug, PartialEq)]
pub struct NoiseField {
    region: NoiseRegion,
    values: Vec<f32>,
}

impl NoiseField {
    pub fn filled(region: NoiseRegion, value: f32) -> Self {
        NoiseField {
            region,
            values: vec![value; region.len()],
        }
    }

    pub fn region(&self) -> &NoiseRegion {
        &self.region
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [f32] {
        &mut self.values
    }

    pub fn into_values(self) -> Vec<f32> {
        self.values
    }

    pub fn get(&self, x: usize, z: usize) -> f32 {
        self.values[z * self.region.width + x]
    }

    /// Elementwise `self = op(self, other)`.
    pub fn compose(&mut self, other: &NoiseField, operation: NoiseOperation) -> Result<()> {
        if other.values.len() != self.values.len() {
            return Err(TerrainError::BufferSize {
                what: "noise field",
                expected: self.values.len(),
                actual: other.values.len(),
            });
        }
        self.values
            .par_iter_mut()
            .zip(other.values.par_iter())
            .for_each(|(current, value)| *current = operation.apply(*current, *value));
        Ok(())
    }

    /// Values below `threshold` become 0.
    pub fn apply_cutoff(&mut self, threshold: f32) {
        self.values.par_iter_mut().for_each(|v| {
            if *v < threshold {
                *v = 0.0;
            }
        });
    }

    pub fn apply_scalar(&mut self, operation: NoiseOperation, value: f32) {
        self.values
            .par_iter_mut()
            .for_each(|v| *v = operation.apply(*v, value));
    }
}

/// Octave-layered value noise with post-processing.
pub struct NoiseGenerator {
    settings: NoiseSettings,
    seed: u32,
    octave_offsets: Vec<Vec2>,
    amplitude_sum: f32,
    noise: FastNoiseLite,
}

impl NoiseGenerator {
    pub fn new(settings: &NoiseSettings, seed: u32) -> Self {
        let noise_seed = seed.wrapping_add(settings.seed_offset);
        let mut rng = CellRandom::new(noise_seed);
        let base = Vec2::from(settings.offset);
        let offsets = (0..settings.octaves.max(1))
            .map(|_| {
                let x = rng.range_f32(-OCTAVE_OFFSET_RANGE, OCTAVE_OFFSET_RANGE);
                let z = rng.range_f32(-OCTAVE_OFFSET_RANGE, OCTAVE_OFFSET_RANGE);
                base + Vec2::new(x, z)
            })
            .collect();
        Self::with_octave_offsets(settings, seed, offsets)
    }

    /// Uses caller supplied offsets, one per octave; `settings.octaves` is ignored.
    pub fn with_octave_offsets(settings: &NoiseSettings, seed: u32, octave_offsets: Vec<Vec2>) -> Self {
        let mut noise = FastNoiseLite::with_seed(seed.wrapping_add(settings.seed_offset) as i32);
        noise.set_noise_type(Some(NoiseType::Value));
        noise.set_frequency(Some(1.0));

        let persistence = settings.persistence.abs();
        let amplitude_sum = (0..octave_offsets.len())
            .map(|i| persistence.powi(i as i32))
            .sum::<f32>();

        NoiseGenerator {
            settings: *settings,
            seed,
            octave_offsets,
            amplitude_sum,
            noise,
        }
    }

    pub fn settings(&self) -> &NoiseSettings {
        &self.settings
    }

    pub fn octave_offsets(&self) -> &[Vec2] {
        &self.octave_offsets
    }

    /// Raw fractal sum before post-processing.
    pub fn sample_raw(&self, x: f32, z: f32) -> f32 {
        let mut value = 0.0;
        let mut frequency = 1.0;
        let mut amplitude = 1.0;

        for offset in &self.octave_offsets {
            let sx = (x + offset.x) / self.settings.scale * frequency;
            let sz = (z + offset.y) / self.settings.scale * frequency;
            value += self.noise.get_noise_2d(sx, sz) * amplitude;

            frequency *= self.settings.lacunarity;
            amplitude *= self.settings.persistence;
        }
        value
    }

    pub fn sample(&self, x: f32, z: f32) -> f32 {
        let mut value = self.sample_raw(x, z);

        if self.settings.invert {
            value = -value;
        }
        if self.settings.normalize {
            let sum = if self.amplitude_sum > 0.0 { self.amplitude_sum } else { 1.0 };
            value = ((value / sum + 1.0) * 0.5).clamp(0.0, 1.0);
        }
        if let Some(threshold) = self.settings.cutoff {
            if value < threshold {
                value = 0.0;
            }
        }
        value
    }

    pub fn generate(&self, region: NoiseRegion) -> NoiseField {
        let mut field = NoiseField::filled(region, 0.0);
        if region.is_empty() {
            return field;
        }
        field
            .values
            .par_chunks_mut(region.width)
            .with_min_len(ROW_BATCH)
            .enumerate()
            .for_each(|(z, row)| {
                for (x, value) in row.iter_mut().enumerate() {
                    let p = region.position(x, z);
                    *value = self.sample(p.x, p.y);
                }
            });
        field
    }
}

impl Clone for NoiseGenerator {
    fn clone(&self) -> Self {
        NoiseGenerator::with_octave_offsets(&self.settings, self.seed, self.octave_offsets.clone())
    }
}

/// Base noise with layers composed on top, e.g. macro × detail − erosion.
#[derive(Clone)]
pub struct NoiseStack {
    base: NoiseGenerator,
    layers: Vec<(NoiseOperation, NoiseGenerator)>,
}

impl NoiseStack {
    pub fn new(settings: &NoiseStackSettings, seed: u32) -> Self {
        NoiseStack {
            base: NoiseGenerator::new(&settings.base, seed),
            layers: settings
                .layers
                .iter()
                .map(|layer| (layer.operation, NoiseGenerator::new(&layer.noise, seed)))
                .collect(),
        }
    }

    pub fn sample(&self, x: f32, z: f32) -> f32 {
        self.layers
            .iter()
            .fold(self.base.sample(x, z), |value, (operation, layer)| {
                operation.apply(value, layer.sample(x, z))
            })
    }

    pub fn generate(&self, region: NoiseRegion) -> NoiseField {
        let mut field = self.base.generate(region);
        for (operation, layer) in &self.layers {
            let layer_field = layer.generate(region);
            // Same region on both sides, sizes always match.
            field
                .values
                .par_iter_mut()
                .zip(layer_field.values.par_iter())
                .for_each(|(current, value)| *current = operation.apply(*current, *value));
        }
        field
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> NoiseSettings {
        NoiseSettings {
            scale: 10.0,
            octaves: 3,
            ..NoiseSettings::default()
        }
    }

    #[test]
    fn generate_matches_point_samples() {
        let generator = NoiseGenerator::new(&settings(), 9);
        let region = NoiseRegion::new(Vec2::new(-40.0, 12.0), 33, 17, 0.5);
        let field = generator.generate(region);

        for z in 0..region.depth {
            for x in 0..region.width {
                let p = region.position(x, z);
                assert_eq!(field.get(x, z).to_bits(), generator.sample(p.x, p.y).to_bits());
            }
        }
    }

    #[test]
    fn normalized_values_stay_in_unit_range() {
        let generator = NoiseGenerator::new(&settings(), 3);
        let field = generator.generate(NoiseRegion::square(Vec2::ZERO, 64, 1.0));
        assert!(field.values().iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn invert_flips_raw_noise() {
        let plain = NoiseGenerator::new(
            &NoiseSettings {
                normalize: false,
                ..settings()
            },
            5,
        );
        let inverted = NoiseGenerator::new(
            &NoiseSettings {
                normalize: false,
                invert: true,
                ..settings()
            },
            5,
        );
        for i in 0..20 {
            let x = i as f32 * 3.7;
            assert_eq!(plain.sample(x, -x), -inverted.sample(x, -x));
        }
    }

    #[test]
    fn cutoff_zeroes_low_values() {
        let generator = NoiseGenerator::new(
            &NoiseSettings {
                cutoff: Some(0.5),
                ..settings()
            },
            1,
        );
        let field = generator.generate(NoiseRegion::square(Vec2::ZERO, 32, 1.0));
        assert!(field.values().iter().all(|v| *v == 0.0 || *v >= 0.5));
    }

    #[test]
    fn compose_operations() {
        let region = NoiseRegion::square(Vec2::ZERO, 2, 1.0);
        let mut field = NoiseField::filled(region, 2.0);
        let other = NoiseField::filled(region, 3.0);

        field.compose(&other, NoiseOperation::Add).unwrap();
        assert_eq!(field.values(), &[5.0; 4]);
        field.compose(&other, NoiseOperation::Multiply).unwrap();
        assert_eq!(field.values(), &[15.0; 4]);
        field.compose(&other, NoiseOperation::Subtract).unwrap();
        assert_eq!(field.values(), &[12.0; 4]);
        field.compose(&other, NoiseOperation::Set).unwrap();
        assert_eq!(field.values(), &[3.0; 4]);

        field.apply_scalar(NoiseOperation::Multiply, 0.1);
        field.apply_cutoff(0.31);
        assert_eq!(field.values(), &[0.0; 4]);
    }

    #[test]
    fn compose_rejects_mismatched_fields() {
        let mut field = NoiseField::filled(NoiseRegion::square(Vec2::ZERO, 2, 1.0), 0.0);
        let other = NoiseField::filled(NoiseRegion::square(Vec2::ZERO, 3, 1.0), 0.0);
        assert!(matches!(
            field.compose(&other, NoiseOperation::Add),
            Err(TerrainError::BufferSize { expected: 4, actual: 9, .. })
        ));
    }

    #[test]
    fn stack_generate_matches_stack_sample() {
        let stack = NoiseStack::new(&NoiseStackSettings::terrain_height(), 77);
        let region = NoiseRegion::square(Vec2::new(160.0, -320.0), 24, 2.0);
        let field = stack.generate(region);
        for z in 0..region.depth {
            for x in 0..region.width {
                let p = region.position(x, z);
                assert_eq!(field.get(x, z).to_bits(), stack.sample(p.x, p.y).to_bits());
            }
        }
    }

    #[test]
    fn explicit_offsets_are_used() {
        let offsets = vec![Vec2::new(1.0, 2.0), Vec2::new(3.0, 4.0)];
        let generator = NoiseGenerator::with_octave_offsets(&settings(), 0, offsets.clone());
        assert_eq!(generator.octave_offsets(), offsets.as_slice());
        assert_eq!(generator.clone().sample(5.0, 5.0), generator.sample(5.0, 5.0));
    }
}
