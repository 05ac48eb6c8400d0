//! Texture splat weights and detail (grass) density layers

use glam::IVec2;
use rayon::prelude::*;

use crate::core::error::{Result, TerrainError};
use crate::core::parcel::OwnershipSet;
use crate::utils::settings::DetailScatterMode;
use crate::world::noise::NoiseField;

/// Per-pixel texture weights, `layers` values per pixel.
///
/// Layer 0 is the implicit base layer filling whatever the noise layers leave uncovered.
#[derive(Clone, Debug, PartialEq)]
pub struct SplatMap {
    width: usize,
    depth: usize,
    layers: usize,
    weights: Vec<f32>,
}

impl SplatMap {
    pub fn from_layers(layers: &[NoiseField]) -> Result<Self> {
        let Some(first) = layers.first() else {
            return Err(TerrainError::InvalidSettings(
                "splat map needs at least one texture layer".to_string(),
            ));
        };
        let region = *first.region();
        if let Some(layer) = layers.iter().find(|l| l.values().len() != region.len()) {
            return Err(TerrainError::BufferSize {
                what: "texture layer",
                expected: region.len(),
                actual: layer.values().len(),
            });
        }

        let stride = layers.len() + 1;
        let mut weights = vec![0.0f32; region.len() * stride];
        weights.par_chunks_mut(stride).enumerate().for_each(|(i, pixel)| {
            let sum: f32 = layers.iter().map(|l| l.values()[i]).sum();
            let base = (1.0 - sum).max(0.0);
            let total = sum + base;

            pixel[0] = base / total;
            for (weight, layer) in pixel[1..].iter_mut().zip(layers) {
                *weight = layer.values()[i] / total;
            }
        });

        Ok(SplatMap {
            width: region.width,
            depth: region.depth,
            layers: stride,
            weights,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Layer count including the base layer.
    pub fn layer_count(&self) -> usize {
        self.layers
    }

    pub fn weight(&self, x: usize, z: usize, layer: usize) -> f32 {
        self.weights[(z * self.width + x) * self.layers + layer]
    }

    pub fn pixel(&self, x: usize, z: usize) -> &[f32] {
        let start = (z * self.width + x) * self.layers;
        &self.weights[start..start + self.layers]
    }
}

/// Integer density per detail pixel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DetailLayer {
    width: usize,
    depth: usize,
    values: Vec<i32>,
}

impl DetailLayer {
    /// Scales noise to the scatter mode's range. With `owned`, pixels over owned parcels are zeroed.
    pub fn from_noise(
        field: &NoiseField,
        mode: DetailScatterMode,
        owned: Option<&OwnershipSet>,
        parcel_size: i32,
    ) -> Self {
        let region = *field.region();
        let max = mode.max_value() as f32;
        let mut values = vec![0i32; region.len()];

        if region.width > 0 {
            values
                .par_chunks_mut(region.width)
                .enumerate()
                .for_each(|(z, row)| {
                    for (x, value) in row.iter_mut().enumerate() {
                        if let Some(ownership) = owned {
                            let p = region.position(x, z) / parcel_size as f32;
                            if ownership.is_owned(IVec2::new(p.x.floor() as i32, p.y.floor() as i32)) {
                                continue;
                            }
                        }
                        *value = (field.get(x, z) * max).floor() as i32;
                    }
                });
        }

        DetailLayer {
            width: region.width,
            depth: region.depth,
            values,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn get(&self, x: usize, z: usize) -> i32 {
        self.values[z * self.width + x]
    }

    pub fn values(&self) -> &[i32] {
        &self.values
    }
}
