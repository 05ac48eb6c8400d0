//! Corner-aware height blending and dense heightmap synthesis

use glam::{IVec2, Vec2, Vec3};
use rayon::prelude::*;

use crate::constants::ROW_BATCH;
use crate::core::error::{Result, TerrainError};
use crate::world::noise::{NoiseField, NoiseRegion, NoiseStack};
use crate::world::parcel_heights::ParcelHeights;

/// World distance used for central-difference normals.
const NORMAL_SAMPLE_OFFSET: f32 = 0.5;

#[inline]
fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Height of the terrain surface at any world position.
///
/// Shared by the heightmap and the collider so both describe the same surface.
#[derive(Clone, Copy)]
pub struct TerrainHeightFunction<'a> {
    heights: &'a ParcelHeights,
    noise: Option<&'a NoiseStack>,
    parcel_size: f32,
}

impl<'a> TerrainHeightFunction<'a> {
    pub fn new(heights: &'a ParcelHeights, noise: Option<&'a NoiseStack>, parcel_size: i32) -> Self {
        TerrainHeightFunction {
            heights,
            noise,
            parcel_size: parcel_size as f32,
        }
    }

    pub fn heights(&self) -> &'a ParcelHeights {
        self.heights
    }

    pub fn parcel_size(&self) -> f32 {
        self.parcel_size
    }

    pub fn parcel_of(&self, x: f32, z: f32) -> IVec2 {
        IVec2::new(
            (x / self.parcel_size).floor() as i32,
            (z / self.parcel_size).floor() as i32,
        )
    }

    /// Resolver heights blended across parcel edges, before noise.
    pub fn blended_height(&self, x: f32, z: f32) -> f32 {
        let parcel = self.parcel_of(x, z);
        // Owned and out-of-world parcels are flat.
        let Some(record) = self.heights.record(parcel) else {
            return 0.0;
        };

        let lx = x / self.parcel_size - parcel.x as f32;
        let lz = z / self.parcel_size - parcel.y as f32;
        let base = record.base_height;
        let n = &record.neighbors;
        let h = |neighbor: Option<f32>| neighbor.unwrap_or(0.0);

        let (side_x, tx) = if lx < 0.5 {
            (h(n.left), (0.5 - lx) * 2.0)
        } else {
            (h(n.right), (lx - 0.5) * 2.0)
        };
        let (side_z, tz) = if lz < 0.5 {
            (h(n.down), (0.5 - lz) * 2.0)
        } else {
            (h(n.up), (lz - 0.5) * 2.0)
        };
        let diagonal = match (lx < 0.5, lz < 0.5) {
            (true, true) => h(n.down_left),
            (false, true) => h(n.down_right),
            (true, false) => h(n.up_left),
            (false, false) => h(n.up_right),
        };

        let horizontal = lerp(base, side_x, tx);
        let vertical = lerp(base, side_z, tz);
        let corner = lerp(base, diagonal, tx).min(lerp(base, diagonal, tz));

        corner.max(horizontal).max(vertical).max(base)
    }

    /// Blended height scaled by the height noise, in world units.
    pub fn world_height(&self, x: f32, z: f32) -> f32 {
        let blended = self.blended_height(x, z);
        match self.noise {
            Some(noise) => blended * noise_factor(noise.sample(x, z)),
            None => blended,
        }
    }

    pub fn normal(&self, x: f32, z: f32) -> Vec3 {
        let e = NORMAL_SAMPLE_OFFSET;
        let dx = self.world_height(x - e, z) - self.world_height(x + e, z);
        let dz = self.world_height(x, z - e) - self.world_height(x, z + e);
        Vec3::new(dx, 2.0 * e, dz).normalize()
    }
}

/// Composed stacks can leave the unit range (e.g. after subtracting erosion).
fn noise_factor(value: f32) -> f32 {
    value.clamp(0.0, 1.0)
}

/// Normalized heights of one chunk, row-major with `resolution` vertices per edge.
#[derive(Clone, Debug, PartialEq)]
pub struct HeightField {
    resolution: usize,
    heights: Vec<f32>,
}

impl HeightField {
    pub fn resolution(&self) -> usize {
        self.resolution
    }

    pub fn heights(&self) -> &[f32] {
        &self.heights
    }

    pub fn get(&self, x: usize, z: usize) -> f32 {
        self.heights[z * self.resolution + x]
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.heights)
    }

    pub fn into_heights(self) -> Vec<f32> {
        self.heights
    }
}

pub struct HeightFieldSynthesizer<'a> {
    height_fn: TerrainHeightFunction<'a>,
}

impl<'a> HeightFieldSynthesizer<'a> {
    pub fn new(height_fn: TerrainHeightFunction<'a>) -> Self {
        HeightFieldSynthesizer { height_fn }
    }

    /// Vertex grid of a chunk; the height noise must be generated over this region.
    pub fn region(&self, chunk_min_parcel: IVec2, chunk_parcels: i32, resolution: usize) -> NoiseRegion {
        let size = self.height_fn.parcel_size;
        let step = if resolution > 1 {
            chunk_parcels as f32 * size / (resolution - 1) as f32
        } else {
            0.0
        };
        NoiseRegion::square(chunk_min_parcel.as_vec2() * size, resolution, step)
    }

    pub fn synthesize(
        &self,
        chunk_min_parcel: IVec2,
        chunk_parcels: i32,
        resolution: usize,
        noise_field: Option<&NoiseField>,
        max_height: f32,
    ) -> Result<HeightField> {
        let region = self.region(chunk_min_parcel, chunk_parcels, resolution);
        if let Some(field) = noise_field {
            if field.values().len() != region.len() {
                return Err(TerrainError::BufferSize {
                    what: "height noise field",
                    expected: region.len(),
                    actual: field.values().len(),
                });
            }
        }

        let mut heights = vec![0.0f32; region.len()];
        if max_height > 0.0 && resolution > 0 {
            let scale = 1.0 / max_height;
            heights
                .par_chunks_mut(resolution)
                .with_min_len(ROW_BATCH)
                .enumerate()
                .for_each(|(z, row)| {
                    for (x, value) in row.iter_mut().enumerate() {
                        let p: Vec2 = region.position(x, z);
                        let noise = noise_field.map_or(1.0, |field| noise_factor(field.get(x, z)));
                        *value = self.height_fn.blended_height(p.x, p.y) * noise * scale;
                    }
                });
        }

        Ok(HeightField {
            resolution,
            heights,
        })
    }
}
