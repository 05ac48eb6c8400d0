use glam::IVec2;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::constants::*;
use crate::core::error::{Result, TerrainError};
use crate::core::parcel::WorldBounds;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TerrainSettings {
    pub seed: u32,
    pub parcel_size: i32,
    pub world_min: [i32; 2],
    pub world_max: [i32; 2],
    pub chunk_size_parcels: i32,
    /// Divides the ring radius; larger values make unclaimed land rise slower.
    pub height_nerf: f32,
    /// Vertices per chunk edge; defaults to one per world unit plus the closing edge.
    #[serde(default)]
    pub heightmap_resolution: Option<u32>,
    #[serde(default)]
    pub height_noise: Option<NoiseStackSettings>,
    pub tree_cell_size: f32,
    #[serde(default)]
    pub trees: Vec<TreePrototype>,
    #[serde(default)]
    pub texture_layers: Vec<NoiseStackSettings>,
    #[serde(default)]
    pub detail_scatter_mode: DetailScatterMode,
    #[serde(default)]
    pub detail_layers: Vec<DetailLayerSettings>,
    pub detail_distance: f32,
    #[serde(default)]
    pub hole_polarity: HolePolarity,
}

impl Default for TerrainSettings {
    fn default() -> Self {
        Self {
            seed: DEFAULT_WORLD_SEED,
            parcel_size: PARCEL_SIZE,
            world_min: [WORLD_MIN_PARCEL; 2],
            world_max: [WORLD_MAX_PARCEL; 2],
            chunk_size_parcels: CHUNK_SIZE_PARCELS,
            height_nerf: DEFAULT_HEIGHT_NERF,
            heightmap_resolution: None,
            height_noise: Some(NoiseStackSettings::terrain_height()),
            tree_cell_size: DEFAULT_TREE_CELL_SIZE,
            trees: vec![TreePrototype::oak(), TreePrototype::pine()],
            texture_layers: vec![NoiseStackSettings::new(NoiseSettings {
                scale: 30.0,
                octaves: 3,
                seed_offset: 101,
                cutoff: Some(0.55),
                ..NoiseSettings::default()
            })],
            detail_scatter_mode: DetailScatterMode::default(),
            detail_layers: vec![DetailLayerSettings::default()],
            detail_distance: DEFAULT_DETAIL_DISTANCE,
            hole_polarity: HolePolarity::default(),
        }
    }
}

impl TerrainSettings {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let settings: TerrainSettings = toml::from_str(source)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn bounds(&self) -> WorldBounds {
        WorldBounds::new(IVec2::from(self.world_min), IVec2::from(self.world_max))
    }

    pub fn chunk_size_units(&self) -> i32 {
        self.chunk_size_parcels * self.parcel_size
    }

    pub fn heightmap_resolution(&self) -> usize {
        match self.heightmap_resolution {
            Some(resolution) => resolution as usize,
            None => self.chunk_size_units() as usize + 1,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(TerrainError::InvalidSettings(msg));

        // (P + 1)^2 collider vertices must stay addressable by u16 indices.
        if self.parcel_size <= 0 || self.parcel_size > 254 {
            return fail(format!("parcel_size {} outside 1..=254", self.parcel_size));
        }
        if self.chunk_size_parcels <= 0 {
            return fail(format!(
                "chunk_size_parcels must be positive, got {}",
                self.chunk_size_parcels
            ));
        }
        if !(self.height_nerf.is_finite() && self.height_nerf > 0.0) {
            return fail(format!("height_nerf must be positive, got {}", self.height_nerf));
        }
        if let Some(resolution) = self.heightmap_resolution {
            if resolution < 2 {
                return fail(format!("heightmap_resolution must be >= 2, got {resolution}"));
            }
        }
        if !(self.tree_cell_size.is_finite() && self.tree_cell_size > 0.0) {
            return fail(format!(
                "tree_cell_size must be positive, got {}",
                self.tree_cell_size
            ));
        }
        if self.detail_distance < 0.0 {
            warn!(
                detail_distance = self.detail_distance,
                "negative detail distance, every visible chunk will be treated as far"
            );
        }

        if let Some(noise) = &self.height_noise {
            noise.validate("height_noise")?;
        }
        for (i, layer) in self.texture_layers.iter().enumerate() {
            layer.validate(&format!("texture_layers[{i}]"))?;
        }
        for layer in &self.detail_layers {
            layer.noise.validate(&layer.name)?;
        }
        for tree in &self.trees {
            tree.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct NoiseSettings {
    pub scale: f32,
    pub octaves: u32,
    pub persistence: f32,
    pub lacunarity: f32,
    #[serde(default)]
    pub offset: [f32; 2],
    #[serde(default)]
    pub seed_offset: u32,
    #[serde(default)]
    pub invert: bool,
    #[serde(default = "default_true")]
    pub normalize: bool,
    /// Values below the threshold become 0.
    #[serde(default)]
    pub cutoff: Option<f32>,
}

fn default_true() -> bool {
    true
}

impl Default for NoiseSettings {
    fn default() -> Self {
        Self {
            scale: 50.0,
            octaves: 4,
            persistence: 0.5,
            lacunarity: 2.0,
            offset: [0.0, 0.0],
            seed_offset: 0,
            invert: false,
            normalize: true,
            cutoff: None,
        }
    }
}

impl NoiseSettings {
    pub fn validate(&self, name: &str) -> Result<()> {
        if !(self.scale.is_finite() && self.scale > 0.0) {
            return Err(TerrainError::InvalidSettings(format!(
                "{name}: scale must be positive, got {}",
                self.scale
            )));
        }
        if self.octaves == 0 || self.octaves > 16 {
            return Err(TerrainError::InvalidSettings(format!(
                "{name}: octaves {} outside 1..=16",
                self.octaves
            )));
        }
        if !(self.lacunarity.is_finite() && self.lacunarity > 0.0) {
            return Err(TerrainError::InvalidSettings(format!(
                "{name}: lacunarity must be positive, got {}",
                self.lacunarity
            )));
        }
        if !self.persistence.is_finite() {
            return Err(TerrainError::InvalidSettings(format!(
                "{name}: persistence must be finite"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum NoiseOperation {
    Set,
    Add,
    Multiply,
    Subtract,
}

impl NoiseOperation {
    pub fn apply(self, current: f32, value: f32) -> f32 {
        match self {
            NoiseOperation::Set => value,
            NoiseOperation::Add => current + value,
            NoiseOperation::Multiply => current * value,
            NoiseOperation::Subtract => current - value,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct NoiseLayerSettings {
    pub operation: NoiseOperation,
    pub noise: NoiseSettings,
}

/// A base noise plus layers composed on top of it in order.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct NoiseStackSettings {
    pub base: NoiseSettings,
    #[serde(default)]
    pub layers: Vec<NoiseLayerSettings>,
}

impl NoiseStackSettings {
    pub fn new(base: NoiseSettings) -> Self {
        Self {
            base,
            layers: Vec::new(),
        }
    }

    pub fn with_layer(mut self, operation: NoiseOperation, noise: NoiseSettings) -> Self {
        self.layers.push(NoiseLayerSettings { operation, noise });
        self
    }

    /// Macro shape times detail, minus an erosion mask.
    pub fn terrain_height() -> Self {
        Self::new(NoiseSettings {
            scale: 120.0,
            octaves: 3,
            ..NoiseSettings::default()
        })
        .with_layer(
            NoiseOperation::Multiply,
            NoiseSettings {
                scale: 25.0,
                octaves: 4,
                seed_offset: 1,
                ..NoiseSettings::default()
            },
        )
        .with_layer(
            NoiseOperation::Subtract,
            NoiseSettings {
                scale: 60.0,
                octaves: 2,
                seed_offset: 2,
                cutoff: Some(0.8),
                ..NoiseSettings::default()
            },
        )
    }

    pub fn validate(&self, name: &str) -> Result<()> {
        self.base.validate(name)?;
        for layer in &self.layers {
            layer.noise.validate(name)?;
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct TreeRandomization {
    /// Maximum jitter from the density cell centre, in world units.
    pub position_offset: f32,
    pub min_scale_xz: f32,
    pub max_scale_xz: f32,
    pub min_scale_y: f32,
    pub max_scale_y: f32,
    /// Rotation range around Y, in degrees.
    pub min_rotation: f32,
    pub max_rotation: f32,
}

impl Default for TreeRandomization {
    fn default() -> Self {
        Self {
            position_offset: 1.0,
            min_scale_xz: 0.8,
            max_scale_xz: 1.2,
            min_scale_y: 0.8,
            max_scale_y: 1.4,
            min_rotation: 0.0,
            max_rotation: 360.0,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TreePrototype {
    pub name: String,
    /// Canopy radius at scale 1, in world units.
    pub radius: f32,
    #[serde(default)]
    pub randomization: TreeRandomization,
    pub density_noise: NoiseStackSettings,
}

impl TreePrototype {
    pub fn oak() -> Self {
        Self {
            name: "oak".to_string(),
            radius: 3.0,
            randomization: TreeRandomization::default(),
            density_noise: NoiseStackSettings::new(NoiseSettings {
                scale: 12.0,
                octaves: 2,
                seed_offset: 11,
                cutoff: Some(0.62),
                ..NoiseSettings::default()
            }),
        }
    }

    pub fn pine() -> Self {
        Self {
            name: "pine".to_string(),
            radius: 2.0,
            randomization: TreeRandomization {
                position_offset: 0.75,
                min_scale_y: 1.0,
                max_scale_y: 1.8,
                ..TreeRandomization::default()
            },
            density_noise: NoiseStackSettings::new(NoiseSettings {
                scale: 9.0,
                octaves: 2,
                seed_offset: 12,
                cutoff: Some(0.66),
                ..NoiseSettings::default()
            }),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let r = &self.randomization;
        if !(self.radius.is_finite() && self.radius >= 0.0) {
            return Err(TerrainError::InvalidSettings(format!(
                "tree '{}': radius must be non-negative",
                self.name
            )));
        }
        if r.min_scale_xz > r.max_scale_xz || r.min_scale_y > r.max_scale_y {
            return Err(TerrainError::InvalidSettings(format!(
                "tree '{}': min scale exceeds max scale",
                self.name
            )));
        }
        if r.min_scale_xz <= 0.0 || r.min_scale_y <= 0.0 {
            return Err(TerrainError::InvalidSettings(format!(
                "tree '{}': scales must be positive",
                self.name
            )));
        }
        if r.position_offset < 0.0 {
            return Err(TerrainError::InvalidSettings(format!(
                "tree '{}': position_offset must be non-negative",
                self.name
            )));
        }
        self.density_noise.validate(&self.name)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetailScatterMode {
    #[default]
    Coverage,
    InstanceCount,
}

impl DetailScatterMode {
    pub fn max_value(self) -> i32 {
        match self {
            DetailScatterMode::Coverage => MAX_DETAIL_COVERAGE,
            DetailScatterMode::InstanceCount => MAX_DETAIL_INSTANCES,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DetailLayerSettings {
    pub name: String,
    pub noise: NoiseStackSettings,
    /// Zero the layer on owned parcels.
    #[serde(default = "default_true")]
    pub nullify_on_owned: bool,
}

impl Default for DetailLayerSettings {
    fn default() -> Self {
        Self {
            name: "grass".to_string(),
            noise: NoiseStackSettings::new(NoiseSettings {
                scale: 8.0,
                octaves: 2,
                seed_offset: 201,
                ..NoiseSettings::default()
            }),
            nullify_on_owned: true,
        }
    }
}

/// How the consuming backend reads hole mask booleans.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum HolePolarity {
    #[default]
    TrueIsHole,
    TrueIsSurface,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        TerrainSettings::default().validate().unwrap();
        assert_eq!(TerrainSettings::default().heightmap_resolution(), 257);
    }

    #[test]
    fn parses_partial_toml() {
        let settings = TerrainSettings::from_toml_str(
            r#"
            seed = 42
            parcel_size = 16
            world_min = [-10, -10]
            world_max = [10, 10]
            chunk_size_parcels = 4
            height_nerf = 2.0
            tree_cell_size = 1.0
            detail_distance = 150.0
            hole_polarity = "TrueIsSurface"

            [[trees]]
            name = "bush"
            radius = 1.5
            [trees.density_noise.base]
            scale = 5.0
            octaves = 1
            persistence = 0.5
            lacunarity = 2.0
            cutoff = 0.5
            "#,
        )
        .unwrap();

        assert_eq!(settings.seed, 42);
        assert_eq!(settings.bounds().width(), 21);
        assert_eq!(settings.trees.len(), 1);
        assert!(settings.trees[0].density_noise.base.normalize);
        assert_eq!(settings.hole_polarity, HolePolarity::TrueIsSurface);
        assert!(settings.height_noise.is_none());
    }

    #[test]
    fn rejects_zero_nerf() {
        let settings = TerrainSettings {
            height_nerf: 0.0,
            ..TerrainSettings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(TerrainError::InvalidSettings(_))
        ));
    }

    #[test]
    fn rejects_bad_octaves() {
        let mut settings = TerrainSettings::default();
        settings.trees[0].density_noise.base.octaves = 0;
        assert!(settings.validate().is_err());
    }
}
