// Core module with parcel grid, randomness and errors
pub mod core;

// Render module with frustum culling
pub mod render;

// World module with terrain generation
pub mod world;

// Settings
pub mod utils;

// Other modules
pub mod constants;

// Re-exports
pub use constants::*;
pub use crate::core::{CellRandom, OwnershipSet, Result, TerrainError, WorldBounds};
pub use render::{Aabb, FrustumView, VisibilityCuller, VisibilityRecord, extract_frustum_planes};
pub use utils::settings::{
    DetailLayerSettings, DetailScatterMode, HolePolarity, NoiseOperation, NoiseSettings,
    NoiseStackSettings, TerrainSettings, TreePrototype, TreeRandomization,
};
pub use world::{
    CancellationToken, ChunkTerrain, ColliderBatch, ColliderTracker, ColliderVertex, HeightField,
    HoleMask, MeshBaker, NoiseField, NoiseGenerator, NoiseRegion, NoiseStack,
    ParcelHeightResolver, ParcelHeights, RegionLoader, TerrainContext, TerrainGenerator,
    TerrainHeightFunction, TerrainModel, TreeInstance, VegetationPlacementEngine,
};
