//! Terrain generation modules
//! Contains noise, parcel heights, heightfields, holes, colliders, trees and the pipeline.

pub mod collider;
pub mod generator;
pub mod height;
pub mod holes;
pub mod loader;
pub mod model;
pub mod noise;
pub mod parcel_heights;
pub mod splat;
pub mod trees;

// Re-export commonly used types
pub use collider::{ColliderBatch, ColliderTracker, ColliderVertex, MeshBaker, index_buffer};
pub use generator::{CancellationToken, ChunkTerrain, TerrainContext, TerrainGenerator};
pub use height::{HeightField, HeightFieldSynthesizer, TerrainHeightFunction};
pub use holes::HoleMask;
pub use loader::{ChunkResult, RegionLoader};
pub use model::{ChunkModel, TerrainModel};
pub use noise::{NoiseField, NoiseGenerator, NoiseRegion, NoiseStack};
pub use parcel_heights::{EmptyParcelRecord, ParcelHeightResolver, ParcelHeights};
pub use splat::{DetailLayer, SplatMap};
pub use trees::{TreeGrid, TreeInstance, TreeLayout, VegetationPlacementEngine};
