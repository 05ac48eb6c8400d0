//! Core data structures shared by every generation stage
//! Contains the parcel grid, deterministic randomness and the error type.

pub mod error;
pub mod parcel;
pub mod random;

// Re-export commonly used types
pub use error::{Result, TerrainError};
pub use parcel::{NEIGHBOR_OFFSETS, OwnershipSet, WorldBounds};
pub use random::CellRandom;
