//! Culling-related modules
//! Contains frustum extraction and per-chunk visibility tracking.

pub mod culling;
pub mod frustum;

// Re-export commonly used types
pub use culling::{FrustumView, VisibilityCuller, VisibilityRecord};
pub use frustum::{Aabb, extract_frustum_planes};
