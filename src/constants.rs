// World constants
pub const PARCEL_SIZE: i32 = 16;
pub const WORLD_MIN_PARCEL: i32 = -150;
pub const WORLD_MAX_PARCEL: i32 = 150;
pub const CHUNK_SIZE_PARCELS: i32 = 16;

// Hole mask samples per parcel edge
pub const HOLE_PIXELS_PER_PARCEL: usize = 16;

// Detail layer scaling (coverage vs instance count scatter)
pub const MAX_DETAIL_COVERAGE: i32 = 255;
pub const MAX_DETAIL_INSTANCES: i32 = 16;

// Default generation parameters
pub const DEFAULT_HEIGHT_NERF: f32 = 10.0;
pub const DEFAULT_WORLD_SEED: u32 = 1;
pub const DEFAULT_DETAIL_DISTANCE: f32 = 200.0;
pub const DEFAULT_TREE_CELL_SIZE: f32 = 2.0;

// Collider tracking
pub const COLLIDER_USE_RADIUS_FACTOR: f32 = 1.0 / 3.0;

// Scheduling
pub const MAX_PENDING_REQUESTS: usize = 256;
pub const ROW_BATCH: usize = 8;
