use thiserror::Error;

/// Errors surfaced by the terrain pipeline.
///
/// Neighbour lookups and height queries never fail; these cover caller mistakes
/// (bad settings, mismatched scratch buffers) and coarse cancellation.
#[derive(Debug, Error)]
pub enum TerrainError {
    #[error("invalid terrain settings: {0}")]
    InvalidSettings(String),

    #[error("buffer size mismatch for {what}: expected {expected}, got {actual}")]
    BufferSize {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("failed to parse terrain settings: {0}")]
    SettingsParse(#[from] toml::de::Error),

    #[error("chunk ({x}, {y}) is outside the terrain")]
    ChunkOutOfBounds { x: i32, y: i32 },

    #[error("generation of chunk ({x}, {y}) was cancelled")]
    Cancelled { x: i32, y: i32 },
}

pub type Result<T> = std::result::Result<T, TerrainError>;
