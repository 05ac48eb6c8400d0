pub mod settings;

pub use settings::TerrainSettings;
