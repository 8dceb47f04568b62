//! Scene and octree configuration

use serde::{Serialize, Deserialize};

use super::{Config, ConfigError};
use crate::foundation::math::Vec3;
use crate::spatial::BoundingBox;

/// Upper bound on octree subdivision levels
pub const MAX_OCTREE_LEVELS: u32 = 16;

/// # Octree Configuration
///
/// World extent covered by the root octant and the subdivision depth limit.
/// Objects outside the extent are still indexed; they simply live in the
/// root octant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OctreeConfig {
    /// Minimum corner of the root octant
    pub min: [f32; 3],
    /// Maximum corner of the root octant
    pub max: [f32; 3],
    /// Maximum subdivision depth below the root octant
    pub num_levels: u32,
}

impl OctreeConfig {
    /// Create an octree configuration from explicit bounds
    pub fn new(bounds: &BoundingBox, num_levels: u32) -> Self {
        Self {
            min: bounds.min.into(),
            max: bounds.max.into(),
            num_levels,
        }
    }

    /// Cube centred on the origin with the given half extent
    pub fn cube(half_extent: f32, num_levels: u32) -> Self {
        Self {
            min: [-half_extent; 3],
            max: [half_extent; 3],
            num_levels,
        }
    }

    /// Set the number of subdivision levels
    pub fn with_levels(mut self, num_levels: u32) -> Self {
        self.num_levels = num_levels;
        self
    }

    /// Root octant bounds
    pub fn bounds(&self) -> BoundingBox {
        BoundingBox::new(Vec3::from(self.min), Vec3::from(self.max))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_levels == 0 {
            return Err(ConfigError::Invalid("octree needs at least one level".to_string()));
        }
        if self.num_levels > MAX_OCTREE_LEVELS {
            return Err(ConfigError::Invalid(format!(
                "octree levels {} exceed the maximum of {}",
                self.num_levels, MAX_OCTREE_LEVELS
            )));
        }
        if (0..3).any(|axis| self.min[axis] >= self.max[axis]) {
            return Err(ConfigError::Invalid(format!(
                "octree bounds are empty: min {:?} max {:?}",
                self.min, self.max
            )));
        }
        Ok(())
    }
}

impl Default for OctreeConfig {
    fn default() -> Self {
        Self::cube(1000.0, 8)
    }
}

/// # Scene Configuration
///
/// Top-level settings for a [`Scene`](crate::scene::Scene).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneConfig {
    /// Run per-drawable update hooks on the rayon pool
    pub threaded_update: bool,
    /// Default log filter used by [`logging::init_with_level`](crate::foundation::logging::init_with_level)
    pub log_level: String,
    /// Spatial index settings
    pub octree: OctreeConfig,
}

impl SceneConfig {
    /// Create a new scene configuration with defaults
    pub fn new() -> Self {
        Self {
            threaded_update: true,
            log_level: "info".to_string(),
            octree: OctreeConfig::default(),
        }
    }

    /// Set octree configuration
    pub fn with_octree(mut self, octree: OctreeConfig) -> Self {
        self.octree = octree;
        self
    }

    /// Enable or disable the parallel update phase
    pub fn with_threaded_update(mut self, enabled: bool) -> Self {
        self.threaded_update = enabled;
        self
    }

    /// Set log level
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.octree.validate()
    }
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl Config for SceneConfig {}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("scene_octree_{}_{}", std::process::id(), name))
    }

    #[test]
    fn test_default_octree_matches_reference_world() {
        let config = OctreeConfig::default();
        let bounds = config.bounds();

        assert_eq!(bounds.min, Vec3::new(-1000.0, -1000.0, -1000.0));
        assert_eq!(bounds.max, Vec3::new(1000.0, 1000.0, 1000.0));
        assert_eq!(config.num_levels, 8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(OctreeConfig::cube(10.0, 0).validate().is_err());
        assert!(OctreeConfig::cube(10.0, MAX_OCTREE_LEVELS + 1).validate().is_err());
        assert!(OctreeConfig::cube(-10.0, 4).validate().is_err());
    }

    #[test]
    fn test_toml_roundtrip() {
        let path = temp_path("scene.toml");
        let config = SceneConfig::new()
            .with_octree(OctreeConfig::cube(250.0, 6))
            .with_threaded_update(false)
            .with_log_level("debug");

        config.save_to_file(&path).unwrap();
        let loaded = SceneConfig::load_from_file(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_ron_roundtrip() {
        let path = temp_path("scene.ron");
        let config = SceneConfig::new().with_octree(OctreeConfig::cube(64.0, 3));

        config.save_to_file(&path).unwrap();
        let loaded = SceneConfig::load_from_file(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_unsupported_extension() {
        let result = SceneConfig::new().save_to_file(temp_path("scene.yaml"));
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
    }
}
