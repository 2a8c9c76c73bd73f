//! # Engine Configuration
//!
//! Every tunable of the engine lives in `EngineConfig`. It is read once at
//! startup from a JSON file and validated before anything touches the GPU.
//!
//! The file is looked up at the path named by `VOXEL_TERRAIN_CONFIG` if that
//! variable is set, and at `voxel_terrain.json` in the working directory
//! otherwise. A missing default file means defaults; a missing file named by
//! the variable is an error. Fields left out of the file keep their defaults.
//!
//! ```json
//! {
//!     "visibility_distance": 3,
//!     "terrain": { "seed": 7, "amplitude": 40.0 }
//! }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{
    error::StartupError,
    voxels::{chunk::active_set::active_chunk_count, density::TerrainSettings},
};

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_VARIABLE: &str = "VOXEL_TERRAIN_CONFIG";
/// Configuration file used when the variable is not set.
pub const DEFAULT_CONFIG_PATH: &str = "voxel_terrain.json";

/// Largest accepted visibility distance. At 8 the active set is already
/// 2601 chunks.
const MAX_VISIBILITY_DISTANCE: u32 = 8;

/// Which backend meshes chunks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MesherBackend {
    /// The compute shader
    #[default]
    Gpu,
    /// Host Marching Cubes on the streaming worker
    Cpu,
}

/// Free-fly camera settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    /// Movement speed in world units per second
    pub speed: f32,
    /// Mouse look multiplier
    pub sensitivity: f32,
    /// Where the camera starts, in world space
    pub start_position: [f32; 3],
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            speed: 24.0,
            sensitivity: 0.4,
            start_position: [16.0, 40.0, 16.0],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Horizontal reach of the active set in chunks
    pub visibility_distance: u32,
    /// Chunk meshes kept between passes; at least the active set size
    pub cache_capacity: usize,
    pub mesher: MesherBackend,
    pub compute_shader_path: PathBuf,
    pub render_shader_path: PathBuf,
    pub terrain: TerrainSettings,
    pub camera: CameraSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            visibility_distance: 2,
            cache_capacity: 256,
            mesher: MesherBackend::default(),
            compute_shader_path: PathBuf::from("assets/shaders/build_mesh.wgsl"),
            render_shader_path: PathBuf::from("assets/shaders/terrain.wgsl"),
            terrain: TerrainSettings::default(),
            camera: CameraSettings::default(),
        }
    }
}

impl EngineConfig {
    /// Loads the configuration from the file named by `VOXEL_TERRAIN_CONFIG`,
    /// or from `voxel_terrain.json` if the variable is not set.
    pub fn load() -> Result<Self, StartupError> {
        match std::env::var_os(CONFIG_PATH_VARIABLE) {
            Some(path) => Self::load_from(Path::new(&path), true),
            None => Self::load_from(Path::new(DEFAULT_CONFIG_PATH), false),
        }
    }

    /// Loads and validates a configuration file.
    ///
    /// # Arguments
    /// * `path` - The file to read
    /// * `required` - Whether a missing file is an error rather than defaults
    pub fn load_from(path: &Path, required: bool) -> Result<Self, StartupError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(error) if !required && error.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No configuration at {}, using defaults", path.display());
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(source) => {
                return Err(StartupError::ConfigRead {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let config: Self =
            serde_json::from_str(&contents).map_err(|source| StartupError::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;

        log::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Checks value ranges that the types alone cannot express.
    pub fn validate(&self) -> Result<(), StartupError> {
        if self.visibility_distance > MAX_VISIBILITY_DISTANCE {
            return Err(StartupError::ConfigValue(format!(
                "visibility_distance {} is above the maximum of {MAX_VISIBILITY_DISTANCE}",
                self.visibility_distance
            )));
        }

        let active = active_chunk_count(self.visibility_distance);
        if self.cache_capacity < active {
            return Err(StartupError::ConfigValue(format!(
                "cache_capacity {} is below the {active} chunks visible at distance {}",
                self.cache_capacity, self.visibility_distance
            )));
        }

        if !(self.terrain.frequency.is_finite() && self.terrain.frequency > 0.0) {
            return Err(StartupError::ConfigValue(format!(
                "terrain.frequency must be positive, got {}",
                self.terrain.frequency
            )));
        }

        if !(self.camera.speed > 0.0 && self.camera.sensitivity > 0.0) {
            return Err(StartupError::ConfigValue(
                "camera.speed and camera.sensitivity must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_config(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "voxel_terrain_{}_{name}.json",
            std::process::id()
        ));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.visibility_distance, 2);
        assert_eq!(config.cache_capacity, 256);
        assert_eq!(config.mesher, MesherBackend::Gpu);
    }

    #[test]
    fn partial_files_keep_defaults() {
        let path = temp_config(
            "partial",
            r#"{ "visibility_distance": 1, "mesher": "cpu", "terrain": { "seed": 7 } }"#,
        );
        let config = EngineConfig::load_from(&path, true).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.visibility_distance, 1);
        assert_eq!(config.mesher, MesherBackend::Cpu);
        assert_eq!(config.terrain.seed, 7);
        assert_eq!(config.terrain.amplitude, TerrainSettings::default().amplitude);
        assert_eq!(config.camera, CameraSettings::default());
    }

    #[test]
    fn missing_files_depend_on_whether_they_were_asked_for() {
        let path = std::env::temp_dir().join("voxel_terrain_does_not_exist.json");
        assert_eq!(
            EngineConfig::load_from(&path, false).unwrap(),
            EngineConfig::default()
        );
        assert!(matches!(
            EngineConfig::load_from(&path, true),
            Err(StartupError::ConfigRead { .. })
        ));
    }

    #[test]
    fn malformed_files_are_parse_errors() {
        let path = temp_config("malformed", r#"{ "visibility_distance": "far" }"#);
        let result = EngineConfig::load_from(&path, true);
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(result, Err(StartupError::ConfigParse { .. })));
    }

    #[test]
    fn cache_must_hold_the_active_set() {
        let config = EngineConfig {
            visibility_distance: 3,
            cache_capacity: active_chunk_count(3) - 1,
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(StartupError::ConfigValue(_))));

        let config = EngineConfig {
            cache_capacity: active_chunk_count(3),
            ..config
        };
        config.validate().unwrap();
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let far = EngineConfig {
            visibility_distance: MAX_VISIBILITY_DISTANCE + 1,
            cache_capacity: usize::MAX,
            ..EngineConfig::default()
        };
        assert!(far.validate().is_err());

        let mut still = EngineConfig::default();
        still.camera.speed = 0.0;
        assert!(still.validate().is_err());

        let mut flat = EngineConfig::default();
        flat.terrain.frequency = f64::NAN;
        assert!(flat.validate().is_err());
    }
}
