use log::error;
use nalgebra_glm::Vec3;
use serde::{Deserialize, Serialize};

use crate::{
    render::{Camera, Renderer, ShadingMode},
    sdf::Interpolation,
    spatial::BvhOptions,
    Error, Result,
};

/// The structure that is built from a mesh input and then rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub enum Representation {
    /// The triangles indexed by a BVH.
    #[default]
    Mesh,

    /// A dense SDF grid computed by voxelization and redistancing.
    Grid,

    /// A sparse SDF octree sampled from the SDF grid.
    Octree,
}

/// The configuration of a render run.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RenderConfig {
    /// The input files. Can be an expression like `*.glb`.
    /// Files ending with `.grid` and `.octree` are loaded as SDFs, everything else as mesh.
    pub input: String,

    /// The structure built from mesh inputs.
    #[serde(default)]
    pub representation: Representation,

    /// The number of lattice points along every axis of a grid built from a mesh.
    #[serde(default = "default_grid_size")]
    pub grid_size: u32,

    /// The maximal depth of an octree built from a mesh.
    #[serde(default = "default_octree_depth")]
    pub octree_depth: u32,

    /// The sampling mode of SDF grids.
    #[serde(default)]
    pub interpolation: Interpolation,

    /// Should a checkerboard plane be placed below the model.
    #[serde(default = "default_true")]
    pub ground_plane: bool,

    #[serde(default)]
    pub shading: ShadingMode,

    #[serde(default = "default_true")]
    pub enable_shadows: bool,

    #[serde(default = "default_true")]
    pub enable_reflections: bool,

    #[serde(default = "default_light_pos")]
    pub light_pos: Vec3,

    pub frame_width: usize,
    pub frame_height: usize,

    /// The number of threads to use
    pub num_threads: usize,

    /// The cameras to render the scene from.
    pub views: Vec<Camera>,

    /// Should the SDF grid built from a mesh be saved next to the frames.
    #[serde(default)]
    pub write_grid: bool,

    /// Should the BVH built from a mesh be saved next to the frames.
    #[serde(default)]
    pub write_bvh: bool,

    /// Should the depth buffer be saved next to every frame.
    #[serde(default)]
    pub write_depth: bool,

    #[serde(default)]
    pub bvh: BvhOptions,
}

fn default_grid_size() -> u32 {
    64
}

fn default_octree_depth() -> u32 {
    6
}

fn default_true() -> bool {
    true
}

fn default_light_pos() -> Vec3 {
    Vec3::new(2f32, 2f32, 2f32)
}

impl RenderConfig {
    /// Reads the configuration from the provided reader.
    ///
    /// # Arguments
    /// * `reader` - The reader to read the configuration from.
    pub fn read<R: std::io::Read>(reader: R) -> Result<Self> {
        let config: RenderConfig = serde_yaml::from_reader(reader).map_err(|e| {
            error!("Failed to parse the configuration: {:?}", e);

            Error::DeserializationError(Box::new(e))
        })?;

        config.bvh.validate().map_err(|e| {
            error!("Invalid BVH options: {}", e);
            e
        })?;

        Ok(config)
    }

    /// Writes the configuration to the provided writer.
    ///
    /// # Arguments
    /// * `writer` - The writer to write the configuration to.
    pub fn write<W: std::io::Write>(&self, mut writer: W) -> Result<()> {
        let yaml = serde_yaml::to_string(&self).map_err(|e| {
            error!("Failed to serialize the configuration: {:?}", e);

            Error::SerializationError(Box::new(e))
        })?;

        writer.write_all(yaml.as_bytes())?;

        Ok(())
    }

    /// Returns the renderer set up with the configured shading.
    pub fn renderer(&self) -> Renderer {
        Renderer {
            light_pos: self.light_pos,
            shading: self.shading,
            enable_shadows: self.enable_shadows,
            enable_reflections: self.enable_reflections,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_loading_config() {
        let simple_config_data = include_bytes!("../../configs/simple.yaml");
        let config = RenderConfig::read(&simple_config_data[..]).unwrap();

        assert_eq!(config.input, "test_data/*.obj");
        assert_eq!(config.representation, Representation::Grid);
        assert_eq!(config.grid_size, 64);
        assert_eq!(config.octree_depth, 6);
        assert_eq!(config.interpolation, Interpolation::CubicBSpline);
        assert!(config.ground_plane);
        assert_eq!(config.shading, ShadingMode::Lambert);
        assert!(config.enable_shadows);
        assert!(!config.enable_reflections);
        assert_eq!(config.light_pos, Vec3::new(2.0, 2.0, 2.0));
        assert_eq!(config.frame_width, 640);
        assert_eq!(config.frame_height, 480);
        assert_eq!(config.num_threads, 4);
        assert!(config.write_grid);
        assert!(!config.write_depth);
        assert!(!config.write_bvh);
        assert_eq!(config.bvh.max_leaf_size, 8);

        assert_eq!(config.views.len(), 2);
        assert_eq!(config.views[0].position, Vec3::new(0.0, 0.5, 3.0));
        assert_eq!(config.views[0].target, Vec3::zeros());
        assert_eq!(config.views[0].up, Vec3::new(0.0, 1.0, 0.0));
        assert_eq!(config.views[1].up, Vec3::new(0.0, 0.0, 1.0));

        let renderer = config.renderer();
        assert!(!renderer.enable_reflections);
        assert_eq!(renderer.shading, ShadingMode::Lambert);
    }

    #[test]
    fn test_write_and_read_config() {
        let simple_config_data = include_bytes!("../../configs/simple.yaml");
        let config = RenderConfig::read(&simple_config_data[..]).unwrap();

        let mut buffer = Vec::new();
        config.write(&mut buffer).unwrap();
        let config2 = RenderConfig::read(&buffer[..]).unwrap();

        assert_eq!(config2.input, config.input);
        assert_eq!(config2.views, config.views);
        assert_eq!(config2.bvh, config.bvh);
        assert_eq!(config2.representation, config.representation);
    }

    #[test]
    fn test_invalid_config() {
        let result = RenderConfig::read("input: [".as_bytes());
        assert!(matches!(result, Err(Error::DeserializationError(_))));
    }

    #[test]
    fn test_invalid_leaf_size() {
        let simple_config_data = include_bytes!("../../configs/simple.yaml");
        let mut config = RenderConfig::read(&simple_config_data[..]).unwrap();

        for max_leaf_size in [0, 9] {
            config.bvh.max_leaf_size = max_leaf_size;
            let mut buffer = Vec::new();
            config.write(&mut buffer).unwrap();

            let result = RenderConfig::read(&buffer[..]);
            assert!(matches!(result, Err(Error::InvalidConfig(_))));
        }
    }
}
