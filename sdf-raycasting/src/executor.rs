use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use log::{error, info};
use nalgebra_glm::{UVec3, Vec3};

use crate::{
    mesh::load_and_normalize_mesh,
    render::Frame,
    scene::{CheckerPlane, Scene},
    sdf::{build_grid_from_mesh, SdfGrid, SdfOctree},
    spatial::{Builder, Bvh},
    Error, Mesh, RenderConfig, Representation, Result, StatsNode, StatsNodeTrait,
};

/// The ground plane height used when the model bounds are unknown.
const DEFAULT_GROUND_HEIGHT: f32 = -1f32;

/// Renders the configured views of every input file.
pub struct RenderExecutor {
    config: RenderConfig,
    out_dir: PathBuf,
}

impl RenderExecutor {
    /// Creates a new render executor.
    ///
    /// # Arguments
    /// * `config` - The render configuration.
    /// * `out_dir` - The directory into which frames and built structures are written.
    pub fn new(config: RenderConfig, out_dir: PathBuf) -> Self {
        Self { config, out_dir }
    }

    /// Renders all given inputs and returns the number of successfully rendered inputs.
    /// A failing input is logged and skipped.
    ///
    /// # Arguments
    /// * `inputs` - The input files.
    /// * `s` - The stats node to write the timings to.
    pub fn run(&self, inputs: &[PathBuf], s: StatsNode) -> Result<usize> {
        info!("Num Inputs: {}", inputs.len());
        info!("Num Views: {}", self.config.views.len());

        info!("Initialize the render executor...");
        self.initialize().map_err(|err| {
            error!("Failed to initialize the render executor: {:?}", err);
            err
        })?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.num_threads)
            .build()?;

        let mut num_rendered = 0;
        for path in inputs.iter() {
            info!("Processing '{}'...", path.display());

            let rendered = pool.install(|| match self.process_input(path, s.clone()) {
                Ok(()) => true,
                Err(err) => {
                    error!("Failed to process '{}': {:?}", path.display(), err);
                    info!("Skipping input...");
                    false
                }
            });

            if rendered {
                num_rendered += 1;
            }
        }

        Ok(num_rendered)
    }

    /// Loads, builds and renders a single input.
    fn process_input(&self, path: &Path, s: StatsNode) -> Result<()> {
        let name = Self::input_name(path);
        let s = s.get_child(&name);
        let _t = s.register_timing();

        let scene = self.load_scene(path, s.clone())?;

        self.render_views(&scene, &name, s.get_child("render"))
    }

    /// Loads the scene for the given input file. SDF grids, SDF octrees and cached BVHs are used
    /// as they are, any other file is loaded as mesh and converted into the configured
    /// representation.
    ///
    /// # Arguments
    /// * `path` - The input file.
    /// * `s` - The stats node to write the timings to.
    pub fn load_scene(&self, path: &Path, s: StatsNode) -> Result<Scene> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());

        let t = s.get_child("load").register_timing();
        match extension.as_deref() {
            Some("grid") => {
                let mut grid = SdfGrid::load(path)?;
                grid.set_interpolation(self.config.interpolation);

                Ok(self.with_ground(Scene::Grid(grid), DEFAULT_GROUND_HEIGHT))
            }
            Some("octree") => {
                let octree = SdfOctree::load(path)?;
                Ok(self.with_ground(Scene::Octree(octree), DEFAULT_GROUND_HEIGHT))
            }
            Some("bvh") => {
                let bvh = Bvh::load(path)?;
                let ground = Self::ground_height(bvh.mesh());

                Ok(self.with_ground(Scene::Mesh(bvh), ground))
            }
            _ => {
                let mesh = load_and_normalize_mesh(path)?;
                drop(t);

                self.build_scene(mesh, &Self::input_name(path), s)
            }
        }
    }

    /// Builds the configured representation of the mesh.
    ///
    /// # Arguments
    /// * `mesh` - The normalized mesh.
    /// * `name` - The name used for the written structures.
    /// * `s` - The stats node to write the timings to.
    pub fn build_scene(&self, mesh: Mesh, name: &str, s: StatsNode) -> Result<Scene> {
        let ground = Self::ground_height(&mesh);
        let _t = s.get_child("build").register_timing();

        let scene = match self.config.representation {
            Representation::Mesh => {
                let bvh = Builder::new(self.config.bvh).build(mesh);
                if self.config.write_bvh {
                    bvh.save(self.out_dir.join(format!("{}.bvh", name)))?;
                }

                Scene::Mesh(bvh)
            }
            Representation::Grid => Scene::Grid(self.build_grid(&mesh, name)?),
            Representation::Octree => {
                let grid = self.build_grid(&mesh, name)?;
                let octree = SdfOctree::from_grid(&grid, self.config.octree_depth);
                info!("Built octree with {} nodes", octree.nodes().len());

                if self.config.write_grid {
                    octree.save(self.out_dir.join(format!("{}.octree", name)))?;
                }

                Scene::Octree(octree)
            }
        };

        Ok(self.with_ground(scene, ground))
    }

    fn build_grid(&self, mesh: &Mesh, name: &str) -> Result<SdfGrid> {
        let size = self.config.grid_size;
        let mut grid = build_grid_from_mesh(UVec3::new(size, size, size), mesh)?;
        grid.set_interpolation(self.config.interpolation);

        if self.config.write_grid {
            grid.save(self.out_dir.join(format!("{}.grid", name)))?;
        }

        Ok(grid)
    }

    /// Renders every configured view into its own frame file.
    fn render_views(&self, scene: &Scene, name: &str, s: StatsNode) -> Result<()> {
        let renderer = self.config.renderer();
        let mut frame = Frame::new_empty(self.config.frame_width, self.config.frame_height);

        for (view_index, camera) in self.config.views.iter().enumerate() {
            info!(
                "Render view {}/{} of {} ({})...",
                view_index + 1,
                self.config.views.len(),
                name,
                scene.name()
            );

            frame.clear();
            let ms = {
                let _t = s.get_child(&format!("view_{}", view_index)).register_timing();
                renderer.draw(scene, &mut frame, camera)
            };
            info!("Rendered view {} in {:.2} ms", view_index, ms);

            frame.save_ppm(self.out_dir.join(format!("{}_view_{}.ppm", name, view_index)))?;

            if self.config.write_depth {
                let depth_path = self
                    .out_dir
                    .join(format!("{}_view_{}_depth.pgm", name, view_index));
                let mut writer = BufWriter::new(File::create(depth_path)?);
                frame.write_depth_as_pgm(&mut writer)?;
                writer.flush()?;
            }
        }

        Ok(())
    }

    /// Returns the union of the scene and the ground plane if enabled.
    fn with_ground(&self, scene: Scene, height: f32) -> Scene {
        if self.config.ground_plane {
            let plane = CheckerPlane::new(Vec3::new(0f32, 1f32, 0f32), height);
            Scene::union(scene, Scene::Plane(plane))
        } else {
            scene
        }
    }

    /// Returns the lowest y-coordinate of the mesh.
    fn ground_height(mesh: &Mesh) -> f32 {
        let bbox = mesh.bbox();
        if bbox.is_empty() {
            DEFAULT_GROUND_HEIGHT
        } else {
            bbox.min.y
        }
    }

    fn input_name(path: &Path) -> String {
        path.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "input".to_string())
    }

    /// Makes sure the output directory exists.
    fn initialize(&self) -> Result<()> {
        std::fs::create_dir_all(&self.out_dir).map_err(|err| {
            error!("Failed to create the output directory: {:?}", err);

            Error::Io(err)
        })?;

        Ok(())
    }
}
