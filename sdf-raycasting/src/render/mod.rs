//! A small raytracer that draws any intersectable scene into a frame.

mod camera;
mod frame;

pub use camera::*;
pub use frame::*;

use std::time::Instant;

use nalgebra_glm::{Vec3, Vec4};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{math::Ray, scene::Intersect, HitInfo};

/// The light every surface receives regardless of the light source.
pub const AMBIENT: f32 = 0.1;

/// Secondary rays start this far above the surface to avoid hitting it again.
pub const SURFACE_OFFSET: f32 = 1e-2;

/// The number of nested shading evaluations, i.e., the primary hit plus one reflection.
pub const MAX_RECURSION_DEPTH: u32 = 2;

/// Determines how the color of a hit is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ShadingMode {
    /// The normal mapped from [-1,1] to [0,1].
    Normal,

    /// Diffuse lighting from a point light with optional hard shadows and reflections.
    #[default]
    Lambert,

    /// The plain surface color.
    Color,
}

/// Draws scenes by casting one ray per pixel.
#[derive(Debug, Clone)]
pub struct Renderer {
    pub light_pos: Vec3,
    pub shading: ShadingMode,
    pub enable_shadows: bool,
    pub enable_reflections: bool,
}

impl Default for Renderer {
    fn default() -> Self {
        Self {
            light_pos: Vec3::new(2f32, 2f32, 2f32),
            shading: ShadingMode::default(),
            enable_shadows: true,
            enable_reflections: true,
        }
    }
}

impl Renderer {
    /// Draws the scene into the frame and returns the elapsed time in milliseconds.
    /// A pixel is only overwritten if the new hit is nearer than its stored depth, s.t. several
    /// scenes can be drawn into the same frame.
    ///
    /// # Arguments
    /// * `scene` - The scene to draw.
    /// * `frame` - The frame to draw into.
    /// * `camera` - The camera from which the scene is seen.
    pub fn draw<S: Intersect + Sync>(&self, scene: &S, frame: &mut Frame, camera: &Camera) -> f32 {
        let t0 = Instant::now();

        let width = frame.get_width();
        let height = frame.get_height();
        if width == 0 || height == 0 {
            return 0f32;
        }

        let rays = camera.primary_rays(width, height);
        let (colors, depths) = frame.buffers_mut();

        colors
            .par_chunks_mut(width)
            .zip(depths.par_chunks_mut(width))
            .enumerate()
            .for_each(|(y, (colors, depths))| {
                for (x, (color, depth)) in colors.iter_mut().zip(depths.iter_mut()).enumerate() {
                    let ray = rays.ray(x, y);
                    if let Some((c, t)) = self.shade(scene, &ray, MAX_RECURSION_DEPTH) {
                        write_fragment(color, depth, pack_rgba(&c), t);
                    }
                }
            });

        t0.elapsed().as_secs_f32() * 1e3f32
    }

    /// Returns the color and ray parameter of the nearest hit or None if the ray misses.
    ///
    /// # Arguments
    /// * `scene` - The scene to trace.
    /// * `ray` - The ray to trace.
    /// * `depth` - The remaining number of nested shading evaluations.
    fn shade<S: Intersect>(&self, scene: &S, ray: &Ray, depth: u32) -> Option<(Vec4, f32)> {
        let hit = scene.intersect(ray);
        if !hit.hit {
            return None;
        }

        let color = match self.shading {
            ShadingMode::Normal => {
                let n = (hit.normal + Vec3::new(1f32, 1f32, 1f32)) / 2f32;
                Vec4::new(n.x, n.y, n.z, 1f32)
            }
            ShadingMode::Color => Vec4::new(hit.albedo.x, hit.albedo.y, hit.albedo.z, 1f32),
            ShadingMode::Lambert => {
                let c = self.lambert(scene, ray, &hit, depth);
                Vec4::new(c.x, c.y, c.z, 1f32)
            }
        };

        Some((color, hit.t))
    }

    fn lambert<S: Intersect>(&self, scene: &S, ray: &Ray, hit: &HitInfo, depth: u32) -> Vec3 {
        // back faces are lit like front faces
        let n = if hit.normal.dot(&ray.dir) > 0f32 {
            -hit.normal
        } else {
            hit.normal
        };
        let origin = ray.at(hit.t) + n * SURFACE_OFFSET;

        let to_light = self.light_pos - origin;
        let light_dist = to_light.norm();
        let mut diffuse = if light_dist > 0f32 {
            n.dot(&(to_light / light_dist)).max(0f32)
        } else {
            0f32
        };

        if self.enable_shadows && diffuse > 0f32 {
            let shadow_ray = Ray::new(origin, to_light / light_dist, 0f32, light_dist);
            if scene.intersect(&shadow_ray).hit {
                diffuse = 0f32;
            }
        }

        let mut color = hit.albedo * (AMBIENT + (1f32 - AMBIENT) * diffuse);

        if self.enable_reflections && hit.reflectiveness > 0f32 && depth > 1 {
            let d = ray.dir.normalize();
            let reflected = Ray::new(origin, d - n * (2f32 * d.dot(&n)), 0f32, Z_FAR);
            let mirrored = self
                .shade(scene, &reflected, depth - 1)
                .map(|(c, _)| Vec3::new(c.x, c.y, c.z))
                .unwrap_or_else(Vec3::zeros);

            color = color * (1f32 - hit.reflectiveness) + mirrored * hit.reflectiveness;
        }

        color
    }
}

#[cfg(test)]
mod test {
    use crate::{
        math::AABB,
        scene::{CheckerPlane, Scene},
        spatial::{Builder, BvhOptions},
        Mesh,
    };

    use super::*;

    fn cube() -> Scene {
        Scene::Mesh(
            Builder::new(BvhOptions::default())
                .build(Mesh::new_box(&AABB::new_cube(&Vec3::zeros(), 1.0))),
        )
    }

    fn ground() -> Scene {
        Scene::Plane(CheckerPlane::new(Vec3::new(0.0, 1.0, 0.0), -1.0))
    }

    #[test]
    fn test_draw_normals() {
        let renderer = Renderer {
            shading: ShadingMode::Normal,
            ..Default::default()
        };
        let camera = Camera::new(Vec3::new(0.0, 0.0, 5.0), Vec3::zeros());
        let mut frame = Frame::new_empty(32, 32);

        renderer.draw(&cube(), &mut frame, &camera);

        // the front face points towards the camera
        assert_eq!(unpack_rgba(frame.color(18, 15)), [128, 128, 255, 255]);
        assert!((frame.depth(18, 15) - 4.51).abs() < 1e-2);

        // the corners miss the cube
        assert_eq!(frame.color(0, 0), 0);
        assert_eq!(frame.depth(31, 31), f32::INFINITY);
    }

    #[test]
    fn test_draw_keeps_nearest() {
        let renderer = Renderer {
            shading: ShadingMode::Color,
            ..Default::default()
        };
        let camera = Camera::new(Vec3::new(0.0, 0.0, 5.0), Vec3::zeros());
        let mut frame = Frame::new_empty(16, 16);

        let back = Scene::Plane(CheckerPlane::new(Vec3::new(0.0, 0.0, 1.0), -2.0));

        renderer.draw(&cube(), &mut frame, &camera);
        let cube_depth = frame.depth(9, 7);
        assert!(cube_depth < 5.0);
        renderer.draw(&back, &mut frame, &camera);

        // the cube is in front of the plane
        assert_eq!(frame.depth(9, 7), cube_depth);

        // the plane fills the rest
        assert!(frame.depth(0, 0) > 7.0 && frame.depth(0, 0).is_finite());
        assert_eq!(unpack_rgba(frame.color(0, 0))[3], 255);
    }

    #[test]
    fn test_shadows() {
        let scene = Scene::union(ground(), cube());
        let ray = Ray::new(
            Vec3::new(0.01, -0.6, 0.02),
            Vec3::new(0.0, -1.0, 0.0),
            0.0,
            Z_FAR,
        );

        let mut renderer = Renderer {
            light_pos: Vec3::new(0.0, 5.0, 0.0),
            enable_reflections: false,
            ..Default::default()
        };

        let (lit, t) = renderer.shade(&scene, &ray, MAX_RECURSION_DEPTH).unwrap();
        assert!((t - 0.4).abs() < 1e-5);
        assert!((lit - Vec4::new(0.1, 0.1, 0.1, 1.0)).norm() < 1e-5, "{:?}", lit);

        renderer.enable_shadows = false;
        let (lit, _) = renderer.shade(&scene, &ray, MAX_RECURSION_DEPTH).unwrap();
        assert!(lit.x > 0.99 && lit.x <= 1.0, "{:?}", lit);
    }

    #[test]
    fn test_reflections() {
        let scene = ground();
        let ray = Ray::new(
            Vec3::new(0.3, 1.0, 0.4),
            Vec3::new(1.0, -1.0, 0.0).normalize(),
            0.0,
            Z_FAR,
        );

        let mut renderer = Renderer::default();
        let (reflected, _) = renderer.shade(&scene, &ray, MAX_RECURSION_DEPTH).unwrap();

        renderer.enable_reflections = false;
        let (plain, _) = renderer.shade(&scene, &ray, MAX_RECURSION_DEPTH).unwrap();

        // nothing is mirrored, so the reflection only darkens the plane
        assert!(plain.x > 0.8);
        assert!((reflected.x - plain.x * 0.7).abs() < 1e-5);
        assert_eq!(reflected.w, 1.0);
    }

    #[test]
    fn test_empty_frame() {
        let mut frame = Frame::new_empty(0, 0);
        let camera = Camera::new(Vec3::new(0.0, 0.0, 5.0), Vec3::zeros());
        Renderer::default().draw(&cube(), &mut frame, &camera);
        assert!(frame.get_colors().is_empty());
    }
}
