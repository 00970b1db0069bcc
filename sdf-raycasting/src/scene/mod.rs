//! The geometry representations behind a uniform ray intersection interface.

mod plane;

pub use plane::*;

use crate::{
    math::Ray,
    sdf::{SdfGrid, SdfOctree},
    spatial::Bvh,
    HitInfo,
};

/// Anything a ray can be intersected with.
pub trait Intersect {
    /// Returns the nearest hit of the ray within its parameter interval `[t_near, t_far]`.
    ///
    /// # Arguments
    /// * `ray` - The ray to intersect. Its direction does not need to be normalized.
    fn intersect(&self, ray: &Ray) -> HitInfo;
}

/// A scene composed of the supported geometry representations.
#[derive(Debug, Clone)]
pub enum Scene {
    Mesh(Bvh),
    Grid(SdfGrid),
    Octree(SdfOctree),
    Plane(CheckerPlane),

    /// The union of two scenes, which reports the nearer of both hits.
    Union(Box<Scene>, Box<Scene>),
}

impl Scene {
    /// Returns the union of both scenes.
    pub fn union(first: Scene, second: Scene) -> Self {
        Self::Union(Box::new(first), Box::new(second))
    }

    /// Returns a short name of the representation for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Mesh(_) => "mesh",
            Self::Grid(_) => "grid",
            Self::Octree(_) => "octree",
            Self::Plane(_) => "plane",
            Self::Union(..) => "union",
        }
    }
}

impl Intersect for Scene {
    fn intersect(&self, ray: &Ray) -> HitInfo {
        match self {
            Self::Mesh(bvh) => bvh.intersect(ray),
            Self::Grid(grid) => grid.intersect(ray),
            Self::Octree(octree) => octree.intersect(ray),
            Self::Plane(plane) => plane.intersect(ray),
            Self::Union(first, second) => first.intersect(ray).nearer(second.intersect(ray)),
        }
    }
}

#[cfg(test)]
mod test {
    use nalgebra_glm::{UVec3, Vec3};
    use rand::{Rng, SeedableRng};

    use crate::{
        math::AABB,
        spatial::{Builder, BvhOptions},
        Mesh,
    };

    use super::*;

    fn random_ray(rng: &mut impl Rng) -> Ray {
        let origin = Vec3::new(
            rng.random_range(-1f32..1f32),
            rng.random_range(-1f32..1f32),
            rng.random_range(-1f32..1f32),
        )
        .normalize()
            * 4f32;
        let target = Vec3::new(
            rng.random_range(-1.5f32..1.5f32),
            rng.random_range(-1.5f32..1.5f32),
            rng.random_range(-1.5f32..1.5f32),
        );

        Ray::from_pos(&origin, &target)
    }

    #[test]
    fn test_union_returns_nearer_hit() {
        let plane = CheckerPlane::new(Vec3::new(0.0, 1.0, 0.0), -1.0);
        let cube = Builder::new(BvhOptions::default())
            .build(Mesh::new_box(&AABB::new_cube(&Vec3::zeros(), 1.0)));

        let union = Scene::union(Scene::Plane(plane), Scene::Mesh(cube.clone()));
        assert_eq!(union.name(), "union");

        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(17);
        let mut num_plane = 0;
        let mut num_cube = 0;
        for _ in 0..50 {
            let ray = random_ray(&mut rng);

            let a = plane.intersect(&ray);
            let b = cube.intersect(&ray);
            let hit = union.intersect(&ray);

            if a.hit || b.hit {
                assert!(hit.hit);
                assert_eq!(hit.t, a.t.min(b.t));
            } else {
                assert!(!hit.hit);
            }

            if hit.hit && hit == a {
                num_plane += 1;
            } else if hit.hit {
                num_cube += 1;
            }
        }

        assert!(num_plane > 0);
        assert!(num_cube > 0);
    }

    #[test]
    fn test_union_ties_prefer_second() {
        let first = CheckerPlane::new(Vec3::new(0.0, 1.0, 0.0), 0.0);
        let second = CheckerPlane::new(Vec3::new(0.0, -1.0, 0.0), 0.0);
        let union = Scene::union(Scene::Plane(first), Scene::Plane(second));

        let ray = Ray::new(
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(0.0, -1.0, 0.0),
            0.0,
            f32::INFINITY,
        );
        let hit = union.intersect(&ray);
        assert_eq!(hit.t, 1.0);
        assert_eq!(hit.normal, Vec3::new(0.0, -1.0, 0.0));
    }

    #[test]
    fn test_grid_and_octree_scenes() {
        let grid = SdfGrid::from_fn(UVec3::new(32, 32, 32), |p| p.norm() - 0.5).unwrap();
        let octree = SdfOctree::from_grid(&grid, 5);

        let ray = Ray::new(
            Vec3::new(0.01, 3.0, 0.02),
            Vec3::new(0.0, -1.0, 0.0),
            0.0,
            f32::INFINITY,
        );

        for scene in [Scene::Grid(grid), Scene::Octree(octree)] {
            let hit = scene.intersect(&ray);
            assert!(hit.hit, "{}", scene.name());
            assert!((hit.t - 2.5).abs() < 2e-2, "{}: t={}", scene.name(), hit.t);
        }
    }
}
