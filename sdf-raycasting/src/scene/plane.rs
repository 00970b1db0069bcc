use nalgebra_glm::Vec3;

use crate::{math::Ray, HitInfo};

use super::Intersect;

/// The fraction of light mirrored by the plane.
pub const PLANE_REFLECTIVENESS: f32 = 0.3;

/// Ray directions with a smaller dot product with the normal are treated as parallel.
const PARALLEL_EPS: f32 = 1e-8;

/// An infinite plane with a black and white checkerboard of unit cells.
///
/// The plane consists of all points p with `dot(n, p) = offset`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CheckerPlane {
    normal: Vec3,
    offset: f32,

    /// Orthonormal basis of the plane, which spans the checkerboard.
    basis: [Vec3; 2],
}

impl CheckerPlane {
    /// Creates the plane with the given unit normal and offset.
    ///
    /// # Arguments
    /// * `normal` - The unit normal of the plane.
    /// * `offset` - The signed distance of the plane to the origin along the normal.
    pub fn new(normal: Vec3, offset: f32) -> Self {
        Self {
            normal,
            offset,
            basis: Self::basis(&normal),
        }
    }

    /// Computes an orthonormal basis of the plane orthogonal to the given normal.
    fn basis(normal: &Vec3) -> [Vec3; 2] {
        let a = normal.abs();
        let b0 = if a.x > a.y && a.x > a.z {
            Vec3::new(normal.y, -normal.x, 0f32).normalize()
        } else {
            Vec3::new(0f32, normal.z, -normal.y).normalize()
        };
        let b1 = b0.cross(normal).normalize();

        [b0, b1]
    }

    /// Returns the checkerboard color at the given point on the plane.
    ///
    /// # Arguments
    /// * `p` - A point on the plane.
    pub fn albedo(&self, p: &Vec3) -> Vec3 {
        let x = p.dot(&self.basis[0]).ceil() as i64;
        let y = p.dot(&self.basis[1]).ceil() as i64;

        if (x + y).rem_euclid(2) == 0 {
            Vec3::zeros()
        } else {
            Vec3::new(1f32, 1f32, 1f32)
        }
    }
}

impl Intersect for CheckerPlane {
    fn intersect(&self, ray: &Ray) -> HitInfo {
        let divisor = ray.dir.dot(&self.normal);
        if divisor.abs() < PARALLEL_EPS {
            return HitInfo::miss();
        }

        let t = (self.offset - ray.pos.dot(&self.normal)) / divisor;
        if !(t >= ray.t_near && t <= ray.t_far) {
            return HitInfo::miss();
        }

        HitInfo {
            albedo: self.albedo(&ray.at(t)),
            reflectiveness: PLANE_REFLECTIVENESS,
            ..HitInfo::new_hit(t, self.normal)
        }
    }
}
