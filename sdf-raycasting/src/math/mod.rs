mod aabb;
mod box8;
mod intersection;
mod ray;

pub use aabb::*;
pub use box8::*;
pub use intersection::*;
pub use ray::*;

use nalgebra_glm::{vec4_to_vec3, Mat4, Vec3, Vec4};

/// Transforms the given position with the given homogenous transformation matrix and returns the
/// transformed position.
///
/// # Arguments
/// * `t` - The 4x4 homogenous transformation matrix.
/// * `p` - The 3D position to transform.
#[inline]
pub fn transform_vec3(t: &Mat4, p: &Vec3) -> Vec3 {
    let p = t * Vec4::new(p[0], p[1], p[2], 1f32);
    vec4_to_vec3(&p) / p[3]
}

/// Transforms the given direction with the given homogenous transformation matrix, i.e., the
/// translational part of the matrix is ignored.
///
/// # Arguments
/// * `t` - The 4x4 homogenous transformation matrix.
/// * `d` - The 3D direction to transform.
#[inline]
pub fn transform_dir(t: &Mat4, d: &Vec3) -> Vec3 {
    vec4_to_vec3(&(t * Vec4::new(d[0], d[1], d[2], 0f32)))
}
