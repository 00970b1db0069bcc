//! Signed distance fields on the domain [-1,1]^3.
//!
//! Two representations are provided: a dense grid with trilinear or cubic B-spline
//! reconstruction and a sparse octree whose nodes store the 8 corner samples of their box.
//! Both are intersected by sphere tracing.

mod bspline;
mod grid;
mod octree;
mod redistance;
mod voxelize;

pub use bspline::*;
pub use grid::*;
pub use octree::*;
pub use redistance::*;
pub use voxelize::*;

use nalgebra_glm::{self as glm, Vec3};

use crate::math::{Ray, AABB};

/// Upper bound for the number of marching steps of a single sphere tracing query.
pub const MAX_MARCH_STEPS: usize = 8192;

/// Marches the ray through the given box by stepping along the distances returned by `sdf`.
/// Returns the ray parameter of the hit together with the last marching position, or `None` if
/// the ray leaves the box or its parameter interval without converging. The returned parameter
/// always lies within the parameter interval of the ray clipped to the box, e.g., a ray starting
/// inside the surface hits at its first marching position.
///
/// The SDF value is treated as a lower bound for the distance to the surface. The direction of
/// the ray may have any non-zero length.
///
/// # Arguments
/// * `ray` - The ray to trace.
/// * `bbox` - The box to which the marching is restricted.
/// * `hit_eps` - SDF values below this threshold are reported as hit.
/// * `sdf` - The signed distance function.
pub fn sphere_trace<F>(ray: &Ray, bbox: &AABB, hit_eps: f32, sdf: F) -> Option<(f32, Vec3)>
where
    F: Fn(&Vec3) -> f32,
{
    let (t_enter, t_exit) = bbox.ray_interval(ray)?;

    let len = ray.dir.norm();
    if !(len > 0f32 && len.is_finite()) {
        return None;
    }

    // march in units of distance along the normalized direction
    let dir = ray.dir / len;
    let s_far = t_exit * len;
    let mut s = t_enter * len;
    let mut point = glm::clamp_vec(&(ray.pos + s * dir), &bbox.min, &bbox.max);

    for _ in 0..MAX_MARCH_STEPS {
        if s > s_far || !bbox.contains_point(&point) {
            return None;
        }

        let d = sdf(&point);
        if d < hit_eps {
            let t = ((s + d) / len).max(t_enter).min(t_exit);
            return Some((t, point));
        }

        s += d;
        point = ray.pos + s * dir;
    }

    None
}
