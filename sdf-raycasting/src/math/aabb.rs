use std::fmt;
use std::fmt::Display;

use nalgebra_glm as glm;
use serde::{Deserialize, Serialize};

use super::Ray;

/// An AABB bounding volume
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AABB {
    /// the corner with the lower coordinates
    pub min: glm::Vec3,
    /// the corner with the upper coordinates
    pub max: glm::Vec3,
}

impl AABB {
    /// Creates a new empty bounding volume, i.e., min is +inf and max is -inf.
    pub fn new() -> Self {
        let min = glm::vec3(f32::INFINITY, f32::INFINITY, f32::INFINITY);
        let max = glm::vec3(f32::NEG_INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY);

        AABB { min, max }
    }

    /// Creates a bounding volume from its two corners.
    ///
    /// # Arguments
    /// * `min` - The corner with the lower coordinates.
    /// * `max` - The corner with the upper coordinates.
    #[inline]
    pub fn from_corners(min: glm::Vec3, max: glm::Vec3) -> Self {
        AABB { min, max }
    }

    /// Returns the cube [-1,1]^3, i.e., the domain of the signed distance fields.
    #[inline]
    pub fn unit() -> Self {
        Self::from_corners(glm::vec3(-1.0, -1.0, -1.0), glm::vec3(1.0, 1.0, 1.0))
    }

    /// Creates a new bounding volume from the given iterator of vec3 positions.
    ///
    /// # Arguments
    /// * `positions` - The iterator of vec3 positions to create the bounding volume from.
    pub fn from_iter<I>(positions: I) -> Self
    where
        I: Iterator<Item = glm::Vec3>,
    {
        let mut result = AABB::new();

        result.extend_iter(positions);

        result
    }

    /// Creates a new cubic bounding volume with the specified center and size.
    ///
    /// # Arguments
    /// * `center` - The center of the AABB bounding volume.
    /// * `size` - The edge length of the cubic bounding volume.
    pub fn new_cube(center: &glm::Vec3, size: f32) -> Self {
        let half_size = size / 2f32;

        let mut result = AABB::new();
        result.min = *center - glm::vec3(half_size, half_size, half_size);
        result.max = *center + glm::vec3(half_size, half_size, half_size);

        result
    }

    /// Returns true if the bbox is empty and false otherwise.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Extends the bounding volume with the given position
    ///
    ///* `p` - The position about which the volume is extended
    pub fn extend_pos(&mut self, p: &glm::Vec3) {
        self.min = glm::min2(&self.min, p);
        self.max = glm::max2(&self.max, p);
    }

    /// Extends the bounding volume with the given position
    ///
    ///* `rhs` - The right-hand-side bounding volume about which the volume is extended
    pub fn extend_bbox(&mut self, rhs: &Self) {
        self.min = glm::min2(&self.min, &rhs.min);
        self.max = glm::max2(&self.max, &rhs.max);
    }

    /// Extends the bounding volume from the given iterator of vec3 positions.
    pub fn extend_iter<I>(&mut self, positions: I)
    where
        I: Iterator<Item = glm::Vec3>,
    {
        positions.for_each(|p| self.extend_pos(&p))
    }

    /// Computes and returns the bounding box center
    #[inline]
    pub fn get_center(&self) -> glm::Vec3 {
        (self.min + self.max) / 2.0
    }

    /// Computes and returns the bounding box size
    #[inline]
    pub fn get_size(&self) -> glm::Vec3 {
        self.max - self.min
    }

    /// Returns the surface area of the box. Empty boxes have a surface area of zero.
    #[inline]
    pub fn surface_area(&self) -> f32 {
        if self.is_empty() {
            return 0f32;
        }

        let d = self.get_size();
        2f32 * (d.x * d.y + d.x * d.z + d.y * d.z)
    }

    /// Returns the i-th of the 8 equally sized octants of the box. The bits of `i` select the
    /// upper half along x (bit 2), y (bit 1) and z (bit 0).
    ///
    /// # Arguments
    /// * `i` - The index of the octant in 0..8.
    pub fn octant(&self, i: usize) -> Self {
        debug_assert!(i < 8);

        let center = self.get_center();
        let mut result = *self;

        for (axis, bit) in [(0, 2), (1, 1), (2, 0)] {
            if (i >> bit) & 1 == 0 {
                result.max[axis] = center[axis];
            } else {
                result.min[axis] = center[axis];
            }
        }

        result
    }

    #[inline]
    pub fn contains_point(&self, p: &glm::Vec3) -> bool {
        self.min[0] <= p[0]
            && p[0] <= self.max[0]
            && self.min[1] <= p[1]
            && p[1] <= self.max[1]
            && self.min[2] <= p[2]
            && p[2] <= self.max[2]
    }

    #[inline]
    pub fn contains_aabb(&self, aabb: &AABB) -> bool {
        self.min[0] <= aabb.min[0]
            && aabb.max[0] <= self.max[0]
            && self.min[1] <= aabb.min[1]
            && aabb.max[1] <= self.max[1]
            && self.min[2] <= aabb.min[2]
            && aabb.max[2] <= self.max[2]
    }

    /// Clips the parameter interval of the given ray against the box using the slab test and
    /// returns the clipped interval `(t_enter, t_exit)` if it is not empty.
    ///
    /// Zero direction components are tolerated, the resulting infinities either clip the whole
    /// interval or leave it untouched. A ray with a zero direction component lying exactly on
    /// one of the box planes of that axis yields NaN and misses the box.
    ///
    /// # Arguments
    /// * `ray` - The ray to clip.
    pub fn ray_interval(&self, ray: &Ray) -> Option<(f32, f32)> {
        if self.is_empty() {
            return None;
        }

        let inv_dir = ray.inv_dir();
        let mut t_enter = ray.t_near;
        let mut t_exit = ray.t_far;

        for axis in 0..3 {
            let t0 = (self.min[axis] - ray.pos[axis]) * inv_dir[axis];
            let t1 = (self.max[axis] - ray.pos[axis]) * inv_dir[axis];

            // 0 * inf on the slab boundary
            if t0.is_nan() || t1.is_nan() {
                return None;
            }

            t_enter = t_enter.max(t0.min(t1));
            t_exit = t_exit.min(t0.max(t1));
        }

        if t_enter <= t_exit {
            Some((t_enter, t_exit))
        } else {
            None
        }
    }
}

impl Default for AABB {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

fn vec3_to_string(f: &mut fmt::Formatter<'_>, v: &glm::Vec3) -> fmt::Result {
    write!(f, "({}, {}, {})", v[0], v[1], v[2])
}

impl Display for AABB {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        vec3_to_string(f, &self.min)?;
        write!(f, "-")?;
        vec3_to_string(f, &self.max)
    }
}
