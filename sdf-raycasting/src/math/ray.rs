use nalgebra_glm::{normalize, Vec3};

/// A ray segment that starts at pos and runs along dir for all parameters in [t_near, t_far].
/// The direction does not need to be normalized.
#[derive(Debug, Clone, Copy)]
pub struct Ray {
    /// The start position of the ray
    pub pos: Vec3,

    /// The direction of the ray.
    pub dir: Vec3,

    /// The lower bound for valid ray parameters.
    pub t_near: f32,

    /// The upper bound for valid ray parameters.
    pub t_far: f32,
}

impl Ray {
    /// Creates a new ray with the given parameter interval.
    ///
    /// # Arguments
    /// * `pos` - The start position of the ray.
    /// * `dir` - The direction of the ray.
    /// * `t_near` - The lower bound for valid ray parameters.
    /// * `t_far` - The upper bound for valid ray parameters.
    pub fn new(pos: Vec3, dir: Vec3, t_near: f32, t_far: f32) -> Self {
        Self {
            pos,
            dir,
            t_near,
            t_far,
        }
    }

    /// Creates a new unbounded ray spanned by the two positions x0 and x1.
    ///
    /// # Arguments
    /// * `x0` - The start position of the ray
    /// * `x1` - The next position along the line of the ray.
    pub fn from_pos(x0: &Vec3, x1: &Vec3) -> Self {
        Self {
            dir: normalize(&(x1 - x0)),
            pos: *x0,
            t_near: 0f32,
            t_far: f32::INFINITY,
        }
    }

    /// Returns the component-wise inverse of the direction. Zero components yield +-infinity.
    #[inline]
    pub fn inv_dir(&self) -> Vec3 {
        Vec3::new(1f32 / self.dir.x, 1f32 / self.dir.y, 1f32 / self.dir.z)
    }

    /// Returns the point on the ray for the given parameter.
    #[inline]
    pub fn at(&self, t: f32) -> Vec3 {
        self.pos + t * self.dir
    }

    /// Returns a copy of the ray with a new parameter interval.
    #[inline]
    pub fn with_range(&self, t_near: f32, t_far: f32) -> Self {
        Self {
            t_near,
            t_far,
            ..*self
        }
    }
}
