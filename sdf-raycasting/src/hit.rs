use nalgebra_glm::Vec3;

/// The result of intersecting a ray with an intersectable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitInfo {
    /// True if the ray hit the surface.
    pub hit: bool,

    /// The ray parameter of the hit, +inf for a miss.
    pub t: f32,

    /// The unit surface normal at the hit point.
    pub normal: Vec3,

    /// The surface color at the hit point.
    pub albedo: Vec3,

    /// The fraction of light that is mirrored at the surface.
    pub reflectiveness: f32,
}

impl HitInfo {
    /// Returns a "no hit" result.
    #[inline]
    pub fn miss() -> Self {
        Self {
            hit: false,
            t: f32::INFINITY,
            normal: Vec3::new(0f32, 1f32, 0f32),
            albedo: Vec3::new(1f32, 1f32, 1f32),
            reflectiveness: 0f32,
        }
    }

    /// Returns a hit at t with the given normal and default material.
    #[inline]
    pub fn new_hit(t: f32, normal: Vec3) -> Self {
        Self {
            hit: true,
            t,
            normal,
            ..Self::miss()
        }
    }

    /// Returns the result with the smaller ray parameter. On equal parameters `other` wins.
    #[inline]
    pub fn nearer(self, other: Self) -> Self {
        if self.t < other.t {
            self
        } else {
            other
        }
    }
}

impl Default for HitInfo {
    #[inline]
    fn default() -> Self {
        Self::miss()
    }
}
