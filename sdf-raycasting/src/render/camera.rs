use nalgebra_glm::{self as glm, Mat4, Vec3, Vec4};
use serde::{Deserialize, Serialize};

use crate::math::{transform_dir, Ray};

/// The vertical field of view in radians.
pub const FOV_Y: f32 = std::f32::consts::FRAC_PI_4;

pub const Z_NEAR: f32 = 0.01;
pub const Z_FAR: f32 = 100.0;

/// A pinhole camera looking from its position at the target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub position: Vec3,
    pub target: Vec3,

    #[serde(default = "default_up")]
    pub up: Vec3,
}

fn default_up() -> Vec3 {
    Vec3::new(0f32, 1f32, 0f32)
}

impl Camera {
    /// Creates a new camera with the y-axis as up vector.
    ///
    /// # Arguments
    /// * `position` - The position of the eye.
    /// * `target` - The point the camera looks at.
    pub fn new(position: Vec3, target: Vec3) -> Self {
        Self {
            position,
            target,
            up: default_up(),
        }
    }

    /// Returns the normalized viewing direction.
    #[inline]
    pub fn forward(&self) -> Vec3 {
        (self.target - self.position).normalize()
    }

    #[inline]
    pub fn view_matrix(&self) -> Mat4 {
        glm::look_at(&self.position, &self.target, &self.up)
    }

    /// Returns the perspective projection for the given aspect ratio.
    #[inline]
    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        glm::perspective(aspect, FOV_Y, Z_NEAR, Z_FAR)
    }

    /// Returns the generator for the primary rays of a frame with the given size.
    ///
    /// # Arguments
    /// * `width` - The width of the frame in pixels.
    /// * `height` - The height of the frame in pixels.
    pub fn primary_rays(&self, width: usize, height: usize) -> PrimaryRays {
        let width = width.max(1) as f32;
        let height = height.max(1) as f32;

        PrimaryRays {
            origin: self.position,
            inv_view: glm::inverse(&self.view_matrix()),
            inv_proj: glm::inverse(&self.projection_matrix(width / height)),
            width,
            height,
        }
    }
}

/// Generates the rays through the pixel centers of a frame.
pub struct PrimaryRays {
    origin: Vec3,
    inv_view: Mat4,
    inv_proj: Mat4,
    width: f32,
    height: f32,
}

impl PrimaryRays {
    /// Returns the ray through the center of the given pixel. The direction is normalized and the
    /// parameter range is `[0, Z_FAR]`.
    ///
    /// # Arguments
    /// * `x` - The column of the pixel.
    /// * `y` - The row of the pixel, where 0 is the top row.
    pub fn ray(&self, x: usize, y: usize) -> Ray {
        let ndc_x = (x as f32 + 0.5) / self.width * 2f32 - 1f32;
        let ndc_y = 1f32 - (y as f32 + 0.5) / self.height * 2f32;

        let p = self.inv_proj * Vec4::new(ndc_x, ndc_y, 0f32, 1f32);
        let dir = Vec3::new(p.x, p.y, p.z) / p.w;
        let dir = transform_dir(&self.inv_view, &dir).normalize();

        Ray::new(self.origin, dir, 0f32, Z_FAR)
    }
}
