mod io;
mod io_utils;

pub use io::*;

use crate::math::AABB;
use log::debug;
use nalgebra_glm::{TVec3, Vec3};
use serde::{Deserialize, Serialize};

/// The vertex indices of a single triangle.
pub type Triangle = TVec3<u32>;

/// A simple tessellated mesh.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Mesh {
    pub vertices: Vec<Vec3>,
    pub indices: Vec<Triangle>,
}

impl Mesh {
    /// Returns `true` if all indices are valid and false otherwise.
    pub fn is_valid(&self) -> bool {
        let num_vertices = self.vertices.len() as u32;

        self.indices
            .iter()
            .all(|t| t.x < num_vertices && t.y < num_vertices && t.z < num_vertices)
    }

    /// Returns the number of triangles of the mesh.
    #[inline]
    pub fn num_triangles(&self) -> usize {
        self.indices.len()
    }

    /// Returns the three vertex positions of the given triangle.
    ///
    /// # Arguments
    /// * `triangle` - The index of the triangle.
    #[inline]
    pub fn triangle_positions(&self, triangle: usize) -> [Vec3; 3] {
        let t = &self.indices[triangle];

        [
            self.vertices[t[0] as usize],
            self.vertices[t[1] as usize],
            self.vertices[t[2] as usize],
        ]
    }

    /// Returns the bounding box of the given triangle.
    #[inline]
    pub fn triangle_bbox(&self, triangle: usize) -> AABB {
        AABB::from_iter(self.triangle_positions(triangle).into_iter())
    }

    /// Returns the bounding box of all vertices.
    pub fn bbox(&self) -> AABB {
        AABB::from_iter(self.vertices.iter().copied())
    }

    /// Moves the mesh to the center of its bounding box and scales it, s.t. the bounding box
    /// fits into the unit sphere and therefore into [-1,1]^3.
    pub fn normalize_to_unit_sphere(&mut self) {
        let bbox = self.bbox();
        if bbox.is_empty() {
            return;
        }

        let center = bbox.get_center();
        let scale = (bbox.max - center).norm();
        let scale = if scale > 0f32 { scale } else { 1f32 };

        debug!(
            "Normalize mesh with bbox {} by center {:?} and scale {}",
            bbox, center, scale
        );

        self.vertices
            .iter_mut()
            .for_each(|v| *v = (*v - center) / scale);
    }

    /// Creates a closed box mesh with outward facing, counter-clockwise oriented triangles.
    ///
    /// # Arguments
    /// * `aabb` - The box to tessellate.
    pub fn new_box(aabb: &AABB) -> Self {
        let vertices = (0..8)
            .map(|i| {
                Vec3::new(
                    if i & 1 == 0 { aabb.min.x } else { aabb.max.x },
                    if i & 2 == 0 { aabb.min.y } else { aabb.max.y },
                    if i & 4 == 0 { aabb.min.z } else { aabb.max.z },
                )
            })
            .collect();

        let quads: [[u32; 4]; 6] = [
            [0, 4, 6, 2], // -x
            [1, 3, 7, 5], // +x
            [0, 1, 5, 4], // -y
            [2, 6, 7, 3], // +y
            [0, 2, 3, 1], // -z
            [4, 5, 7, 6], // +z
        ];

        let indices = quads
            .iter()
            .flat_map(|q| {
                [
                    Triangle::new(q[0], q[1], q[2]),
                    Triangle::new(q[0], q[2], q[3]),
                ]
            })
            .collect();

        Self { vertices, indices }
    }
}
