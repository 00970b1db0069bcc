use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
};

use log::info;

use nalgebra_glm::Vec3;
use serde::{Deserialize, Serialize};

use crate::{
    math::{sort8, triangle_normal, triangle_ray, Box8, Ray},
    scene::Intersect,
    Error, HitInfo, Mesh, Result,
};

/// The maximal number of children of an internal node.
pub const BVH_ARITY: usize = 8;

/// A node of the 8-ary bounding volume hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Node {
    /// A leaf referencing the triangles `start..start + count` of the reordered mesh.
    Leaf { start: u32, count: u32 },

    /// An internal node whose `real_count` children are stored at `offset..offset + real_count`.
    /// Lanes of unused children hold empty boxes.
    Internal {
        boxes: Box8,
        offset: u32,
        real_count: u32,
    },
}

/// Bounding Volume Hierarchy over the triangles of a mesh. The triangles of the mesh are
/// ordered s.t. every leaf references a contiguous range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bvh {
    /// The mesh with reordered triangles.
    pub(crate) mesh: Mesh,

    /// The nodes of the BVH with the root at index 0.
    pub(crate) nodes: Vec<Node>,
}

impl Bvh {
    /// Returns the mesh with the triangles in leaf order.
    #[inline]
    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    /// Returns the nodes of the BVH. The first node is the root node.
    #[inline]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Returns the number of bytes allocated for nodes, vertices and triangles.
    pub fn memory_usage(&self) -> usize {
        self.nodes.capacity() * std::mem::size_of::<Node>()
            + self.mesh.vertices.capacity() * std::mem::size_of::<Vec3>()
            + self.mesh.indices.capacity() * std::mem::size_of::<crate::mesh::Triangle>()
    }

    /// Loads a BVH cached with [`Bvh::save`].
    ///
    /// # Arguments
    /// * `path` - The path of the BVH file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bvh = Self::read_from(BufReader::new(File::open(path.as_ref())?))?;

        info!(
            "Loaded BVH {:?} with {} nodes and {} triangles",
            path.as_ref(),
            bvh.nodes.len(),
            bvh.mesh.num_triangles()
        );

        Ok(bvh)
    }

    /// Saves the BVH to the given file.
    ///
    /// # Arguments
    /// * `path` - The path of the BVH file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write(&mut writer)?;
        writer.flush()?;

        Ok(())
    }

    /// Writes the BVH to the given writer.
    ///
    /// # Arguments
    /// * `writer` - The writer to write the BVH to.
    pub fn write<W: Write>(&self, writer: W) -> Result<()> {
        bincode::serialize_into(writer, self).map_err(|e| Error::SerializationError(Box::new(e)))
    }

    /// Reads the BVH from the given reader.
    ///
    /// # Arguments
    /// * `reader` - The reader to read the BVH from.
    pub fn read_from<R: Read>(reader: R) -> Result<Self> {
        let bvh: Self = bincode::deserialize_from(reader)
            .map_err(|e| Error::DeserializationError(Box::new(e)))?;
        bvh.validate()?;

        Ok(bvh)
    }

    /// Checks that all node references and triangle ranges are within bounds.
    fn validate(&self) -> Result<()> {
        if !self.mesh.is_valid() {
            return Err(Error::CorruptData("BVH mesh has invalid indices".to_string()));
        }

        let num_nodes = self.nodes.len();
        let num_triangles = self.mesh.num_triangles();
        if num_nodes == 0 {
            return Err(Error::CorruptData("BVH without root node".to_string()));
        }

        for (index, node) in self.nodes.iter().enumerate() {
            let valid = match *node {
                Node::Leaf { start, count } => {
                    start as usize + count as usize <= num_triangles
                }
                Node::Internal {
                    offset, real_count, ..
                } => {
                    offset as usize > index
                        && (1..=BVH_ARITY as u32).contains(&real_count)
                        && offset as usize + real_count as usize <= num_nodes
                }
            };

            if !valid {
                return Err(Error::CorruptData(format!("BVH node {} is invalid", index)));
            }
        }

        Ok(())
    }

    fn intersect_node(&self, index: usize, ray: &Ray, inv_dir: &Vec3, best: &mut HitInfo) {
        match &self.nodes[index] {
            Node::Leaf { start, count } => {
                let start = *start as usize;
                for triangle in start..(start + *count as usize) {
                    let [p0, p1, p2] = self.mesh.triangle_positions(triangle);

                    let limited = ray.with_range(ray.t_near, best.t.min(ray.t_far));
                    if let Some(t) = triangle_ray(&p0, &p1, &p2, &limited) {
                        if t < best.t {
                            *best = HitInfo::new_hit(t, triangle_normal(&p0, &p1, &p2));
                        }
                    }
                }
            }
            Node::Internal {
                boxes,
                offset,
                real_count,
            } => {
                let mut ts = boxes.intersect(ray, inv_dir);
                let mut children = [0, 1, 2, 3, 4, 5, 6, 7];
                sort8(&mut ts, &mut children);

                for (t, child) in ts.iter().zip(children.iter()) {
                    // the entries are sorted, so all remaining children are farther away
                    if !(*t < best.t) {
                        break;
                    }

                    if *child < *real_count as usize {
                        self.intersect_node(*offset as usize + child, ray, inv_dir, best);
                    }
                }
            }
        }
    }
}

impl Intersect for Bvh {
    fn intersect(&self, ray: &Ray) -> HitInfo {
        let mut best = HitInfo::miss();
        self.intersect_node(0, ray, &ray.inv_dir(), &mut best);

        best
    }
}

#[cfg(test)]
mod test {
    use crate::{math::AABB, spatial::Builder, spatial::BvhOptions};

    use super::*;

    #[test]
    fn test_intersect_box() {
        let mesh = Mesh::new_box(&AABB::new_cube(&Vec3::zeros(), 2.0));
        let bvh = Builder::new(BvhOptions::default()).build(mesh);

        let ray = Ray::new(
            Vec3::new(0.1, 0.2, -5.0),
            Vec3::new(0.0, 0.0, 1.0),
            0.0,
            f32::INFINITY,
        );
        let hit = bvh.intersect(&ray);
        assert!(hit.hit);
        assert!((hit.t - 4.0).abs() < 1e-6);
        assert!((hit.normal - Vec3::new(0.0, 0.0, -1.0)).norm() < 1e-6);

        // limited range
        let hit = bvh.intersect(&ray.with_range(0.0, 3.0));
        assert!(!hit.hit);

        // starting inside hits the back side
        let hit = bvh.intersect(&ray.with_range(4.5, f32::INFINITY));
        assert!(hit.hit);
        assert!((hit.t - 6.0).abs() < 1e-6);
    }

    #[test]
    fn test_read_and_write() {
        let mesh = Mesh::new_box(&AABB::unit());
        let bvh = Builder::new(BvhOptions::default()).build(mesh);

        let mut buffer = Vec::new();
        bvh.write(&mut buffer).unwrap();
        let bvh2 = Bvh::read_from(&buffer[..]).unwrap();

        assert_eq!(bvh.nodes(), bvh2.nodes());
        assert_eq!(bvh.mesh().indices, bvh2.mesh().indices);
        assert_eq!(bvh.mesh().vertices, bvh2.mesh().vertices);
    }

    #[test]
    fn test_read_invalid_nodes() {
        let bvh = Bvh {
            mesh: Mesh::new_box(&AABB::unit()),
            nodes: vec![Node::Leaf { start: 4, count: 9 }],
        };

        let mut buffer = Vec::new();
        bvh.write(&mut buffer).unwrap();
        assert!(matches!(
            Bvh::read_from(&buffer[..]),
            Err(Error::CorruptData(_))
        ));
    }
}
