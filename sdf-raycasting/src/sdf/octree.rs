use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
};

use log::{debug, info};
use nalgebra_glm::Vec3;

use crate::{
    math::{sort8, Box8, Ray, AABB},
    scene::Intersect,
    Error, HitInfo, Result,
};

use super::{
    grid::{read_f32, read_u32},
    sphere_trace, SdfGrid,
};

/// SDF values below this threshold are reported as hit.
pub const OCTREE_HIT_EPS: f32 = 1e-4;

/// Leaves whose corner values all exceed this threshold are definitely away from the surface.
pub const EMPTY_NODE_THRESHOLD: f32 = 10f32;

/// The size of a single node record in the binary format.
const NODE_RECORD_SIZE: usize = 9 * 4;

/// Local coordinates within a leaf are kept this far away from the faces.
const LOCAL_COORD_EPS: f32 = 1e-7;

/// A node of the octree with the SDF values at the 8 corners of its box.
///
/// The corner and child order is given by the bits of the index, i.e., bit 2 selects the upper
/// half in x, bit 1 in y and bit 0 in z.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OctreeNode {
    pub values: [f32; 8],

    /// The index of the first of the 8 consecutive children, or `None` for a leaf.
    pub children: Option<u32>,
}

impl OctreeNode {
    #[inline]
    pub fn new_leaf(values: [f32; 8]) -> Self {
        Self {
            values,
            children: None,
        }
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    /// Returns true if the node cannot contain any surface, i.e., all corner magnitudes are far
    /// away or the corners were never populated.
    pub fn is_empty(&self) -> bool {
        self.values.iter().all(|v| v.abs() > EMPTY_NODE_THRESHOLD)
            || self.values.iter().all(|v| *v == 0f32)
    }

    /// Returns the trilinear interpolation and its gradient w.r.t. the local coordinates.
    ///
    /// # Arguments
    /// * `u` - The local coordinates within the node in [0,1]^3.
    fn eval(&self, u: &Vec3) -> (f32, Vec3) {
        let mut value = 0f32;
        let mut gradient = Vec3::zeros();

        for (i, v) in self.values.iter().enumerate() {
            // weight and its derivative per axis
            let (wx, dx) = if i & 4 == 0 { (1f32 - u.x, -1f32) } else { (u.x, 1f32) };
            let (wy, dy) = if i & 2 == 0 { (1f32 - u.y, -1f32) } else { (u.y, 1f32) };
            let (wz, dz) = if i & 1 == 0 { (1f32 - u.z, -1f32) } else { (u.z, 1f32) };

            value += wx * wy * wz * v;
            gradient += Vec3::new(dx * wy * wz, wx * dy * wz, wx * wy * dz) * *v;
        }

        (value, gradient)
    }
}

/// A sparse octree over [-1,1]^3 storing the SDF at the corners of every node. Node 0 is the
/// root and the 8 children of a node are stored consecutively behind their parent.
#[derive(Debug, Clone, PartialEq)]
pub struct SdfOctree {
    nodes: Vec<OctreeNode>,
}

impl SdfOctree {
    /// Creates a new octree from the given nodes and checks the structure, i.e., every node has
    /// either no or 8 children stored behind itself.
    ///
    /// # Arguments
    /// * `nodes` - The nodes with the root at index 0.
    pub fn new(nodes: Vec<OctreeNode>) -> Result<Self> {
        if nodes.is_empty() {
            return Err(Error::CorruptData("Octree without root node".to_string()));
        }

        for (index, node) in nodes.iter().enumerate() {
            if let Some(offset) = node.children {
                let offset = offset as usize;
                if offset <= index || offset + 8 > nodes.len() {
                    return Err(Error::CorruptData(format!(
                        "Node {} has invalid children offset {} for {} nodes",
                        index,
                        offset,
                        nodes.len()
                    )));
                }
            }
        }

        Ok(Self { nodes })
    }

    /// Builds the octree by sampling the given SDF. Nodes are only subdivided if the surface may
    /// pass through their box, i.e., if the absolute SDF value at the center does not exceed the
    /// distance to the corners.
    ///
    /// # Arguments
    /// * `max_depth` - The maximal depth of the leaves. The root has depth 0.
    /// * `sdf` - The signed distance function defined on [-1,1]^3.
    pub fn build<F>(max_depth: u32, sdf: F) -> Self
    where
        F: Fn(&Vec3) -> f32,
    {
        info!("Build SDF octree with max depth {}...", max_depth);

        let root_box = AABB::unit();
        let mut nodes = vec![Self::sample_node(&root_box, &sdf)];
        Self::subdivide(&mut nodes, 0, &root_box, 0, max_depth, &sdf);

        let num_leaves = nodes.iter().filter(|n| n.is_leaf()).count();
        info!(
            "Build SDF octree with max depth {}...DONE, {} nodes, {} leaves",
            max_depth,
            nodes.len(),
            num_leaves
        );

        Self { nodes }
    }

    /// Builds the octree from the given grid.
    ///
    /// # Arguments
    /// * `grid` - The grid to sample with its configured interpolation.
    /// * `max_depth` - The maximal depth of the leaves.
    pub fn from_grid(grid: &SdfGrid, max_depth: u32) -> Self {
        Self::build(max_depth, |p| grid.sample(p))
    }

    fn sample_node<F>(bbox: &AABB, sdf: &F) -> OctreeNode
    where
        F: Fn(&Vec3) -> f32,
    {
        let mut values = [0f32; 8];
        for (i, v) in values.iter_mut().enumerate() {
            let corner = Vec3::new(
                if i & 4 == 0 { bbox.min.x } else { bbox.max.x },
                if i & 2 == 0 { bbox.min.y } else { bbox.max.y },
                if i & 1 == 0 { bbox.min.z } else { bbox.max.z },
            );
            *v = sdf(&corner);
        }

        OctreeNode::new_leaf(values)
    }

    fn subdivide<F>(
        nodes: &mut Vec<OctreeNode>,
        index: usize,
        bbox: &AABB,
        depth: u32,
        max_depth: u32,
        sdf: &F,
    ) where
        F: Fn(&Vec3) -> f32,
    {
        if depth >= max_depth {
            return;
        }

        let half_diagonal = bbox.get_size().norm() * 0.5f32;
        if sdf(&bbox.get_center()).abs() > half_diagonal {
            return;
        }

        let offset = nodes.len();
        nodes[index].children = Some(offset as u32);
        for i in 0..8 {
            nodes.push(Self::sample_node(&bbox.octant(i), sdf));
        }

        for i in 0..8 {
            Self::subdivide(nodes, offset + i, &bbox.octant(i), depth + 1, max_depth, sdf);
        }
    }

    #[inline]
    pub fn nodes(&self) -> &[OctreeNode] {
        &self.nodes
    }

    /// Returns the SDF value and the unit normal of the given leaf at the given point.
    ///
    /// # Arguments
    /// * `node` - The leaf node.
    /// * `bbox` - The box of the leaf node.
    /// * `point` - The point at which the SDF is evaluated.
    fn leaf_eval(node: &OctreeNode, bbox: &AABB, point: &Vec3) -> (f32, Vec3) {
        let size = bbox.get_size();
        let u = (point - bbox.min)
            .component_div(&size)
            .map(|c| c.clamp(LOCAL_COORD_EPS, 1f32 - LOCAL_COORD_EPS));

        let (value, gradient) = node.eval(&u);

        // chain rule from local to world coordinates
        let gradient = gradient.component_div(&size);
        let len = gradient.norm();
        let normal = if len > 0f32 && len.is_finite() {
            gradient / len
        } else {
            Vec3::new(0f32, 1f32, 0f32)
        };

        (value, normal)
    }

    fn intersect_leaf(node: &OctreeNode, bbox: &AABB, ray: &Ray) -> HitInfo {
        if node.is_empty() || node.values.iter().all(|v| *v >= OCTREE_HIT_EPS) {
            return HitInfo::miss();
        }

        match sphere_trace(ray, bbox, OCTREE_HIT_EPS, |p| {
            Self::leaf_eval(node, bbox, p).0
        }) {
            Some((t, point)) => HitInfo::new_hit(t, Self::leaf_eval(node, bbox, &point).1),
            None => HitInfo::miss(),
        }
    }

    fn intersect_node(&self, index: usize, bbox: &AABB, ray: &Ray, inv_dir: &Vec3) -> HitInfo {
        let node = &self.nodes[index];
        let offset = match node.children {
            None => return Self::intersect_leaf(node, bbox, ray),
            Some(offset) => offset as usize,
        };

        let boxes = Box8::from_octants(bbox);
        let mut ts = boxes.intersect(ray, inv_dir);
        let mut children = [0, 1, 2, 3, 4, 5, 6, 7];
        sort8(&mut ts, &mut children);

        for (t, child) in ts.iter().zip(children.iter()) {
            if !t.is_finite() {
                break;
            }

            let hit = self.intersect_node(offset + child, &bbox.octant(*child), ray, inv_dir);
            if hit.hit {
                return hit;
            }
        }

        HitInfo::miss()
    }

    /// Loads the octree from the given file.
    ///
    /// # Arguments
    /// * `path` - The path of the octree file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        let octree = Self::read_from(reader)?;

        info!(
            "Loaded octree {:?} with {} nodes",
            path.as_ref(),
            octree.nodes.len()
        );

        Ok(octree)
    }

    /// Saves the octree to the given file.
    ///
    /// # Arguments
    /// * `path` - The path of the octree file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write(&mut writer)?;
        writer.flush()?;

        Ok(())
    }

    /// Reads the octree from its binary representation, i.e., the little-endian node count as
    /// u32 followed by the node records. Every record consists of the 8 corner values as f32 and
    /// the children offset as u32, where 0 marks a leaf.
    ///
    /// # Arguments
    /// * `reader` - The reader to read the octree from.
    pub fn read_from<R: Read>(mut reader: R) -> Result<Self> {
        let mut header = [0u8; 4];
        reader.read_exact(&mut header).map_err(|err| match err.kind() {
            std::io::ErrorKind::UnexpectedEof => {
                Error::CorruptData("Octree header is truncated".to_string())
            }
            _ => Error::Io(err),
        })?;
        let num_nodes = read_u32(&header) as usize;

        let mut payload = Vec::new();
        reader.read_to_end(&mut payload)?;

        if Some(payload.len()) != num_nodes.checked_mul(NODE_RECORD_SIZE) {
            return Err(Error::CorruptData(format!(
                "Octree with {} nodes requires {} bytes, got {}",
                num_nodes,
                num_nodes.saturating_mul(NODE_RECORD_SIZE),
                payload.len()
            )));
        }

        let nodes = payload
            .chunks_exact(NODE_RECORD_SIZE)
            .map(|record| {
                let mut values = [0f32; 8];
                for (i, v) in values.iter_mut().enumerate() {
                    *v = read_f32(&record[i * 4..]);
                }

                let offset = read_u32(&record[32..]);
                OctreeNode {
                    values,
                    children: if offset == 0 { None } else { Some(offset) },
                }
            })
            .collect();

        debug!("Read octree with {} nodes", num_nodes);

        Self::new(nodes)
    }

    /// Writes the binary representation of the octree.
    ///
    /// # Arguments
    /// * `writer` - The writer to write the octree to.
    pub fn write<W: Write>(&self, mut writer: W) -> Result<()> {
        writer.write_all(&(self.nodes.len() as u32).to_le_bytes())?;

        for node in self.nodes.iter() {
            for v in node.values.iter() {
                writer.write_all(&v.to_le_bytes())?;
            }

            writer.write_all(&node.children.unwrap_or(0).to_le_bytes())?;
        }

        Ok(())
    }
}

impl Intersect for SdfOctree {
    fn intersect(&self, ray: &Ray) -> HitInfo {
        self.intersect_node(0, &AABB::unit(), ray, &ray.inv_dir())
    }
}

#[cfg(test)]
mod test {
    use rand::{Rng, SeedableRng};

    use super::*;

    fn sphere(p: &Vec3) -> f32 {
        p.norm() - 0.5
    }

    #[test]
    fn test_leaf_eval() {
        let mut values = [0f32; 8];
        for (i, v) in values.iter_mut().enumerate() {
            // linear function x + 2y - z at the corners of the unit cube
            *v = ((i >> 2) & 1) as f32 + 2.0 * ((i >> 1) & 1) as f32 - (i & 1) as f32;
        }
        let node = OctreeNode::new_leaf(values);

        let bbox = AABB::from_corners(Vec3::zeros(), Vec3::new(1.0, 1.0, 1.0));
        let p = Vec3::new(0.25, 0.5, 0.75);
        let (value, normal) = SdfOctree::leaf_eval(&node, &bbox, &p);

        assert!((value - (0.25 + 1.0 - 0.75)).abs() < 1e-6);
        assert!((normal - Vec3::new(1.0, 2.0, -1.0).normalize()).norm() < 1e-5);
    }

    #[test]
    fn test_empty_leaves() {
        assert!(OctreeNode::new_leaf([11.0; 8]).is_empty());
        assert!(OctreeNode::new_leaf([0.0; 8]).is_empty());
        assert!(OctreeNode::new_leaf([-11.0; 8]).is_empty());
        assert!(!OctreeNode::new_leaf([11.0, 11.0, 11.0, 11.0, 11.0, 11.0, 11.0, 9.0]).is_empty());
        assert!(!OctreeNode::new_leaf([0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.1]).is_empty());
    }

    #[test]
    fn test_build_structure() {
        let octree = SdfOctree::build(4, sphere);
        let nodes = octree.nodes();

        assert!(nodes.len() > 1);
        assert_eq!((nodes.len() - 1) % 8, 0);
        assert!(SdfOctree::new(nodes.to_vec()).is_ok());

        // the root is always subdivided for a surface through the domain
        assert_eq!(nodes[0].children, Some(1));
    }

    #[test]
    fn test_build_depth_zero() {
        let octree = SdfOctree::build(0, sphere);
        assert_eq!(octree.nodes().len(), 1);
        assert!(octree.nodes()[0].is_leaf());
    }

    #[test]
    fn test_intersect_sphere() {
        let octree = SdfOctree::build(6, sphere);

        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(10);
        for _ in 0..100 {
            let origin = Vec3::new(
                rng.random_range(-1f32..1f32),
                rng.random_range(-1f32..1f32),
                rng.random_range(-1f32..1f32),
            )
            .normalize()
                * rng.random_range(1.5f32..4f32);
            let target = Vec3::new(
                rng.random_range(-0.25f32..0.25f32),
                rng.random_range(-0.25f32..0.25f32),
                rng.random_range(-0.25f32..0.25f32),
            );
            let ray = Ray::from_pos(&origin, &target);

            // analytic ray sphere intersection with normalized direction
            let b = ray.pos.dot(&ray.dir);
            let c = ray.pos.dot(&ray.pos) - 0.25;
            let expected = -b - (b * b - c).sqrt();

            let hit = octree.intersect(&ray);
            assert!(hit.hit);
            assert!(
                (hit.t - expected).abs() < 1e-2,
                "t={}, expected={}",
                hit.t,
                expected
            );
            assert!(hit.normal.dot(&ray.at(expected).normalize()) > 0.95);
        }

        let ray = Ray::from_pos(&Vec3::new(-3.0, 0.8, 0.0), &Vec3::new(0.0, 0.8, 0.0));
        assert!(!octree.intersect(&ray).hit);
    }

    #[test]
    fn test_from_grid() {
        let grid = SdfGrid::from_fn(nalgebra_glm::UVec3::new(33, 33, 33), sphere).unwrap();
        let octree = SdfOctree::from_grid(&grid, 5);

        // off the octant boundary planes, which are touched but never entered
        let ray = Ray::new(
            Vec3::new(0.01, 0.02, -3.0),
            Vec3::new(0.0, 0.0, 1.0),
            0.0,
            f32::INFINITY,
        );
        let hit = octree.intersect(&ray);
        assert!(hit.hit);
        assert!((hit.t - (3.0 - (0.25f32 - 0.0005).sqrt())).abs() < 1e-2);
        assert!(hit.normal.z < -0.99);
    }

    #[test]
    fn test_file_round_trip() {
        let octree = SdfOctree::build(3, sphere);

        let mut buffer = Vec::new();
        octree.write(&mut buffer).unwrap();
        assert_eq!(buffer.len(), 4 + octree.nodes().len() * NODE_RECORD_SIZE);

        let octree2 = SdfOctree::read_from(&buffer[..]).unwrap();
        assert_eq!(octree, octree2);
    }

    #[test]
    fn test_read_corrupt_data() {
        assert!(matches!(
            SdfOctree::read_from(&[1u8, 0][..]),
            Err(Error::CorruptData(_))
        ));

        // no nodes
        assert!(matches!(
            SdfOctree::read_from(&0u32.to_le_bytes()[..]),
            Err(Error::CorruptData(_))
        ));

        let octree = SdfOctree::build(2, sphere);
        let mut buffer = Vec::new();
        octree.write(&mut buffer).unwrap();

        // truncated node record
        assert!(matches!(
            SdfOctree::read_from(&buffer[..buffer.len() - 1]),
            Err(Error::CorruptData(_))
        ));

        // children offset out of range
        let mut corrupt = buffer.clone();
        corrupt[4 + 32..4 + 36].copy_from_slice(&(octree.nodes().len() as u32).to_le_bytes());
        assert!(matches!(
            SdfOctree::read_from(&corrupt[..]),
            Err(Error::CorruptData(_))
        ));

        // cyclic reference back to the root
        let mut corrupt = buffer.clone();
        let last = 4 + (octree.nodes().len() - 1) * NODE_RECORD_SIZE;
        corrupt[last + 32..last + 36].copy_from_slice(&1u32.to_le_bytes());
        assert!(matches!(
            SdfOctree::read_from(&corrupt[..]),
            Err(Error::CorruptData(_))
        ));
    }
}
