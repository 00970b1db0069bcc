use std::{
    collections::VecDeque,
    sync::{Mutex, MutexGuard, PoisonError},
};

use log::{debug, info, trace, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    math::{Box8, AABB},
    Error, Mesh, Result,
};

use super::{Bvh, Node, BVH_ARITY};

/// The options for building the BVH.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BvhOptions {
    /// The cost of traversing a node relative to intersecting a triangle.
    pub traverse_cost: f32,

    /// Ranges with at most this many triangles become leaves. Larger ranges are always split.
    /// Must be in `1..=8`.
    pub max_leaf_size: usize,

    /// Ranges with more triangles than this are built in parallel.
    pub parallel_threshold: usize,
}

impl Default for BvhOptions {
    fn default() -> Self {
        Self {
            traverse_cost: 1f32,
            max_leaf_size: BVH_ARITY,
            parallel_threshold: 4096,
        }
    }
}

impl BvhOptions {
    /// Checks that the options can be used for building a BVH.
    pub fn validate(&self) -> Result<()> {
        if !(1..=BVH_ARITY).contains(&self.max_leaf_size) {
            return Err(Error::InvalidConfig(format!(
                "max_leaf_size must be in 1..={}, got {}",
                BVH_ARITY, self.max_leaf_size
            )));
        }

        if !(self.traverse_cost >= 0f32 && self.traverse_cost.is_finite()) {
            return Err(Error::InvalidConfig(format!(
                "traverse_cost must be finite and non-negative, got {}",
                self.traverse_cost
            )));
        }

        Ok(())
    }
}

/// The result of searching a binary split of a triangle range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitResult {
    /// True if the range is split.
    pub divided: bool,

    /// The SAH cost of the best split found.
    pub cost: f32,

    /// The number of triangles in the left part of the split range.
    pub index: usize,
}

/// Builds an 8-ary BVH by greedily splitting triangle ranges with the surface area heuristic.
pub struct Builder {
    options: BvhOptions,
}

/// The state shared by all tasks of a single build.
struct BuildContext<'a> {
    bboxes: &'a [AABB],
    nodes: Mutex<Vec<Node>>,
}

impl<'a> BuildContext<'a> {
    fn lock_nodes(&self) -> MutexGuard<'_, Vec<Node>> {
        self.nodes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the bounding box of the given triangles.
    fn range_bbox(&self, order: &[u32]) -> AABB {
        let mut bbox = AABB::new();
        for t in order.iter() {
            bbox.extend_bbox(&self.bboxes[*t as usize]);
        }

        bbox
    }
}

impl Builder {
    /// Creates a new BVH builder with the provided options. A leaf size outside of `1..=8` is
    /// clamped into that range.
    ///
    /// # Arguments
    /// * `options` - The options for the BVH.
    pub fn new(mut options: BvhOptions) -> Self {
        let max_leaf_size = options.max_leaf_size.clamp(1, BVH_ARITY);
        if max_leaf_size != options.max_leaf_size {
            warn!(
                "Clamped max leaf size {} to {}",
                options.max_leaf_size, max_leaf_size
            );
            options.max_leaf_size = max_leaf_size;
        }

        Self { options }
    }

    /// Builds the BVH for the given mesh. The builder takes ownership of the mesh and reorders
    /// its triangles s.t. every leaf references a contiguous range.
    ///
    /// # Arguments
    /// * `mesh` - The mesh to build the BVH from.
    pub fn build(&self, mut mesh: Mesh) -> Bvh {
        let num_triangles = mesh.num_triangles();
        info!("Build BVH for {} triangles...", num_triangles);

        if num_triangles == 0 {
            return Bvh {
                mesh,
                nodes: vec![Node::Leaf { start: 0, count: 0 }],
            };
        }

        let bboxes: Vec<AABB> = (0..num_triangles)
            .into_par_iter()
            .map(|t| mesh.triangle_bbox(t))
            .collect();
        let mut order: Vec<u32> = (0..num_triangles as u32).collect();

        let ctx = BuildContext {
            bboxes: &bboxes,
            nodes: Mutex::new(vec![Node::Leaf { start: 0, count: 0 }]),
        };

        self.build_node(&ctx, 0, 0, &mut order);

        let nodes = ctx.nodes.into_inner().unwrap_or_else(PoisonError::into_inner);

        let indices = order.iter().map(|t| mesh.indices[*t as usize]).collect();
        mesh.indices = indices;

        let bvh = Bvh { mesh, nodes };
        info!(
            "Build BVH for {} triangles...DONE, {} nodes",
            num_triangles,
            bvh.nodes.len()
        );
        debug!(
            "BVH memory usage: {:.2} MiB",
            bvh.memory_usage() as f64 / (1024f64 * 1024f64)
        );

        bvh
    }

    /// Builds the subtree of the given node for the given triangles.
    ///
    /// # Arguments
    /// * `ctx` - The state shared by all tasks of the build.
    /// * `node_index` - The index of the already allocated node.
    /// * `start` - The position of the first triangle of `order` within the final order.
    /// * `order` - The triangles of the node, which will be reordered.
    fn build_node(&self, ctx: &BuildContext, node_index: usize, start: usize, order: &mut [u32]) {
        let count = order.len();
        if count <= 1 || count <= self.options.max_leaf_size {
            ctx.lock_nodes()[node_index] = Node::Leaf {
                start: start as u32,
                count: count as u32,
            };
            return;
        }

        let dividers = self.partition(ctx.bboxes, order);

        // the boundaries of the child ranges
        let mut bounds = Vec::with_capacity(dividers.len() + 2);
        bounds.push(0);
        bounds.extend(dividers.iter().copied());
        bounds.push(count);

        let real_count = bounds.len() - 1;
        let mut boxes = Box8::empty();
        for (i, range) in bounds.windows(2).enumerate() {
            boxes.set(i, &ctx.range_bbox(&order[range[0]..range[1]]));
        }

        let offset = {
            let mut nodes = ctx.lock_nodes();
            let offset = nodes.len();
            nodes.resize(offset + real_count, Node::Leaf { start: 0, count: 0 });
            nodes[node_index] = Node::Internal {
                boxes,
                offset: offset as u32,
                real_count: real_count as u32,
            };

            offset
        };

        trace!(
            "Node {} with {} triangles has {} children at {}",
            node_index,
            count,
            real_count,
            offset
        );

        let mut children = Vec::with_capacity(real_count);
        let mut rest = order;
        for (i, range) in bounds.windows(2).enumerate() {
            let (child, tail) = std::mem::take(&mut rest).split_at_mut(range[1] - range[0]);
            children.push((offset + i, start + range[0], child));
            rest = tail;
        }

        if count > self.options.parallel_threshold {
            children
                .into_par_iter()
                .for_each(|(index, start, child)| self.build_node(ctx, index, start, child));
        } else {
            for (index, start, child) in children {
                self.build_node(ctx, index, start, child);
            }
        }
    }

    /// Splits the given range greedily into at most 8 parts by repeated binary splits. Returns
    /// the sorted positions of the dividers.
    ///
    /// # Arguments
    /// * `bboxes` - The bounding boxes of all triangles.
    /// * `order` - The triangles of the range, which will be reordered.
    fn partition(&self, bboxes: &[AABB], order: &mut [u32]) -> Vec<usize> {
        let mut dividers = Vec::with_capacity(BVH_ARITY - 1);
        let mut queue = VecDeque::with_capacity(BVH_ARITY);
        queue.push_back((0, order.len()));

        while dividers.len() < BVH_ARITY - 1 {
            let Some((lo, hi)) = queue.pop_front() else {
                break;
            };

            // the node must not become a leaf
            let forced = dividers.is_empty();

            let split = self.try_divide(bboxes, &mut order[lo..hi], forced);
            if split.divided {
                let mid = lo + split.index;
                dividers.push(mid);
                queue.push_back((lo, mid));
                queue.push_back((mid, hi));
            }
        }

        dividers.sort_unstable();
        dividers
    }

    /// Searches the binary split of the given range with the lowest SAH cost. All 3 axes are
    /// tried by sorting the triangles along the upper corner of their bounding boxes. If the range
    /// is divided, the triangles are reordered along the chosen axis.
    ///
    /// # Arguments
    /// * `bboxes` - The bounding boxes of all triangles.
    /// * `order` - The triangles of the range.
    /// * `forced` - If true, the range is divided even if no split beats the no-split cost.
    pub fn try_divide(&self, bboxes: &[AABB], order: &mut [u32], forced: bool) -> SplitResult {
        let n = order.len();
        let no_split = SplitResult {
            divided: false,
            cost: n as f32,
            index: 0,
        };
        if n < 2 {
            return no_split;
        }

        let mut parent = AABB::new();
        order
            .iter()
            .for_each(|t| parent.extend_bbox(&bboxes[*t as usize]));
        let parent_area = parent.surface_area();

        let mut best_cost = f32::INFINITY;
        let mut best_index = n / 2;
        let mut best_order: Option<Vec<u32>> = None;

        let mut right_areas = vec![0f32; n];
        for axis in 0..3 {
            let mut sorted = order.to_vec();
            sorted.sort_by(|a, b| {
                bboxes[*a as usize].max[axis].total_cmp(&bboxes[*b as usize].max[axis])
            });

            // right_areas[i] is the area of the triangles i..n
            let mut right = AABB::new();
            for i in (1..n).rev() {
                right.extend_bbox(&bboxes[sorted[i] as usize]);
                right_areas[i] = right.surface_area();
            }

            let mut left = AABB::new();
            let mut improved = false;
            for i in 1..n {
                left.extend_bbox(&bboxes[sorted[i - 1] as usize]);

                let cost = self.options.traverse_cost
                    + left.surface_area() / parent_area * i as f32
                    + right_areas[i] / parent_area * (n - i) as f32;

                if cost < best_cost {
                    best_cost = cost;
                    best_index = i;
                    improved = true;
                }
            }

            if improved {
                best_order = Some(sorted);
            }
        }

        if best_cost < n as f32 || forced {
            // without any gain, e.g. for coincident or degenerate boxes, split at the median
            if !(best_cost < n as f32) {
                best_index = n / 2;
            }

            if let Some(sorted) = best_order {
                order.copy_from_slice(&sorted);
            }

            SplitResult {
                divided: true,
                cost: best_cost,
                index: best_index,
            }
        } else {
            SplitResult {
                cost: best_cost,
                ..no_split
            }
        }
    }
}
