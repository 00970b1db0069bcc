use nalgebra_glm::Vec3;
use serde::{Deserialize, Serialize};

use super::{Ray, AABB};

/// Eight bounding boxes in struct-of-arrays layout, s.t. a ray can be tested against all of them
/// in one pass over 8 lanes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Box8 {
    pub min_x: [f32; 8],
    pub min_y: [f32; 8],
    pub min_z: [f32; 8],
    pub max_x: [f32; 8],
    pub max_y: [f32; 8],
    pub max_z: [f32; 8],
}

impl Box8 {
    /// Creates 8 empty boxes.
    pub fn empty() -> Self {
        Self {
            min_x: [f32::INFINITY; 8],
            min_y: [f32::INFINITY; 8],
            min_z: [f32::INFINITY; 8],
            max_x: [f32::NEG_INFINITY; 8],
            max_y: [f32::NEG_INFINITY; 8],
            max_z: [f32::NEG_INFINITY; 8],
        }
    }

    /// Splits the given box into its 8 octants, see [`AABB::octant`] for the lane order.
    ///
    /// # Arguments
    /// * `aabb` - The box to split.
    pub fn from_octants(aabb: &AABB) -> Self {
        let mut result = Self::empty();
        for i in 0..8 {
            result.set(i, &aabb.octant(i));
        }

        result
    }

    /// Stores the given box in the i-th lane.
    pub fn set(&mut self, i: usize, aabb: &AABB) {
        self.min_x[i] = aabb.min.x;
        self.min_y[i] = aabb.min.y;
        self.min_z[i] = aabb.min.z;
        self.max_x[i] = aabb.max.x;
        self.max_y[i] = aabb.max.y;
        self.max_z[i] = aabb.max.z;
    }

    /// Returns the box stored in the i-th lane.
    pub fn get(&self, i: usize) -> AABB {
        AABB::from_corners(
            Vec3::new(self.min_x[i], self.min_y[i], self.min_z[i]),
            Vec3::new(self.max_x[i], self.max_y[i], self.max_z[i]),
        )
    }

    /// Intersects the ray with all 8 boxes and returns per lane the entry parameter of the ray,
    /// or +inf if the lane is missed or empty.
    ///
    /// # Arguments
    /// * `ray` - The ray whose parameter interval is clipped.
    /// * `inv_dir` - The precomputed inverse ray direction.
    pub fn intersect(&self, ray: &Ray, inv_dir: &Vec3) -> [f32; 8] {
        let mut t_enter = [ray.t_near; 8];
        let mut t_exit = [ray.t_far; 8];

        Self::clip_axis(
            &mut t_enter,
            &mut t_exit,
            &self.min_x,
            &self.max_x,
            ray.pos.x,
            inv_dir.x,
        );
        Self::clip_axis(
            &mut t_enter,
            &mut t_exit,
            &self.min_y,
            &self.max_y,
            ray.pos.y,
            inv_dir.y,
        );
        Self::clip_axis(
            &mut t_enter,
            &mut t_exit,
            &self.min_z,
            &self.max_z,
            ray.pos.z,
            inv_dir.z,
        );

        let mut result = [f32::INFINITY; 8];
        for i in 0..8 {
            let non_empty = self.min_x[i] <= self.max_x[i]
                && self.min_y[i] <= self.max_y[i]
                && self.min_z[i] <= self.max_z[i];

            if non_empty && t_enter[i] <= t_exit[i] {
                result[i] = t_enter[i];
            }
        }

        result
    }

    #[inline(always)]
    fn clip_axis(
        t_enter: &mut [f32; 8],
        t_exit: &mut [f32; 8],
        min: &[f32; 8],
        max: &[f32; 8],
        pos: f32,
        inv_dir: f32,
    ) {
        for i in 0..8 {
            let t0 = (min[i] - pos) * inv_dir;
            let t1 = (max[i] - pos) * inv_dir;

            // rays on a slab plane miss, see AABB::ray_interval
            if t0.is_nan() || t1.is_nan() {
                t_enter[i] = f32::INFINITY;
                t_exit[i] = f32::NEG_INFINITY;
                continue;
            }

            t_enter[i] = t_enter[i].max(t0.min(t1));
            t_exit[i] = t_exit[i].min(t0.max(t1));
        }
    }
}

/// Compare-exchange pairs of an optimal 19 comparator sorting network for 8 elements.
const SORT8_NETWORK: [(usize, usize); 19] = [
    (0, 1),
    (2, 3),
    (4, 5),
    (6, 7),
    (0, 2),
    (1, 3),
    (4, 6),
    (5, 7),
    (1, 2),
    (5, 6),
    (0, 4),
    (3, 7),
    (1, 5),
    (2, 6),
    (1, 4),
    (3, 6),
    (2, 4),
    (3, 5),
    (3, 4),
];

/// Sorts the 8 ray parameters ascending and carries the child indices along.
///
/// # Arguments
/// * `ts` - The ray parameters to sort.
/// * `children` - The payload that is permuted in the same way as `ts`.
#[inline]
pub fn sort8(ts: &mut [f32; 8], children: &mut [usize; 8]) {
    for (a, b) in SORT8_NETWORK {
        if ts[a] > ts[b] {
            ts.swap(a, b);
            children.swap(a, b);
        }
    }
}

#[cfg(test)]
mod test {
    use rand::prelude::*;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    #[test]
    fn test_sort8() {
        let mut r = ChaCha8Rng::seed_from_u64(8);

        for _ in 0..1000 {
            let mut ts = [0f32; 8];
            ts.iter_mut().for_each(|t| *t = r.random_range(-10f32..10f32));
            if r.random_bool(0.3) {
                ts[r.random_range(0..8)] = f32::INFINITY;
            }

            let original = ts;
            let mut children = [0, 1, 2, 3, 4, 5, 6, 7];
            sort8(&mut ts, &mut children);

            assert!(ts.windows(2).all(|w| w[0] <= w[1]), "{:?}", ts);
            for (t, c) in ts.iter().zip(children.iter()) {
                assert_eq!(*t, original[*c]);
            }
        }
    }

    #[test]
    fn test_intersect_matches_single_box_test() {
        let mut r = ChaCha8Rng::seed_from_u64(3);

        for _ in 0..200 {
            let mut boxes = Box8::empty();
            let mut aabbs = Vec::new();
            for i in 0..7 {
                let c = Vec3::new(
                    r.random_range(-5f32..5f32),
                    r.random_range(-5f32..5f32),
                    r.random_range(-5f32..5f32),
                );
                let aabb = AABB::new_cube(&c, r.random_range(0.1f32..3f32));
                boxes.set(i, &aabb);
                aabbs.push(aabb);
            }

            let ray = Ray::from_pos(
                &Vec3::new(
                    r.random_range(-10f32..10f32),
                    r.random_range(-10f32..10f32),
                    r.random_range(-10f32..10f32),
                ),
                &Vec3::new(
                    r.random_range(-2f32..2f32),
                    r.random_range(-2f32..2f32),
                    r.random_range(-2f32..2f32),
                ),
            );

            let ts = boxes.intersect(&ray, &ray.inv_dir());
            for (i, aabb) in aabbs.iter().enumerate() {
                let expected = aabb.ray_interval(&ray).map(|(t, _)| t);
                assert_eq!(expected.unwrap_or(f32::INFINITY), ts[i]);
            }

            // the unused lane is never hit
            assert_eq!(ts[7], f32::INFINITY);
        }
    }

    #[test]
    fn test_ray_on_slab_plane_misses() {
        let mut boxes = Box8::empty();
        boxes.set(0, &AABB::unit());
        boxes.set(1, &AABB::new_cube(&Vec3::new(0.0, 2.0, 0.0), 2.0));

        // lies on the upper y plane of box 0 and the lower y plane of box 1
        let ray = Ray::new(
            Vec3::new(-3.0, 1.0, 0.5),
            Vec3::new(1.0, 0.0, 0.0),
            0.0,
            f32::INFINITY,
        );

        let ts = boxes.intersect(&ray, &ray.inv_dir());
        assert_eq!(ts, [f32::INFINITY; 8]);
        assert!(AABB::unit().ray_interval(&ray).is_none());
    }

    #[test]
    fn test_octant_lanes() {
        let aabb = AABB::unit();
        let boxes = Box8::from_octants(&aabb);

        for i in 0..8 {
            assert_eq!(boxes.get(i), aabb.octant(i));
        }
    }
}
