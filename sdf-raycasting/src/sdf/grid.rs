use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
};

use log::info;
use nalgebra_glm::{self as glm, UVec3, Vec3};
use serde::{Deserialize, Serialize};

use crate::{
    math::{Ray, AABB},
    scene::Intersect,
    Error, HitInfo, Result,
};

use super::{sample_cubic, sphere_trace};

/// SDF values below this threshold are reported as hit.
pub const GRID_HIT_EPS: f32 = 1e-3;

/// The step used for the central differences of the normal estimation.
pub const NORMAL_EPS: f32 = 1e-3;

/// The reconstruction used for sampling the grid in between lattice points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Interpolation {
    #[default]
    Trilinear,
    CubicBSpline,
}

/// A dense grid of SDF values spanning the domain [-1,1]^3.
///
/// The lattice point (x,y,z) is stored at index `(z * size.y + y) * size.x + x` and is located
/// at `2 * (x,y,z) / (size - 1) - 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct SdfGrid {
    size: UVec3,
    values: Vec<f32>,
    interpolation: Interpolation,
}

impl SdfGrid {
    /// Creates a new grid from the given values.
    ///
    /// # Arguments
    /// * `size` - The number of lattice points along each axis. Must not be zero.
    /// * `values` - The values in lattice order.
    pub fn new(size: UVec3, values: Vec<f32>) -> Result<Self> {
        let num_values = Self::num_values(&size)?;
        if num_values != values.len() {
            return Err(Error::CorruptData(format!(
                "Grid of size {:?} requires {} values, got {}",
                size.as_slice(),
                num_values,
                values.len()
            )));
        }

        Ok(Self {
            size,
            values,
            interpolation: Interpolation::default(),
        })
    }

    /// Creates a grid where every lattice point has the same value.
    ///
    /// # Arguments
    /// * `size` - The number of lattice points along each axis. Must not be zero.
    /// * `value` - The value of all lattice points.
    pub fn new_filled(size: UVec3, value: f32) -> Result<Self> {
        let num_values = Self::num_values(&size)?;
        Self::new(size, vec![value; num_values])
    }

    /// Creates a grid by evaluating the given function at every lattice point.
    ///
    /// # Arguments
    /// * `size` - The number of lattice points along each axis. Must not be zero.
    /// * `f` - The function to evaluate.
    pub fn from_fn<F>(size: UVec3, f: F) -> Result<Self>
    where
        F: Fn(&Vec3) -> f32,
    {
        let mut grid = Self::new_filled(size, 0f32)?;
        for z in 0..size.z {
            for y in 0..size.y {
                for x in 0..size.x {
                    let p = grid.lattice_point(x, y, z);
                    let index = grid.index(x, y, z);
                    grid.values[index] = f(&p);
                }
            }
        }

        Ok(grid)
    }

    /// Returns the number of values for the given size or an error if the size is empty or
    /// overflows.
    fn num_values(size: &UVec3) -> Result<usize> {
        if size.iter().any(|s| *s == 0) {
            return Err(Error::CorruptData(format!(
                "Grid size {:?} is empty",
                size.as_slice()
            )));
        }

        (size.x as usize)
            .checked_mul(size.y as usize)
            .and_then(|n| n.checked_mul(size.z as usize))
            .ok_or_else(|| {
                Error::CorruptData(format!("Grid size {:?} overflows", size.as_slice()))
            })
    }

    /// Returns the number of lattice points along each axis.
    #[inline]
    pub fn size(&self) -> &UVec3 {
        &self.size
    }

    /// Returns the values in lattice order.
    #[inline]
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    #[inline]
    pub fn interpolation(&self) -> Interpolation {
        self.interpolation
    }

    #[inline]
    pub fn set_interpolation(&mut self, interpolation: Interpolation) {
        self.interpolation = interpolation;
    }

    /// Returns the index of the given lattice point.
    #[inline]
    pub fn index(&self, x: u32, y: u32, z: u32) -> usize {
        ((z as usize * self.size.y as usize) + y as usize) * self.size.x as usize + x as usize
    }

    /// Returns the value at the given lattice point.
    #[inline]
    pub fn value(&self, x: u32, y: u32, z: u32) -> f32 {
        self.values[self.index(x, y, z)]
    }

    /// Sets the value at the given lattice point.
    #[inline]
    pub fn set_value(&mut self, x: u32, y: u32, z: u32, value: f32) {
        let index = self.index(x, y, z);
        self.values[index] = value;
    }

    /// Returns the position of the given lattice point in [-1,1]^3.
    pub fn lattice_point(&self, x: u32, y: u32, z: u32) -> Vec3 {
        let to_point = |c: u32, s: u32| {
            if s > 1 {
                c as f32 / (s - 1) as f32 * 2f32 - 1f32
            } else {
                0f32
            }
        };

        Vec3::new(
            to_point(x, self.size.x),
            to_point(y, self.size.y),
            to_point(z, self.size.z),
        )
    }

    /// Returns the continuous lattice coordinates of the given point, clamped to the grid.
    pub fn lattice_coord(&self, point: &Vec3) -> Vec3 {
        let max_coord = self.max_lattice_coord();
        let p = (point + Vec3::new(1f32, 1f32, 1f32)).component_mul(&max_coord) * 0.5f32;

        glm::clamp_vec(&p, &Vec3::zeros(), &max_coord)
    }

    /// Returns the coordinates of the last lattice point.
    #[inline]
    pub fn max_lattice_coord(&self) -> Vec3 {
        Vec3::new(
            (self.size.x - 1) as f32,
            (self.size.y - 1) as f32,
            (self.size.z - 1) as f32,
        )
    }

    /// Samples the grid at the given point with the configured interpolation.
    ///
    /// # Arguments
    /// * `point` - The sample point. Points outside [-1,1]^3 are clamped to the domain.
    #[inline]
    pub fn sample(&self, point: &Vec3) -> f32 {
        match self.interpolation {
            Interpolation::Trilinear => self.sample_trilinear(point),
            Interpolation::CubicBSpline => sample_cubic(self, point),
        }
    }

    /// Samples the grid at the given point by trilinear interpolation of the 8 surrounding
    /// lattice points.
    ///
    /// # Arguments
    /// * `point` - The sample point. Points outside [-1,1]^3 are clamped to the domain.
    pub fn sample_trilinear(&self, point: &Vec3) -> f32 {
        let p = self.lattice_coord(point);
        let c0 = p.map(|c| c.floor());
        let c1 = p.map(|c| c.ceil());

        // weights of the lower and upper corner per axis
        let mut w0 = Vec3::zeros();
        let mut w1 = Vec3::zeros();
        for axis in 0..3 {
            if c0[axis] == c1[axis] {
                w0[axis] = 1f32;
                w1[axis] = 0f32;
            } else {
                w0[axis] = c1[axis] - p[axis];
                w1[axis] = p[axis] - c0[axis];
            }
        }

        let c0 = c0.map(|c| c as u32);
        let c1 = c1.map(|c| c as u32);

        let mut result = 0f32;
        for i in 0..8 {
            let (x, wx) = if i & 4 == 0 { (c0.x, w0.x) } else { (c1.x, w1.x) };
            let (y, wy) = if i & 2 == 0 { (c0.y, w0.y) } else { (c1.y, w1.y) };
            let (z, wz) = if i & 1 == 0 { (c0.z, w0.z) } else { (c1.z, w1.z) };

            let w = wx * wy * wz;
            if w != 0f32 {
                result += w * self.value(x, y, z);
            }
        }

        result
    }

    /// Estimates the surface normal at the given point by central differences. Probes that would
    /// leave [-1,1]^3 fall back to one-sided differences.
    ///
    /// # Arguments
    /// * `point` - The point at which the normal is estimated.
    pub fn normal(&self, point: &Vec3) -> Vec3 {
        let mut gradient = Vec3::zeros();
        for axis in 0..3 {
            let mut lower = *point;
            let mut upper = *point;
            lower[axis] = (point[axis] - NORMAL_EPS).max(-1f32);
            upper[axis] = (point[axis] + NORMAL_EPS).min(1f32);

            let h = upper[axis] - lower[axis];
            if h > 0f32 {
                gradient[axis] = (self.sample(&upper) - self.sample(&lower)) / h;
            }
        }

        let len = gradient.norm();
        if len > 0f32 && len.is_finite() {
            gradient / len
        } else {
            Vec3::new(0f32, 1f32, 0f32)
        }
    }

    /// Loads the grid from the given file.
    ///
    /// # Arguments
    /// * `path` - The path of the grid file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        let grid = Self::read_from(reader)?;

        info!(
            "Loaded grid {:?} of size {:?}",
            path.as_ref(),
            grid.size.as_slice()
        );

        Ok(grid)
    }

    /// Saves the grid to the given file.
    ///
    /// # Arguments
    /// * `path` - The path of the grid file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write(&mut writer)?;
        writer.flush()?;

        Ok(())
    }

    /// Reads the grid from its binary representation, i.e., the little-endian grid size as 3
    /// u32 values followed by the little-endian f32 values in lattice order.
    ///
    /// # Arguments
    /// * `reader` - The reader to read the grid from.
    pub fn read_from<R: Read>(mut reader: R) -> Result<Self> {
        let mut header = [0u8; 12];
        reader.read_exact(&mut header).map_err(|err| match err.kind() {
            std::io::ErrorKind::UnexpectedEof => {
                Error::CorruptData("Grid header is truncated".to_string())
            }
            _ => Error::Io(err),
        })?;

        let size = UVec3::new(
            read_u32(&header[0..4]),
            read_u32(&header[4..8]),
            read_u32(&header[8..12]),
        );
        let num_values = Self::num_values(&size)?;

        let mut payload = Vec::new();
        reader.read_to_end(&mut payload)?;

        if Some(payload.len()) != num_values.checked_mul(4) {
            return Err(Error::CorruptData(format!(
                "Grid of size {:?} requires {} values, but {} bytes are left",
                size.as_slice(),
                num_values,
                payload.len()
            )));
        }

        let values = payload.chunks_exact(4).map(read_f32).collect();

        Self::new(size, values)
    }

    /// Writes the binary representation of the grid.
    ///
    /// # Arguments
    /// * `writer` - The writer to write the grid to.
    pub fn write<W: Write>(&self, mut writer: W) -> Result<()> {
        for s in self.size.iter() {
            writer.write_all(&s.to_le_bytes())?;
        }

        for v in self.values.iter() {
            writer.write_all(&v.to_le_bytes())?;
        }

        Ok(())
    }
}

impl Intersect for SdfGrid {
    fn intersect(&self, ray: &Ray) -> HitInfo {
        match sphere_trace(ray, &AABB::unit(), GRID_HIT_EPS, |p| self.sample(p)) {
            Some((t, point)) => HitInfo::new_hit(t, self.normal(&point)),
            None => HitInfo::miss(),
        }
    }
}

#[inline]
pub(crate) fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

#[inline]
pub(crate) fn read_f32(bytes: &[u8]) -> f32 {
    f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

#[cfg(test)]
mod test {
    use rand::{Rng, SeedableRng};

    use super::*;

    fn sphere_grid(n: u32, radius: f32) -> SdfGrid {
        SdfGrid::from_fn(UVec3::new(n, n, n), |p| p.norm() - radius).unwrap()
    }

    /// Returns the analytic ray parameter of the first intersection with a sphere at the origin.
    fn ray_sphere(ray: &Ray, radius: f32) -> Option<f32> {
        let a = ray.dir.dot(&ray.dir);
        let b = 2f32 * ray.pos.dot(&ray.dir);
        let c = ray.pos.dot(&ray.pos) - radius * radius;
        let disc = b * b - 4f32 * a * c;
        if disc < 0f32 {
            return None;
        }

        Some((-b - disc.sqrt()) / (2f32 * a))
    }

    #[test]
    fn test_corner_scenario() {
        let mut values = vec![0f32; 8];
        values[0] = -1f32;
        let grid = SdfGrid::new(UVec3::new(2, 2, 2), values).unwrap();

        assert_eq!(grid.sample(&Vec3::new(-1.0, -1.0, -1.0)), -1.0);
        assert_eq!(grid.sample(&Vec3::new(0.0, 0.0, 0.0)), -0.125);
        assert_eq!(grid.sample(&Vec3::new(1.0, 1.0, 1.0)), 0.0);
    }

    #[test]
    fn test_trilinear_exact_at_lattice_points() {
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(3);
        let size = UVec3::new(5, 3, 9);
        let values = (0..135).map(|_| rng.random_range(-10f32..10f32)).collect();
        let grid = SdfGrid::new(size, values).unwrap();

        for z in 0..size.z {
            for y in 0..size.y {
                for x in 0..size.x {
                    let p = grid.lattice_point(x, y, z);
                    assert_eq!(grid.sample(&p), grid.value(x, y, z), "({},{},{})", x, y, z);
                }
            }
        }
    }

    #[test]
    fn test_sample_linear_field() {
        let grid = SdfGrid::from_fn(UVec3::new(9, 9, 9), |p| p.x + 2.0 * p.y - p.z).unwrap();

        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(4);
        for _ in 0..100 {
            let p = Vec3::new(
                rng.random_range(-1f32..1f32),
                rng.random_range(-1f32..1f32),
                rng.random_range(-1f32..1f32),
            );

            let expected = p.x + 2.0 * p.y - p.z;
            assert!((grid.sample(&p) - expected).abs() < 1e-4);

            let n = grid.normal(&p);
            let expected_n = Vec3::new(1.0, 2.0, -1.0).normalize();
            assert!((n - expected_n).norm() < 1e-2);
        }

        // outside points are clamped to the domain
        assert_eq!(
            grid.sample(&Vec3::new(5.0, -5.0, 0.0)),
            grid.sample(&Vec3::new(1.0, -1.0, 0.0))
        );
    }

    #[test]
    fn test_single_lattice_point_axis() {
        let grid = SdfGrid::new(UVec3::new(1, 1, 2), vec![1.0, 3.0]).unwrap();
        assert_eq!(grid.sample(&Vec3::new(0.3, -0.7, 0.0)), 2.0);
        assert_eq!(grid.lattice_point(0, 0, 1), Vec3::new(0.0, 0.0, 1.0));
    }

    #[test]
    fn test_intersect_sphere_grid() {
        let radius = 0.5f32;
        let grid = sphere_grid(64, radius);

        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(5);
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
            let expected = ray_sphere(&ray, radius).unwrap();

            let hit = grid.intersect(&ray);
            assert!(hit.hit);
            assert!(
                (hit.t - expected).abs() < 1e-2,
                "t={}, expected={}",
                hit.t,
                expected
            );

            let expected_normal = ray.at(expected).normalize();
            assert!(hit.normal.dot(&expected_normal) > 0.95);
        }
    }

    #[test]
    fn test_intersect_misses() {
        let grid = sphere_grid(16, 0.5);

        let ray = Ray::from_pos(&Vec3::new(-3.0, 0.8, 0.0), &Vec3::new(0.0, 0.8, 0.0));
        assert!(!grid.intersect(&ray).hit);

        let ray = Ray::from_pos(&Vec3::new(-3.0, 0.0, 0.0), &Vec3::new(-4.0, 0.0, 0.0));
        assert!(!grid.intersect(&ray).hit);
    }

    #[test]
    fn test_file_round_trip() {
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(6);

        let mut bytes = Vec::new();
        for _ in 0..3 {
            bytes.extend_from_slice(&4u32.to_le_bytes());
        }
        for i in 0..64 {
            let v = if i % 7 == 0 {
                f32::INFINITY
            } else {
                rng.random_range(-2f32..2f32)
            };
            bytes.extend_from_slice(&v.to_le_bytes());
        }

        let grid = SdfGrid::read_from(&bytes[..]).unwrap();
        assert_eq!(grid.size(), &UVec3::new(4, 4, 4));
        assert_eq!(grid.value(0, 0, 0), f32::INFINITY);

        let mut written = Vec::new();
        grid.write(&mut written).unwrap();
        assert_eq!(bytes, written);
    }

    #[test]
    fn test_read_corrupt_data() {
        // truncated header
        let bytes = 4u32.to_le_bytes();
        assert!(matches!(
            SdfGrid::read_from(&bytes[..]),
            Err(Error::CorruptData(_))
        ));

        // missing values
        let mut bytes = Vec::new();
        for _ in 0..3 {
            bytes.extend_from_slice(&2u32.to_le_bytes());
        }
        bytes.extend_from_slice(&1f32.to_le_bytes());
        assert!(matches!(
            SdfGrid::read_from(&bytes[..]),
            Err(Error::CorruptData(_))
        ));

        // trailing bytes
        let mut bytes = Vec::new();
        for _ in 0..3 {
            bytes.extend_from_slice(&1u32.to_le_bytes());
        }
        bytes.extend_from_slice(&[0u8; 5]);
        assert!(matches!(
            SdfGrid::read_from(&bytes[..]),
            Err(Error::CorruptData(_))
        ));

        // dimensions overflow
        let mut bytes = Vec::new();
        for _ in 0..3 {
            bytes.extend_from_slice(&u32::MAX.to_le_bytes());
        }
        assert!(matches!(
            SdfGrid::read_from(&bytes[..]),
            Err(Error::CorruptData(_))
        ));

        // empty dimension
        let mut bytes = Vec::new();
        for s in [4u32, 0, 4] {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        assert!(matches!(
            SdfGrid::read_from(&bytes[..]),
            Err(Error::CorruptData(_))
        ));
    }
}
