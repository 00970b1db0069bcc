use log::{debug, warn};

use crate::{Error, Result};

use super::SdfGrid;

/// Tolerance for the comparison of the upwind candidates.
const UPWIND_EPS: f32 = 1e-8;

/// Negative discriminants down to `-DISCRIMINANT_TOLERANCE * h^2` are treated as rounding noise.
const DISCRIMINANT_TOLERANCE: f32 = 1e-4;

/// Number of sweep directions, i.e., all combinations of forward and backward along x, y and z.
const NUM_SWEEPS: usize = 8;

/// Propagates the distances of the finite (frozen) lattice points to all other lattice points by
/// fast sweeping, i.e., by solving the Eikonal equation |grad d| = 1 with Godunov upwind updates
/// in 8 alternating sweep directions. Frozen lattice points are never changed. The sign of a new
/// value is taken from the majority of the finite neighbors, ties are positive.
///
/// # Arguments
/// * `grid` - The seeded grid, e.g., the output of the mesh voxelization.
pub fn redistance(grid: &mut SdfGrid) -> Result<()> {
    let size = *grid.size();
    let max_extent = size.x.max(size.y).max(size.z);
    if max_extent < 2 {
        return Ok(());
    }

    let h = 2f32 / (max_extent - 1) as f32;
    let frozen: Vec<bool> = grid.values().iter().map(|v| v.is_finite()).collect();

    let orders = |n: u32| -> [Vec<u32>; 2] { [(0..n).collect(), (0..n).rev().collect()] };
    let xs = orders(size.x);
    let ys = orders(size.y);
    let zs = orders(size.z);

    let mut num_updates = 0usize;
    for sweep in 0..NUM_SWEEPS {
        for &x in xs[sweep / 4].iter() {
            for &y in ys[(sweep % 4) / 2].iter() {
                for &z in zs[sweep % 2].iter() {
                    let index = grid.index(x, y, z);
                    if frozen[index] {
                        continue;
                    }

                    if update_voxel(grid, x, y, z, h)? {
                        num_updates += 1;
                    }
                }
            }
        }
    }

    debug!(
        "Redistanced grid of size {:?} with {} frozen points and {} updates",
        size.as_slice(),
        frozen.iter().filter(|f| **f).count(),
        num_updates
    );

    Ok(())
}

/// Solves the upwind update for a single lattice point and stores the result if it reduces the
/// magnitude. Returns true if the value has been changed.
fn update_voxel(grid: &mut SdfGrid, x: u32, y: u32, z: u32, h: f32) -> Result<bool> {
    let size = *grid.size();
    let neighbors = |c: u32, n: u32| (c.saturating_sub(1), (c + 1).min(n - 1));

    let (x0, x1) = neighbors(x, size.x);
    let (y0, y1) = neighbors(y, size.y);
    let (z0, z1) = neighbors(z, size.z);

    let values = [
        grid.value(x0, y, z),
        grid.value(x1, y, z),
        grid.value(x, y0, z),
        grid.value(x, y1, z),
        grid.value(x, y, z0),
        grid.value(x, y, z1),
    ];

    let mut a = [
        values[0].abs().min(values[1].abs()),
        values[2].abs().min(values[3].abs()),
        values[4].abs().min(values[5].abs()),
    ];
    a.sort_by(|l, r| l.total_cmp(r));

    let d = solve_upwind(&a, h)?;

    let current = grid.value(x, y, z);
    if !(current.abs() > d) {
        return Ok(false);
    }

    let (positive, negative) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((0, 0), |(p, n), v| if *v < 0f32 { (p, n + 1) } else { (p + 1, n) });

    let value = if negative > positive { -d } else { d };
    grid.set_value(x, y, z, value);

    Ok(true)
}

/// Returns the smallest upwind solution of the discretized Eikonal equation for the sorted
/// neighbor magnitudes `a` and the lattice spacing `h`.
fn solve_upwind(a: &[f32; 3], h: f32) -> Result<f32> {
    let d = a[0] + h;
    if d <= a[1] + UPWIND_EPS {
        return Ok(d);
    }

    // (d - a0)^2 + (d - a1)^2 = h^2
    let b = -2f32 * (a[0] + a[1]);
    let c = a[0] * a[0] + a[1] * a[1] - h * h;
    let d = (-b + checked_sqrt(b * b - 8f32 * c, h)?) / 4f32;
    if d <= a[2] + UPWIND_EPS {
        return Ok(d);
    }

    // (d - a0)^2 + (d - a1)^2 + (d - a2)^2 = h^2
    let b = -2f32 * (a[0] + a[1] + a[2]);
    let c = a[0] * a[0] + a[1] * a[1] + a[2] * a[2] - h * h;
    let d = (-b + checked_sqrt(b * b - 12f32 * c, h)?) / 6f32;

    Ok(d)
}

/// Returns the square root of the discriminant. Negative values beyond rounding noise indicate
/// inconsistent neighbor values and are reported in debug builds.
fn checked_sqrt(disc: f32, h: f32) -> Result<f32> {
    if disc >= 0f32 {
        return Ok(disc.sqrt());
    }

    if disc < -DISCRIMINANT_TOLERANCE * h * h {
        if cfg!(debug_assertions) {
            return Err(Error::InvariantViolation(format!(
                "Negative discriminant {} in upwind update",
                disc
            )));
        }

        warn!("Negative discriminant {} in upwind update clamped", disc);
    }

    Ok(0f32)
}

#[cfg(test)]
mod test {
    use nalgebra_glm::UVec3;

    use super::*;

    fn single_seed(n: u32) -> SdfGrid {
        let mut grid = SdfGrid::new_filled(UVec3::new(n, n, n), f32::INFINITY).unwrap();
        let c = n / 2;
        grid.set_value(c, c, c, 0.0);
        grid
    }

    #[test]
    fn test_solve_upwind() {
        let h = 0.5f32;

        // one-sided
        assert_eq!(solve_upwind(&[1.0, 3.0, 3.0], h).unwrap(), 1.5);
        assert_eq!(
            solve_upwind(&[0.0, f32::INFINITY, f32::INFINITY], h).unwrap(),
            0.5
        );

        // two equal neighbors
        let d = solve_upwind(&[0.0, 0.0, f32::INFINITY], h).unwrap();
        assert!((d - h / 2f32.sqrt()).abs() < 1e-6);

        // three equal neighbors
        let d = solve_upwind(&[0.0, 0.0, 0.0], h).unwrap();
        assert!((d - h / 3f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn test_single_seed() {
        let n = 9;
        let mut grid = single_seed(n);
        redistance(&mut grid).unwrap();

        let h = 0.25f32;
        let c = 4;
        assert_eq!(grid.value(c, c, c), 0.0);
        assert!(grid.values().iter().all(|v| v.is_finite() && *v >= 0.0));

        // exact along the axes
        for k in 1..=4 {
            let expected = k as f32 * h;
            assert!((grid.value(c + k, c, c) - expected).abs() < 1e-5);
            assert!((grid.value(c, c - k, c) - expected).abs() < 1e-5);
            assert!((grid.value(c, c, c + k) - expected).abs() < 1e-5);
        }

        // close to the euclidean distance elsewhere
        for z in 0..n {
            for y in 0..n {
                for x in 0..n {
                    let p = grid.lattice_point(x, y, z);
                    let d = grid.value(x, y, z);
                    assert!(
                        (d - p.norm()).abs() <= 0.35 * p.norm() + 1e-6,
                        "({},{},{}): {} vs {}",
                        x,
                        y,
                        z,
                        d,
                        p.norm()
                    );
                }
            }
        }
    }

    #[test]
    fn test_redistance_is_idempotent() {
        let mut once = single_seed(8);
        redistance(&mut once).unwrap();

        let mut twice = once.clone();
        redistance(&mut twice).unwrap();

        assert_eq!(once, twice);
    }

    #[test]
    fn test_negative_seed_propagates_sign() {
        let mut grid = SdfGrid::new_filled(UVec3::new(5, 5, 5), f32::INFINITY).unwrap();
        grid.set_value(2, 2, 2, -0.1);
        redistance(&mut grid).unwrap();

        assert!(grid.values().iter().all(|v| *v < 0.0));
        assert!((grid.value(4, 2, 2) + 1.1).abs() < 1e-5);
    }

    #[test]
    fn test_unseeded_grid_stays_infinite() {
        let mut grid = SdfGrid::new_filled(UVec3::new(3, 3, 3), f32::INFINITY).unwrap();
        redistance(&mut grid).unwrap();
        assert!(grid.values().iter().all(|v| *v == f32::INFINITY));

        let mut grid = SdfGrid::new_filled(UVec3::new(1, 1, 1), f32::INFINITY).unwrap();
        redistance(&mut grid).unwrap();
    }
}
