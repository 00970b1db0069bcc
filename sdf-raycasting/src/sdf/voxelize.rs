use log::{debug, info};
use nalgebra_glm::{UVec3, Vec3};

use crate::{math::closest_point_triangle, Mesh, Result};

use super::{redistance, SdfGrid};

/// Seeds a grid with the signed distances of the lattice points near the surface of the given
/// mesh. Every triangle updates the lattice points of its bounding box padded by one voxel. The
/// sign is given by the side of the triangle's plane the lattice point lies on. Lattice points
/// far away from the surface remain `+inf`.
///
/// # Arguments
/// * `size` - The number of lattice points along each axis.
/// * `mesh` - The mesh, which is expected to lie within [-1,1]^3.
pub fn voxelize_mesh(size: UVec3, mesh: &Mesh) -> Result<SdfGrid> {
    let mut grid = SdfGrid::new_filled(size, f32::INFINITY)?;
    let max_coord = grid.max_lattice_coord();

    // maps a world position to the continuous lattice coordinate
    let to_lattice = |p: &Vec3| (p + Vec3::new(1f32, 1f32, 1f32)).component_mul(&max_coord) * 0.5f32;
    let lattice_range = |lo: f32, hi: f32, max: f32| -> Option<(u32, u32)> {
        let lo = (lo.floor() - 1f32).max(0f32);
        let hi = (hi.ceil() + 1f32).min(max);
        if lo <= hi {
            Some((lo as u32, hi as u32))
        } else {
            None
        }
    };

    for triangle in 0..mesh.num_triangles() {
        let [a, b, c] = mesh.triangle_positions(triangle);
        let normal = (b - a).cross(&(c - a));

        let bbox = mesh.triangle_bbox(triangle);
        let lo = to_lattice(&bbox.min);
        let hi = to_lattice(&bbox.max);

        let (Some((x0, x1)), Some((y0, y1)), Some((z0, z1))) = (
            lattice_range(lo.x, hi.x, max_coord.x),
            lattice_range(lo.y, hi.y, max_coord.y),
            lattice_range(lo.z, hi.z, max_coord.z),
        ) else {
            continue;
        };

        for z in z0..=z1 {
            for y in y0..=y1 {
                for x in x0..=x1 {
                    let p = grid.lattice_point(x, y, z);
                    let closest = closest_point_triangle(&p, &a, &b, &c);
                    let to_point = p - closest;

                    let dist = to_point.norm();
                    if dist < grid.value(x, y, z).abs() {
                        let value = if normal.dot(&to_point) >= 0f32 {
                            dist
                        } else {
                            -dist
                        };

                        grid.set_value(x, y, z, value);
                    }
                }
            }
        }
    }

    debug!(
        "Voxelized {} triangles, {} of {} lattice points seeded",
        mesh.num_triangles(),
        grid.values().iter().filter(|v| v.is_finite()).count(),
        grid.values().len()
    );

    Ok(grid)
}

/// Computes the signed distance grid of the given mesh by voxelizing it and propagating the
/// distances of the seeded lattice points into the whole grid.
///
/// # Arguments
/// * `size` - The number of lattice points along each axis.
/// * `mesh` - The mesh, which is expected to lie within [-1,1]^3.
pub fn build_grid_from_mesh(size: UVec3, mesh: &Mesh) -> Result<SdfGrid> {
    info!(
        "Build SDF grid of size {:?} from mesh with {} triangles...",
        size.as_slice(),
        mesh.num_triangles()
    );

    let mut grid = voxelize_mesh(size, mesh)?;
    redistance(&mut grid)?;

    info!("Build SDF grid...DONE");

    Ok(grid)
}
