use nalgebra_glm::Vec3;

use super::Ray;

/// Determinants below this threshold are treated as rays parallel to the triangle.
const PARALLEL_EPS: f32 = 1e-12;

/// Determines the intersection between the given triangle and ray with the closed form test of
/// Moeller and Trumbore. If there is an intersection, the ray parameter t is returned.
/// That is, ray.pos + t * ray.dir is the intersection point and t lies in [t_near, t_far].
///
/// # Arguments
/// * `p0` - The first vertex of the triangle.
/// * `p1` - The second vertex of the triangle.
/// * `p2` - The third vertex of the triangle.
/// * `ray` - The ray to compute the intersection with.
pub fn triangle_ray(p0: &Vec3, p1: &Vec3, p2: &Vec3, ray: &Ray) -> Option<f32> {
    let edge0: Vec3 = p1 - p0;
    let edge1: Vec3 = p2 - p0;

    let h = ray.dir.cross(&edge1);
    let det = edge0.dot(&h);
    if det.abs() < PARALLEL_EPS {
        return None;
    }

    let inv_det = 1f32 / det;
    let s: Vec3 = ray.pos - p0;
    let u = inv_det * s.dot(&h);
    if !(0f32..=1f32).contains(&u) {
        return None;
    }

    let q = s.cross(&edge0);
    let v = inv_det * ray.dir.dot(&q);
    if v < 0f32 || u + v > 1f32 {
        return None;
    }

    let t = inv_det * edge1.dot(&q);
    if t < ray.t_near || t > ray.t_far {
        None
    } else {
        Some(t)
    }
}

/// Returns the normalized geometric normal of the triangle, i.e., the normal given by the
/// counter-clockwise orientation of the vertices.
#[inline]
pub fn triangle_normal(p0: &Vec3, p1: &Vec3, p2: &Vec3) -> Vec3 {
    (p1 - p0).cross(&(p2 - p0)).normalize()
}

/// Computes the point on the triangle that is closest to the given point.
///
/// The Voronoi regions of the triangle are tested in a fixed order, i.e., vertex a, b, c, then
/// the edges ab, ac, bc and finally the interior. Points on a region boundary are assigned to
/// the first region in that order.
///
/// # Arguments
/// * `p` - The point for which the closest point is computed.
/// * `a` - The first vertex of the triangle.
/// * `b` - The second vertex of the triangle.
/// * `c` - The third vertex of the triangle.
pub fn closest_point_triangle(p: &Vec3, a: &Vec3, b: &Vec3, c: &Vec3) -> Vec3 {
    let ab: Vec3 = b - a;
    let ac: Vec3 = c - a;
    let ap: Vec3 = p - a;

    let d1 = ab.dot(&ap);
    let d2 = ac.dot(&ap);
    if d1 <= 0f32 && d2 <= 0f32 {
        return *a;
    }

    let bp: Vec3 = p - b;
    let d3 = ab.dot(&bp);
    let d4 = ac.dot(&bp);
    if d3 >= 0f32 && d4 <= d3 {
        return *b;
    }

    let cp: Vec3 = p - c;
    let d5 = ab.dot(&cp);
    let d6 = ac.dot(&cp);
    if d6 >= 0f32 && d5 <= d6 {
        return *c;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0f32 && d1 >= 0f32 && d3 <= 0f32 {
        let v = d1 / (d1 - d3);
        return a + v * ab;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0f32 && d2 >= 0f32 && d6 <= 0f32 {
        let v = d2 / (d2 - d6);
        return a + v * ac;
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0f32 && (d4 - d3) >= 0f32 && (d5 - d6) >= 0f32 {
        let v = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return b + v * (c - b);
    }

    let denom = 1f32 / (va + vb + vc);
    let v = vb * denom;
    let w = vc * denom;
    a + v * ab + w * ac
}
