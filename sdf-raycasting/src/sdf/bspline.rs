use nalgebra_glm::Vec3;

use super::SdfGrid;

/// The maximal degree of the B-spline reconstruction.
pub const BSPLINE_DEGREE: usize = 3;

/// The B-spline basis along one grid axis, evaluated at a fixed parameter.
///
/// The lattice points of the axis are the control points of a clamped uniform B-spline of degree
/// `min(3, n - 1)` on the parameter domain [0,1].
#[derive(Debug, Clone, Copy)]
struct AxisSpline {
    num_ctrl: usize,
    degree: usize,
    span: usize,
    t: f32,
}

impl AxisSpline {
    /// # Arguments
    /// * `num_ctrl` - The number of control points (lattice points) along the axis.
    /// * `t` - The spline parameter in [0,1].
    fn new(num_ctrl: usize, t: f32) -> Self {
        let degree = BSPLINE_DEGREE.min(num_ctrl - 1);
        let t = t.clamp(0f32, 1f32);

        let num_segments = num_ctrl - degree;
        let segment = ((t * num_segments as f32).floor() as usize).min(num_segments - 1);

        Self {
            num_ctrl,
            degree,
            span: degree + segment,
            t,
        }
    }

    /// Returns the i-th knot of the clamped uniform knot vector.
    fn knot(&self, i: usize) -> f32 {
        if i <= self.degree {
            0f32
        } else if i >= self.num_ctrl {
            1f32
        } else {
            (i - self.degree) as f32 / (self.num_ctrl - self.degree) as f32
        }
    }

    /// Returns the index of the first control point influencing the spline at `t`.
    #[inline]
    fn first_ctrl(&self) -> usize {
        self.span - self.degree
    }

    /// Returns the number of control points influencing the spline at `t`.
    #[inline]
    fn num_support(&self) -> usize {
        self.degree + 1
    }

    /// Evaluates the spline with de Boor's algorithm.
    ///
    /// # Arguments
    /// * `ctrl` - The control points `first_ctrl()..first_ctrl() + num_support()`.
    fn eval(&self, ctrl: &[f32; BSPLINE_DEGREE + 1]) -> f32 {
        let p = self.degree;
        let k = self.span;
        let mut d = *ctrl;

        for r in 1..=p {
            for j in (r..=p).rev() {
                let i = j + k - p;
                let lo = self.knot(i);
                let denom = self.knot(i + 1 + p - r) - lo;
                let alpha = if denom > 0f32 {
                    (self.t - lo) / denom
                } else {
                    0f32
                };

                d[j] = (1f32 - alpha) * d[j - 1] + alpha * d[j];
            }
        }

        d[p]
    }
}

/// Samples the grid by interpreting the lattice values as control points of a tensor product
/// B-spline of degree 3 (lower along axes with less than 4 lattice points). Evaluation runs
/// along x first, then y and finally z.
///
/// # Arguments
/// * `grid` - The grid to sample.
/// * `point` - The sample point. Points outside [-1,1]^3 are clamped to the domain.
pub fn sample_cubic(grid: &SdfGrid, point: &Vec3) -> f32 {
    let size = grid.size();
    let t = (point + Vec3::new(1f32, 1f32, 1f32)) * 0.5f32;

    let sx = AxisSpline::new(size.x as usize, t.x);
    let sy = AxisSpline::new(size.y as usize, t.y);
    let sz = AxisSpline::new(size.z as usize, t.z);

    let mut z_ctrl = [0f32; BSPLINE_DEGREE + 1];
    for jz in 0..sz.num_support() {
        let z = (sz.first_ctrl() + jz) as u32;

        let mut y_ctrl = [0f32; BSPLINE_DEGREE + 1];
        for jy in 0..sy.num_support() {
            let y = (sy.first_ctrl() + jy) as u32;

            let mut x_ctrl = [0f32; BSPLINE_DEGREE + 1];
            for jx in 0..sx.num_support() {
                let x = (sx.first_ctrl() + jx) as u32;
                x_ctrl[jx] = grid.value(x, y, z);
            }

            y_ctrl[jy] = sx.eval(&x_ctrl);
        }

        z_ctrl[jz] = sy.eval(&y_ctrl);
    }

    sz.eval(&z_ctrl)
}
