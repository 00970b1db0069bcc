use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use nalgebra_glm::Vec4;

use crate::Result;

/// Packs the given color with components in [0,1] into `r | g << 8 | b << 16 | a << 24`.
///
/// # Arguments
/// * `color` - The RGBA color. Values outside of [0,1] are clamped.
pub fn pack_rgba(color: &Vec4) -> u32 {
    let mut packed = 0u32;
    for (i, c) in color.iter().enumerate() {
        let c = ((*c).clamp(0f32, 1f32) * 255f32).round() as u32;
        packed |= c << (8 * i);
    }

    packed
}

/// Unpacks the given color into its 8-bit RGBA components.
#[inline]
pub fn unpack_rgba(color: u32) -> [u8; 4] {
    color.to_le_bytes()
}

/// Writes the color and depth of a pixel if t is nearer than the stored depth.
/// Returns true if the pixel has been written.
///
/// # Arguments
/// * `color` - The stored packed color of the pixel.
/// * `depth` - The stored depth of the pixel.
/// * `fragment` - The packed color of the new surface.
/// * `t` - The depth of the new surface.
#[inline]
pub fn write_fragment(color: &mut u32, depth: &mut f32, fragment: u32, t: f32) -> bool {
    if t < *depth {
        *color = fragment;
        *depth = t;
        true
    } else {
        false
    }
}

/// A frame with a packed color buffer and a depth buffer holding the ray parameter of the
/// nearest surface written so far.
pub struct Frame {
    width: usize,
    height: usize,

    colors: Vec<u32>,
    depths: Vec<f32>,
}

impl Frame {
    /// Creates a new cleared frame.
    ///
    /// # Arguments
    /// * `width` - The width of the frame.
    /// * `height` - The height of the frame.
    pub fn new_empty(width: usize, height: usize) -> Self {
        let num_pixels = width * height;

        Self {
            width,
            height,
            colors: vec![0u32; num_pixels],
            depths: vec![f32::INFINITY; num_pixels],
        }
    }

    /// Resets all colors to transparent black and all depths to infinity.
    pub fn clear(&mut self) {
        self.colors.fill(0u32);
        self.depths.fill(f32::INFINITY);
    }

    #[inline]
    pub fn get_width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn get_height(&self) -> usize {
        self.height
    }

    /// Returns the packed colors row by row, where the first row is the top row.
    #[inline]
    pub fn get_colors(&self) -> &[u32] {
        &self.colors
    }

    #[inline]
    pub fn get_depths(&self) -> &[f32] {
        &self.depths
    }

    /// Returns the color of the given pixel.
    #[inline]
    pub fn color(&self, x: usize, y: usize) -> u32 {
        self.colors[y * self.width + x]
    }

    /// Returns the depth of the given pixel.
    #[inline]
    pub fn depth(&self, x: usize, y: usize) -> f32 {
        self.depths[y * self.width + x]
    }

    /// Returns the mutable color and depth buffers.
    pub(crate) fn buffers_mut(&mut self) -> (&mut [u32], &mut [f32]) {
        (&mut self.colors, &mut self.depths)
    }

    /// Saves the colors as ASCII PPM file.
    ///
    /// # Arguments
    /// * `path` - The path of the image file.
    pub fn save_ppm<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_ppm(&mut writer)?;
        writer.flush()?;

        Ok(())
    }

    /// Writes the colors as ASCII PPM (P3) image. The alpha channel is dropped.
    ///
    /// # Arguments
    /// * `out` - The writer to which the image is written.
    pub fn write_ppm<W: Write>(&self, mut out: W) -> Result<()> {
        writeln!(out, "P3")?;
        writeln!(out, "{} {}", self.width, self.height)?;
        writeln!(out, "255")?;

        for row in self.colors.chunks(self.width.max(1)) {
            let mut first = true;
            for color in row {
                let [r, g, b, _] = unpack_rgba(*color);
                if !first {
                    write!(out, " ")?;
                }
                write!(out, "{} {} {}", r, g, b)?;
                first = false;
            }

            writeln!(out)?;
        }

        Ok(())
    }

    /// Writes the depth buffer as ASCII PGM (P2) image. Near surfaces are bright, infinite
    /// depths are black.
    ///
    /// # Arguments
    /// * `out` - The writer to which the image is written.
    pub fn write_depth_as_pgm<W: Write>(&self, mut out: W) -> Result<()> {
        let (min_depth, max_depth) = self
            .depths
            .iter()
            .filter(|d| d.is_finite())
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), d| {
                (lo.min(*d), hi.max(*d))
            });
        let range = (max_depth - min_depth).max(f32::EPSILON);

        writeln!(out, "P2")?;
        writeln!(out, "{} {}", self.width, self.height)?;
        writeln!(out, "255")?;

        for row in self.depths.chunks(self.width.max(1)) {
            let line = row
                .iter()
                .map(|d| {
                    if d.is_finite() {
                        let v = 1f32 - (d - min_depth) / range;
                        ((v * 200f32) as u32 + 55).to_string()
                    } else {
                        "0".to_string()
                    }
                })
                .collect::<Vec<_>>()
                .join(" ");
            writeln!(out, "{}", line)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn write_pixel(frame: &mut Frame, x: usize, y: usize, fragment: u32, t: f32) -> bool {
        let index = y * frame.get_width() + x;
        let (colors, depths) = frame.buffers_mut();
        write_fragment(&mut colors[index], &mut depths[index], fragment, t)
    }

    #[test]
    fn test_pack_rgba() {
        assert_eq!(pack_rgba(&Vec4::new(1.0, 0.0, 0.0, 1.0)), 0xff0000ff);
        assert_eq!(pack_rgba(&Vec4::new(0.0, 1.0, 0.0, 0.0)), 0x0000ff00);
        assert_eq!(pack_rgba(&Vec4::new(2.0, -1.0, 0.5, 1.0)), 0xff8000ff);
        assert_eq!(unpack_rgba(0xff8000ff), [255, 0, 128, 255]);
    }

    #[test]
    fn test_depth_test() {
        let mut frame = Frame::new_empty(3, 2);
        assert_eq!(frame.depth(2, 1), f32::INFINITY);

        assert!(write_pixel(&mut frame, 2, 1, 7, 5.0));
        assert!(!write_pixel(&mut frame, 2, 1, 8, 6.0));
        assert!(!write_pixel(&mut frame, 2, 1, 8, 5.0));
        assert!(write_pixel(&mut frame, 2, 1, 9, 4.0));

        assert_eq!(frame.color(2, 1), 9);
        assert_eq!(frame.depth(2, 1), 4.0);
        assert_eq!(frame.get_colors()[5], 9);

        frame.clear();
        assert_eq!(frame.color(2, 1), 0);
        assert_eq!(frame.depth(2, 1), f32::INFINITY);
    }

    #[test]
    fn test_write_ppm() {
        let mut frame = Frame::new_empty(2, 2);
        write_pixel(&mut frame, 0, 0, pack_rgba(&Vec4::new(1.0, 0.0, 0.0, 1.0)), 1.0);
        write_pixel(&mut frame, 1, 1, pack_rgba(&Vec4::new(0.0, 0.0, 1.0, 1.0)), 1.0);

        let mut buffer = Vec::new();
        frame.write_ppm(&mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();

        assert_eq!(text, "P3\n2 2\n255\n255 0 0 0 0 0\n0 0 0 0 0 255\n");
    }

    #[test]
    fn test_write_depth_pgm() {
        let mut frame = Frame::new_empty(3, 1);
        write_pixel(&mut frame, 0, 0, 1, 1.0);
        write_pixel(&mut frame, 1, 0, 1, 3.0);

        let mut buffer = Vec::new();
        frame.write_depth_as_pgm(&mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();

        assert_eq!(text, "P2\n3 1\n255\n255 55 0\n");
    }
}
