//! Bilinear rotation and scaling of multi-band rasters.
//!
//! Both operations use inverse mapping: every output pixel centre is mapped
//! back into the source and interpolated from its four neighbours.
//!
//! For rotation by θ about the source centre `(cx, cy)` (y axis down, so a
//! positive angle turns the picture clockwise on screen):
//! ```text
//! src_x = cx + dx * cos(θ) + dy * sin(θ)
//! src_y = cy - dx * sin(θ) + dy * cos(θ)
//! ```

use rayon::prelude::*;

use crate::image_pipeline::common::raster::{Raster, Rect};

/// Bounding box of a `width x height` rectangle rotated by `radians`.
pub fn compute_rotated_bounds(width: u32, height: u32, radians: f64) -> (u32, u32) {
    let cos = radians.cos().abs();
    let sin = radians.sin().abs();
    let (w, h) = (width as f64, height as f64);

    let new_w = (w * cos + h * sin).round() as u32;
    let new_h = (w * sin + h * cos).round() as u32;
    (new_w.max(1), new_h.max(1))
}

/// Interpolated sample at a fractional source position, where integer
/// positions are pixel centres. Leaves `out` untouched and returns `false`
/// outside the raster.
fn sample_bilinear(src: &Raster, x: f64, y: f64, out: &mut [u16]) -> bool {
    let b = src.bounds();
    let (x0, y0) = (x.floor() as i32, y.floor() as i32);
    if x0 < b.x || y0 < b.y || x0 >= b.right() || y0 >= b.bottom() {
        return false;
    }
    sample_bilinear_clamped(src, x, y, out);
    true
}

/// Bilinear sample that replicates edge pixels outside the raster.
fn sample_bilinear_clamped(src: &Raster, x: f64, y: f64, out: &mut [u16]) {
    let (fx0, fy0) = (x.floor(), y.floor());
    let (x0, y0) = (fx0 as i32, fy0 as i32);
    let (fx, fy) = ((x - fx0).clamp(0.0, 1.0), (y - fy0).clamp(0.0, 1.0));
    for (band, slot) in out.iter_mut().enumerate() {
        let p00 = src.get_clamped(x0, y0, band) as f64;
        let p10 = src.get_clamped(x0 + 1, y0, band) as f64;
        let p01 = src.get_clamped(x0, y0 + 1, band) as f64;
        let p11 = src.get_clamped(x0 + 1, y0 + 1, band) as f64;
        let v = p00 * (1.0 - fx) * (1.0 - fy)
            + p10 * fx * (1.0 - fy)
            + p01 * (1.0 - fx) * fy
            + p11 * fx * fy;
        *slot = v.clamp(0.0, 65535.0).round() as u16;
    }
}

/// Rotates `src` about its centre. The output covers the whole rotated
/// image, is centred on the same point and keeps absolute coordinates.
/// Areas not covered by the source are zero.
pub fn rotate(src: &Raster, radians: f64) -> Raster {
    let b = src.bounds();
    let (dst_w, dst_h) = compute_rotated_bounds(b.width, b.height, radians);

    let cx = b.x as f64 + b.width as f64 / 2.0;
    let cy = b.y as f64 + b.height as f64 / 2.0;
    let dst_bounds = Rect::new(
        (cx - dst_w as f64 / 2.0).round() as i32,
        (cy - dst_h as f64 / 2.0).round() as i32,
        dst_w,
        dst_h,
    );

    let (cos, sin) = (radians.cos(), radians.sin());
    let bands = src.bands();
    let mut out = Raster::new(dst_bounds, bands);

    out.data_mut()
        .par_chunks_mut(dst_w as usize * bands)
        .enumerate()
        .for_each(|(row, line)| {
            let dy = dst_bounds.y as f64 + row as f64 + 0.5 - cy;
            for (col, px) in line.chunks_exact_mut(bands).enumerate() {
                let dx = dst_bounds.x as f64 + col as f64 + 0.5 - cx;
                let sx = cx + dx * cos + dy * sin - 0.5;
                let sy = cy - dx * sin + dy * cos - 0.5;
                sample_bilinear(src, sx, sy, px);
            }
        });

    out
}

/// Rescales `src` by `(scale_x, scale_y)` with edge-replicated borders.
/// Output sizes are rounded down and the output starts at the origin. An
/// empty source, or one that scales below a pixel, gives an empty raster.
pub fn scale(src: &Raster, scale_x: f64, scale_y: f64) -> Raster {
    let b = src.bounds();
    let dst_w = (b.width as f64 * scale_x).floor() as u32;
    let dst_h = (b.height as f64 * scale_y).floor() as u32;
    let bands = src.bands();
    let mut out = Raster::new(Rect::new(0, 0, dst_w, dst_h), bands);
    if b.is_empty() || out.bounds().is_empty() {
        return Raster::new(Rect::new(0, 0, 0, 0), bands);
    }

    out.data_mut()
        .par_chunks_mut(dst_w as usize * bands)
        .enumerate()
        .for_each(|(row, line)| {
            let sy = b.y as f64 + (row as f64 + 0.5) / scale_y - 0.5;
            for (col, px) in line.chunks_exact_mut(bands).enumerate() {
                let sx = b.x as f64 + (col as f64 + 0.5) / scale_x - 0.5;
                sample_bilinear_clamped(src, sx, sy, px);
            }
        });

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_4;

    fn flat(bounds: Rect, value: u16) -> Raster {
        Raster::from_data(bounds, 3, vec![value; bounds.area() * 3]).unwrap()
    }

    #[test]
    fn test_rotated_bounds() {
        assert_eq!(compute_rotated_bounds(100, 50, 0.0), (100, 50));
        assert_eq!(compute_rotated_bounds(100, 100, FRAC_PI_4), (141, 141));
    }

    #[test]
    fn test_rotate_keeps_centre() {
        let src = flat(Rect::new(10, 20, 100, 60), 1000);
        let out = rotate(&src, FRAC_PI_4);
        let b = out.bounds();
        let (cx, cy) = (b.x as f64 + b.width as f64 / 2.0, b.y as f64 + b.height as f64 / 2.0);
        assert!((cx - 60.0).abs() <= 1.0);
        assert!((cy - 50.0).abs() <= 1.0);
        // Centre is covered, the corners of the bounding box are not.
        assert_eq!(out.get(60, 50, 1), 1000);
        assert_eq!(out.get(b.x, b.y, 1), 0);
    }

    #[test]
    fn test_rotate_quarter_turn_moves_pixels_clockwise() {
        let mut src = Raster::new(Rect::new(0, 0, 9, 9), 1);
        src.set(8, 4, 0, 500); // right-hand middle
        let out = rotate(&src, std::f64::consts::FRAC_PI_2);
        assert_eq!(out.bounds(), Rect::new(0, 0, 9, 9));
        assert_eq!(out.get(4, 8, 0), 500); // bottom middle
    }

    #[test]
    fn test_scale_dimensions_and_flat_content() {
        let src = flat(Rect::new(5, 5, 40, 20), 700);
        let out = scale(&src, 0.75, 1.5);
        assert_eq!(out.bounds(), Rect::new(0, 0, 30, 30));
        assert!(out.data().iter().all(|&v| v == 700));
    }

    #[test]
    fn test_scale_rounds_down() {
        let out = scale(&flat(Rect::new(0, 0, 82, 42), 1), 0.75, 1.5);
        assert_eq!((out.width(), out.height()), (61, 63));
    }

    #[test]
    fn test_scale_empty_source() {
        let empty = Raster::new(Rect::new(5, 5, 0, 0), 3);
        assert!(scale(&empty, 0.75, 1.5).bounds().is_empty());
        // One column shrinks to nothing.
        let sliver = flat(Rect::new(0, 0, 1, 8), 3);
        assert!(scale(&sliver, 0.75, 1.5).bounds().is_empty());
    }
}
