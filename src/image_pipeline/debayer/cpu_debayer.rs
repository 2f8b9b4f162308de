//! Edge-directed demosaic.
//!
//! Four passes over an interleaved RGB buffer the size of the CFA raster:
//!
//! 1. seed each site's own channel from the mosaic, suppressing hot pixels;
//! 2. interpolate green at red/blue sites along the flatter direction, with a
//!    high-frequency correction taken from the observed colour;
//! 3. refine those greens along the least-gradient of four directions;
//! 4. rebuild red and blue from colour differences against the green guide.
//!
//! Every pass reads a snapshot of the previous one and writes rows in
//! parallel, so the result does not depend on scheduling. Pixels closer than
//! [`DEMOSAIC_BORDER`] to an edge lack neighbours and are cropped away.

use rayon::prelude::*;
use tracing::{debug, info};

use crate::image_pipeline::common::raster::Raster;
use crate::image_pipeline::debayer::DEMOSAIC_BORDER;
use crate::image_pipeline::raw::types::{Channel, FilterPattern};

const R: usize = 0;
const G: usize = 1;
const B: usize = 2;

#[inline]
fn clamp16(v: i32) -> u16 {
    v.clamp(0, 0xffff) as u16
}

pub struct CpuDebayer {
    pattern: FilterPattern,
}

/// Read-only view of one pass's output.
struct Plane<'a> {
    data: &'a [u16],
    width: usize,
}

impl Plane<'_> {
    #[inline]
    fn at(&self, x: usize, y: usize, c: usize) -> i32 {
        self.data[3 * (y * self.width + x) + c] as i32
    }
}

impl CpuDebayer {
    pub fn new(pattern: FilterPattern) -> Self {
        Self { pattern }
    }

    /// Demosaics a single-band CFA raster. The result has three bands and
    /// bounds shrunk by [`DEMOSAIC_BORDER`] on each side.
    pub fn process(&self, cfa: &Raster) -> Raster {
        let bounds = cfa.bounds();
        let (width, height) = (bounds.width as usize, bounds.height as usize);
        info!("Starting edge-directed demosaic for image {}x{}", width, height);

        let mut rgb = vec![0u16; width * height * 3];

        self.seed(cfa, &mut rgb);
        debug!("Seeded CFA samples");

        if width > 4 && height > 4 {
            let snapshot = rgb.clone();
            self.interpolate_green(&snapshot, &mut rgb, width, height, bounds.x, bounds.y);
            let snapshot = rgb.clone();
            self.refine_green(&snapshot, &mut rgb, width, height, bounds.x, bounds.y);
            debug!("Green channel reconstructed");
        }
        if width > 2 && height > 2 {
            for channel in [Channel::Red, Channel::Blue] {
                let snapshot = rgb.clone();
                self.interpolate_color(channel, &snapshot, &mut rgb, width, height, bounds.x, bounds.y);
            }
            debug!("Red and blue channels reconstructed");
        }

        let full = Raster::from_data(bounds, 3, rgb)
            .unwrap_or_else(|| Raster::new(bounds, 3));
        full.crop(bounds.inset(DEMOSAIC_BORDER))
            .unwrap_or_else(|| Raster::new(bounds.inset(DEMOSAIC_BORDER), 3))
    }

    /// Colour of local site `(x, y)` in a raster whose origin is `(ox, oy)`.
    #[inline]
    fn color(&self, x: usize, y: usize, ox: i32, oy: i32) -> Channel {
        self.pattern.color_at(x as i32 + ox, y as i32 + oy)
    }

    fn seed(&self, cfa: &Raster, rgb: &mut [u16]) {
        let bounds = cfa.bounds();
        let (width, height) = (bounds.width as usize, bounds.height as usize);
        let src = cfa.data();
        let at = |x: usize, y: usize| src[y * width + x] as i32;

        rgb.par_chunks_mut(width * 3).enumerate().for_each(|(y, row)| {
            for x in 0..width {
                let channel = self.color(x, y, bounds.x, bounds.y);
                let mut value = at(x, y);

                if x >= 2 && x + 2 < width && y >= 2 && y + 2 < height {
                    let mut v = [0i32; 12];
                    let n = if channel == Channel::Green {
                        v[..8].copy_from_slice(&[
                            at(x - 1, y - 1),
                            at(x + 1, y - 1),
                            at(x - 1, y + 1),
                            at(x + 1, y + 1),
                            2 * at(x, y - 1),
                            2 * at(x, y + 1),
                            2 * at(x - 1, y),
                            2 * at(x + 1, y),
                        ]);
                        8
                    } else {
                        v.copy_from_slice(&[
                            at(x, y - 2),
                            at(x, y + 2),
                            at(x - 2, y),
                            at(x + 2, y),
                            2 * at(x - 1, y - 1),
                            2 * at(x + 1, y - 1),
                            2 * at(x - 1, y + 1),
                            2 * at(x + 1, y + 1),
                            2 * at(x, y - 1),
                            2 * at(x, y + 1),
                            2 * at(x - 1, y),
                            2 * at(x + 1, y),
                        ]);
                        12
                    };
                    // A site far brighter than all its neighbours is a hot pixel.
                    if v[..n].iter().all(|&nv| value >= 2 * nv) {
                        value = (v[0] + v[1] + v[2] + v[3]) / 4;
                    }
                }
                row[3 * x + channel.index()] = clamp16(value);
            }
        });
    }

    fn interpolate_green(&self, prev: &[u16], rgb: &mut [u16], width: usize, height: usize, ox: i32, oy: i32) {
        let p = Plane { data: prev, width };

        rgb.par_chunks_mut(width * 3).enumerate().for_each(|(y, row)| {
            if y < 2 || y + 2 >= height {
                return;
            }
            for x in 2..width - 2 {
                let channel = self.color(x, y, ox, oy);
                if channel == Channel::Green {
                    continue;
                }
                let c = channel.index();

                let (hl, hr) = (p.at(x - 1, y, G), p.at(x + 1, y, G));
                let (vu, vd) = (p.at(x, y - 1, G), p.at(x, y + 1, G));
                let cxy = p.at(x, y, c);
                let (chl, chr) = (p.at(x - 2, y, c), p.at(x + 2, y, c));
                let (cvu, cvd) = (p.at(x, y - 2, c), p.at(x, y + 2, c));

                let dh = (hl - hr).abs() + (chl + chr - 2 * cxy).abs();
                let dv = (vu - vd).abs() + (cvu + cvd - 2 * cxy).abs();

                // Averaging is a low pass, so put back some of the observed
                // channel's high frequencies where the channels correlate.
                let mut sample;
                if dv > dh {
                    sample = (hl + hr) / 2;
                    if sample < 4 * cxy && cxy < 4 * sample {
                        sample += (cxy - (chl + chr) / 2) / 4;
                    }
                } else if dh > dv {
                    sample = (vu + vd) / 2;
                    if sample < 4 * cxy && cxy < 4 * sample {
                        sample += (cxy - (cvu + cvd) / 2) / 4;
                    }
                } else {
                    sample = (vu + hl + vd + hr) / 4;
                    if sample < 4 * cxy && cxy < 4 * sample {
                        sample += (cxy - (chl + chr + cvu + cvd) / 4) / 8;
                    }
                }
                row[3 * x + G] = clamp16(sample);
            }
        });
    }

    fn refine_green(&self, prev: &[u16], rgb: &mut [u16], width: usize, height: usize, ox: i32, oy: i32) {
        let p = Plane { data: prev, width };

        rgb.par_chunks_mut(width * 3).enumerate().for_each(|(y, row)| {
            if y < 2 || y + 2 >= height {
                return;
            }
            for x in 2..width - 2 {
                let channel = self.color(x, y, ox, oy);
                if channel == Channel::Green {
                    continue;
                }
                let c = channel.index();

                let xy = p.at(x, y, G);
                let cxy = p.at(x, y, c);
                // Only where the channels are correlated enough.
                if !(xy < 4 * cxy && cxy < 4 * xy) {
                    continue;
                }

                let (hl, hr) = (p.at(x - 2, y, G), p.at(x + 2, y, G));
                let (vu, vd) = (p.at(x, y - 2, G), p.at(x, y + 2, G));
                let (ul, br) = (p.at(x - 2, y - 2, G), p.at(x + 2, y + 2, G));
                let (ur, bl) = (p.at(x + 2, y - 2, G), p.at(x - 2, y + 2, G));

                let (chl, chr) = (p.at(x - 2, y, c), p.at(x + 2, y, c));
                let (cvu, cvd) = (p.at(x, y - 2, c), p.at(x, y + 2, c));
                let (cul, cbr) = (p.at(x - 2, y - 2, c), p.at(x + 2, y + 2, c));
                let (cur, cbl) = (p.at(x + 2, y - 2, c), p.at(x - 2, y + 2, c));

                let candidates = [
                    (xy - (hl + hr) / 2, cxy - (chl + chr) / 2, (hl + hr) / 2),
                    (xy - (vu + vd) / 2, cxy - (cvu + cvd) / 2, (vu + vd) / 2),
                    (xy - (ul + br) / 2, cxy - (cul + cbr) / 2, (ul + br) / 2),
                    (xy - (ur + bl) / 2, cxy - (cur + cbl) / 2, (ur + bl) / 2),
                ];

                let mut best = 0;
                let mut min_gradient = i32::MAX;
                for (i, (dg, dc, _)) in candidates.iter().enumerate() {
                    let gradient = dg.abs() + dc.abs();
                    if gradient < min_gradient {
                        min_gradient = gradient;
                        best = i;
                    }
                }

                // Flat areas are left alone.
                if min_gradient > xy / 4 {
                    let (_, dc, mean) = candidates[best];
                    row[3 * x + G] = clamp16((xy + mean + dc) / 2);
                }
            }
        });
    }

    fn interpolate_color(
        &self,
        channel: Channel,
        prev: &[u16],
        rgb: &mut [u16],
        width: usize,
        height: usize,
        ox: i32,
        oy: i32,
    ) {
        let p = Plane { data: prev, width };
        let c = channel.index();
        let diff = |x: usize, y: usize| p.at(x, y, G) - p.at(x, y, c);

        rgb.par_chunks_mut(width * 3).enumerate().for_each(|(y, row)| {
            if y < 1 || y + 1 >= height {
                return;
            }
            for x in 1..width - 1 {
                let site = self.color(x, y, ox, oy);
                if site == channel {
                    continue;
                }
                let cg = p.at(x, y, G);

                let sample = if site != Channel::Green {
                    // Opposite colour: its neighbours of this channel are diagonal.
                    cg - (diff(x - 1, y - 1) + diff(x + 1, y - 1) + diff(x - 1, y + 1) + diff(x + 1, y + 1)) / 4
                } else if self.color(x, y - 1, ox, oy) == channel {
                    cg - (diff(x, y - 1) + diff(x, y + 1)) / 2
                } else {
                    cg - (diff(x - 1, y) + diff(x + 1, y)) / 2
                };
                row[3 * x + c] = clamp16(sample);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_pipeline::common::raster::Rect;

    fn uniform_mosaic(pattern: FilterPattern, width: u32, height: u32, rgb: [u16; 3]) -> Raster {
        let mut raster = Raster::new(Rect::new(0, 0, width, height), 1);
        for y in 0..height as i32 {
            for x in 0..width as i32 {
                raster.set(x, y, 0, rgb[pattern.color_at(x, y).index()]);
            }
        }
        raster
    }

    #[test]
    fn test_output_geometry() {
        let cfa = uniform_mosaic(FilterPattern::Rggb, 100, 100, [1000, 2000, 3000]);
        let out = CpuDebayer::new(FilterPattern::Rggb).process(&cfa);
        assert_eq!(out.bands(), 3);
        assert_eq!(out.bounds(), Rect::new(4, 4, 92, 92));
    }

    #[test]
    fn test_flat_field_is_reproduced() {
        for pattern in [FilterPattern::Rggb, FilterPattern::Bggr, FilterPattern::Grbg, FilterPattern::Gbrg] {
            let cfa = uniform_mosaic(pattern, 32, 24, [1000, 2000, 3000]);
            let out = CpuDebayer::new(pattern).process(&cfa);
            for px in out.data().chunks_exact(3) {
                assert_eq!(px, &[1000, 2000, 3000], "{:?}", pattern);
            }
        }
    }

    #[test]
    fn test_hot_pixel_suppressed() {
        let mut cfa = uniform_mosaic(FilterPattern::Rggb, 16, 16, [1000, 1000, 1000]);
        // (8, 8) is a red site.
        cfa.set(8, 8, 0, 60000);
        let out = CpuDebayer::new(FilterPattern::Rggb).process(&cfa);
        assert_eq!(out.get(8, 8, 0), 1000);
    }
}
