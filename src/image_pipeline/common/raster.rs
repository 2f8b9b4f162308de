//! Owned 16-bit rasters with absolute bounds.
//!
//! Every stage of the pipeline passes pixels around as a [`Raster`]: an
//! interleaved `u16` buffer plus the rectangle it covers. The origin of that
//! rectangle may be anywhere (demosaic and crops keep absolute coordinates),
//! which is what lets geometry rules speak in sensor coordinates.

/// Axis-aligned rectangle in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> i32 {
        self.x + self.width as i32
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height as i32
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Overlap of two rectangles, `None` when they do not touch.
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(Rect::new(x0, y0, (x1 - x0) as u32, (y1 - y0) as u32))
    }

    /// Shrinks the rectangle by `amount` on every side. Saturates to empty.
    pub fn inset(&self, amount: u32) -> Rect {
        Rect::new(
            self.x + amount as i32,
            self.y + amount as i32,
            self.width.saturating_sub(2 * amount),
            self.height.saturating_sub(2 * amount),
        )
    }

    pub fn translate(&self, dx: i32, dy: i32) -> Rect {
        Rect::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x && y >= self.y && x < self.right() && y < self.bottom()
    }
}

/// Interleaved multi-band 16-bit raster.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    bounds: Rect,
    bands: usize,
    data: Vec<u16>,
}

impl Raster {
    /// Zero-filled raster covering `bounds`.
    pub fn new(bounds: Rect, bands: usize) -> Self {
        Self {
            bounds,
            bands,
            data: vec![0; bounds.area() * bands],
        }
    }

    /// Wraps an existing buffer. Returns `None` if its length does not match.
    pub fn from_data(bounds: Rect, bands: usize, data: Vec<u16>) -> Option<Self> {
        if bands == 0 || data.len() != bounds.area() * bands {
            return None;
        }
        Some(Self { bounds, bands, data })
    }

    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    pub fn width(&self) -> u32 {
        self.bounds.width
    }

    pub fn height(&self) -> u32 {
        self.bounds.height
    }

    pub fn bands(&self) -> usize {
        self.bands
    }

    pub fn data(&self) -> &[u16] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u16] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<u16> {
        self.data
    }

    /// Samples of one row, in absolute row coordinates.
    pub fn row(&self, y: i32) -> &[u16] {
        let stride = self.bounds.width as usize * self.bands;
        let start = (y - self.bounds.y) as usize * stride;
        &self.data[start..start + stride]
    }

    /// Sample of `band` at absolute `(x, y)`. Panics outside the bounds.
    pub fn get(&self, x: i32, y: i32, band: usize) -> u16 {
        self.data[self.offset(x, y) + band]
    }

    pub fn set(&mut self, x: i32, y: i32, band: usize, value: u16) {
        let offset = self.offset(x, y);
        self.data[offset + band] = value;
    }

    /// Like [`get`](Self::get) but clamps the coordinates to the bounds.
    pub fn get_clamped(&self, x: i32, y: i32, band: usize) -> u16 {
        let x = x.clamp(self.bounds.x, self.bounds.right() - 1);
        let y = y.clamp(self.bounds.y, self.bounds.bottom() - 1);
        self.get(x, y, band)
    }

    fn offset(&self, x: i32, y: i32) -> usize {
        let col = (x - self.bounds.x) as usize;
        let row = (y - self.bounds.y) as usize;
        (row * self.bounds.width as usize + col) * self.bands
    }

    /// Copy of the part of `self` inside `rect`, keeping absolute coordinates.
    pub fn crop(&self, rect: Rect) -> Option<Raster> {
        let area = self.bounds.intersection(&rect)?;
        let mut out = Raster::new(area, self.bands);
        out.copy_from(self);
        Some(out)
    }

    /// Copies the overlap of `src` into `self`. Band counts must agree.
    /// Returns the number of pixels copied.
    pub fn copy_from(&mut self, src: &Raster) -> usize {
        debug_assert_eq!(self.bands, src.bands);
        let Some(area) = self.bounds.intersection(&src.bounds) else {
            return 0;
        };
        let run = area.width as usize * self.bands;
        for y in area.y..area.bottom() {
            let s = src.offset(area.x, y);
            let d = self.offset(area.x, y);
            self.data[d..d + run].copy_from_slice(&src.data[s..s + run]);
        }
        area.area()
    }

    /// Same pixels, origin moved to `(0, 0)`.
    pub fn into_origin(mut self) -> Raster {
        self.bounds = Rect::new(0, 0, self.bounds.width, self.bounds.height);
        self
    }

    /// Replicates a single-band raster into `bands` identical bands.
    pub fn expand_bands(&self, bands: usize) -> Raster {
        if self.bands == bands {
            return self.clone();
        }
        let mut data = Vec::with_capacity(self.bounds.area() * bands);
        for px in self.data.chunks_exact(self.bands) {
            for b in 0..bands {
                data.push(px[b.min(self.bands - 1)]);
            }
        }
        Raster { bounds: self.bounds, bands, data }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_intersection() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(5, -3, 10, 5);
        assert_eq!(a.intersection(&b), Some(Rect::new(5, 0, 5, 2)));
        assert_eq!(a.intersection(&Rect::new(10, 0, 4, 4)), None);
    }

    #[test]
    fn test_rect_inset() {
        let r = Rect::new(0, 0, 100, 100).inset(4);
        assert_eq!(r, Rect::new(4, 4, 92, 92));
        assert!(Rect::new(0, 0, 6, 6).inset(4).is_empty());
    }

    #[test]
    fn test_from_data_rejects_wrong_length() {
        assert!(Raster::from_data(Rect::new(0, 0, 2, 2), 3, vec![0; 11]).is_none());
        assert!(Raster::from_data(Rect::new(0, 0, 2, 2), 3, vec![0; 12]).is_some());
    }

    #[test]
    fn test_crop_keeps_absolute_coordinates() {
        let data: Vec<u16> = (0..100).collect();
        let raster = Raster::from_data(Rect::new(0, 0, 10, 10), 1, data).unwrap();
        let cropped = raster.crop(Rect::new(2, 3, 4, 2)).unwrap();
        assert_eq!(cropped.bounds(), Rect::new(2, 3, 4, 2));
        assert_eq!(cropped.get(2, 3, 0), 32);
        assert_eq!(cropped.get(5, 4, 0), 45);
    }

    #[test]
    fn test_copy_from_overlap_only() {
        let src = Raster::from_data(Rect::new(2, 2, 2, 2), 1, vec![7; 4]).unwrap();
        let mut dst = Raster::new(Rect::new(0, 0, 3, 3), 1);
        assert_eq!(dst.copy_from(&src), 1);
        assert_eq!(dst.get(2, 2, 0), 7);
        assert_eq!(dst.data().iter().filter(|&&v| v == 7).count(), 1);
    }

    #[test]
    fn test_expand_bands() {
        let mono = Raster::from_data(Rect::new(0, 0, 2, 1), 1, vec![1, 2]).unwrap();
        let rgb = mono.expand_bands(3);
        assert_eq!(rgb.data(), &[1, 1, 1, 2, 2, 2]);
    }

    #[test]
    fn test_get_clamped() {
        let r = Raster::from_data(Rect::new(4, 4, 2, 2), 1, vec![1, 2, 3, 4]).unwrap();
        assert_eq!(r.get_clamped(0, 0, 0), 1);
        assert_eq!(r.get_clamped(10, 10, 0), 4);
    }
}
