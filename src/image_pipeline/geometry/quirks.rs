//! Per-camera geometry corrections.
//!
//! A small closed table of rules, evaluated in order; the first rule whose
//! conditions all hold decides the correction. Cameras without a rule get
//! the default border crop.

use std::f64::consts::PI;

use tracing::debug;

use crate::image_pipeline::common::raster::{Raster, Rect};
use crate::image_pipeline::geometry::transform;
use crate::image_pipeline::raw::types::{FormatFamily, ImageSource};

/// Pixels trimmed on each side by the default correction and before the
/// non-square-pixel rescale.
pub const BORDER_CROP: u32 = 5;

/// Inset of the centred crop after a sensor rotation.
const ROTATION_CROP_MARGIN: i32 = 2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Correction {
    /// Sensor mounted at an angle: rotate about the centre, then crop back
    /// to the metadata size less the margin.
    RotateSensor { radians: f64 },
    /// Non-square photosites: trim the border, then rescale.
    NonSquarePixels { scale_x: f64, scale_y: f64 },
    /// Drop [`BORDER_CROP`] pixels on each side.
    BorderCrop,
}

/// One row of the quirk table. `None` fields match anything.
#[derive(Debug)]
pub struct QuirkRule {
    pub families: &'static [FormatFamily],
    /// Case-insensitive prefix of the camera make.
    pub make_prefix: Option<&'static str>,
    /// Case-insensitive exact camera model.
    pub model: Option<&'static str>,
    /// Only applies when the metadata width differs from the sensor width.
    pub requires_crop_mismatch: bool,
    pub correction: Correction,
}

impl QuirkRule {
    pub fn matches(&self, family: FormatFamily, source: &ImageSource) -> bool {
        if !self.families.is_empty() && !self.families.contains(&family) {
            return false;
        }
        if let Some(prefix) = self.make_prefix {
            let make = source.make.to_ascii_uppercase();
            if !make.starts_with(&prefix.to_ascii_uppercase()) {
                return false;
            }
        }
        if let Some(model) = self.model {
            if !source.model.eq_ignore_ascii_case(model) {
                return false;
            }
        }
        if self.requires_crop_mismatch && source.image_width == source.raw_width {
            return false;
        }
        true
    }
}

const S2PRO_ROTATION: Correction = Correction::RotateSensor { radians: 3.0 * PI / 4.0 };
const FUJI_ROTATION: Correction = Correction::RotateSensor { radians: PI / 4.0 };

pub static QUIRK_RULES: &[QuirkRule] = &[
    QuirkRule {
        families: &[FormatFamily::Raf],
        make_prefix: None,
        model: Some("FinePix S2Pro"),
        requires_crop_mismatch: true,
        correction: S2PRO_ROTATION,
    },
    QuirkRule {
        families: &[FormatFamily::Dng],
        make_prefix: Some("FUJI"),
        model: Some("FinePix S2Pro"),
        requires_crop_mismatch: true,
        correction: S2PRO_ROTATION,
    },
    QuirkRule {
        families: &[FormatFamily::Raf],
        make_prefix: None,
        model: None,
        requires_crop_mismatch: true,
        correction: FUJI_ROTATION,
    },
    QuirkRule {
        families: &[FormatFamily::Dng],
        make_prefix: Some("FUJI"),
        model: None,
        requires_crop_mismatch: true,
        correction: FUJI_ROTATION,
    },
    QuirkRule {
        families: &[],
        make_prefix: Some("NIKON"),
        model: Some("D1X"),
        requires_crop_mismatch: false,
        correction: Correction::NonSquarePixels { scale_x: 0.75, scale_y: 1.5 },
    },
];

pub fn select_correction(family: FormatFamily, source: &ImageSource) -> Correction {
    QUIRK_RULES
        .iter()
        .find(|rule| rule.matches(family, source))
        .map(|rule| rule.correction)
        .unwrap_or(Correction::BorderCrop)
}

fn border_crop(raster: &Raster, amount: u32) -> Raster {
    let inner = raster.bounds().inset(amount);
    raster
        .crop(inner)
        .unwrap_or_else(|| Raster::new(Rect::new(inner.x, inner.y, 0, 0), raster.bands()))
}

/// Applies the camera's geometry correction to a demosaiced raster.
/// The result keeps whatever origin the correction produces; callers
/// translate it before tiling.
pub fn correct_geometry(raster: &Raster, family: FormatFamily, source: &ImageSource) -> Raster {
    if raster.bounds().is_empty() {
        return raster.clone();
    }
    let correction = select_correction(family, source);
    debug!(?correction, make = %source.make, model = %source.model, "Applying geometry correction");

    match correction {
        Correction::RotateSensor { radians } => {
            let rotated = transform::rotate(raster, radians);
            let b = rotated.bounds();
            let crop = Rect::new(
                b.x + (b.width as i32 - source.image_width as i32) / 2 + ROTATION_CROP_MARGIN,
                b.y + (b.height as i32 - source.image_height as i32) / 2 + ROTATION_CROP_MARGIN,
                source.image_width.saturating_sub(2 * ROTATION_CROP_MARGIN as u32),
                source.image_height.saturating_sub(2 * ROTATION_CROP_MARGIN as u32),
            );
            rotated
                .crop(crop)
                .unwrap_or_else(|| Raster::new(Rect::new(crop.x, crop.y, 0, 0), rotated.bands()))
        }
        Correction::NonSquarePixels { scale_x, scale_y } => {
            transform::scale(&border_crop(raster, BORDER_CROP), scale_x, scale_y)
        }
        Correction::BorderCrop => border_crop(raster, BORDER_CROP),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(make: &str, model: &str, image_width: u32, raw_width: u32) -> ImageSource {
        ImageSource {
            make: make.to_string(),
            model: model.to_string(),
            image_width,
            image_height: image_width,
            raw_width,
            raw_height: raw_width,
            ..Default::default()
        }
    }

    #[test]
    fn test_rule_order() {
        let s2 = source("FUJIFILM", "FinePix S2Pro", 100, 120);
        assert_eq!(select_correction(FormatFamily::Raf, &s2), S2PRO_ROTATION);
        assert_eq!(select_correction(FormatFamily::Dng, &s2), S2PRO_ROTATION);

        let s5 = source("FUJIFILM", "FinePix S5Pro", 100, 120);
        assert_eq!(select_correction(FormatFamily::Raf, &s5), FUJI_ROTATION);
        assert_eq!(select_correction(FormatFamily::Dng, &s5), FUJI_ROTATION);
    }

    #[test]
    fn test_fuji_requires_width_mismatch() {
        let xt = source("FUJIFILM", "X-T2", 120, 120);
        assert_eq!(select_correction(FormatFamily::Raf, &xt), Correction::BorderCrop);
        // A DNG from another maker never rotates.
        let leica = source("Leica", "M10", 100, 120);
        assert_eq!(select_correction(FormatFamily::Dng, &leica), Correction::BorderCrop);
    }

    #[test]
    fn test_nikon_d1x_any_family() {
        let d1x = source("NIKON CORPORATION", "d1x", 100, 100);
        assert_eq!(
            select_correction(FormatFamily::Nef, &d1x),
            Correction::NonSquarePixels { scale_x: 0.75, scale_y: 1.5 }
        );
        let d1h = source("NIKON", "D1H", 100, 100);
        assert_eq!(select_correction(FormatFamily::Nef, &d1h), Correction::BorderCrop);
    }

    #[test]
    fn test_border_crop_geometry() {
        let raster = Raster::new(Rect::new(4, 4, 92, 92), 3);
        let out = correct_geometry(&raster, FormatFamily::Cr2, &source("Canon", "EOS 5D", 100, 100));
        assert_eq!(out.bounds(), Rect::new(9, 9, 82, 82));
    }

    #[test]
    fn test_d1x_geometry() {
        let raster = Raster::new(Rect::new(4, 4, 92, 52), 3);
        let out = correct_geometry(&raster, FormatFamily::Nef, &source("NIKON", "D1X", 100, 100));
        // 82x42 after the trim, then (3/4, 3/2) rounded down.
        assert_eq!(out.bounds(), Rect::new(0, 0, 61, 63));
    }

    #[test]
    fn test_small_d1x_frame_is_empty() {
        let d1x = source("NIKON", "D1X", 18, 18);
        for side in [0, 6, 10, 11] {
            let raster = Raster::new(Rect::new(4, 4, side, side), 3);
            let out = correct_geometry(&raster, FormatFamily::Nef, &d1x);
            assert!(out.bounds().is_empty(), "{} px side", side);
        }
    }

    #[test]
    fn test_fuji_rotation_crop_size() {
        let raster = Raster::new(Rect::new(4, 4, 92, 92), 3);
        let out = correct_geometry(&raster, FormatFamily::Raf, &source("FUJIFILM", "FinePix S5Pro", 60, 100));
        assert_eq!((out.width(), out.height()), (56, 56));
    }
}
