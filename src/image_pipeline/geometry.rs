//! Geometry correction module
//!
//! Rotation and rescaling primitives plus the per-camera rule table that
//! decides how a demosaiced raster is straightened and trimmed.

pub mod quirks;
pub mod transform;

pub use quirks::{correct_geometry, select_correction, Correction, QuirkRule, BORDER_CROP, QUIRK_RULES};
pub use transform::{rotate, scale};
