//! Types for debayering operations

/// Demosaic algorithm selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DemosaicQuality {
    /// Edge-directed green reconstruction with colour-difference red/blue.
    #[default]
    EdgeDirected,
    /// Bilinear interpolation, for fast previews.
    Linear,
}
