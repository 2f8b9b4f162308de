//! RAW image data types

use std::fmt;
use std::path::{Path, PathBuf};

use crate::image_pipeline::common::raster::Raster;

/// Filter code of a sensor without a colour filter array.
pub const FILTERS_NONE: u32 = 0;
/// Filter code of a CFA that is not a 2x2 Bayer tiling (X-Trans and friends).
pub const FILTERS_NON_BAYER: u32 = 0xFFFF_FFFF;

/// RAW container families. Each family gets its own pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatFamily {
    Arw,
    Cr2,
    Crw,
    Dng,
    Nef,
    Orf,
    Pef,
    Raf,
    Rw2,
    Srw,
    Other,
}

impl FormatFamily {
    pub const ALL: [FormatFamily; 11] = [
        FormatFamily::Arw,
        FormatFamily::Cr2,
        FormatFamily::Crw,
        FormatFamily::Dng,
        FormatFamily::Nef,
        FormatFamily::Orf,
        FormatFamily::Pef,
        FormatFamily::Raf,
        FormatFamily::Rw2,
        FormatFamily::Srw,
        FormatFamily::Other,
    ];

    /// Family for a lowercase or uppercase file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        let family = match ext.to_ascii_lowercase().as_str() {
            "arw" | "srf" | "sr2" => FormatFamily::Arw,
            "cr2" | "cr3" => FormatFamily::Cr2,
            "crw" => FormatFamily::Crw,
            "dng" => FormatFamily::Dng,
            "nef" | "nrw" => FormatFamily::Nef,
            "orf" => FormatFamily::Orf,
            "pef" => FormatFamily::Pef,
            "raf" => FormatFamily::Raf,
            "rw2" | "raw" => FormatFamily::Rw2,
            "srw" => FormatFamily::Srw,
            "mrw" | "3fr" | "erf" | "kdc" | "dcr" | "mef" | "mos" | "iiq" | "x3f" => FormatFamily::Other,
            _ => return None,
        };
        Some(family)
    }
}

impl fmt::Display for FormatFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FormatFamily::Arw => "ARW",
            FormatFamily::Cr2 => "CR2",
            FormatFamily::Crw => "CRW",
            FormatFamily::Dng => "DNG",
            FormatFamily::Nef => "NEF",
            FormatFamily::Orf => "ORF",
            FormatFamily::Pef => "PEF",
            FormatFamily::Raf => "RAF",
            FormatFamily::Rw2 => "RW2",
            FormatFamily::Srw => "SRW",
            FormatFamily::Other => "RAW",
        };
        f.write_str(name)
    }
}

/// Colour channel of a CFA site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Red,
    Green,
    Blue,
}

impl Channel {
    pub fn index(self) -> usize {
        match self {
            Channel::Red => 0,
            Channel::Green => 1,
            Channel::Blue => 2,
        }
    }
}

/// The four rotations of the 2x2 Bayer tiling, named by the colours of
/// the top-left 2x2 block read row by row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterPattern {
    Rggb,
    Bggr,
    Grbg,
    Gbrg,
}

impl FilterPattern {
    /// Decodes a dcraw-style filter code. Trivial and non-Bayer codes yield `None`.
    pub fn from_filters(filters: u32) -> Option<Self> {
        match filters {
            0x9494_9494 => Some(FilterPattern::Rggb),
            0x1616_1616 => Some(FilterPattern::Bggr),
            0x6161_6161 => Some(FilterPattern::Grbg),
            0x4949_4949 => Some(FilterPattern::Gbrg),
            _ => None,
        }
    }

    pub fn filters(self) -> u32 {
        match self {
            FilterPattern::Rggb => 0x9494_9494,
            FilterPattern::Bggr => 0x1616_1616,
            FilterPattern::Grbg => 0x6161_6161,
            FilterPattern::Gbrg => 0x4949_4949,
        }
    }

    /// Parses a CFA name such as `"RGGB"`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "RGGB" => Some(FilterPattern::Rggb),
            "BGGR" => Some(FilterPattern::Bggr),
            "GRBG" => Some(FilterPattern::Grbg),
            "GBRG" => Some(FilterPattern::Gbrg),
            _ => None,
        }
    }

    /// Colour of the site at absolute `(x, y)`.
    pub fn color_at(self, x: i32, y: i32) -> Channel {
        let shift = ((((y << 1) & 14) | (x & 1)) << 1) as u32;
        match (self.filters() >> shift) & 3 {
            0 => Channel::Red,
            2 => Channel::Blue,
            _ => Channel::Green,
        }
    }
}

/// Everything known about a RAW file before its pixels are decoded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageSource {
    pub path: PathBuf,
    /// Size after the camera's active-area crop.
    pub image_width: u32,
    pub image_height: u32,
    /// Full sensor size as stored in the file.
    pub raw_width: u32,
    pub raw_height: u32,
    /// dcraw filter code, see [`FilterPattern`].
    pub filters: u32,
    pub raw_colors: u32,
    pub make: String,
    pub model: String,
    pub decodable: bool,
    /// Capture time from file metadata, epoch millis.
    pub capture_time_millis: Option<i64>,
    /// Capture time reported by the decoder, epoch millis.
    pub decoder_capture_time_millis: Option<i64>,
}

impl ImageSource {
    /// Metadata capture time, falling back to the decoder's.
    pub fn capture_time(&self) -> Option<i64> {
        self.capture_time_millis.or(self.decoder_capture_time_millis)
    }

    pub fn filter_pattern(&self) -> Option<FilterPattern> {
        FilterPattern::from_filters(self.filters)
    }

    /// Whether the filter code asks for a demosaic at all.
    pub fn is_mosaiced(&self) -> bool {
        self.filters != FILTERS_NONE && self.filters != FILTERS_NON_BAYER
    }

    pub fn file_name(&self) -> String {
        file_name_of(&self.path)
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// Decoder output: either one CFA band or three demosaiced bands.
#[derive(Debug, Clone)]
pub struct DecodedRaster {
    pub raster: Raster,
    /// Actual bits per sample from the sensor (e.g., 12, 14, or 16)
    pub bits_per_sample: u32,
}
