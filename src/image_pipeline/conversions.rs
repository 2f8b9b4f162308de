//! Pipeline conversions module
//!
//! Orchestration of RAW decoding: cache lookup, decode, demosaic, geometry
//! correction, tiling and the hand-off to the background cache writer.

pub mod context;
mod raw_conversion;
pub mod timing;


pub use context::PipelineContext;
pub use raw_conversion::RawConversionPipeline;
pub use timing::{PipelineTimings, StepTiming, Timer};
