//! Common utilities module
//!
//! Types shared by every stage of the pipeline: errors, the owned raster
//! representation and the cooperative progress/cancellation handle.

pub mod error;
pub mod progress;
pub mod raster;

pub use error::{CacheError, PipelineError, Result};
pub use progress::ProgressHandle;
pub use raster::{Raster, Rect};
