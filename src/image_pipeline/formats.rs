//! Format resolution and per-family pipelines.

pub mod handlers;
pub mod resolver;

pub use handlers::FormatHandlers;
pub use resolver::{ExtensionProbe, FormatProbe, FormatResolver};
