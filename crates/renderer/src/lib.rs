//! Rendering of interpolated AQI fields.
//!
//! - [`style`]: color boundaries and render options
//! - [`raster`]: field to north-up RGBA image
//! - [`png`]: PNG encoding with `tEXt` metadata
//! - [`metadata`]: what is published next to each image

pub mod metadata;
pub mod png;
pub mod raster;
pub mod style;

pub use metadata::{EncodedRaster, RasterMetadata};
pub use png::PngEncoder;
pub use raster::{rasterize, RasterImage};
pub use style::{Color, ColorBoundaries, ColorBoundary, ColorStop, RenderMode, RenderOptions, StyleError};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Expected {expected} values, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Style error: {0}")]
    Style(#[from] StyleError),

    #[error("PNG encoding failed: {0}")]
    Encode(String),
}
