//! Scalar field to RGBA raster.

use rayon::prelude::*;

use crate::style::{ColorBoundaries, RenderOptions};
use crate::RenderError;

/// Minimum pixels before rows are colored in parallel.
const PARALLEL_THRESHOLD: usize = 4096;

/// RGBA pixels, 4 bytes per pixel, row 0 at the top (north).
#[derive(Debug, Clone, PartialEq)]
pub struct RasterImage {
    width: usize,
    height: usize,
    pixels: Vec<u8>,
}

impl RasterImage {
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }

    /// RGBA of the pixel at column `x`, image row `y`.
    pub fn pixel(&self, x: usize, y: usize) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y * self.width + x) * 4;
        self.pixels.get(i..i + 4).and_then(|p| p.try_into().ok())
    }
}

/// Color a row-major field (row 0 south) into a north-up image.
///
/// One pixel per value. NaN values are transparent.
pub fn rasterize(
    values: &[f64],
    width: usize,
    height: usize,
    boundaries: &ColorBoundaries,
    options: &RenderOptions,
) -> Result<RasterImage, RenderError> {
    if values.len() != width * height {
        return Err(RenderError::DimensionMismatch {
            expected: width * height,
            actual: values.len(),
        });
    }
    options.validate()?;

    let mut pixels = vec![0u8; width * height * 4];
    if pixels.is_empty() {
        return Ok(RasterImage {
            width,
            height,
            pixels,
        });
    }

    let color_row = |(y, out): (usize, &mut [u8])| {
        // image row 0 is the northernmost field row
        let row = height - 1 - y;
        let source = &values[row * width..(row + 1) * width];
        for (pixel, &value) in out.chunks_exact_mut(4).zip(source) {
            let color = boundaries.color_for(value, options.mode).scale_alpha(options.opacity);
            pixel.copy_from_slice(&[color.r, color.g, color.b, color.a]);
        }
    };

    if width * height >= PARALLEL_THRESHOLD {
        pixels.par_chunks_mut(width * 4).enumerate().for_each(color_row);
    } else {
        pixels.chunks_mut(width * 4).enumerate().for_each(color_row);
    }

    Ok(RasterImage {
        width,
        height,
        pixels,
    })
}
