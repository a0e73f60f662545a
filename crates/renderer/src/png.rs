//! PNG encoding for RGBA rasters.
//!
//! Supports two encoding modes:
//! - **Indexed PNG (color type 3)**: Used when image has ≤256 unique colors.
//!   Discrete AQI banding always fits, so this is the common path.
//! - **RGBA PNG (color type 6)**: Fallback for images with >256 colors,
//!   e.g. smooth rendering.
//!
//! [`PngEncoder`] picks the mode automatically and can embed `tEXt`
//! metadata chunks.

use rayon::prelude::*;
use std::collections::HashMap;
use std::io::Write;
use tracing::debug;

use crate::raster::RasterImage;
use crate::RenderError;

/// PNG file signature.
pub const PNG_SIGNATURE: [u8; 8] = [137, 80, 78, 71, 13, 10, 26, 10];

/// Maximum colors for indexed PNG (PNG8)
const MAX_PALETTE_SIZE: usize = 256;

/// Minimum pixels to benefit from parallel palette extraction
const PARALLEL_THRESHOLD: usize = 4096; // 64x64 or larger

type Palette = Vec<(u8, u8, u8, u8)>;

/// Encodes rasters as PNG, optionally with `tEXt` metadata.
#[derive(Debug, Clone)]
pub struct PngEncoder {
    text: Vec<(String, String)>,
    compression: flate2::Compression,
}

impl Default for PngEncoder {
    fn default() -> Self {
        Self {
            text: Vec::new(),
            compression: flate2::Compression::fast(),
        }
    }
}

impl PngEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a `tEXt` chunk. Keywords must be 1-79 Latin-1 characters.
    pub fn with_text(mut self, keyword: impl Into<String>, text: impl Into<String>) -> Self {
        self.text.push((keyword.into(), text.into()));
        self
    }

    pub fn with_texts<I>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.text.extend(entries);
        self
    }

    pub fn with_compression(mut self, level: u32) -> Self {
        self.compression = flate2::Compression::new(level.min(9));
        self
    }

    pub fn encode(&self, image: &RasterImage) -> Result<Vec<u8>, RenderError> {
        self.encode_pixels(image.pixels(), image.width(), image.height())
    }

    /// Encode raw RGBA pixels, choosing indexed mode when the colors fit.
    pub fn encode_pixels(
        &self,
        pixels: &[u8],
        width: usize,
        height: usize,
    ) -> Result<Vec<u8>, RenderError> {
        if width == 0 || height == 0 {
            return Err(RenderError::Encode("image has no pixels".to_string()));
        }
        if pixels.len() != width * height * 4 {
            return Err(RenderError::DimensionMismatch {
                expected: width * height * 4,
                actual: pixels.len(),
            });
        }
        for (keyword, _) in &self.text {
            if keyword.is_empty() || keyword.len() > 79 || !keyword.is_ascii() {
                return Err(RenderError::Encode(format!(
                    "invalid tEXt keyword '{}'",
                    keyword
                )));
            }
        }

        let num_pixels = pixels.len() / 4;

        // Try to extract a palette (use parallel version for larger images)
        let palette_result = if num_pixels >= PARALLEL_THRESHOLD {
            extract_palette_parallel(pixels)
        } else {
            extract_palette_sequential(pixels)
        };

        let indexed = palette_result.is_some();
        let result = match palette_result {
            Some((palette, indices)) => self.write_indexed(width, height, &palette, &indices),
            None => self.write_rgba(pixels, width, height),
        };
        let png =
            result.map_err(|e| RenderError::Encode(format!("IDAT compression failed: {}", e)))?;

        debug!(width, height, indexed, bytes = png.len(), "Encoded PNG");
        Ok(png)
    }

    fn write_indexed(
        &self,
        width: usize,
        height: usize,
        palette: &[(u8, u8, u8, u8)],
        indices: &[u8],
    ) -> std::io::Result<Vec<u8>> {
        let mut png = Vec::new();
        png.extend_from_slice(&PNG_SIGNATURE);

        write_chunk(&mut png, b"IHDR", &ihdr(width, height, 3));

        // PLTE chunk (palette)
        let mut plte_data = Vec::with_capacity(palette.len() * 3);
        for (r, g, b, _) in palette {
            plte_data.extend_from_slice(&[*r, *g, *b]);
        }
        write_chunk(&mut png, b"PLTE", &plte_data);

        // tRNS chunk (transparency) - only if any color has alpha < 255
        if palette.iter().any(|(_, _, _, a)| *a < 255) {
            let trns_data: Vec<u8> = palette.iter().map(|(_, _, _, a)| *a).collect();
            write_chunk(&mut png, b"tRNS", &trns_data);
        }

        self.write_text_chunks(&mut png);

        let idat_data = deflate_scanlines(indices, width, height, self.compression)?;
        write_chunk(&mut png, b"IDAT", &idat_data);
        write_chunk(&mut png, b"IEND", &[]);

        Ok(png)
    }

    fn write_rgba(&self, pixels: &[u8], width: usize, height: usize) -> std::io::Result<Vec<u8>> {
        let mut png = Vec::new();
        png.extend_from_slice(&PNG_SIGNATURE);

        write_chunk(&mut png, b"IHDR", &ihdr(width, height, 6));
        self.write_text_chunks(&mut png);

        let idat_data = deflate_scanlines(pixels, width * 4, height, self.compression)?;
        write_chunk(&mut png, b"IDAT", &idat_data);
        write_chunk(&mut png, b"IEND", &[]);

        Ok(png)
    }

    fn write_text_chunks(&self, png: &mut Vec<u8>) {
        for (keyword, text) in &self.text {
            let mut data = Vec::with_capacity(keyword.len() + 1 + text.len());
            data.extend_from_slice(keyword.as_bytes());
            data.push(0);
            // tEXt is Latin-1; anything else is replaced
            data.extend(text.chars().map(|c| if (c as u32) < 256 { c as u8 } else { b'?' }));
            write_chunk(png, b"tEXt", &data);
        }
    }
}

/// Encode RGBA pixels with automatic format selection and no metadata.
pub fn create_png_auto(pixels: &[u8], width: usize, height: usize) -> Result<Vec<u8>, RenderError> {
    PngEncoder::new().encode_pixels(pixels, width, height)
}

/// Read every `tEXt` chunk of a PNG as `(keyword, text)` pairs.
///
/// Stops at the first malformed chunk.
pub fn read_text_chunks(png: &[u8]) -> Vec<(String, String)> {
    let mut entries: Vec<(String, String)> = Vec::new();
    if png.len() < 8 || png[..8] != PNG_SIGNATURE {
        return entries;
    }

    let mut offset = 8;
    while offset + 8 <= png.len() {
        let len = u32::from_be_bytes([png[offset], png[offset + 1], png[offset + 2], png[offset + 3]])
            as usize;
        let kind = &png[offset + 4..offset + 8];
        let data_start = offset + 8;
        let Some(data) = png.get(data_start..data_start + len) else {
            break;
        };

        if kind == b"tEXt" {
            if let Some(split) = data.iter().position(|&b| b == 0) {
                let keyword: String = data[..split].iter().map(|&b| b as char).collect();
                let text: String = data[split + 1..].iter().map(|&b| b as char).collect();
                entries.push((keyword, text));
            }
        }
        if kind == b"IEND" {
            break;
        }
        // data + CRC
        offset = data_start + len + 4;
    }

    entries
}

fn ihdr(width: usize, height: usize, color_type: u8) -> Vec<u8> {
    let mut ihdr_data = Vec::with_capacity(13);
    ihdr_data.extend_from_slice(&(width as u32).to_be_bytes());
    ihdr_data.extend_from_slice(&(height as u32).to_be_bytes());
    ihdr_data.push(8); // bit depth
    ihdr_data.push(color_type); // 3 = indexed, 6 = RGBA
    ihdr_data.push(0); // compression method
    ihdr_data.push(0); // filter method
    ihdr_data.push(0); // interlace method
    ihdr_data
}

/// Pack RGBA bytes into a u32 for faster hashing and comparison
#[inline(always)]
fn pack_color(r: u8, g: u8, b: u8, a: u8) -> u32 {
    (r as u32) | ((g as u32) << 8) | ((b as u32) << 16) | ((a as u32) << 24)
}

/// Unpack u32 back to RGBA tuple
#[inline(always)]
fn unpack_color(packed: u32) -> (u8, u8, u8, u8) {
    (
        packed as u8,
        (packed >> 8) as u8,
        (packed >> 16) as u8,
        (packed >> 24) as u8,
    )
}

/// Sequential palette extraction for small images.
fn extract_palette_sequential(pixels: &[u8]) -> Option<(Palette, Vec<u8>)> {
    let mut color_to_index: HashMap<u32, u8> = HashMap::with_capacity(MAX_PALETTE_SIZE);
    let mut palette: Palette = Vec::with_capacity(MAX_PALETTE_SIZE);
    let mut indices: Vec<u8> = Vec::with_capacity(pixels.len() / 4);

    for chunk in pixels.chunks_exact(4) {
        let packed = pack_color(chunk[0], chunk[1], chunk[2], chunk[3]);

        let index = match color_to_index.get(&packed) {
            Some(&idx) => idx,
            None => {
                if palette.len() >= MAX_PALETTE_SIZE {
                    return None;
                }
                let idx = palette.len() as u8;
                palette.push((chunk[0], chunk[1], chunk[2], chunk[3]));
                color_to_index.insert(packed, idx);
                idx
            }
        };
        indices.push(index);
    }

    Some((palette, indices))
}

/// Parallel palette extraction for larger images.
///
/// Unique colors are collected per chunk, merged, and then every pixel is
/// mapped to its palette index in a second parallel pass.
fn extract_palette_parallel(pixels: &[u8]) -> Option<(Palette, Vec<u8>)> {
    let chunk_pixels = (pixels.len() / 4 / rayon::current_num_threads()).max(256);
    let chunk_size = chunk_pixels * 4;

    let unique_colors: Vec<u32> = pixels
        .par_chunks(chunk_size)
        .flat_map(|chunk| {
            let mut local_colors: HashMap<u32, ()> = HashMap::with_capacity(MAX_PALETTE_SIZE);
            for pixel in chunk.chunks_exact(4) {
                local_colors.insert(pack_color(pixel[0], pixel[1], pixel[2], pixel[3]), ());
                // Early exit if we definitely have too many colors
                if local_colors.len() > MAX_PALETTE_SIZE {
                    break;
                }
            }
            local_colors.into_keys().collect::<Vec<_>>()
        })
        .collect();

    let mut global_colors: HashMap<u32, u8> = HashMap::with_capacity(MAX_PALETTE_SIZE);
    let mut palette: Palette = Vec::with_capacity(MAX_PALETTE_SIZE);

    for packed in unique_colors {
        if !global_colors.contains_key(&packed) {
            if palette.len() >= MAX_PALETTE_SIZE {
                return None;
            }
            global_colors.insert(packed, palette.len() as u8);
            palette.push(unpack_color(packed));
        }
    }

    let mut indices = vec![0u8; pixels.len() / 4];
    indices
        .par_chunks_mut(chunk_pixels)
        .zip(pixels.par_chunks(chunk_size))
        .for_each(|(idx_chunk, px_chunk)| {
            for (idx, pixel) in idx_chunk.iter_mut().zip(px_chunk.chunks_exact(4)) {
                let packed = pack_color(pixel[0], pixel[1], pixel[2], pixel[3]);
                *idx = global_colors.get(&packed).copied().unwrap_or(0);
            }
        });

    Some((palette, indices))
}

/// Prefix each `row_bytes` scanline with filter type 0 and deflate.
fn deflate_scanlines(
    data: &[u8],
    row_bytes: usize,
    height: usize,
    compression: flate2::Compression,
) -> std::io::Result<Vec<u8>> {
    let mut uncompressed = Vec::with_capacity(height * (1 + row_bytes));
    for row in data.chunks_exact(row_bytes).take(height) {
        uncompressed.push(0); // filter type: none
        uncompressed.extend_from_slice(row);
    }

    let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), compression);
    encoder.write_all(&uncompressed)?;
    encoder.finish()
}

/// Write a PNG chunk
fn write_chunk(png: &mut Vec<u8>, chunk_type: &[u8; 4], data: &[u8]) {
    png.extend_from_slice(&(data.len() as u32).to_be_bytes());
    png.extend_from_slice(chunk_type);
    png.extend_from_slice(data);

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(chunk_type);
    hasher.update(data);
    png.extend_from_slice(&hasher.finalize().to_be_bytes());
}
