//! PNG encoding for rendered band images.
//!
//! Band images are mostly a few hundred grey levels plus a transparent fill,
//! so the encoder first tries an indexed image (color type 3) and falls back
//! to truecolor with alpha (color type 6) when the image has more than 256
//! distinct colors.

use std::collections::{HashMap, HashSet};
use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use rayon::prelude::*;
use thiserror::Error;
use tracing::trace;

const SIGNATURE: [u8; 8] = [137, 80, 78, 71, 13, 10, 26, 10];

const MAX_PALETTE_SIZE: usize = 256;

/// Pixels handed to each worker while collecting distinct colors.
const COLOR_SCAN_CHUNK: usize = 16 * 1024;

/// PNG encoding failure.
#[derive(Error, Debug)]
pub enum PngError {
    #[error("pixel buffer holds {actual} bytes, expected {expected} for {width}x{height}")]
    BufferSize {
        width: usize,
        height: usize,
        expected: usize,
        actual: usize,
    },

    #[error("image dimensions {width}x{height} are not encodable")]
    Dimensions { width: usize, height: usize },

    #[error("IDAT compression failed: {0}")]
    Compression(#[from] std::io::Error),
}

/// Palette entry as RGBA.
pub type PaletteEntry = [u8; 4];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColorType {
    Indexed,
    Rgba,
}

impl ColorType {
    fn code(self) -> u8 {
        match self {
            ColorType::Indexed => 3,
            ColorType::Rgba => 6,
        }
    }

    fn bytes_per_pixel(self) -> usize {
        match self {
            ColorType::Indexed => 1,
            ColorType::Rgba => 4,
        }
    }
}

/// Encode RGBA pixels, choosing an indexed image when the colors fit a palette.
///
/// `pixels` is row-major from the top-left, 4 bytes per pixel.
pub fn create_png_auto(pixels: &[u8], width: usize, height: usize) -> Result<Vec<u8>, PngError> {
    validate(width, height, pixels.len(), ColorType::Rgba)?;

    match extract_palette(pixels) {
        Some((palette, indices)) => {
            trace!(width, height, colors = palette.len(), "Encoding indexed PNG");
            create_png_indexed(width, height, &palette, &indices)
        }
        None => {
            trace!(width, height, "Encoding RGBA PNG");
            create_png(pixels, width, height)
        }
    }
}

/// Encode RGBA pixels as a color type 6 image.
pub fn create_png(pixels: &[u8], width: usize, height: usize) -> Result<Vec<u8>, PngError> {
    validate(width, height, pixels.len(), ColorType::Rgba)?;
    encode(ColorType::Rgba, width, height, &[], pixels)
}

/// Encode palette indices as a color type 3 image.
///
/// A tRNS chunk is written only when some palette entry is not opaque.
pub fn create_png_indexed(
    width: usize,
    height: usize,
    palette: &[PaletteEntry],
    indices: &[u8],
) -> Result<Vec<u8>, PngError> {
    validate(width, height, indices.len(), ColorType::Indexed)?;
    encode(ColorType::Indexed, width, height, palette, indices)
}

fn validate(width: usize, height: usize, len: usize, color: ColorType) -> Result<(), PngError> {
    let limit = u32::MAX as usize;
    if width == 0 || height == 0 || width > limit || height > limit {
        return Err(PngError::Dimensions { width, height });
    }
    let expected = width * height * color.bytes_per_pixel();
    if len != expected {
        return Err(PngError::BufferSize {
            width,
            height,
            expected,
            actual: len,
        });
    }
    Ok(())
}

fn encode(
    color: ColorType,
    width: usize,
    height: usize,
    palette: &[PaletteEntry],
    data: &[u8],
) -> Result<Vec<u8>, PngError> {
    let idat = compress_scanlines(data, width * color.bytes_per_pixel())?;
    let mut png = Vec::with_capacity(SIGNATURE.len() + 64 + palette.len() * 4 + idat.len());
    png.extend_from_slice(&SIGNATURE);

    let mut header = [0u8; 13];
    header[0..4].copy_from_slice(&(width as u32).to_be_bytes());
    header[4..8].copy_from_slice(&(height as u32).to_be_bytes());
    header[8] = 8;
    header[9] = color.code();
    // Compression, filter and interlace methods stay 0.
    push_chunk(&mut png, b"IHDR", &header);

    if color == ColorType::Indexed {
        let rgb: Vec<u8> = palette.iter().flat_map(|c| [c[0], c[1], c[2]]).collect();
        push_chunk(&mut png, b"PLTE", &rgb);
        if palette.iter().any(|c| c[3] != u8::MAX) {
            let alpha: Vec<u8> = palette.iter().map(|c| c[3]).collect();
            push_chunk(&mut png, b"tRNS", &alpha);
        }
    }

    push_chunk(&mut png, b"IDAT", &idat);
    push_chunk(&mut png, b"IEND", &[]);
    Ok(png)
}

/// Prefix every scanline with filter type 0 and deflate the result.
fn compress_scanlines(data: &[u8], stride: usize) -> std::io::Result<Vec<u8>> {
    let rows = data.len() / stride;
    let mut raw = Vec::with_capacity(rows * (stride + 1));
    for row in data.chunks_exact(stride) {
        raw.push(0);
        raw.extend_from_slice(row);
    }
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(raw.len() / 4), Compression::fast());
    encoder.write_all(&raw)?;
    encoder.finish()
}

fn push_chunk(png: &mut Vec<u8>, kind: &[u8; 4], data: &[u8]) {
    png.extend_from_slice(&(data.len() as u32).to_be_bytes());
    let start = png.len();
    png.extend_from_slice(kind);
    png.extend_from_slice(data);
    let crc = crc32fast::hash(&png[start..]);
    png.extend_from_slice(&crc.to_be_bytes());
}

/// Distinct colors of the image, or `None` once there are more than 256.
fn distinct_colors(pixels: &[u8]) -> Option<Vec<u32>> {
    let found = pixels
        .par_chunks(COLOR_SCAN_CHUNK * 4)
        .map(|chunk| {
            let mut seen = HashSet::with_capacity(MAX_PALETTE_SIZE + 1);
            for px in chunk.chunks_exact(4) {
                seen.insert(u32::from_le_bytes([px[0], px[1], px[2], px[3]]));
                if seen.len() > MAX_PALETTE_SIZE {
                    return None;
                }
            }
            Some(seen)
        })
        .try_reduce(HashSet::new, |mut a, b| {
            a.extend(b);
            (a.len() <= MAX_PALETTE_SIZE).then_some(a)
        })?;

    let mut colors: Vec<u32> = found.into_iter().collect();
    colors.sort_unstable();
    Some(colors)
}

/// Palette and per-pixel indices, when the image fits an indexed encoding.
///
/// Palette order is the sorted packed color, so the output does not depend on
/// how the scan was split across threads.
fn extract_palette(pixels: &[u8]) -> Option<(Vec<PaletteEntry>, Vec<u8>)> {
    let colors = distinct_colors(pixels)?;
    let lookup: HashMap<u32, u8> = colors
        .iter()
        .enumerate()
        .map(|(i, &packed)| (packed, i as u8))
        .collect();

    let indices = pixels
        .par_chunks_exact(4)
        .map(|px| {
            let packed = u32::from_le_bytes([px[0], px[1], px[2], px[3]]);
            lookup.get(&packed).copied().unwrap_or(0)
        })
        .collect();
    let palette = colors.into_iter().map(u32::to_le_bytes).collect();
    Some((palette, indices))
}
